//! Process bootstrap: load the config, start logging, and run the event
//! loop until it errors out or the process is killed.

use std::path::PathBuf;

use server_proxy::config::ServerConfig;
use server_proxy::error::Result;
use server_proxy::log_info;
use server_proxy::log_queue;
use server_proxy::server::WebServer;

fn main() -> Result<()> {
    let config_path: PathBuf = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.yaml"));

    let config = ServerConfig::load(&config_path)?;
    log_queue::init(config.open_log, config.log_level, config.log_que_size);
    log_info!("loaded config from {}", config_path.display());

    let mut server = WebServer::new(config)?;
    server.run()
}
