//! Loading a config document from disk, the one path `config.rs`'s own
//! unit tests don't cover (they all go through `RawConfig::from_str`).

use server_proxy::config::ServerConfig;
use std::io::Write;

fn write_temp_config(contents: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!(
        "server_proxy-config-test-{}-{:?}.yaml",
        std::process::id(),
        std::thread::current().id()
    ));
    let mut file = std::fs::File::create(&path).expect("create temp config");
    file.write_all(contents.as_bytes()).expect("write temp config");
    path
}

const SAMPLE: &str = "port: 9090\n\
sql_user: root\n\
sql_pwd: root\n\
db_name: webserver\n";

#[test]
fn loads_a_config_file_from_disk() {
    let path = write_temp_config(SAMPLE);
    let config = ServerConfig::load(&path).expect("valid config file");
    assert_eq!(config.port, 9090);
    // Defaults from the derive's #[field(default = "...")] attributes.
    assert_eq!(config.thread_num, 4);
    assert_eq!(config.conn_pool_num, 8);
    assert!(config.open_log);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn missing_file_is_an_error() {
    let path = std::env::temp_dir().join("server_proxy-config-test-does-not-exist.yaml");
    let _ = std::fs::remove_file(&path);
    assert!(ServerConfig::load(&path).is_err());
}

#[test]
fn out_of_range_port_is_rejected_after_parsing() {
    let path = write_temp_config(&SAMPLE.replace("port: 9090", "port: 1"));
    let err = ServerConfig::load(&path).unwrap_err();
    assert!(format!("{err}").contains("port"));
    let _ = std::fs::remove_file(&path);
}
