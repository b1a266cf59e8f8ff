//! Server configuration: a flat YAML document matching spec.md §6's
//! CLI/config table, loaded through the teacher's own `parser`/
//! `parser_derive` mini-YAML stack.

use std::path::PathBuf;

use parser::FromYaml;
use parser_derive::YamlStruct;

use crate::error::{CleanError, Result};

/// Field-for-field mirror of the YAML document; validated into
/// `ServerConfig` below. Kept separate so the derive can stay a pure
/// field-extraction macro, it has no way to express the range checks
/// `port`/`trig_mode` need.
#[derive(Debug, YamlStruct)]
struct RawConfig {
    port: u16,
    #[field(default = "3")]
    trig_mode: u32,
    #[field(default = "60000")]
    timeout_ms: i64,
    #[field(default = "false")]
    opt_linger: bool,
    #[field(default = "3306")]
    sql_port: u16,
    sql_user: String,
    sql_pwd: String,
    db_name: String,
    #[field(default = "8")]
    conn_pool_num: usize,
    #[field(default = "4")]
    thread_num: usize,
    #[field(default = "true")]
    open_log: bool,
    #[field(default = "2")]
    log_level: u32,
    #[field(default = "1024")]
    log_que_size: usize,
    src_dir: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub trig_mode: u32,
    pub timeout_ms: i64,
    pub opt_linger: bool,
    pub sql_port: u16,
    pub sql_user: String,
    pub sql_pwd: String,
    pub db_name: String,
    pub conn_pool_num: usize,
    pub thread_num: usize,
    pub open_log: bool,
    pub log_level: u32,
    pub log_que_size: usize,
    pub src_dir: PathBuf,
}

impl ServerConfig {
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let raw = RawConfig::from_str(&text)?;
        Self::try_from(raw)
    }

    /// Bit 0 of `trig_mode`: connection sockets are edge-triggered.
    pub fn conn_edge_triggered(&self) -> bool {
        self.trig_mode & 0b01 != 0
    }

    /// Bit 1 of `trig_mode`: the listening socket is edge-triggered.
    pub fn listener_edge_triggered(&self) -> bool {
        self.trig_mode & 0b10 != 0
    }

    /// `timeoutMS ≤ 0` disables idle-connection eviction.
    pub fn timeout_enabled(&self) -> bool {
        self.timeout_ms > 0
    }
}

impl TryFrom<RawConfig> for ServerConfig {
    type Error = CleanError;

    fn try_from(raw: RawConfig) -> Result<Self> {
        if !(1024..=65535).contains(&raw.port) {
            return Err("port must be between 1024 and 65535".into());
        }
        if raw.trig_mode > 3 {
            return Err("trig_mode must be one of 0, 1, 2, 3".into());
        }
        Ok(Self {
            port: raw.port,
            trig_mode: raw.trig_mode,
            timeout_ms: raw.timeout_ms,
            opt_linger: raw.opt_linger,
            sql_port: raw.sql_port,
            sql_user: raw.sql_user,
            sql_pwd: raw.sql_pwd,
            db_name: raw.db_name,
            conn_pool_num: raw.conn_pool_num.max(1),
            thread_num: raw.thread_num.max(1),
            open_log: raw.open_log,
            log_level: raw.log_level,
            log_que_size: raw.log_que_size,
            src_dir: raw
                .src_dir
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("resources")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "port: 8080\n\
trig_mode: 3\n\
timeout_ms: 60000\n\
opt_linger: false\n\
sql_port: 3306\n\
sql_user: root\n\
sql_pwd: root\n\
db_name: webserver\n\
conn_pool_num: 8\n\
thread_num: 4\n\
open_log: true\n\
log_level: 1\n\
log_que_size: 1024\n";

    #[test]
    fn parses_the_documented_example() {
        let raw = RawConfig::from_str(SAMPLE).expect("valid config");
        let cfg = ServerConfig::try_from(raw).expect("valid ranges");
        assert_eq!(cfg.port, 8080);
        assert!(cfg.conn_edge_triggered());
        assert!(cfg.listener_edge_triggered());
        assert_eq!(cfg.src_dir, PathBuf::from("resources"));
    }

    #[test]
    fn rejects_port_out_of_range() {
        let text = SAMPLE.replace("port: 8080", "port: 80");
        let raw = RawConfig::from_str(&text).expect("valid yaml");
        assert!(ServerConfig::try_from(raw).is_err());
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let text = SAMPLE.replace("sql_user: root\n", "");
        assert!(RawConfig::from_str(&text).is_err());
    }
}
