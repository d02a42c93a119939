use std::path::PathBuf;

use clap::Parser;

use crate::config::BridgeConfig;
use crate::error::Result;

#[derive(Parser, Debug)]
#[command(name = "openhab-bridge")]
#[command(version)]
#[command(about = "Relay item updates and commands between a message bus and an openHAB REST API")]
pub struct Args {
    /// TOML config file; flags below override its values
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Server host name
    #[arg(long)]
    pub host: Option<String>,

    /// Server port
    #[arg(long)]
    pub port: Option<u16>,

    /// Basic-auth user name
    #[arg(long)]
    pub user: Option<String>,

    /// Basic-auth password
    #[arg(long)]
    pub password: Option<String>,

    /// Group whose members are long-polled
    #[arg(long)]
    pub group: Option<String>,

    /// Prefix for the bus topics
    #[arg(long)]
    pub basename: Option<String>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Load the config file (if any), apply flag overrides, and validate.
    pub fn resolve_config(&self) -> Result<BridgeConfig> {
        let mut cfg = match &self.config {
            Some(path) => BridgeConfig::load(path)?,
            None => BridgeConfig::default(),
        };
        if let Some(host) = &self.host {
            cfg.server_host = host.clone();
        }
        if let Some(port) = self.port {
            cfg.server_port = port;
        }
        if let Some(user) = &self.user {
            cfg.username = user.clone();
        }
        if let Some(password) = &self.password {
            cfg.password = password.clone();
        }
        if let Some(group) = &self.group {
            cfg.group_name = group.clone();
        }
        if let Some(basename) = &self.basename {
            cfg.basename = basename.clone();
        }
        cfg.validate()?;
        Ok(cfg)
    }
}
