//! `chatgate serve` — Start the HTTP gateway.

use std::path::PathBuf;

use chatgate_config::AppConfig;
use tracing::{info, warn};

pub struct ServeArgs {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub config: Option<PathBuf>,
}

/// The config file (or the default one) plus environment and flag overrides.
pub fn resolve_config(args: &ServeArgs) -> Result<AppConfig, Box<dyn std::error::Error + Send + Sync>> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    }
    .map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(host) = &args.host {
        config.gateway.host = host.clone();
    }
    if let Some(port) = args.port {
        config.gateway.port = port;
    }
    config.validate()?;
    Ok(config)
}

pub async fn run(args: ServeArgs) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = resolve_config(&args)?;
    let upstream = config.upstream_url()?;

    println!("chatgate gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Upstream:  {upstream}");
    println!("   Identity:  {}", config.identity_url()?);
    println!("   Default capability servers: {}", config.capabilities.default_servers.len());

    chatgate_gateway::start(config, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for Ctrl-C, running until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining in-flight requests");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "[gateway]\nport = 9000\n\n[upstream]\nurl = \"http://llm.local\"\n");

        let config = resolve_config(&ServeArgs {
            host: Some("127.0.0.1".into()),
            port: Some(9100),
            config: Some(path),
        })
        .unwrap();
        assert_eq!(config.gateway.host, "127.0.0.1");
        assert_eq!(config.gateway.port, 9100);
    }

    #[test]
    fn file_values_survive_without_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "[gateway]\nport = 9000\n");

        let config = resolve_config(&ServeArgs {
            host: None,
            port: None,
            config: Some(path),
        })
        .unwrap();
        assert_eq!(config.gateway.port, 9000);
    }

    #[test]
    fn zero_port_flag_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "");

        let result = resolve_config(&ServeArgs {
            host: None,
            port: Some(0),
            config: Some(path),
        });
        assert!(result.is_err());
    }
}
