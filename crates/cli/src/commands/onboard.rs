//! `chatgate onboard` — First-time setup.

use std::path::Path;

use chatgate_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config_dir = AppConfig::config_dir();

    println!("chatgate — First-Time Setup");
    println!("===========================\n");

    let config_path = write_default_config(&config_dir)?;
    match config_path {
        Some(path) => {
            println!("Created config.toml at: {}", path.display());
            println!("\nNext steps:");
            println!("   1. Set [upstream] url in {} (or export CHATGATE_UPSTREAM_URL)", path.display());
            println!("   2. Optionally list [capabilities] default_servers");
            println!("   3. Run: chatgate serve\n");
        }
        None => {
            let path = config_dir.join("config.toml");
            println!("Config already exists at: {}", path.display());
            println!("   Edit it manually or delete and re-run onboard.\n");
        }
    }

    Ok(())
}

/// Create `dir/config.toml` with defaults unless it already exists.
///
/// Returns the path written, or `None` when an existing file was left alone.
pub fn write_default_config(dir: &Path) -> std::io::Result<Option<std::path::PathBuf>> {
    std::fs::create_dir_all(dir)?;

    let config_path = dir.join("config.toml");
    if config_path.exists() {
        return Ok(None);
    }
    std::fs::write(&config_path, AppConfig::default_toml())?;
    Ok(Some(config_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_loadable_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join(".chatgate");

        let written = write_default_config(&nested).unwrap().unwrap();
        let config = AppConfig::load_from(&written).unwrap();
        assert_eq!(config.gateway.port, AppConfig::default().gateway.port);

        std::fs::write(&written, "[gateway]\nport = 9999\n").unwrap();
        assert!(write_default_config(&nested).unwrap().is_none());
        assert_eq!(AppConfig::load_from(&written).unwrap().gateway.port, 9999);
    }
}
