//! `chatgate config` — Configuration inspection commands.

use chatgate_config::AppConfig;

pub async fn validate() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    println!("Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   Config parsed successfully");

            let warnings = warnings(&config);
            if warnings.is_empty() {
                println!("   All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   warning: {w}");
                }
            }

            println!();
            println!("   Gateway:      {}:{}", config.gateway.host, config.gateway.port);
            println!(
                "   Upstream:     {}",
                config.upstream.url.as_deref().unwrap_or("(unset)")
            );
            println!("   Token budget: {}", config.context.token_budget);
            println!("   Servers:      {}", config.capabilities.default_servers.len());
            println!("   Storage:      {}", config.storage.database_url);
        }
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

/// Problems that don't stop the config from loading but will bite at runtime.
fn warnings(config: &AppConfig) -> Vec<&'static str> {
    let mut warnings = Vec::new();

    if config.upstream.url.is_none() {
        warnings.push("No upstream url set (set [upstream] url or CHATGATE_UPSTREAM_URL); serve will refuse to start");
    }

    if config.identity.url.is_none() && config.upstream.url.is_some() {
        warnings.push("No identity url set; tokens are checked against the upstream's /auth");
    }

    if config
        .capabilities
        .default_servers
        .iter()
        .any(|s| !s.starts_with("http://") && !s.starts_with("https://"))
    {
        warnings.push("One or more default capability servers is not an http(s) url");
    }

    warnings
}

pub async fn show() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}
