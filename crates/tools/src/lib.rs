//! Built-in tool implementations for chatgate.
//!
//! Local tools run inside the gateway process. Anything heavier lives on a
//! capability server.

pub mod ping_pong;

pub use ping_pong::PingPongTool;

use chatgate_core::error::ToolError;
use chatgate_core::tool::ToolRegistry;

/// Create the registry of built-in tools.
pub fn default_registry() -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(PingPongTool))?;
    tracing::debug!(tools = ?registry.names(), "Built-in tools registered");
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_ping_pong() {
        let registry = default_registry().unwrap();
        assert_eq!(registry.names(), vec!["ping_pong"]);
        assert_eq!(registry.definitions()[0].function.name, "ping_pong");
    }
}
