//! `swarmline gateway` — Start the HTTP/WebSocket server.

use swarmline_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("Swarmline Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Agents:    {}", config.effective_agents().len());
    println!("   WebSocket: ws://{}:{}/v1/ws", config.gateway.host, config.gateway.port);

    swarmline_gateway::start(config).await?;

    Ok(())
}
