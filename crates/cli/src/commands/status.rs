//! `swarmline status` — Show configuration status.

use swarmline_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    println!("Swarmline Status");
    println!("================");
    println!("  Config dir:     {}", AppConfig::config_dir().display());
    println!("  Tool root:      {}", config.tool_root().display());
    println!("  Provider:       {}", config.default_provider);
    println!("  Model:          {}", config.default_model);
    println!("  API key:        {}", if config.has_api_key() { "set" } else { "missing" });
    println!("  Temperature:    {}", config.default_temperature);
    println!("  Agents:         {}", config.effective_agents().len());
    println!("  Initial agent:  {}", config.initial_agent());
    println!("  Ceiling:        {} iterations", config.runtime.iteration_ceiling);
    match config.runtime.task_max_iterations {
        Some(bound) => println!("  Task bound:     {bound} iterations"),
        None => println!("  Task bound:     none"),
    }
    println!("  Tool calls:     {:?}", config.runtime.tool_discipline);
    println!("  Mail deadline:  {}s", config.mailbox.default_deadline_secs);
    println!("  Gateway:        {}:{}", config.gateway.host, config.gateway.port);

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  Config file found");
    } else {
        println!("\n  No config file. Run `swarmline onboard` first");
    }

    Ok(())
}
