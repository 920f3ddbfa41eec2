//! `swarmline agents` — List the configured agent population.

use swarmline_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let initial = config.initial_agent();

    println!("Agents");
    println!("======");
    for profile in config.effective_agents() {
        let marker = if profile.name == initial { "*" } else { " " };
        let role = if profile.role.is_empty() {
            String::new()
        } else {
            format!(" ({})", profile.role)
        };
        println!(" {marker} {}{role}", profile.name);
        if !profile.description.is_empty() {
            println!("     {}", profile.description);
        }
        if !profile.tools.is_empty() {
            println!("     tools: {}", profile.tools.join(", "));
        }
        if let Some(max) = profile.max_iterations {
            println!("     max iterations: {max}");
        }
    }
    println!();
    println!("  * starts active");

    Ok(())
}
