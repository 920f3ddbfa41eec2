//! `swarmline onboard` — First-time setup.

use swarmline_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");
    let workspace_dir = AppConfig::workspace_dir();

    println!("Swarmline — First-Time Setup");
    println!("============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("  Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    // The filesystem tools are confined to this directory unless
    // tools.workspace_root says otherwise.
    if !workspace_dir.exists() {
        std::fs::create_dir_all(&workspace_dir)?;
        println!("  Created workspace directory: {}", workspace_dir.display());
    }

    if config_path.exists() {
        println!("\n  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("  Created config.toml at: {}", config_path.display());
        println!("\n  Next steps:");
        println!("   1. Set SWARMLINE_API_KEY or add api_key to {}", config_path.display());
        println!("   2. Describe your agents under [[agents]]");
        println!("   3. Run: swarmline agent\n");
    }

    println!("Setup complete. Run `swarmline agent` to start a session.\n");

    Ok(())
}
