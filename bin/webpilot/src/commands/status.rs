use webpilot_core::{Config, Paths};
use webpilot_tools::browser::manager::find_chrome_binary;

pub async fn run() -> anyhow::Result<()> {
    let paths = Paths::new();

    println!("webpilot status");
    println!("===============");
    println!();

    let config_path = paths.config_file();
    let config_exists = config_path.exists();
    println!(
        "Config:    {} {}",
        config_path.display(),
        if config_exists { "✓" } else { "✗ (not found)" }
    );

    match find_chrome_binary() {
        Some(path) => println!("Browser:   {} ✓", path),
        None => println!("Browser:   ✗ (Chrome not found)"),
    }

    if !config_exists {
        println!();
        println!("Run `webpilot onboard` to initialize.");
        return Ok(());
    }

    let config = Config::load(&config_path)?;

    println!("Planner:   {} ({})", config.planner.provider, config.planner.model);
    println!("Gateway:   {}:{}", config.gateway.host, config.gateway.port);
    println!();

    println!("Providers:");
    for name in ["openai", "azure", "groq"] {
        let status = match config.get_provider(name) {
            Some(provider) if !provider.api_key.is_empty() => "✓ configured",
            Some(_) => "✗ no key",
            None => "- not set",
        };
        println!("  {:<8} {}", name, status);
    }
    println!("  {:<8} {}", "fixture", "✓ built-in");

    Ok(())
}
