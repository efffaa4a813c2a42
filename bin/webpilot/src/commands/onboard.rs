use std::io::{self, Write};
use webpilot_core::{Config, Paths};

pub async fn run(force: bool) -> anyhow::Result<()> {
    let paths = Paths::new();

    if paths.config_file().exists() && !force {
        print!("Config already exists. Overwrite? [y/N] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let config = Config::default();
    config.save(&paths.config_file())?;
    std::fs::create_dir_all(paths.browser_dir())?;

    println!("✓ Created config: {}", paths.config_file().display());
    println!();
    println!("Next steps:");
    println!("  1. Edit {} to add your API key", paths.config_file().display());
    println!("  2. Run `webpilot status` to verify configuration");
    println!("  3. Run `webpilot serve` to start the API server");

    Ok(())
}
