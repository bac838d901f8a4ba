//! Environment diagnostics.

use kioskd_core::{Config, Paths};
use kioskd_driver::find_browser_binary;

pub fn run() -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;

    println!("kioskd doctor");
    println!("=============");

    match config
        .session
        .browser_path
        .clone()
        .or_else(find_browser_binary)
    {
        Some(path) => println!("browser binary:  {}", path),
        None => println!("browser binary:  NOT FOUND (install Chrome or Chromium)"),
    }

    let config_file = paths.config_file();
    println!(
        "config file:     {} ({})",
        config_file.display(),
        if config_file.exists() {
            "present"
        } else {
            "using defaults"
        }
    );

    let state_file = config.state_file(&paths);
    println!(
        "state file:      {} ({})",
        state_file.display(),
        if state_file.exists() {
            "present"
        } else {
            "empty"
        }
    );
    println!("profile root:    {}", config.profile_root(&paths).display());

    match &config.session.target_url {
        Some(url) => println!("mode:            kiosk ({})", url),
        None => println!("mode:            general"),
    }

    Ok(())
}
