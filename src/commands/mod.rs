pub mod inspect;
pub mod serve;

// Re-export command functions for convenience
pub use inspect::{announce, interfaces};
pub use serve::{serve, ServeParams};

use anyhow::{Context, Result};
use std::path::Path;

use lanbeacon::config::Config;

/// Load config from a TOML file, or from the environment when no file is given
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::from_env(),
    };
    Ok(config)
}
