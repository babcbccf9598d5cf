//! `upq config` – show where the config lives and what it says.

use anyhow::Result;
use upq_core::config::{self, UploadConfig};

pub fn run_config(cfg: &UploadConfig) -> Result<()> {
    let path = config::config_path()?;
    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(cfg)?);
    if let Err(err) = cfg.validate() {
        println!("# not ready to upload: {}", err);
    }
    Ok(())
}
