//! `upq check` – run the file checks without uploading.

use std::path::PathBuf;

use anyhow::{Context, Result};
use upq_core::config::UploadConfig;
use upq_core::validate;
use upq_core::UploadFile;

pub fn run_check(cfg: &UploadConfig, files: &[PathBuf]) -> Result<()> {
    let rules = cfg.validation_rules();
    if let Some(allowed) = rules.extensions.as_ref().filter(|set| !set.is_empty()) {
        println!("allowed extensions: {}", allowed.iter().collect::<Vec<_>>().join(", "));
    }
    let mut rejected = 0usize;
    println!("{:<10} {:<12} {}", "VERDICT", "SIZE", "FILE");
    for path in files {
        let file = UploadFile::from_path(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        match validate::validate(&file, &rules) {
            Ok(()) => println!("{:<10} {:<12} {}", "ok", file.size(), path.display()),
            Err(err) => {
                rejected += 1;
                println!("{:<10} {:<12} {}: {}", "rejected", file.size(), path.display(), err);
            }
        }
    }
    if rejected > 0 {
        anyhow::bail!("{} of {} file(s) rejected", rejected, files.len());
    }
    Ok(())
}
