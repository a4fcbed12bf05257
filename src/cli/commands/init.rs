use anyhow::{bail, Result};
use std::path::Path;

use crate::cli::config::Config;

pub fn execute_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists. Use --force to overwrite.", path.display());
    }

    let config = Config::default();
    config.save(path)?;

    eprintln!("Created {}", path.display());
    eprintln!("  stream: {}", config.stream.endpoint);
    eprintln!("  classifier: {} ({})", config.classifier.model, config.classifier.base_url);
    eprintln!();
    eprintln!("Next: export OPENAI_API_KEY=... && skymood run");

    Ok(())
}
