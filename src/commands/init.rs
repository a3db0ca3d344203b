//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use std::path::PathBuf;
use tracing::info;

/// A small denormalized sales dataset so the engine works out of the box;
/// replace the file referenced by `dataset` in config.toml with real data.
const SAMPLE_DATASET: &str = include_str!("sample_dataset.json");

/// Initialize configuration and the sample dataset.
pub async fn cmd_init(base_dir: Option<PathBuf>, force: bool) -> Result<Config> {
    let base = base_dir.unwrap_or_else(Config::default_base_dir);
    let config_path = base.join("config.toml");

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Already initialized at {}",
            config_path.display()
        )));
    }

    std::fs::create_dir_all(&base)?;

    let dataset_path = base.join("sample_dataset.json");
    if !dataset_path.exists() || force {
        std::fs::write(&dataset_path, SAMPLE_DATASET)?;
        info!("Wrote sample dataset to {:?}", dataset_path);
    }

    let mut config = Config::load_from(Some(base.clone()))?;
    config.dataset = Some(PathBuf::from("sample_dataset.json"));
    config.save()?;

    info!("Initialized analyst at {:?}", base);
    Ok(config)
}
