//! Configuration management

use std::path::PathBuf;
use stowage_s3::StorageSettings;

/// Command-line values layered over the file and environment
#[derive(Debug, Default)]
pub struct Overrides {
    /// Settings file; `stowage.toml` in the working directory when unset
    pub config_file: Option<PathBuf>,
    pub endpoint: Option<String>,
    pub default_bucket: Option<String>,
}

/// Load settings from the file, then `MINIO_*` variables, then `overrides`
pub fn load(overrides: Overrides) -> anyhow::Result<StorageSettings> {
    let file = match &overrides.config_file {
        Some(path) => config::File::from(path.as_path()).required(true),
        None => config::File::with_name("stowage").required(false),
    };

    let builder = config::Config::builder()
        .add_source(file)
        .set_override_option("endpoint", overrides.endpoint)?
        .set_override_option("default_bucket", overrides.default_bucket)?;

    Ok(StorageSettings::from_builder(builder)?)
}
