//! Configuration file loading.
//!
//! One optional TOML file; every section falls back to its default, so a
//! partial file (or none at all) yields a working deployment.

use std::path::Path;

use docket_core::EngineConfig;

/// Load and validate the engine configuration.
pub(crate) fn load(path: Option<&Path>) -> Result<EngineConfig, String> {
    let config: EngineConfig = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
            toml::from_str(&raw).map_err(|e| format!("cannot parse {}: {}", path.display(), e))?
        }
        None => EngineConfig::default(),
    };
    config
        .validate()
        .map_err(|problems| format!("invalid configuration: {}", problems.join("; ")))?;
    Ok(config)
}
