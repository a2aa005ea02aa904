//! Settings loading.

use log::*;
use marker_pose::prelude::v1::*;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Default settings file location, in the user's configuration directory.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("marker-pose").join("settings.json"))
}

/// Load settings from a JSON file.
///
/// Missing fields take their default values.
pub fn load_settings(path: impl AsRef<Path>) -> Result<MarkerSettings> {
    let file = File::open(path.as_ref())?;
    serde_json::from_reader(file).map_err(Into::into)
}

/// Resolve the settings to replay with.
///
/// Explicitly given file takes priority, then the default settings file if it exists, then the
/// built-in defaults. `overrides` are then applied in order.
///
/// # Arguments
///
/// * `path` - explicit settings file.
/// * `overrides` - `Property name=value` pairs.
pub fn resolve_settings<'a>(
    path: Option<&Path>,
    overrides: impl IntoIterator<Item = &'a str>,
) -> Result<MarkerSettings> {
    let mut settings = match path {
        Some(path) => load_settings(path)?,
        None => match default_settings_path().filter(|p| p.exists()) {
            Some(path) => {
                info!("Using settings from {}", path.display());
                load_settings(path)?
            }
            None => MarkerSettings::default(),
        },
    };

    for o in overrides {
        let (name, value) = o
            .split_once('=')
            .ok_or_else(|| anyhow!("Override must be of the form name=value: {o}"))?;
        settings.set_property(name, value)?;
    }

    Ok(settings.sanitized())
}
