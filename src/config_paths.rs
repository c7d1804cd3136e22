use std::path::PathBuf;

use crate::error::Error;

pub const CONFIG_ENV_VAR: &str = "THUMBSHELF_CONFIG";

pub fn thumbshelf_config_dir() -> Result<PathBuf, Error> {
    let home = if cfg!(target_os = "windows") {
        std::env::var("USERPROFILE")
            .or_else(|_| std::env::var("HOME"))
            .map_err(|_| Error::ConfigPath("Unable to resolve USERPROFILE/HOME".to_string()))?
    } else {
        std::env::var("HOME")
            .map_err(|_| Error::ConfigPath("Unable to resolve HOME".to_string()))?
    };

    let mut path = PathBuf::from(home);
    if cfg!(target_os = "macos") {
        path.push("Library");
        path.push("Application Support");
        path.push("thumbshelf");
    } else {
        path.push(".config");
        path.push("thumbshelf");
    }
    Ok(path)
}

/// Location of the persisted connection record, honouring `THUMBSHELF_CONFIG`.
pub fn connection_config_path() -> Result<PathBuf, Error> {
    if let Some(custom) = std::env::var_os(CONFIG_ENV_VAR).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(custom));
    }
    Ok(thumbshelf_config_dir()?.join("config.json"))
}
