use std::path::{Path, PathBuf};

use tracing::info;

use super::{types::Config, ConfigError};

/// Validate configuration values.
///
/// Pure checks only; see [`verify_environment`] for the filesystem side.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.processing.poll_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "processing.poll_interval_secs must be greater than 0".to_string(),
        ));
    }

    if config.processing.allowed_extensions.is_empty() {
        return Err(ConfigError::ValidationError(
            "processing.allowed_extensions cannot be empty".to_string(),
        ));
    }

    if let Some(ext) = config
        .processing
        .allowed_extensions
        .iter()
        .find(|e| e.trim_start_matches('.').is_empty())
    {
        return Err(ConfigError::ValidationError(format!(
            "processing.allowed_extensions contains an invalid entry: {:?}",
            ext
        )));
    }

    if config.color.target_colorspace.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "color.target_colorspace cannot be empty".to_string(),
        ));
    }

    if config.transcode.container.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "transcode.container cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Check that the host matches the configuration before the engine starts.
///
/// - every tool executable resolves (explicit path exists, or bare name on `PATH`)
/// - the watch folder exists and is readable
/// - the remaining managed folders and state-file parents exist (created if missing)
///   and are readable
pub fn verify_environment(config: &Config) -> Result<(), ConfigError> {
    for (name, tool) in [
        ("tools.art_cli", &config.tools.art_cli),
        ("tools.ffmpeg", &config.tools.ffmpeg),
        ("tools.ffprobe", &config.tools.ffprobe),
    ] {
        if resolve_executable(tool).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "{} not found: {}",
                name,
                tool.display()
            )));
        }
    }

    let watch = &config.paths.watch;
    if !watch.is_dir() {
        return Err(ConfigError::ValidationError(format!(
            "watch folder not found: {}",
            watch.display()
        )));
    }
    ensure_readable("watch", watch)?;

    for (name, dir) in config.paths.managed_folders() {
        if name == "watch" {
            continue;
        }
        ensure_dir(name, dir)?;
        ensure_readable(name, dir)?;
    }

    ensure_dir("logs", &config.paths.logs)?;
    for file in [
        &config.paths.status_file,
        &config.paths.history_file,
        &config.paths.lock_file,
    ] {
        if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir("state", parent)?;
        }
    }

    Ok(())
}

/// Resolve a tool path the way a shell would.
pub fn resolve_executable(tool: &Path) -> Option<PathBuf> {
    if tool.components().count() > 1 || tool.is_absolute() {
        return tool.is_file().then(|| tool.to_path_buf());
    }

    let search_path = std::env::var_os("PATH")?;
    std::env::split_paths(&search_path)
        .map(|dir| dir.join(tool))
        .find(|candidate| candidate.is_file())
}

fn ensure_dir(name: &str, dir: &Path) -> Result<(), ConfigError> {
    if dir.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(dir).map_err(|e| {
        ConfigError::ValidationError(format!(
            "failed to create {} folder {}: {}",
            name,
            dir.display(),
            e
        ))
    })?;
    info!("Created {} folder: {}", name, dir.display());
    Ok(())
}

fn ensure_readable(name: &str, dir: &Path) -> Result<(), ConfigError> {
    std::fs::read_dir(dir).map(|_| ()).map_err(|e| {
        ConfigError::ValidationError(format!(
            "{} folder {} is not readable: {}",
            name,
            dir.display(),
            e
        ))
    })
}
