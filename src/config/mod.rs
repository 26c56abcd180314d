mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./lumicast.toml",
        "~/.config/lumicast/config.toml",
        "/etc/lumicast/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if config.tick_ms == 0 {
        anyhow::bail!("Scheduling tick period cannot be 0");
    }

    let mut seen = HashSet::new();
    for channel in &config.channels {
        if channel.name.is_empty() {
            anyhow::bail!("Channel name cannot be empty");
        }
        if !seen.insert(channel.name.as_str()) {
            anyhow::bail!("Duplicate channel name '{}'", channel.name);
        }
        if channel.timescale == 0 {
            anyhow::bail!("Channel '{}' has a zero timescale", channel.name);
        }
        if channel.video_duration == 0 || channel.audio_duration == 0 {
            anyhow::bail!("Channel '{}' has a zero segment duration", channel.name);
        }
        if channel.video_qualities.is_empty() || channel.audio_qualities.is_empty() {
            anyhow::bail!("Channel '{}' has an empty quality list", channel.name);
        }
        if !channel.source_dir.exists() {
            tracing::warn!("Source directory does not exist: {:?}", channel.source_dir);
        }
    }

    Ok(())
}

/// Channel fixture shared by unit tests across modules.
#[cfg(test)]
pub fn test_channel_config(name: &str) -> ChannelConfig {
    ChannelConfig {
        name: name.to_string(),
        source_dir: std::env::temp_dir().join(name),
        timescale: 90000,
        video_duration: 180000,
        audio_duration: 432000,
        video_qualities: vec!["1080p".to_string(), "720p".to_string()],
        audio_qualities: vec!["128k".to_string(), "64k".to_string()],
        vcodec: "avc1.42E020".to_string(),
        acodec: "mp4a.40.2".to_string(),
        retention_segments: None,
        selector: crate::engine::selector::SelectorKind::default(),
    }
}
