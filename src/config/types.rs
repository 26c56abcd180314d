use crate::engine::selector::SelectorKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Scheduling tick period in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Ordered channel list; order is the advertised catalog order.
    #[serde(default, rename = "channel")]
    pub channels: Vec<ChannelConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tick_ms: default_tick_ms(),
            channels: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChannelConfig {
    pub name: String,

    /// Directory the encoder writes into, with `video/` and `audio/`
    /// subdirectories per medium.
    pub source_dir: PathBuf,

    /// Ticks per second for all timestamps of this channel.
    pub timescale: u64,

    /// Video segment stride in timescale units.
    pub video_duration: u64,

    /// Audio segment stride in timescale units.
    pub audio_duration: u64,

    /// Video quality ladder, preferred quality first.
    pub video_qualities: Vec<String>,

    /// Audio quality ladder, preferred quality first.
    pub audio_qualities: Vec<String>,

    pub vcodec: String,

    pub acodec: String,

    /// Live window size in segments; absent keeps the whole stream.
    #[serde(default)]
    pub retention_segments: Option<u64>,

    #[serde(default)]
    pub selector: SelectorKind,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9361
}

fn default_tick_ms() -> u64 {
    100
}
