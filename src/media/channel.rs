//! Channels and the channel registry.
//!
//! A channel's identity (name, codecs, timescale, strides, quality ladders)
//! is fixed at startup from configuration; only its two segment stores
//! mutate afterwards, and only from the engine task.

use super::{Medium, Quality, SegmentStore, StoreError};
use crate::config::{ChannelConfig, Config};
use crate::engine::selector::SelectorKind;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub struct Channel {
    name: String,
    source_dir: PathBuf,
    vcodec: String,
    acodec: String,
    timescale: u64,
    video_qualities: Vec<Quality>,
    audio_qualities: Vec<Quality>,
    selector: SelectorKind,
    video: SegmentStore,
    audio: SegmentStore,
}

impl Channel {
    pub fn from_config(cfg: &ChannelConfig) -> Self {
        Self {
            name: cfg.name.clone(),
            source_dir: cfg.source_dir.clone(),
            vcodec: cfg.vcodec.clone(),
            acodec: cfg.acodec.clone(),
            timescale: cfg.timescale,
            video_qualities: cfg.video_qualities.iter().map(|s| Quality::from(s.as_str())).collect(),
            audio_qualities: cfg.audio_qualities.iter().map(|s| Quality::from(s.as_str())).collect(),
            selector: cfg.selector,
            video: SegmentStore::new(cfg.video_duration, cfg.retention_segments),
            audio: SegmentStore::new(cfg.audio_duration, cfg.retention_segments),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn vcodec(&self) -> &str {
        &self.vcodec
    }

    pub fn acodec(&self) -> &str {
        &self.acodec
    }

    pub fn timescale(&self) -> u64 {
        self.timescale
    }

    pub fn selector(&self) -> SelectorKind {
        self.selector
    }

    pub fn store(&self, medium: Medium) -> &SegmentStore {
        match medium {
            Medium::Video => &self.video,
            Medium::Audio => &self.audio,
        }
    }

    pub fn store_mut(&mut self, medium: Medium) -> &mut SegmentStore {
        match medium {
            Medium::Video => &mut self.video,
            Medium::Audio => &mut self.audio,
        }
    }

    /// Configured quality ladder for a medium, preferred quality first.
    pub fn qualities(&self, medium: Medium) -> &[Quality] {
        match medium {
            Medium::Video => &self.video_qualities,
            Medium::Audio => &self.audio_qualities,
        }
    }

    /// Safe starting video timestamp for a newly bound client.
    pub fn init_vts(&self) -> Result<u64, StoreError> {
        self.video.init_ts()
    }

    /// Project a video timestamp onto the audio stride lattice, realigning
    /// audio to video at bind time.
    pub fn find_ats(&self, vts: u64) -> u64 {
        self.audio.find_ts(vts)
    }
}

/// Named set of channels, built once at startup. The ordered name list is
/// the catalog advertised to clients in hello messages.
pub struct Registry {
    order: Vec<String>,
    channels: HashMap<String, Channel>,
}

impl Registry {
    pub fn from_config(config: &Config) -> Self {
        let mut order = Vec::with_capacity(config.channels.len());
        let mut channels = HashMap::with_capacity(config.channels.len());
        for cfg in &config.channels {
            order.push(cfg.name.clone());
            channels.insert(cfg.name.clone(), Channel::from_config(cfg));
        }
        Self { order, channels }
    }

    /// Advertised channel catalog, in configuration order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn get(&self, name: &str) -> Option<&Channel> {
        self.channels.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Channel> {
        self.channels.get_mut(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.order.iter().filter_map(|name| self.channels.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_channel_config;
    use bytes::Bytes;

    #[test]
    fn find_ats_projects_onto_audio_lattice() {
        let channel = Channel::from_config(&test_channel_config("c1"));

        // Dv = 180000, Da = 432000.
        assert_eq!(channel.find_ats(0), 0);
        assert_eq!(channel.find_ats(360000), 0);
        assert_eq!(channel.find_ats(432000), 432000);
        assert_eq!(channel.find_ats(540000), 432000);

        // find_ats(vts) <= vts < find_ats(vts) + Da, monotonically.
        let mut prev = 0;
        for vts in (0..2_000_000).step_by(180000) {
            let ats = channel.find_ats(vts);
            assert!(ats <= vts && vts < ats + channel.store(Medium::Audio).duration());
            assert!(ats >= prev);
            prev = ats;
        }
    }

    #[test]
    fn registry_preserves_catalog_order() {
        let config = Config {
            channels: vec![
                test_channel_config("zeta"),
                test_channel_config("alpha"),
                test_channel_config("mid"),
            ],
            ..Config::default()
        };
        let registry = Registry::from_config(&config);
        assert_eq!(registry.names(), ["zeta", "alpha", "mid"]);
        assert!(registry.get("alpha").is_some());
        assert!(registry.get("nope").is_none());
    }

    #[test]
    fn init_vts_delegates_to_video_store() {
        let mut channel = Channel::from_config(&test_channel_config("c1"));
        let q = Quality::from("1080p");
        channel
            .store_mut(Medium::Video)
            .insert_init(q.clone(), Bytes::from_static(b"init"));
        for t in [180000, 360000, 540000] {
            channel
                .store_mut(Medium::Video)
                .insert_segment(q.clone(), t, Bytes::from_static(b"seg"));
        }
        assert_eq!(channel.init_vts().unwrap(), 360000);
    }
}
