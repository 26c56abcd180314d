//! In-memory live segment inventory for one medium of one channel.
//!
//! The store grows as the filesystem watcher reports finished segment files
//! and shrinks from the old end when a retention window is configured.
//! Blobs are `Bytes` so delivery can hand them to many clients without
//! copying.

use super::Quality;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    /// The store cannot yet serve the request; retry after more segments
    /// arrive.
    #[error("not ready")]
    NotReady,

    /// The requested (quality, timestamp) pair is absent, typically because
    /// it was pruned from the live window.
    #[error("segment not found")]
    NotFound,
}

/// Segment inventory for one medium (audio or video) of one channel.
///
/// Timestamps lie on the stride lattice `{k * duration}`; per quality there
/// is at most one initialization blob.
pub struct SegmentStore {
    /// Fixed segment stride in the channel's timescale.
    duration: u64,
    /// Live window size in segments; `None` keeps everything.
    retention: Option<u64>,
    inits: HashMap<Quality, Bytes>,
    segments: HashMap<Quality, BTreeMap<u64, Bytes>>,
}

impl SegmentStore {
    pub fn new(duration: u64, retention: Option<u64>) -> Self {
        Self {
            duration,
            retention,
            inits: HashMap::new(),
            segments: HashMap::new(),
        }
    }

    /// The fixed segment stride.
    pub fn duration(&self) -> u64 {
        self.duration
    }

    /// Install an initialization blob for a quality. Overwrites are
    /// idempotent: encoders rewrite init files on restart.
    pub fn insert_init(&mut self, quality: Quality, data: Bytes) {
        self.inits.insert(quality, data);
    }

    /// Install a segment blob, then evict anything that fell out of the
    /// retention window.
    pub fn insert_segment(&mut self, quality: Quality, timestamp: u64, data: Bytes) {
        self.segments
            .entry(quality)
            .or_default()
            .insert(timestamp, data);
        self.prune();
    }

    /// True iff some quality has both an init blob and the segment at `t`.
    pub fn ready(&self, t: u64) -> bool {
        self.segments.iter().any(|(quality, by_ts)| {
            by_ts.contains_key(&t) && self.inits.contains_key(quality)
        })
    }

    /// Whether `quality` could serve `t` right now (segment and init both
    /// present). Used by the delivery policy to constrain quality selection.
    pub fn usable(&self, quality: &Quality, t: u64) -> bool {
        self.inits.contains_key(quality)
            && self
                .segments
                .get(quality)
                .is_some_and(|by_ts| by_ts.contains_key(&t))
    }

    /// The segment bytes at `(quality, t)`.
    pub fn data(&self, quality: &Quality, t: u64) -> Result<&Bytes, StoreError> {
        self.segments
            .get(quality)
            .and_then(|by_ts| by_ts.get(&t))
            .ok_or(StoreError::NotFound)
    }

    /// The initialization bytes for `quality`.
    pub fn init(&self, quality: &Quality) -> Result<&Bytes, StoreError> {
        self.inits.get(quality).ok_or(StoreError::NotReady)
    }

    /// A safe starting timestamp for a newly joining client: the most recent
    /// ready timestamp at least one stride behind the newest arrival, so new
    /// joins do not race the encoder at the live edge.
    pub fn init_ts(&self) -> Result<u64, StoreError> {
        let latest = self.latest().ok_or(StoreError::NotReady)?;
        let mut candidate = latest.checked_sub(self.duration);
        while let Some(t) = candidate {
            if self.ready(t) {
                return Ok(t);
            }
            candidate = t.checked_sub(self.duration);
        }
        Err(StoreError::NotReady)
    }

    /// Project a timestamp onto this store's stride lattice (largest
    /// `k * duration <= ts`).
    pub fn find_ts(&self, ts: u64) -> u64 {
        ts / self.duration * self.duration
    }

    /// The newest timestamp present for any quality (the live edge).
    pub fn latest(&self) -> Option<u64> {
        self.segments
            .values()
            .filter_map(|by_ts| by_ts.keys().next_back())
            .max()
            .copied()
    }

    /// The oldest timestamp present for any quality.
    pub fn oldest(&self) -> Option<u64> {
        self.segments
            .values()
            .filter_map(|by_ts| by_ts.keys().next())
            .min()
            .copied()
    }

    /// The smallest ready timestamp `>= t`, used to move a lagging client's
    /// cursor back inside the live window.
    pub fn oldest_at_or_after(&self, t: u64) -> Option<u64> {
        self.segments
            .iter()
            .filter(|(quality, _)| self.inits.contains_key(*quality))
            .filter_map(|(_, by_ts)| by_ts.range(t..).next().map(|(ts, _)| *ts))
            .min()
    }

    fn prune(&mut self) {
        let Some(retention) = self.retention else {
            return;
        };
        let Some(latest) = self.latest() else {
            return;
        };
        let cutoff = latest.saturating_sub(retention.saturating_mul(self.duration));
        for by_ts in self.segments.values_mut() {
            *by_ts = by_ts.split_off(&cutoff);
        }
    }
}
