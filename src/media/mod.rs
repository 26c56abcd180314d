//! Channel and segment inventory model.

pub mod channel;
pub mod path;
pub mod quality;
pub mod store;

pub use channel::{Channel, Registry};
pub use quality::Quality;
pub use store::{SegmentStore, StoreError};

use std::fmt;

/// Which elementary stream a store, segment, or frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Medium {
    Video,
    Audio,
}

impl Medium {
    /// The per-medium subdirectory name under a channel's source directory.
    pub fn dir_name(self) -> &'static str {
        match self {
            Medium::Video => "video",
            Medium::Audio => "audio",
        }
    }
}

impl fmt::Display for Medium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}
