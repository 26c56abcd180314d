//! On-disk segment file name parsing.
//!
//! Per channel, each medium has its own directory containing
//! `<quality>-<timestamp>.<ext>` media segments and `<quality>.init.<ext>`
//! initialization blobs. Files are opaque byte containers; only the name is
//! interpreted.

use super::Quality;
use std::path::Path;

/// Classification of a media file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedName {
    /// `<quality>.init.<ext>`
    Init { quality: Quality },
    /// `<quality>-<timestamp>.<ext>`
    Segment { quality: Quality, timestamp: u64 },
}

/// Parse a segment or init file name. Returns `None` for anything that does
/// not match the layout (dotfiles, temp files, unrelated junk).
pub fn parse_file_name(path: &Path) -> Option<ParsedName> {
    let name = path.file_name()?.to_str()?;

    // One trailing extension, always present in the layout.
    let (stem, _ext) = name.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }

    if let Some(quality) = stem.strip_suffix(".init") {
        if quality.is_empty() {
            return None;
        }
        return Some(ParsedName::Init {
            quality: Quality::from(quality),
        });
    }

    // Timestamp follows the last dash, so qualities may themselves contain
    // dashes.
    let (quality, ts) = stem.rsplit_once('-')?;
    if quality.is_empty() {
        return None;
    }
    let timestamp = ts.parse::<u64>().ok()?;
    Some(ParsedName::Segment {
        quality: Quality::from(quality),
        timestamp,
    })
}
