//! Quality selection at segment boundaries.
//!
//! The selector's only contract: the returned quality belongs to the
//! channel's ladder, and a new selection may take effect at any segment
//! boundary (the delivery policy prepends the init blob when it does).

use crate::media::Quality;
use serde::{Deserialize, Serialize};

/// Reported buffer level above which a buffer-aware client is moved to the
/// preferred quality, and below which it is dropped to the cheapest one.
pub const BUFFER_HIGH_WATER_SECS: f64 = 10.0;
pub const BUFFER_LOW_WATER_SECS: f64 = 4.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectorKind {
    /// Keep serving the current quality; fall back to the ladder head.
    #[default]
    Sticky,
    /// Steer by the client's reported playback buffer occupancy.
    BufferAware,
}

/// Pick a quality from `candidates` (the subset of the ladder able to serve
/// the pending timestamp, in ladder order, preferred first).
pub fn select<'a>(
    kind: SelectorKind,
    candidates: &[&'a Quality],
    current: Option<&Quality>,
    buffer_len: Option<f64>,
) -> Option<&'a Quality> {
    let sticky = || {
        current
            .and_then(|c| candidates.iter().copied().find(|q| *q == c))
            .or_else(|| candidates.first().copied())
    };

    match kind {
        SelectorKind::Sticky => sticky(),
        SelectorKind::BufferAware => match buffer_len {
            Some(len) if len >= BUFFER_HIGH_WATER_SECS => candidates.first().copied(),
            Some(len) if len < BUFFER_LOW_WATER_SECS => candidates.last().copied(),
            _ => sticky(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ladder() -> Vec<Quality> {
        vec![
            Quality::from("1080p"),
            Quality::from("720p"),
            Quality::from("480p"),
        ]
    }

    #[test]
    fn sticky_prefers_current_then_head() {
        let ladder = ladder();
        let candidates: Vec<&Quality> = ladder.iter().collect();

        let picked = select(SelectorKind::Sticky, &candidates, None, None).unwrap();
        assert_eq!(picked, &Quality::from("1080p"));

        let current = Quality::from("720p");
        let picked = select(SelectorKind::Sticky, &candidates, Some(&current), None).unwrap();
        assert_eq!(picked, &Quality::from("720p"));
    }

    #[test]
    fn sticky_abandons_unavailable_current() {
        let ladder = ladder();
        // Current quality missing at this timestamp.
        let candidates: Vec<&Quality> = vec![&ladder[0], &ladder[2]];
        let current = Quality::from("720p");
        let picked = select(SelectorKind::Sticky, &candidates, Some(&current), None).unwrap();
        assert_eq!(picked, &Quality::from("1080p"));
    }

    #[test]
    fn empty_candidates_yield_none() {
        assert!(select(SelectorKind::Sticky, &[], None, None).is_none());
    }

    #[test]
    fn buffer_aware_steers_by_watermarks() {
        let ladder = ladder();
        let candidates: Vec<&Quality> = ladder.iter().collect();
        let current = Quality::from("720p");

        let picked = select(
            SelectorKind::BufferAware,
            &candidates,
            Some(&current),
            Some(BUFFER_HIGH_WATER_SECS + 1.0),
        )
        .unwrap();
        assert_eq!(picked, &Quality::from("1080p"));

        let picked = select(
            SelectorKind::BufferAware,
            &candidates,
            Some(&current),
            Some(1.0),
        )
        .unwrap();
        assert_eq!(picked, &Quality::from("480p"));

        // Mid-range buffer sticks; no report yet sticks too.
        let picked = select(
            SelectorKind::BufferAware,
            &candidates,
            Some(&current),
            Some(6.0),
        )
        .unwrap();
        assert_eq!(picked, &Quality::from("720p"));
        let picked = select(SelectorKind::BufferAware, &candidates, Some(&current), None).unwrap();
        assert_eq!(picked, &Quality::from("720p"));
    }
}
