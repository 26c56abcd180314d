//! Filesystem watcher feeding the segment stores.
//!
//! Each channel's source directory holds a `video/` and an `audio/`
//! subdirectory written by an external encoder. Only closed-for-writing
//! events (and files renamed into place) finalize a file; create and
//! modify events for a file still being written are ignored, so a segment
//! is never ingested half-baked.

use crate::media::Medium;
use anyhow::{Context, Result};
use notify::event::{AccessKind, AccessMode, EventKind, ModifyKind, RenameMode};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// A finished media file observed in some channel's source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub channel: String,
    pub medium: Medium,
    pub path: PathBuf,
}

/// Owns the notify watcher; dropping it stops event delivery.
pub struct MediaWatcher {
    _watcher: RecommendedWatcher,
}

/// Watch every channel's media directories, forwarding finished files into
/// `tx`. `roots` pairs each channel name with its source directory.
pub fn spawn_watcher(
    roots: &[(String, PathBuf)],
    tx: mpsc::Sender<WatchEvent>,
) -> Result<MediaWatcher> {
    // Directory -> (channel, medium), consulted per event path.
    let mut dirs: Vec<(PathBuf, String, Medium)> = Vec::new();
    for (channel, source_dir) in roots {
        for medium in [Medium::Video, Medium::Audio] {
            dirs.push((source_dir.join(medium.dir_name()), channel.clone(), medium));
        }
    }

    let classify = {
        let dirs = dirs.clone();
        move |path: &Path| -> Option<WatchEvent> {
            let parent = path.parent()?;
            dirs.iter()
                .find(|(dir, _, _)| dir == parent)
                .map(|(_, channel, medium)| WatchEvent {
                    channel: channel.clone(),
                    medium: *medium,
                    path: path.to_path_buf(),
                })
        }
    };

    let mut watcher = RecommendedWatcher::new(
        move |res: std::result::Result<Event, notify::Error>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(error = %e, "watcher error");
                    return;
                }
            };
            if !finalizes(&event.kind) {
                return;
            }
            for path in event.paths {
                if let Some(watch_event) = classify(&path) {
                    if tx.blocking_send(watch_event).is_err() {
                        // Engine is gone; nothing left to feed.
                        return;
                    }
                }
            }
        },
        Config::default(),
    )
    .context("Failed to create file watcher")?;

    for (dir, channel, medium) in &dirs {
        if dir.exists() {
            watcher
                .watch(dir, RecursiveMode::NonRecursive)
                .with_context(|| format!("Failed to watch directory: {:?}", dir))?;
            tracing::info!(channel = %channel, medium = %medium, "watching {:?}", dir);
        } else {
            tracing::warn!(channel = %channel, medium = %medium, "media directory does not exist: {:?}", dir);
        }
    }

    Ok(MediaWatcher { _watcher: watcher })
}

/// Whether an event class means the file contents are complete.
fn finalizes(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Access(AccessKind::Close(AccessMode::Write))
            | EventKind::Modify(ModifyKind::Name(RenameMode::To))
    )
}

/// Enumerate the segment files already present for one channel, for seeding
/// the stores at startup. Sorted by name so init blobs and older segments
/// land in a deterministic order.
pub fn scan_channel_dir(channel: &str, source_dir: &Path) -> Vec<WatchEvent> {
    let mut events = Vec::new();
    for medium in [Medium::Video, Medium::Audio] {
        let dir = source_dir.join(medium.dir_name());
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(channel, medium = %medium, error = %e,
                    "cannot scan media directory {:?}", dir);
                continue;
            }
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        paths.sort();
        events.extend(paths.into_iter().map(|path| WatchEvent {
            channel: channel.to_string(),
            medium,
            path,
        }));
    }
    events
}
