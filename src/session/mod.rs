//! Per-connection playback state and the session table.
//!
//! A session is either `New` (connected, no channel yet) or `Bound` (channel
//! assigned, cursors live). Malformed input or transport close removes the
//! entry outright; there is no dropped-but-present state to mishandle.

use crate::media::Quality;
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::mpsc;

pub type ConnectionId = u64;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    /// The transport reported an Open for an id we already track. Fatal:
    /// connection ids are never reused within a process lifetime.
    #[error("connection id {0} already exists")]
    DuplicateId(ConnectionId),

    #[error("unknown connection id {0}")]
    Unknown(ConnectionId),
}

/// Playback state of one connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Session {
    New,
    Bound {
        channel: String,
        /// Next video timestamp this client expects, on the video lattice.
        next_vts: u64,
        /// Next audio timestamp, realigned to video at bind time.
        next_ats: u64,
        /// Quality of the last delivered video segment; `None` forces an
        /// init blob on the next video frame.
        curr_vq: Option<Quality>,
        curr_aq: Option<Quality>,
        /// Client-reported playback buffer occupancies in seconds.
        video_buffer_len: Option<f64>,
        audio_buffer_len: Option<f64>,
    },
}

impl Session {
    /// Bind (or rebind) to a channel, resetting cursors and current
    /// qualities. The next video frame will carry an init blob again.
    pub fn bind(&mut self, channel: String, init_vts: u64, init_ats: u64) {
        *self = Session::Bound {
            channel,
            next_vts: init_vts,
            next_ats: init_ats,
            curr_vq: None,
            curr_aq: None,
            video_buffer_len: None,
            audio_buffer_len: None,
        };
    }

    pub fn is_bound(&self) -> bool {
        matches!(self, Session::Bound { .. })
    }

    /// Record a playback report. Returns false when the session is not
    /// bound, which the caller treats as a protocol violation.
    pub fn set_playback_buffers(&mut self, video: f64, audio: f64) -> bool {
        match self {
            Session::Bound {
                video_buffer_len,
                audio_buffer_len,
                ..
            } => {
                *video_buffer_len = Some(video);
                *audio_buffer_len = Some(audio);
                true
            }
            Session::New => false,
        }
    }
}

/// One tracked connection: playback state plus the transport's outbound
/// frame queue for that connection.
pub struct SessionEntry {
    pub session: Session,
    pub outbound: mpsc::Sender<Bytes>,
}

/// All live connections, keyed by transport connection id.
#[derive(Default)]
pub struct SessionTable {
    entries: HashMap<ConnectionId, SessionEntry>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh `New` session. Duplicate ids indicate a transport bug.
    pub fn insert_unique(
        &mut self,
        id: ConnectionId,
        outbound: mpsc::Sender<Bytes>,
    ) -> Result<(), SessionError> {
        if self.entries.contains_key(&id) {
            return Err(SessionError::DuplicateId(id));
        }
        self.entries.insert(
            id,
            SessionEntry {
                session: Session::New,
                outbound,
            },
        );
        Ok(())
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Result<&mut SessionEntry, SessionError> {
        self.entries.get_mut(&id).ok_or(SessionError::Unknown(id))
    }

    pub fn remove(&mut self, id: ConnectionId) -> Option<SessionEntry> {
        self.entries.remove(&id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ConnectionId, &mut SessionEntry)> {
        self.entries.iter_mut().map(|(id, entry)| (*id, entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> mpsc::Sender<Bytes> {
        mpsc::channel(8).0
    }

    #[test]
    fn insert_unique_rejects_reuse() {
        let mut table = SessionTable::new();
        table.insert_unique(42, sender()).unwrap();
        assert_eq!(
            table.insert_unique(42, sender()),
            Err(SessionError::DuplicateId(42))
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn get_mut_unknown() {
        let mut table = SessionTable::new();
        assert!(matches!(table.get_mut(7), Err(SessionError::Unknown(7))));
    }

    #[test]
    fn bind_resets_cursors_and_qualities() {
        let mut session = Session::New;
        session.bind("c1".to_string(), 360000, 0);
        let Session::Bound {
            channel,
            next_vts,
            next_ats,
            curr_vq,
            curr_aq,
            ..
        } = &session
        else {
            panic!("expected bound session");
        };
        assert_eq!(channel, "c1");
        assert_eq!((*next_vts, *next_ats), (360000, 0));
        assert!(curr_vq.is_none() && curr_aq.is_none());

        // Rebind to a different channel resets everything again.
        if let Session::Bound { curr_vq, .. } = &mut session {
            *curr_vq = Some(Quality::from("1080p"));
        }
        session.bind("c2".to_string(), 720000, 432000);
        let Session::Bound {
            channel, curr_vq, ..
        } = &session
        else {
            panic!("expected bound session");
        };
        assert_eq!(channel, "c2");
        assert!(curr_vq.is_none());
    }

    #[test]
    fn playback_report_requires_bound() {
        let mut session = Session::New;
        assert!(!session.set_playback_buffers(5.0, 4.0));

        session.bind("c1".to_string(), 0, 0);
        assert!(session.set_playback_buffers(5.0, 4.0));
        let Session::Bound {
            video_buffer_len,
            audio_buffer_len,
            ..
        } = &session
        else {
            panic!("expected bound session");
        };
        assert_eq!(*video_buffer_len, Some(5.0));
        assert_eq!(*audio_buffer_len, Some(4.0));
    }
}
