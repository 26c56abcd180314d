//! Per-client delivery policy.
//!
//! Once per tick, each bound client is offered at most one video and one
//! audio frame. Audio and video advance independently so a stall in one
//! medium never blocks the other. Cursors move only after a successful
//! enqueue; a full outbound queue retries the same timestamp next tick.

use super::selector;
use crate::media::{Channel, Medium, Quality, Registry};
use crate::protocol::{self, ServerHeader};
use crate::session::{Session, SessionEntry};
use tokio::sync::mpsc::error::TrySendError;

/// Serve both media of one bound client. No-op for `New` sessions.
pub fn serve_client(registry: &Registry, id: u64, entry: &mut SessionEntry) {
    let Session::Bound { channel, .. } = &entry.session else {
        return;
    };
    let Some(channel) = registry.get(channel) else {
        // Unreachable while binds are validated against the registry.
        tracing::error!(id, "bound session references unknown channel");
        return;
    };
    serve_medium(channel, Medium::Video, id, entry);
    serve_medium(channel, Medium::Audio, id, entry);
}

fn serve_medium(channel: &Channel, medium: Medium, id: u64, entry: &mut SessionEntry) {
    let Session::Bound {
        next_vts,
        next_ats,
        curr_vq,
        curr_aq,
        video_buffer_len,
        audio_buffer_len,
        ..
    } = &mut entry.session
    else {
        return;
    };
    let (next_ts, curr_q, buffer_len) = match medium {
        Medium::Video => (next_vts, curr_vq, *video_buffer_len),
        Medium::Audio => (next_ats, curr_aq, *audio_buffer_len),
    };

    let store = channel.store(medium);
    let t = *next_ts;

    if !store.ready(t) {
        // If the cursor fell out of the live window entirely, jump forward
        // to the oldest timestamp still served; otherwise just wait.
        if store.oldest().is_some_and(|oldest| t < oldest) {
            if let Some(recovered) = store.oldest_at_or_after(t) {
                tracing::debug!(id, %medium, from = t, to = recovered, "cursor left live window");
                *next_ts = recovered;
            }
        }
        return;
    }

    let candidates: Vec<&Quality> = channel
        .qualities(medium)
        .iter()
        .filter(|q| store.usable(q, t))
        .collect();
    let Some(quality) =
        selector::select(channel.selector(), &candidates, curr_q.as_ref(), buffer_len)
    else {
        return;
    };

    // ready(t) plus the usable() filter guarantee both lookups.
    let Ok(data) = store.data(quality, t) else {
        return;
    };
    let Ok(init) = store.init(quality) else {
        return;
    };

    let init_required = curr_q.as_ref() != Some(quality);
    let payload_len = data.len() + if init_required { init.len() } else { 0 };

    let header = segment_header(medium, quality, t, store.duration(), payload_len as u64);
    let frame = if init_required {
        protocol::encode_server_frame(&header, &[init.as_ref(), data.as_ref()])
    } else {
        protocol::encode_server_frame(&header, &[data.as_ref()])
    };

    match entry.outbound.try_send(frame) {
        Ok(()) => {
            *next_ts = t + store.duration();
            *curr_q = Some(quality.clone());
        }
        Err(TrySendError::Full(_)) => {
            // Slow client; same timestamp will be retried next tick.
            tracing::debug!(id, %medium, timestamp = t, "outbound queue full");
        }
        Err(TrySendError::Closed(_)) => {
            // Writer is gone; the transport's Close event will reap the
            // session shortly.
            tracing::debug!(id, %medium, "outbound queue closed");
        }
    }
}

fn segment_header(
    medium: Medium,
    quality: &Quality,
    timestamp: u64,
    duration: u64,
    total_byte_length: u64,
) -> ServerHeader {
    match medium {
        Medium::Video => ServerHeader::Video {
            quality: quality.clone(),
            timestamp,
            duration,
            byte_offset: 0,
            total_byte_length,
        },
        Medium::Audio => ServerHeader::Audio {
            quality: quality.clone(),
            timestamp,
            duration,
            byte_offset: 0,
            total_byte_length,
        },
    }
}
