//! The scheduling engine.
//!
//! One tokio task owns every piece of mutable state: the channel registry
//! (and through it all segment stores) and the session table. Transport
//! callbacks, watcher events, and the scheduling tick all funnel into
//! [`Engine::run`]'s select loop, so no locking is needed anywhere and a
//! tick always observes a consistent store snapshot.

pub mod delivery;
pub mod selector;

use crate::media::{path::ParsedName, Registry};
use crate::protocol::{self, ClientMessage, ServerHeader};
use crate::session::{ConnectionId, SessionError, SessionTable};
use crate::watch::WatchEvent;
use anyhow::Result;
use bytes::Bytes;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Events the transport feeds into the engine.
#[derive(Debug)]
pub enum TransportEvent {
    /// A connection opened; `outbound` is its FIFO frame queue.
    Open {
        id: ConnectionId,
        outbound: mpsc::Sender<Bytes>,
    },
    /// A binary message arrived from the client.
    Message { id: ConnectionId, frame: Bytes },
    /// The connection closed.
    Close { id: ConnectionId },
}

pub struct Engine {
    registry: Registry,
    sessions: SessionTable,
    tick: Duration,
    transport_rx: mpsc::Receiver<TransportEvent>,
    watch_rx: mpsc::Receiver<WatchEvent>,
}

impl Engine {
    pub fn new(
        registry: Registry,
        tick: Duration,
        transport_rx: mpsc::Receiver<TransportEvent>,
        watch_rx: mpsc::Receiver<WatchEvent>,
    ) -> Self {
        Self {
            registry,
            sessions: SessionTable::new(),
            tick,
            transport_rx,
            watch_rx,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Seed the stores with segments already on disk at startup; the
    /// watcher only reports files finished after it attaches.
    pub fn preload(&mut self) {
        let scans: Vec<WatchEvent> = self
            .registry
            .iter()
            .flat_map(|channel| crate::watch::scan_channel_dir(channel.name(), channel.source_dir()))
            .collect();
        let count = scans.len();
        for event in scans {
            self.ingest(event);
        }
        tracing::info!(files = count, "preloaded existing segment files");
    }

    /// Drive the engine until cancelled. Returns an error only for fatal
    /// conditions (a transport bug such as a duplicated connection id).
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        enum Wake {
            Transport(TransportEvent),
            Watch(WatchEvent),
            Tick,
        }

        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let wake = tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("engine shutting down");
                    return Ok(());
                }
                Some(event) = self.transport_rx.recv() => Wake::Transport(event),
                Some(event) = self.watch_rx.recv() => Wake::Watch(event),
                _ = ticker.tick() => Wake::Tick,
            };
            match wake {
                Wake::Transport(event) => self.handle_transport_event(event)?,
                Wake::Watch(event) => self.ingest(event),
                Wake::Tick => self.tick(),
            }
        }
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent) -> Result<()> {
        match event {
            TransportEvent::Open { id, outbound } => self.handle_open(id, outbound)?,
            TransportEvent::Message { id, frame } => self.handle_message(id, &frame),
            TransportEvent::Close { id } => self.handle_close(id),
        }
        Ok(())
    }

    /// Register a connection and greet it with the channel catalog.
    pub fn handle_open(
        &mut self,
        id: ConnectionId,
        outbound: mpsc::Sender<Bytes>,
    ) -> Result<(), SessionError> {
        tracing::info!(id, "connection opened");
        self.sessions.insert_unique(id, outbound)?;

        let hello = protocol::encode_server_msg(&ServerHeader::ServerHello {
            channels: self.registry.names().to_vec(),
        });
        if let Ok(entry) = self.sessions.get_mut(id) {
            if entry.outbound.try_send(hello).is_err() {
                tracing::warn!(id, "failed to queue hello; dropping session");
                self.sessions.remove(id);
            }
        }
        Ok(())
    }

    /// Dispatch an inbound control message. Any protocol violation costs
    /// the client its session.
    pub fn handle_message(&mut self, id: ConnectionId, frame: &[u8]) {
        if !self.sessions.contains(id) {
            tracing::debug!(id, "message from unknown connection");
            return;
        }

        let message = match protocol::decode_client_msg(frame) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(id, error = %e, "bad message from client");
                self.drop_session(id);
                return;
            }
        };

        match message {
            ClientMessage::ClientInit { channel } => self.handle_client_init(id, &channel),
            ClientMessage::ClientInfo {
                video_buffer_len,
                audio_buffer_len,
            } => self.handle_client_info(id, video_buffer_len, audio_buffer_len),
        }
    }

    pub fn handle_close(&mut self, id: ConnectionId) {
        tracing::info!(id, "connection closed");
        self.sessions.remove(id);
    }

    fn handle_client_init(&mut self, id: ConnectionId, channel_name: &str) {
        let Some(channel) = self.registry.get(channel_name) else {
            tracing::warn!(id, channel = channel_name, "requested channel not found");
            self.drop_session(id);
            return;
        };

        let init_vts = match channel.init_vts() {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(id, channel = channel_name, error = %e,
                    "channel not yet serving; rejecting join");
                self.drop_session(id);
                return;
            }
        };
        let init_ats = channel.find_ats(init_vts);

        let reply = protocol::encode_server_msg(&ServerHeader::ServerInit {
            channel: channel.name().to_string(),
            vcodec: channel.vcodec().to_string(),
            acodec: channel.acodec().to_string(),
            timescale: channel.timescale(),
            init_vts,
        });

        let Ok(entry) = self.sessions.get_mut(id) else {
            return;
        };
        entry
            .session
            .bind(channel_name.to_string(), init_vts, init_ats);
        if entry.outbound.try_send(reply).is_err() {
            tracing::warn!(id, "failed to queue server-init; dropping session");
            self.sessions.remove(id);
            return;
        }
        tracing::info!(id, channel = channel_name, init_vts, init_ats, "client bound");
    }

    fn handle_client_info(&mut self, id: ConnectionId, video_buffer_len: f64, audio_buffer_len: f64) {
        let Ok(entry) = self.sessions.get_mut(id) else {
            return;
        };
        if !entry
            .session
            .set_playback_buffers(video_buffer_len, audio_buffer_len)
        {
            tracing::warn!(id, "playback report before init");
            self.drop_session(id);
        }
    }

    /// Removing the entry drops the outbound sender, which ends the
    /// connection's writer task and closes the socket.
    fn drop_session(&mut self, id: ConnectionId) {
        self.sessions.remove(id);
    }

    /// Read a finished segment file and install it in its channel's store.
    pub fn ingest(&mut self, event: WatchEvent) {
        let Some(parsed) = crate::media::path::parse_file_name(&event.path) else {
            tracing::debug!(path = ?event.path, "ignoring unrecognized file");
            return;
        };
        let Some(channel) = self.registry.get_mut(&event.channel) else {
            tracing::debug!(channel = %event.channel, "watch event for unknown channel");
            return;
        };

        let data = match std::fs::read(&event.path) {
            Ok(data) => Bytes::from(data),
            Err(e) => {
                // Treated as absent; a later event for the same path retries.
                tracing::warn!(path = ?event.path, error = %e, "failed to read segment file");
                return;
            }
        };

        let store = channel.store_mut(event.medium);
        match parsed {
            ParsedName::Init { quality } => {
                tracing::debug!(channel = %event.channel, medium = %event.medium,
                    quality = %quality, size = data.len(), "installed init blob");
                store.insert_init(quality, data);
            }
            ParsedName::Segment { quality, timestamp } => {
                tracing::debug!(channel = %event.channel, medium = %event.medium,
                    quality = %quality, timestamp, size = data.len(), "installed segment");
                store.insert_segment(quality, timestamp, data);
            }
        }
    }

    /// One scheduling tick: offer every bound session its next segments.
    pub fn tick(&mut self) {
        let Self {
            registry, sessions, ..
        } = self;
        for (id, entry) in sessions.iter_mut() {
            delivery::serve_client(registry, id, entry);
        }
    }
}
