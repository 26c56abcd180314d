//! Disk-to-client round trip: segment files written by an encoder are
//! scanned or ingested, then delivered byte-identical.

use bytes::Bytes;
use lumicast::config::{ChannelConfig, Config};
use lumicast::engine::selector::SelectorKind;
use lumicast::engine::Engine;
use lumicast::media::{Medium, Registry};
use lumicast::protocol::{decode_server_frame, encode_client_msg, ClientMessage, ServerHeader};
use lumicast::watch::WatchEvent;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;

fn write_channel_files(dir: &Path) {
    let video = dir.join("video");
    let audio = dir.join("audio");
    std::fs::create_dir_all(&video).unwrap();
    std::fs::create_dir_all(&audio).unwrap();

    std::fs::write(video.join("1080p.init.mp4"), b"video-init-bytes").unwrap();
    for (t, body) in [
        (180000u64, &b"video-seg-180000"[..]),
        (360000, b"video-seg-360000"),
        (540000, b"video-seg-540000"),
    ] {
        std::fs::write(video.join(format!("1080p-{t}.m4s")), body).unwrap();
    }

    std::fs::write(audio.join("128k.init.mp4"), b"audio-init-bytes").unwrap();
    std::fs::write(audio.join("128k-0.m4s"), b"audio-seg-0").unwrap();
}

fn engine_for(dir: &Path) -> Engine {
    let config = Config {
        channels: vec![ChannelConfig {
            name: "c1".to_string(),
            source_dir: dir.to_path_buf(),
            timescale: 90000,
            video_duration: 180000,
            audio_duration: 432000,
            video_qualities: vec!["1080p".to_string()],
            audio_qualities: vec!["128k".to_string()],
            vcodec: "avc1.42E020".to_string(),
            acodec: "mp4a.40.2".to_string(),
            retention_segments: None,
            selector: SelectorKind::Sticky,
        }],
        ..Config::default()
    };
    let (_tx, transport_rx) = mpsc::channel(8);
    let (_wtx, watch_rx) = mpsc::channel(8);
    Engine::new(
        Registry::from_config(&config),
        Duration::from_millis(100),
        transport_rx,
        watch_rx,
    )
}

#[test]
fn preloaded_files_are_delivered_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    write_channel_files(dir.path());

    let mut engine = engine_for(dir.path());
    engine.preload();

    let (tx, mut rx) = mpsc::channel(64);
    engine.handle_open(1, tx).unwrap();
    let _hello = rx.try_recv().unwrap();

    engine.handle_message(
        1,
        &encode_client_msg(&ClientMessage::ClientInit {
            channel: "c1".to_string(),
        }),
    );
    let init_frame = rx.try_recv().unwrap();
    let (init, _) = decode_server_frame(&init_frame).unwrap();
    assert!(matches!(init, ServerHeader::ServerInit { init_vts: 360000, .. }));

    engine.tick();

    let (header, payload) = decode_server_frame(&rx.try_recv().unwrap()).unwrap();
    assert!(matches!(header, ServerHeader::Video { timestamp: 360000, .. }));
    assert_eq!(payload, Bytes::from("video-init-bytesvideo-seg-360000"));

    let (header, payload) = decode_server_frame(&rx.try_recv().unwrap()).unwrap();
    assert!(matches!(header, ServerHeader::Audio { timestamp: 0, .. }));
    assert_eq!(payload, Bytes::from("audio-init-bytesaudio-seg-0"));
}

#[test]
fn watcher_event_ingests_new_segment() {
    let dir = tempfile::tempdir().unwrap();
    write_channel_files(dir.path());

    let mut engine = engine_for(dir.path());
    engine.preload();

    // Encoder finishes another segment after startup.
    let path = dir.path().join("video").join("1080p-720000.m4s");
    std::fs::write(&path, b"video-seg-720000").unwrap();
    engine.ingest(WatchEvent {
        channel: "c1".to_string(),
        medium: Medium::Video,
        path,
    });

    let store = engine
        .registry()
        .get("c1")
        .unwrap()
        .store(Medium::Video);
    assert!(store.ready(720000));
    assert_eq!(store.latest(), Some(720000));
}

#[test]
fn unreadable_or_unparseable_files_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    write_channel_files(dir.path());
    // Stray files that must not poison the scan.
    std::fs::write(dir.path().join("video").join("tmp.partial.x~"), b"junk").unwrap();

    let mut engine = engine_for(dir.path());
    engine.preload();

    // A watch event for a path that no longer exists is just logged.
    engine.ingest(WatchEvent {
        channel: "c1".to_string(),
        medium: Medium::Video,
        path: dir.path().join("video").join("1080p-900000.m4s"),
    });

    let store = engine
        .registry()
        .get("c1")
        .unwrap()
        .store(Medium::Video);
    assert!(store.ready(360000));
    assert!(!store.ready(900000));
}
