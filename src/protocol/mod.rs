//! Wire message codec.
//!
//! Every message, in both directions, is one binary WebSocket frame laid out
//! as:
//!
//! ```text
//! +----------------+----------------------+------------------+
//! | u16 BE length  | JSON header (length) | payload bytes... |
//! +----------------+----------------------+------------------+
//! ```
//!
//! Control messages carry an empty payload; media messages carry
//! `(optional init blob) || segment blob`. The header is a tagged JSON
//! object (`"type": "client-init"` etc.), so the framing stays uniform while
//! the header schema can grow.

use crate::media::Quality;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Header length prefix size in bytes.
pub const LENGTH_PREFIX: usize = 2;

/// Messages a client may send to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Bind (or rebind) this connection to a channel.
    ClientInit { channel: String },
    /// Periodic playback report; buffer occupancies in seconds.
    ClientInfo {
        video_buffer_len: f64,
        audio_buffer_len: f64,
    },
}

/// Headers of messages the server sends to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerHeader {
    /// Advertised channel catalog, sent once on open.
    ServerHello { channels: Vec<String> },
    /// Reply to a successful init; tells the client where playback starts.
    ServerInit {
        channel: String,
        vcodec: String,
        acodec: String,
        timescale: u64,
        init_vts: u64,
    },
    /// A video segment follows the header.
    Video {
        quality: Quality,
        timestamp: u64,
        duration: u64,
        byte_offset: u64,
        total_byte_length: u64,
    },
    /// An audio segment follows the header.
    Audio {
        quality: Quality,
        timestamp: u64,
        duration: u64,
        byte_offset: u64,
        total_byte_length: u64,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("frame truncated: {0}")]
    Truncated(&'static str),

    #[error("malformed header: {0}")]
    BadHeader(#[from] serde_json::Error),
}

fn header_bytes<T: Serialize>(header: &T) -> Vec<u8> {
    // Headers are small structs with string keys; serialization cannot fail.
    let bytes = serde_json::to_vec(header).expect("message header serializes");
    debug_assert!(bytes.len() <= u16::MAX as usize);
    bytes
}

/// Encode a server message with a media payload assembled from `parts`
/// (init blob, if required, then the segment blob).
pub fn encode_server_frame(header: &ServerHeader, parts: &[&[u8]]) -> Bytes {
    let header = header_bytes(header);
    let payload_len: usize = parts.iter().map(|p| p.len()).sum();
    let mut frame = BytesMut::with_capacity(LENGTH_PREFIX + header.len() + payload_len);
    frame.put_u16(header.len() as u16);
    frame.put_slice(&header);
    for part in parts {
        frame.put_slice(part);
    }
    frame.freeze()
}

/// Encode a payload-less server control message.
pub fn encode_server_msg(header: &ServerHeader) -> Bytes {
    encode_server_frame(header, &[])
}

/// Encode a client control message (used by tests and client tooling).
pub fn encode_client_msg(msg: &ClientMessage) -> Bytes {
    let header = header_bytes(msg);
    let mut frame = BytesMut::with_capacity(LENGTH_PREFIX + header.len());
    frame.put_u16(header.len() as u16);
    frame.put_slice(&header);
    frame.freeze()
}

/// Decode an inbound client frame. Any malformation is a protocol violation
/// that costs the client its session.
pub fn decode_client_msg(frame: &[u8]) -> Result<ClientMessage, CodecError> {
    let (header, _payload) = split_frame(frame)?;
    Ok(serde_json::from_slice(header)?)
}

/// Decode a server frame into its header and payload. The server itself
/// never consumes these; tests and client tooling do.
pub fn decode_server_frame(frame: &[u8]) -> Result<(ServerHeader, Bytes), CodecError> {
    let (header, payload) = split_frame(frame)?;
    let header = serde_json::from_slice(header)?;
    Ok((header, Bytes::copy_from_slice(payload)))
}

fn split_frame(frame: &[u8]) -> Result<(&[u8], &[u8]), CodecError> {
    if frame.len() < LENGTH_PREFIX {
        return Err(CodecError::Truncated("missing length prefix"));
    }
    let header_len = u16::from_be_bytes([frame[0], frame[1]]) as usize;
    let rest = &frame[LENGTH_PREFIX..];
    if rest.len() < header_len {
        return Err(CodecError::Truncated("header shorter than prefix"));
    }
    Ok(rest.split_at(header_len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_round_trip() {
        let messages = [
            ClientMessage::ClientInit {
                channel: "c1".to_string(),
            },
            ClientMessage::ClientInfo {
                video_buffer_len: 7.25,
                audio_buffer_len: 3.5,
            },
        ];
        for msg in messages {
            let frame = encode_client_msg(&msg);
            assert_eq!(decode_client_msg(&frame).unwrap(), msg);
        }
    }

    #[test]
    fn server_messages_round_trip() {
        let headers = [
            ServerHeader::ServerHello {
                channels: vec!["c1".to_string(), "c2".to_string()],
            },
            ServerHeader::ServerInit {
                channel: "c1".to_string(),
                vcodec: "avc1.42E020".to_string(),
                acodec: "mp4a.40.2".to_string(),
                timescale: 90000,
                init_vts: 360000,
            },
        ];
        for header in headers {
            let frame = encode_server_msg(&header);
            let (decoded, payload) = decode_server_frame(&frame).unwrap();
            assert_eq!(decoded, header);
            assert!(payload.is_empty());
        }
    }

    #[test]
    fn media_frame_carries_header_then_payload() {
        let header = ServerHeader::Video {
            quality: Quality::from("1080p"),
            timestamp: 360000,
            duration: 180000,
            byte_offset: 0,
            total_byte_length: 8,
        };
        let frame = encode_server_frame(&header, &[b"init".as_slice(), b"segm".as_slice()]);
        let (decoded, payload) = decode_server_frame(&frame).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(&payload[..], b"initsegm");
    }

    #[test]
    fn header_tag_is_kebab_case() {
        let frame = encode_client_msg(&ClientMessage::ClientInit {
            channel: "c1".to_string(),
        });
        let json = &frame[LENGTH_PREFIX..];
        let value: serde_json::Value = serde_json::from_slice(json).unwrap();
        assert_eq!(value["type"], "client-init");
        assert_eq!(value["channel"], "c1");
    }

    #[test]
    fn rejects_truncated_frames() {
        assert!(decode_client_msg(&[]).is_err());
        assert!(decode_client_msg(&[0]).is_err());
        // Prefix claims more header bytes than exist.
        assert!(decode_client_msg(&[0xff, 0xff, b'{']).is_err());
    }

    #[test]
    fn rejects_unknown_and_malformed_headers() {
        let frame = {
            let json = br#"{"type":"evil","channel":"c1"}"#;
            let mut f = BytesMut::new();
            f.put_u16(json.len() as u16);
            f.put_slice(json);
            f.freeze()
        };
        assert!(decode_client_msg(&frame).is_err());

        let garbage = {
            let mut f = BytesMut::new();
            f.put_u16(4);
            f.put_slice(b"\x00\x01\x02\x03");
            f.freeze()
        };
        assert!(decode_client_msg(&garbage).is_err());
    }
}
