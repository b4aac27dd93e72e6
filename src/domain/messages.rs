//! Wire messages exchanged with producers over the ingest connection.
//!
//! Text frames carry one JSON control message each. Binary frames are only
//! valid immediately after a `chunk-header` and must be exactly `chunkSize`
//! bytes long.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlMessage {
    #[serde(rename_all = "camelCase")]
    ClipBegin {
        clip_number: u64,
        size: u64,
        duration: f64,
    },
    #[serde(rename_all = "camelCase")]
    ChunkHeader {
        clip_number: u64,
        chunk_index: u32,
        chunk_size: u64,
    },
    #[serde(rename_all = "camelCase")]
    ClipComplete { clip_number: u64, total_chunks: u32 },
}

impl ControlMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn clip_number(&self) -> u64 {
        match self {
            ControlMessage::ClipBegin { clip_number, .. }
            | ControlMessage::ChunkHeader { clip_number, .. }
            | ControlMessage::ClipComplete { clip_number, .. } => *clip_number,
        }
    }
}

/// Messages sent back to the producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    ClipAck {
        clip_number: u64,
        accepted: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clip_begin() {
        let msg =
            ControlMessage::parse(r#"{"type":"clip-begin","clipNumber":7,"size":150000,"duration":10.0}"#)
                .unwrap();
        assert_eq!(
            msg,
            ControlMessage::ClipBegin {
                clip_number: 7,
                size: 150000,
                duration: 10.0
            }
        );
    }

    #[test]
    fn test_parse_chunk_header() {
        let msg = ControlMessage::parse(
            r#"{"type":"chunk-header","clipNumber":7,"chunkIndex":2,"chunkSize":18928}"#,
        )
        .unwrap();
        assert_eq!(msg.clip_number(), 7);
        assert!(matches!(
            msg,
            ControlMessage::ChunkHeader {
                chunk_index: 2,
                chunk_size: 18928,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        assert!(ControlMessage::parse(r#"{"type":"frame_metadata","frameNumber":1}"#).is_err());
        assert!(ControlMessage::parse("not json").is_err());
    }

    #[test]
    fn test_ack_serialization() {
        let ack = ServerMessage::ClipAck {
            clip_number: 3,
            accepted: false,
            reason: Some("backpressure".to_string()),
        };
        let json = serde_json::to_value(&ack).unwrap();
        assert_eq!(json["type"], "clip-ack");
        assert_eq!(json["clipNumber"], 3);
        assert_eq!(json["accepted"], false);
        assert_eq!(json["reason"], "backpressure");
    }
}
