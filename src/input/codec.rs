//! Binary container for recording streams.
//!
//! ```text
//! Magic:   "SRPL" (4 bytes)
//! Version: u16 little-endian
//! Body:    bincode (standard config) of frame rate, frame count,
//!          recorded-at timestamp and the entity list
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::{EntityRecord, RecordingStream, Tick};
use crate::error::{ReplayError, Result};

/// Magic bytes identifying a recording file
pub const STREAM_MAGIC: &[u8; 4] = b"SRPL";

/// Current container version
pub const STREAM_VERSION: u16 = 1;

const HEADER_SIZE: usize = 6;

#[derive(Serialize)]
struct StreamBodyRef<'a> {
    frame_rate: u32,
    frame_count: Tick,
    recorded_at: DateTime<Utc>,
    entities: Option<&'a [Arc<EntityRecord>]>,
}

/// On-disk body. The entity list is optional so a file written without one
/// decodes and is then rejected by validation instead of by the decoder.
#[derive(Deserialize)]
struct StreamBody {
    frame_rate: u32,
    frame_count: Tick,
    recorded_at: DateTime<Utc>,
    entities: Option<Vec<Arc<EntityRecord>>>,
}

/// Check whether a buffer starts with the recording magic
pub fn is_recording(data: &[u8]) -> bool {
    data.len() >= STREAM_MAGIC.len() && &data[..STREAM_MAGIC.len()] == STREAM_MAGIC
}

/// Serialize a stream into the container format
pub fn encode_stream(stream: &RecordingStream) -> Result<Vec<u8>> {
    let body = StreamBodyRef {
        frame_rate: stream.frame_rate,
        frame_count: stream.frame_count,
        recorded_at: stream.recorded_at,
        entities: Some(stream.entities.as_slice()),
    };

    let mut bytes = Vec::with_capacity(HEADER_SIZE + 64);
    bytes.extend_from_slice(STREAM_MAGIC);
    bytes.extend_from_slice(&STREAM_VERSION.to_le_bytes());
    bytes.extend(bincode::serde::encode_to_vec(&body, bincode::config::standard())?);
    Ok(bytes)
}

/// Decode and validate a buffer. Errors are tagged with `name`.
pub fn decode_stream(name: &str, data: &[u8]) -> Result<RecordingStream> {
    let invalid = |reason: String| ReplayError::InvalidStream {
        name: name.to_string(),
        reason,
    };

    if data.len() < HEADER_SIZE || !is_recording(data) {
        return Err(invalid("missing recording header".to_string()));
    }
    let version = u16::from_le_bytes([data[4], data[5]]);
    if version != STREAM_VERSION {
        return Err(invalid(format!("unsupported version {}", version)));
    }

    let (body, _): (StreamBody, usize) =
        bincode::serde::decode_from_slice(&data[HEADER_SIZE..], bincode::config::standard())
            .map_err(|source| ReplayError::Decode {
                name: name.to_string(),
                source,
            })?;

    let entities = body
        .entities
        .ok_or_else(|| invalid("missing entity list".to_string()))?;

    let stream = RecordingStream {
        frame_rate: body.frame_rate,
        frame_count: body.frame_count,
        recorded_at: body.recorded_at,
        entities,
    };
    stream.validate().map_err(invalid)?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Chirality, Frame, FramePayload, HandPose, RecordPart};

    fn sample_stream() -> RecordingStream {
        let mut hand = EntityRecord::new("Hand_L", "hand");
        let mut part = RecordPart::new();
        for tick in [0, 10, 25] {
            part.add_frame(Frame::new(tick, FramePayload::Hand(HandPose::open(Chirality::Left))));
        }
        hand.parts.push(part);
        hand.add_status(true, 0);
        RecordingStream::new(30, 90, vec![hand])
    }

    #[test]
    fn test_stream_roundtrip() {
        let stream = sample_stream();
        let bytes = encode_stream(&stream).unwrap();
        assert!(is_recording(&bytes));

        let decoded = decode_stream("take1", &bytes).unwrap();
        assert_eq!(decoded, stream);
    }

    #[test]
    fn test_rejects_bad_header() {
        let err = decode_stream("junk", b"NOPE\x01\x00").unwrap_err();
        assert!(matches!(err, ReplayError::InvalidStream { ref name, .. } if name == "junk"));

        let mut bytes = encode_stream(&sample_stream()).unwrap();
        bytes[4] = 9;
        assert!(decode_stream("future", &bytes).is_err());
    }

    #[test]
    fn test_rejects_truncated_body() {
        let bytes = encode_stream(&sample_stream()).unwrap();
        let err = decode_stream("cut", &bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(err, ReplayError::Decode { .. }));
    }

    #[test]
    fn test_rejects_missing_entity_list() {
        let body = StreamBodyRef {
            frame_rate: 30,
            frame_count: 10,
            recorded_at: Utc::now(),
            entities: None,
        };
        let mut bytes = STREAM_MAGIC.to_vec();
        bytes.extend_from_slice(&STREAM_VERSION.to_le_bytes());
        bytes.extend(bincode::serde::encode_to_vec(&body, bincode::config::standard()).unwrap());

        let err = decode_stream("empty", &bytes).unwrap_err();
        assert!(err.to_string().contains("missing entity list"));
    }

    #[test]
    fn test_rejects_structurally_invalid_stream() {
        let mut stream = sample_stream();
        stream.frame_count = 5;
        let bytes = encode_stream(&stream).unwrap();
        assert!(matches!(
            decode_stream("short", &bytes),
            Err(ReplayError::InvalidStream { .. })
        ));
    }
}
