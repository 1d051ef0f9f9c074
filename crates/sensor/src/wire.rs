//! Length-prefixed binary protocol a sensor worker subprocess speaks over
//! its own stdout (§4.3): one tag byte, a `u32` little-endian payload
//! length, then the payload. Distinct from `codec::frame`'s LIDR wire
//! format — that one drops every channel but xyz for network streaming,
//! while a worker must hand its parent the full-width point cloud so
//! downstream operators still see every channel the sensor produced.

use std::io;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use types::PointCloud;

const TAG_FRAME: u8 = 1;
const TAG_STATUS: u8 = 2;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("unknown message tag {0}")]
    UnknownTag(u8),
    #[error("malformed status payload: {0}")]
    Status(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Connected,
    Disconnected,
    Error,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StatusWire {
    kind: String,
    message: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerStatus {
    pub kind: StatusKind,
    pub message: Option<String>,
}

impl WorkerStatus {
    pub fn connected() -> Self {
        Self { kind: StatusKind::Connected, message: None }
    }

    pub fn disconnected(message: impl Into<String>) -> Self {
        Self { kind: StatusKind::Disconnected, message: Some(message.into()) }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { kind: StatusKind::Error, message: Some(message.into()) }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMessage {
    Frame { points: PointCloud, timestamp: f64 },
    Status(WorkerStatus),
}

/// Writes one frame message. Used by the worker-side process; takes any
/// `Write` so it can target a locked stdout handle or, in tests, a `Vec<u8>`.
pub fn encode_frame<W: io::Write>(mut w: W, points: &PointCloud, timestamp: f64) -> io::Result<()> {
    let width = points.width() as u32;
    let count = points.len() as u32;
    let mut payload = Vec::with_capacity(16 + points.as_flat().len() * 4);
    payload.extend_from_slice(&width.to_le_bytes());
    payload.extend_from_slice(&count.to_le_bytes());
    payload.extend_from_slice(&timestamp.to_le_bytes());
    for value in points.as_flat() {
        payload.extend_from_slice(&value.to_le_bytes());
    }
    write_frame_bytes(&mut w, TAG_FRAME, &payload)
}

pub fn encode_status<W: io::Write>(mut w: W, status: &WorkerStatus) -> io::Result<()> {
    let wire = StatusWire {
        kind: match status.kind {
            StatusKind::Connected => "connected",
            StatusKind::Disconnected => "disconnected",
            StatusKind::Error => "error",
        }
        .to_string(),
        message: status.message.clone(),
    };
    let payload = serde_json::to_vec(&wire).expect("status wire struct always serializes");
    write_frame_bytes(&mut w, TAG_STATUS, &payload)
}

fn write_frame_bytes<W: io::Write>(w: &mut W, tag: u8, payload: &[u8]) -> io::Result<()> {
    w.write_all(&[tag])?;
    w.write_all(&(payload.len() as u32).to_le_bytes())?;
    w.write_all(payload)?;
    w.flush()
}

/// Reads one message from an async stream. Returns `Ok(None)` on a clean
/// EOF at a message boundary, which is how the parent notices its child
/// closed stdout.
pub async fn read_message<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<WorkerMessage>, WireError> {
    let mut tag_buf = [0u8; 1];
    match reader.read_exact(&mut tag_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_le_bytes(len_buf) as usize;

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    decode_payload(tag_buf[0], &payload)
}

fn decode_payload(tag: u8, payload: &[u8]) -> Result<Option<WorkerMessage>, WireError> {
    match tag {
        TAG_FRAME => {
            if payload.len() < 16 {
                return Err(WireError::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated frame header")));
            }
            let width = u32::from_le_bytes(payload[0..4].try_into().unwrap()) as usize;
            let count = u32::from_le_bytes(payload[4..8].try_into().unwrap()) as usize;
            let timestamp = f64::from_le_bytes(payload[8..16].try_into().unwrap());

            let expected = 16 + width * count * 4;
            if payload.len() != expected {
                return Err(WireError::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("frame payload size mismatch: expected {expected}, got {}", payload.len()),
                )));
            }

            let mut data = Vec::with_capacity(width * count);
            let mut offset = 16;
            for _ in 0..(width * count) {
                let bytes: [u8; 4] = payload[offset..offset + 4].try_into().unwrap();
                data.push(f32::from_le_bytes(bytes));
                offset += 4;
            }
            let points = PointCloud::from_flat(data, width.max(3));
            Ok(Some(WorkerMessage::Frame { points, timestamp }))
        }
        TAG_STATUS => {
            let wire: StatusWire = serde_json::from_slice(payload)?;
            let kind = match wire.kind.as_str() {
                "connected" => StatusKind::Connected,
                "disconnected" => StatusKind::Disconnected,
                _ => StatusKind::Error,
            };
            Ok(Some(WorkerMessage::Status(WorkerStatus { kind, message: wire.message })))
        }
        other => Err(WireError::UnknownTag(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::PointCloud;

    #[tokio::test]
    async fn frame_round_trips_through_the_wire() {
        let points = PointCloud::from_xyz(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let mut buf = Vec::new();
        encode_frame(&mut buf, &points, 12.5).unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let message = read_message(&mut cursor).await.unwrap().unwrap();
        match message {
            WorkerMessage::Frame { points: decoded, timestamp } => {
                assert_eq!(decoded.as_flat(), points.as_flat());
                assert_eq!(timestamp, 12.5);
            }
            _ => panic!("expected a frame message"),
        }
    }

    #[tokio::test]
    async fn status_round_trips_through_the_wire() {
        let status = WorkerStatus::error("device unreachable");
        let mut buf = Vec::new();
        encode_status(&mut buf, &status).unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let message = read_message(&mut cursor).await.unwrap().unwrap();
        assert_eq!(message, WorkerMessage::Status(status));
    }

    #[tokio::test]
    async fn clean_eof_at_a_boundary_yields_none() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        assert!(read_message(&mut cursor).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mismatched_frame_payload_size_is_rejected() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&3u32.to_le_bytes());
        payload.extend_from_slice(&2u32.to_le_bytes());
        payload.extend_from_slice(&0.0f64.to_le_bytes());
        payload.extend_from_slice(&1.0f32.to_le_bytes());
        let mut buf = Vec::new();
        buf.push(TAG_FRAME);
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&payload);

        let mut cursor = std::io::Cursor::new(buf);
        assert!(read_message(&mut cursor).await.is_err());
    }
}
