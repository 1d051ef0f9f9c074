//! Little-endian framed point-cloud wire format ("LIDR", v1).
//!
//! Layout: 4-byte magic `LIDR`, u32 version, f64 timestamp, u32 point count
//! `N`, then `N * 3` little-endian f32 triples. Only `(x, y, z)` round-trip —
//! extra channels are dropped on pack and never recovered on unpack.

use thiserror::Error;
use types::PointCloud;

pub const MAGIC: &[u8; 4] = b"LIDR";
pub const VERSION: u32 = 1;

const HEADER_LEN: usize = 4 + 4 + 8 + 4; // magic + version + timestamp + count
const POINT_LEN: usize = 12; // 3 * f32

#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("frame magic mismatch: expected `LIDR`")]
    InvalidMagic,
    #[error("unsupported frame version: {0}")]
    UnsupportedVersion(u32),
    #[error("frame size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("frame too short to contain a header ({0} bytes)")]
    Truncated(usize),
}

/// Serialize a point cloud's positional columns plus a timestamp into a
/// single LIDR frame. Only the first three columns are written.
pub fn pack(points: &PointCloud, timestamp: f64) -> Vec<u8> {
    let n = points.len();
    let mut buf = Vec::with_capacity(HEADER_LEN + n * POINT_LEN);
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&VERSION.to_le_bytes());
    buf.extend_from_slice(&timestamp.to_le_bytes());
    buf.extend_from_slice(&(n as u32).to_le_bytes());
    for i in 0..n {
        let [x, y, z] = points.xyz(i);
        buf.extend_from_slice(&x.to_le_bytes());
        buf.extend_from_slice(&y.to_le_bytes());
        buf.extend_from_slice(&z.to_le_bytes());
    }
    buf
}

/// Parse a LIDR frame back into a width-3 point cloud plus its timestamp.
pub fn unpack(bytes: &[u8]) -> Result<(PointCloud, f64), CodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::Truncated(bytes.len()));
    }
    if &bytes[0..4] != MAGIC {
        return Err(CodecError::InvalidMagic);
    }
    let version = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
    if version != VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let timestamp = f64::from_le_bytes(bytes[8..16].try_into().unwrap());
    let n = u32::from_le_bytes(bytes[16..20].try_into().unwrap()) as usize;

    let expected = HEADER_LEN + n * POINT_LEN;
    if bytes.len() != expected {
        return Err(CodecError::SizeMismatch { expected, actual: bytes.len() });
    }

    let mut data = Vec::with_capacity(n * 3);
    let mut off = HEADER_LEN;
    for _ in 0..n {
        let x = f32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
        let y = f32::from_le_bytes(bytes[off + 4..off + 8].try_into().unwrap());
        let z = f32::from_le_bytes(bytes[off + 8..off + 12].try_into().unwrap());
        data.extend_from_slice(&[x, y, z]);
        off += POINT_LEN;
    }

    Ok((PointCloud::from_flat(data, 3), timestamp))
}

/// Exact encoded size of a frame carrying `n` points, used by the archive
/// writer to record index entries without re-deriving header arithmetic.
pub fn encoded_len(n: usize) -> usize {
    HEADER_LEN + n * POINT_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_round_trip() {
        let points = PointCloud::from_xyz(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let bytes = pack(&points, 123.456);
        let (decoded, ts) = unpack(&bytes).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded.xyz(0), [1.0, 2.0, 3.0]);
        assert_eq!(decoded.xyz(1), [4.0, 5.0, 6.0]);
        assert_eq!(ts, 123.456);
    }

    #[test]
    fn pack_drops_extra_columns() {
        let points = PointCloud::from_flat(vec![1.0, 2.0, 3.0, 99.0, 4.0, 5.0, 6.0, 99.0], 4);
        let bytes = pack(&points, 0.0);
        let (decoded, _) = unpack(&bytes).unwrap();
        assert_eq!(decoded.width(), 3);
        assert_eq!(decoded.xyz(0), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn empty_cloud_round_trips() {
        let points = PointCloud::empty(3);
        let bytes = pack(&points, 1.0);
        let (decoded, ts) = unpack(&bytes).unwrap();
        assert!(decoded.is_empty());
        assert_eq!(ts, 1.0);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = pack(&PointCloud::empty(3), 0.0);
        bytes[0] = b'X';
        assert_eq!(unpack(&bytes), Err(CodecError::InvalidMagic));
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut bytes = pack(&PointCloud::empty(3), 0.0);
        bytes[4..8].copy_from_slice(&2u32.to_le_bytes());
        assert_eq!(unpack(&bytes), Err(CodecError::UnsupportedVersion(2)));
    }

    #[test]
    fn rejects_size_mismatch() {
        let mut bytes = pack(&PointCloud::from_xyz(&[[1.0, 2.0, 3.0]]), 0.0);
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(unpack(&bytes), Err(CodecError::SizeMismatch { .. })));
    }

    #[test]
    fn rejects_truncated_header() {
        assert_eq!(unpack(&[0u8; 3]), Err(CodecError::Truncated(3)));
    }

    #[test]
    fn encoded_len_matches_pack_output() {
        let points = PointCloud::from_xyz(&[[0.0, 0.0, 0.0]; 5]);
        assert_eq!(pack(&points, 0.0).len(), encoded_len(5));
    }
}
