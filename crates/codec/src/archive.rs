//! Seekable single-file recording archive format ("LIDRARCH", v1).
//!
//! ```text
//! [Header, 72 bytes]
//!   magic        8 bytes = "LIDRARCH"
//!   version      u32 = 1
//!   frame_count  u32       (filled on finalize)
//!   metadata_off u64       (filled on finalize)
//!   index_off    u64       (filled on finalize)
//!   first_frame  u64 = 72
//!   start_ts     f64       (filled on first frame)
//!   end_ts       f64       (filled on last frame)
//!   reserved     16 bytes
//! [Frames]   contiguous frame::pack() frames, one per write
//! [Index]    frame_count * 16 bytes: { offset: u64, size: u32, reserved: u32 }
//! [Metadata] UTF-8 JSON blob to EOF
//! ```
//!
//! The writer and reader here are synchronous file-I/O primitives; batching,
//! per-recording admission, and the `stopping -> stopped` lifecycle live one
//! layer up in the recorder service.

use crate::frame::{self, CodecError};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use types::PointCloud;

pub const MAGIC: &[u8; 8] = b"LIDRARCH";
pub const VERSION: u32 = 1;
pub const HEADER_LEN: u64 = 72;
const INDEX_ENTRY_LEN: u64 = 16;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Frame(#[from] CodecError),
    #[error("archive magic mismatch: expected `LIDRARCH`")]
    InvalidMagic,
    #[error("unsupported archive version: {0}")]
    UnsupportedVersion(u32),
    #[error("frame index {0} out of range")]
    OutOfRange(usize),
    #[error("archive already finalized")]
    AlreadyFinalized,
    #[error("malformed archive metadata: {0}")]
    MetadataParse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    offset: u64,
    size: u32,
}

#[derive(Debug, Clone)]
pub struct FinalizeStats {
    pub file_path: PathBuf,
    pub file_size_bytes: u64,
    pub frame_count: u32,
    pub duration_seconds: f64,
    pub average_fps: f64,
}

/// Writes frames to a new archive file. Not `Send`-safe to share across
/// threads without external synchronization; the recorder service owns one
/// per in-progress recording behind its own lock.
pub struct Writer {
    file: File,
    path: PathBuf,
    index: Vec<IndexEntry>,
    start_ts: Option<f64>,
    end_ts: Option<f64>,
    finalized: bool,
}

impl Writer {
    pub fn start(path: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(&path)?;
        file.write_all(&[0u8; HEADER_LEN as usize])?;
        Ok(Self { file, path, index: Vec::new(), start_ts: None, end_ts: None, finalized: false })
    }

    pub fn frame_count(&self) -> usize {
        self.index.len()
    }

    /// Append one frame, recording its offset and size in the in-memory
    /// index and extending the running `[start_ts, end_ts]` span.
    pub fn write_frame(&mut self, points: &PointCloud, timestamp: f64) -> Result<(), ArchiveError> {
        let offset = self.file.stream_position()?;
        let bytes = frame::pack(points, timestamp);
        self.file.write_all(&bytes)?;
        self.index.push(IndexEntry { offset, size: bytes.len() as u32 });
        self.start_ts = Some(self.start_ts.map_or(timestamp, |s| s.min(timestamp)));
        self.end_ts = Some(self.end_ts.map_or(timestamp, |e| e.max(timestamp)));
        Ok(())
    }

    pub fn write_batch(&mut self, frames: &[(&PointCloud, f64)]) -> Result<(), ArchiveError> {
        for (points, ts) in frames {
            self.write_frame(points, *ts)?;
        }
        Ok(())
    }

    /// Append the index and metadata, then rewrite the header with final
    /// counts and offsets. Consumes the writer; a second `finalize` is
    /// rejected rather than silently repeating the trailer write.
    pub fn finalize(mut self, metadata: &serde_json::Value) -> Result<FinalizeStats, ArchiveError> {
        if self.finalized {
            return Err(ArchiveError::AlreadyFinalized);
        }
        self.finalized = true;

        let index_off = self.file.stream_position()?;
        for entry in &self.index {
            self.file.write_all(&entry.offset.to_le_bytes())?;
            self.file.write_all(&entry.size.to_le_bytes())?;
            self.file.write_all(&0u32.to_le_bytes())?;
        }

        let metadata_off = self.file.stream_position()?;
        let metadata_bytes = serde_json::to_vec(metadata)?;
        self.file.write_all(&metadata_bytes)?;

        let frame_count = self.index.len() as u32;
        let start_ts = self.start_ts.unwrap_or(0.0);
        let end_ts = self.end_ts.unwrap_or(0.0);

        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(MAGIC)?;
        self.file.write_all(&VERSION.to_le_bytes())?;
        self.file.write_all(&frame_count.to_le_bytes())?;
        self.file.write_all(&metadata_off.to_le_bytes())?;
        self.file.write_all(&index_off.to_le_bytes())?;
        self.file.write_all(&HEADER_LEN.to_le_bytes())?;
        self.file.write_all(&start_ts.to_le_bytes())?;
        self.file.write_all(&end_ts.to_le_bytes())?;
        self.file.write_all(&[0u8; 16])?;
        self.file.flush()?;

        let file_size_bytes = self.file.metadata()?.len();
        let duration_seconds = (end_ts - start_ts).max(0.0);
        let average_fps = if duration_seconds > 0.0 { frame_count as f64 / duration_seconds } else { 0.0 };

        Ok(FinalizeStats {
            file_path: self.path.clone(),
            file_size_bytes,
            frame_count,
            duration_seconds,
            average_fps,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Header {
    frame_count: u32,
    metadata_off: u64,
    index_off: u64,
    start_ts: f64,
    end_ts: f64,
}

fn parse_header(bytes: &[u8; HEADER_LEN as usize]) -> Result<Header, ArchiveError> {
    if &bytes[0..8] != MAGIC {
        return Err(ArchiveError::InvalidMagic);
    }
    let version = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
    if version != VERSION {
        return Err(ArchiveError::UnsupportedVersion(version));
    }
    Ok(Header {
        frame_count: u32::from_le_bytes(bytes[12..16].try_into().unwrap()),
        metadata_off: u64::from_le_bytes(bytes[16..24].try_into().unwrap()),
        index_off: u64::from_le_bytes(bytes[24..32].try_into().unwrap()),
        start_ts: f64::from_le_bytes(bytes[40..48].try_into().unwrap()),
        end_ts: f64::from_le_bytes(bytes[48..56].try_into().unwrap()),
    })
}

/// Opens a finalized archive for random-access reads. The frame index is
/// loaded fully into memory on open (bounded by `frame_count * 16` bytes).
pub struct Reader {
    file: File,
    header: Header,
    index: Vec<IndexEntry>,
    metadata: serde_json::Value,
}

impl Reader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        let mut file = File::open(path)?;

        let mut header_bytes = [0u8; HEADER_LEN as usize];
        file.read_exact(&mut header_bytes)?;
        let header = parse_header(&header_bytes)?;

        file.seek(SeekFrom::Start(header.index_off))?;
        let mut index = Vec::with_capacity(header.frame_count as usize);
        for _ in 0..header.frame_count {
            let mut entry_bytes = [0u8; INDEX_ENTRY_LEN as usize];
            file.read_exact(&mut entry_bytes)?;
            let offset = u64::from_le_bytes(entry_bytes[0..8].try_into().unwrap());
            let size = u32::from_le_bytes(entry_bytes[8..12].try_into().unwrap());
            index.push(IndexEntry { offset, size });
        }

        file.seek(SeekFrom::Start(header.metadata_off))?;
        let mut metadata_bytes = Vec::new();
        file.read_to_end(&mut metadata_bytes)?;
        let metadata = if metadata_bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&metadata_bytes)?
        };

        Ok(Self { file, header, index, metadata })
    }

    pub fn frame_count(&self) -> u32 {
        self.header.frame_count
    }

    pub fn duration(&self) -> f64 {
        (self.header.end_ts - self.header.start_ts).max(0.0)
    }

    pub fn start_ts(&self) -> f64 {
        self.header.start_ts
    }

    pub fn end_ts(&self) -> f64 {
        self.header.end_ts
    }

    pub fn metadata(&self) -> &serde_json::Value {
        &self.metadata
    }

    pub fn get_frame(&mut self, i: usize) -> Result<(PointCloud, f64), ArchiveError> {
        let entry = *self.index.get(i).ok_or(ArchiveError::OutOfRange(i))?;
        self.file.seek(SeekFrom::Start(entry.offset))?;
        let mut bytes = vec![0u8; entry.size as usize];
        self.file.read_exact(&mut bytes)?;
        let (points, ts) = frame::unpack(&bytes)?;
        Ok((points, ts))
    }

    pub fn iter_frames(&mut self, start: usize, end: usize) -> FrameIter<'_> {
        let end = end.min(self.index.len());
        FrameIter { reader: self, idx: start, end }
    }
}

pub struct FrameIter<'a> {
    reader: &'a mut Reader,
    idx: usize,
    end: usize,
}

impl<'a> Iterator for FrameIter<'a> {
    type Item = Result<(PointCloud, f64), ArchiveError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.idx >= self.end {
            return None;
        }
        let result = self.reader.get_frame(self.idx);
        self.idx += 1;
        Some(result)
    }
}
