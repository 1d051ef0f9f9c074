//! Wire and storage formats for point-cloud frames: the `LIDR` streaming
//! frame (§4.1) and the `LIDRARCH` recording archive (§4.9).

mod archive;
mod frame;

pub use archive::{ArchiveError, FinalizeStats, Reader, Writer, HEADER_LEN};
pub use frame::{encoded_len, pack, unpack, CodecError, MAGIC, VERSION};
