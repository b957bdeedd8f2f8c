pub mod codec;
pub mod loader;

pub use codec::{decode_stream, encode_stream, is_recording, STREAM_MAGIC, STREAM_VERSION};
pub use loader::{decode_batch, LoadFailure, LoadReport, LoadTask, NamedBuffer, StreamLoader};

use std::path::Path;

use crate::core::RecordingStream;
use crate::error::Result;

/// Read a recording file into a buffer named after the file stem
pub fn read_buffer<P: AsRef<Path>>(path: P) -> Result<NamedBuffer> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string());
    Ok(NamedBuffer::new(name, bytes))
}

/// Read and decode a single recording file on the calling thread
pub fn load_file<P: AsRef<Path>>(path: P) -> Result<RecordingStream> {
    let buffer = read_buffer(path)?;
    decode_stream(&buffer.name, &buffer.bytes)
}

/// Encode a stream and write it to disk
pub fn write_stream<P: AsRef<Path>>(path: P, stream: &RecordingStream) -> Result<()> {
    std::fs::write(path, encode_stream(stream)?)?;
    Ok(())
}
