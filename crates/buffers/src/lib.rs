//! Little-endian binary buffer utilities for shapewire.
//!
//! This crate provides the byte-level reading and writing primitives the
//! shapewire codecs are built on.
//!
//! # Overview
//!
//! - [`Reader`] - Reads binary data from a byte slice with cursor tracking.
//!   Every read is bounds-checked and reports truncation as [`BufferError`]
//!   instead of panicking, so a codec can surface a malformed stream to its
//!   caller.
//! - [`Writer`] - Writes binary data to an auto-growing buffer.
//!
//! # Example
//!
//! ```
//! use shapewire_buffers::{Reader, Writer};
//!
//! // Write some data
//! let mut writer = Writer::new();
//! writer.u8(0x01);
//! writer.u16(0x0203);
//! writer.lp_str(Some("hello"));
//! let data = writer.flush();
//!
//! // Read it back
//! let mut reader = Reader::new(&data);
//! assert_eq!(reader.u8().unwrap(), 0x01);
//! assert_eq!(reader.u16().unwrap(), 0x0203);
//! assert_eq!(reader.lp_str().unwrap(), Some("hello".to_string()));
//! ```

mod reader;
mod writer;

pub use reader::Reader;
pub use writer::Writer;

/// Sentinel length prefix encoding a null string.
pub const NULL_STR_LEN: u32 = u32::MAX;

/// Error type for buffer operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// Attempted to read past the end of the buffer.
    EndOfBuffer { at: usize },
    /// Invalid UTF-8 sequence.
    InvalidUtf8 { at: usize },
    /// A length prefix did not fit the remaining buffer.
    BadLength { at: usize, len: u64 },
}

impl std::fmt::Display for BufferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferError::EndOfBuffer { at } => write!(f, "unexpected end of buffer at byte {at}"),
            BufferError::InvalidUtf8 { at } => write!(f, "invalid UTF-8 sequence at byte {at}"),
            BufferError::BadLength { at, len } => {
                write!(f, "length prefix {len} exceeds buffer at byte {at}")
            }
        }
    }
}

impl std::error::Error for BufferError {}
