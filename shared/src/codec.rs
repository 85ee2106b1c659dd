//! Byte-level reader primitives for the A2S wire format.
//!
//! Pure functions over a buffer and a cursor position, no socket I/O. This
//! keeps every wire case testable with literal byte fixtures and insulates
//! the rest of the system from partial or garbled responses.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("packet truncated at offset {offset}: needed {needed} bytes, {remaining} remain")]
    Truncated {
        offset: usize,
        needed: usize,
        remaining: usize,
    },
    #[error("missing connectionless header")]
    InvalidHeader,
    #[error("unexpected message type {got:#04x}")]
    UnexpectedType { got: u8 },
}

fn ensure(buf: &[u8], pos: usize, needed: usize) -> Result<(), CodecError> {
    let remaining = buf.len().saturating_sub(pos);
    if remaining < needed {
        return Err(CodecError::Truncated {
            offset: pos,
            needed,
            remaining,
        });
    }
    Ok(())
}

/// Reads up to the next NUL byte, or to the end of the buffer when no NUL
/// follows (non-fatal). Invalid UTF-8 sequences are replaced, never an error.
pub fn read_cstring(buf: &[u8], pos: usize) -> (String, usize) {
    if pos >= buf.len() {
        return (String::new(), buf.len());
    }
    match buf[pos..].iter().position(|&b| b == 0) {
        Some(end) => {
            let s = String::from_utf8_lossy(&buf[pos..pos + end]).into_owned();
            (s, pos + end + 1)
        }
        None => {
            let s = String::from_utf8_lossy(&buf[pos..]).into_owned();
            (s, buf.len())
        }
    }
}

pub fn read_u8(buf: &[u8], pos: usize) -> Result<(u8, usize), CodecError> {
    ensure(buf, pos, 1)?;
    Ok((buf[pos], pos + 1))
}

pub fn read_u16_le(buf: &[u8], pos: usize) -> Result<(u16, usize), CodecError> {
    ensure(buf, pos, 2)?;
    Ok((LittleEndian::read_u16(&buf[pos..]), pos + 2))
}

pub fn read_i32_le(buf: &[u8], pos: usize) -> Result<(i32, usize), CodecError> {
    ensure(buf, pos, 4)?;
    Ok((LittleEndian::read_i32(&buf[pos..]), pos + 4))
}

pub fn read_f32_le(buf: &[u8], pos: usize) -> Result<(f32, usize), CodecError> {
    ensure(buf, pos, 4)?;
    Ok((LittleEndian::read_f32(&buf[pos..]), pos + 4))
}
