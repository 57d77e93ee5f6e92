//! Tern bytecode - versioned binary form of the program tree.
//!
//! # Layout
//!
//! ```text
//! MAGIC (13 bytes, "TERN BYTECODE") | VERSION (u16, big-endian) | root statement
//! ```
//!
//! Every node is `OPCODE (u8) | payload`, and every statement or expression
//! payload starts with its position (`line i32, column i32`). Integers are
//! big-endian. Strings and arrays are length-prefixed with an `i32`. Optional
//! statement lists carry a presence byte so that an absent `else` and an
//! empty one stay distinct; optional single nodes are written as the `NIL`
//! opcode when absent. Map literals are `count i32` followed by key/value
//! node pairs.
//!
//! There is no checksum. A stream that does not decode cleanly is rejected
//! with a [`DecodeError`]; nothing is ever partially accepted.

mod decode;
mod encode;
mod error;
pub mod opcode;

use std::io::{Read, Write};

use tern_ir::Stmt;

pub use error::DecodeError;

/// File signature.
pub const MAGIC: &[u8; 13] = b"TERN BYTECODE";

/// Current format version.
pub const VERSION: u16 = 1;

/// Whether `bytes` starts with the bytecode signature.
pub fn is_bytecode(bytes: &[u8]) -> bool {
    bytes.starts_with(MAGIC)
}

/// Serialize a program.
pub fn encode(program: &Stmt) -> Vec<u8> {
    let mut encoder = encode::Encoder::new();
    encoder.stmt(program);
    encoder.finish()
}

/// Deserialize a program.
pub fn decode(bytes: &[u8]) -> Result<Stmt, DecodeError> {
    let mut decoder = decode::Decoder::new(bytes)?;
    let program = decoder.stmt()?;
    decoder.finish()?;
    Ok(program)
}

/// Serialize a program into `writer`.
pub fn encode_to<W: Write>(writer: &mut W, program: &Stmt) -> std::io::Result<()> {
    writer.write_all(&encode(program))
}

/// Read `reader` to the end and deserialize the program it holds.
pub fn decode_from<R: Read>(reader: &mut R) -> Result<Stmt, DecodeError> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    decode(&bytes)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
