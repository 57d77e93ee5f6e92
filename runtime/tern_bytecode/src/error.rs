use std::io;

/// Failure to decode a byte stream into a program tree.
///
/// All variants are fatal: a stream that fails to decode is rejected whole.
/// `offset` is the byte index where the problem was detected.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid bytecode: missing magic header")]
    BadMagic,
    #[error("unsupported bytecode version {found} (expected {expected})")]
    UnsupportedVersion { found: u16, expected: u16 },
    #[error("invalid bytecode: unknown opcode {opcode:#04x} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },
    #[error("invalid bytecode: expected {expected} at offset {offset}, found opcode {opcode:#04x}")]
    UnexpectedOpcode {
        expected: &'static str,
        opcode: u8,
        offset: usize,
    },
    #[error("invalid bytecode: truncated stream at offset {offset}")]
    UnexpectedEof { offset: usize },
    #[error("invalid bytecode: negative length {len} at offset {offset}")]
    NegativeLength { len: i32, offset: usize },
    #[error("invalid bytecode: string at offset {offset} is not valid utf-8")]
    InvalidUtf8 { offset: usize },
    #[error("invalid bytecode: {count} trailing bytes after program")]
    TrailingBytes { count: usize },
    #[error("failed to read bytecode: {0}")]
    Io(#[from] io::Error),
}
