//! Node tags.
//!
//! Statement opcodes occupy `0x01..0x40`, expression opcodes `0x40..0x80`,
//! type-expression tags `0x80..`. `NIL` marks an absent optional node in any
//! position. Values are part of the on-disk format: never renumber, only
//! append.

pub const NIL: u8 = 0x00;

// Statements
pub const BLOCK: u8 = 0x01;
pub const EXPR_STMT: u8 = 0x02;
pub const VAR: u8 = 0x03;
pub const ASSIGN: u8 = 0x04;
pub const IF: u8 = 0x05;
pub const TRY: u8 = 0x06;
pub const LOOP: u8 = 0x07;
pub const FOR: u8 = 0x08;
pub const CFOR: u8 = 0x09;
pub const SWITCH: u8 = 0x0A;
pub const SELECT: u8 = 0x0B;
pub const THROW: u8 = 0x0C;
pub const RETURN: u8 = 0x0D;
pub const BREAK: u8 = 0x0E;
pub const CONTINUE: u8 = 0x0F;
pub const MODULE: u8 = 0x10;
pub const SPAWN: u8 = 0x11;
pub const DEFER: u8 = 0x12;
pub const SEND: u8 = 0x13;
pub const RECEIVE: u8 = 0x14;
pub const CLOSE: u8 = 0x15;

// Expressions
pub const NUMBER: u8 = 0x40;
pub const STRING: u8 = 0x41;
pub const BOOL: u8 = 0x42;
pub const NIL_LITERAL: u8 = 0x43;
pub const IDENT: u8 = 0x44;
pub const PAREN: u8 = 0x45;
pub const UNARY: u8 = 0x46;
pub const ADDR: u8 = 0x47;
pub const DEREF: u8 = 0x48;
pub const BINARY: u8 = 0x49;
pub const TERNARY: u8 = 0x4A;
pub const MEMBER: u8 = 0x4B;
pub const INDEX: u8 = 0x4C;
pub const SLICE: u8 = 0x4D;
pub const ARRAY: u8 = 0x4E;
pub const MAP: u8 = 0x4F;
pub const STRUCT: u8 = 0x50;
pub const FUNC: u8 = 0x51;
pub const CALL: u8 = 0x52;
pub const ANON_CALL: u8 = 0x53;
pub const OP_ASSIGN: u8 = 0x54;
pub const LEN: u8 = 0x55;
pub const INCLUDE: u8 = 0x56;
pub const MAKE: u8 = 0x57;
pub const RECV: u8 = 0x58;
pub const DELETE: u8 = 0x59;

// Type expressions
pub const TY_NAMED: u8 = 0x80;
pub const TY_SLICE: u8 = 0x81;
pub const TY_ARRAY: u8 = 0x82;
pub const TY_MAP: u8 = 0x83;
pub const TY_PTR: u8 = 0x84;
pub const TY_CHAN: u8 = 0x85;
pub const TY_FUNC: u8 = 0x86;
pub const TY_STRUCT: u8 = 0x87;
