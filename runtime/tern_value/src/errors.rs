//! Error types for the runtime.
//!
//! # Structured Error Categories
//!
//! `EvalErrorKind` is the typed category of a positioned runtime error.
//! Factory functions (`undefined_symbol(name)`, `index_out_of_range(i, len)`,
//! ...) are the construction API; they fill in both `kind` and `message`.
//!
//! Library-boundary failures that are not positioned (conversion, scope
//! operations, host-function failures) use `thiserror` enums and convert into
//! `EvalError` at the evaluator boundary.

use std::fmt;

use tern_ir::{BinaryOp, Position, UnaryOp};

use crate::value::Value;

/// Result of evaluating an expression.
pub type EvalResult = Result<Value, EvalError>;

/// Typed error category.
#[derive(Clone, Debug)]
pub enum EvalErrorKind {
    // Scope
    UnknownSymbol {
        name: String,
    },
    InvalidSymbol {
        name: String,
    },
    UndefinedType {
        name: String,
    },
    Unaddressable {
        name: String,
    },
    ImmutableBinding {
        name: String,
    },
    TypeCannotBeAssigned {
        from: String,
        to: String,
    },

    // Access
    IndexOutOfRange {
        index: i64,
        len: usize,
    },
    NoSupportMemberOp {
        kind: String,
    },
    NoSuchMember {
        name: String,
        kind: String,
    },
    CannotIndex {
        kind: String,
        index: String,
    },
    InvalidMapKey {
        kind: String,
    },
    NilDereference,

    // Operators
    InvalidOperation {
        op: BinaryOp,
        left: String,
        right: String,
    },
    InvalidUnary {
        op: UnaryOp,
        kind: String,
    },
    ModuloByZero,
    InvalidNumber {
        text: String,
    },

    // Calls
    NotCallable {
        kind: String,
    },
    WrongArgumentCount {
        name: String,
        expected: usize,
        got: usize,
        variadic: bool,
    },
    WrongArgumentType {
        name: String,
        index: usize,
        expected: String,
        got: String,
    },
    ReturnMismatch {
        name: String,
        detail: String,
    },
    HostFailure {
        name: String,
        message: String,
    },
    HostPanic {
        name: String,
        message: String,
    },

    // Built-ins
    InvalidMake {
        detail: String,
    },
    SendOnClosed,
    CloseOfClosed,
    InvalidDelete {
        kind: String,
    },

    // Control
    Thrown {
        value: Value,
    },
    Cancelled,
    UnexpectedSignal {
        signal: &'static str,
    },

    /// Catch-all for failures with no structured category.
    Custom {
        message: String,
    },
}

impl fmt::Display for EvalErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Scope
            Self::UnknownSymbol { name } => write!(f, "undefined symbol '{name}'"),
            Self::InvalidSymbol { name } => write!(f, "invalid symbol '{name}'"),
            Self::UndefinedType { name } => write!(f, "undefined type '{name}'"),
            Self::Unaddressable { name } => write!(f, "cannot take the address of '{name}'"),
            Self::ImmutableBinding { name } => {
                write!(f, "cannot assign to immutable binding '{name}'")
            }
            Self::TypeCannotBeAssigned { from, to } => {
                write!(f, "type {from} cannot be assigned to type {to}")
            }

            // Access
            Self::IndexOutOfRange { index, len } => {
                write!(f, "index out of range [{index}] with length {len}")
            }
            Self::NoSupportMemberOp { kind } => {
                write!(f, "no support member operation on {kind}")
            }
            Self::NoSuchMember { name, kind } => write!(f, "no member named '{name}' on {kind}"),
            Self::CannotIndex { kind, index } => write!(f, "cannot index {kind} with {index}"),
            Self::InvalidMapKey { kind } => write!(f, "invalid map key type {kind}"),
            Self::NilDereference => write!(f, "invalid memory address or nil pointer dereference"),

            // Operators
            Self::InvalidOperation { op, left, right } => write!(
                f,
                "invalid operation: {left} {} {right}",
                op.as_symbol()
            ),
            Self::InvalidUnary { op, kind } => {
                write!(f, "invalid operation: {}{kind}", op.as_symbol())
            }
            Self::ModuloByZero => write!(f, "integer divide by zero"),
            Self::InvalidNumber { text } => write!(f, "invalid number literal '{text}'"),

            // Calls
            Self::NotCallable { kind } => write!(f, "cannot call non-function {kind}"),
            Self::WrongArgumentCount {
                name,
                expected,
                got,
                variadic,
            } => {
                let at_least = if *variadic { "at least " } else { "" };
                write!(
                    f,
                    "function {name} wants {at_least}{expected} arguments but received {got}"
                )
            }
            Self::WrongArgumentType {
                name,
                index,
                expected,
                got,
            } => write!(
                f,
                "function {name} wants argument {} as {expected} but received {got}",
                index + 1
            ),
            Self::ReturnMismatch { name, detail } => {
                write!(f, "function {name} return mismatch: {detail}")
            }
            Self::HostFailure { name, message } => write!(f, "{name}: {message}"),
            Self::HostPanic { name, message } => write!(f, "panic in {name}: {message}"),

            // Built-ins
            Self::InvalidMake { detail } => write!(f, "invalid make: {detail}"),
            Self::SendOnClosed => write!(f, "send on closed channel"),
            Self::CloseOfClosed => write!(f, "close of closed channel"),
            Self::InvalidDelete { kind } => write!(f, "cannot delete from {kind}"),

            // Control
            Self::Thrown { value } => write!(f, "{value}"),
            Self::Cancelled => write!(f, "execution cancelled"),
            Self::UnexpectedSignal { signal } => write!(f, "unexpected {signal}"),

            Self::Custom { message } => write!(f, "{message}"),
        }
    }
}

/// Positioned runtime error.
#[derive(Clone, Debug)]
pub struct EvalError {
    /// Structured category.
    pub kind: EvalErrorKind,
    /// Human-readable message; equals `kind.to_string()` for factory errors.
    pub message: String,
    /// Where the error surfaced. Innermost frame wins.
    pub pos: Option<Position>,
}

impl EvalError {
    /// Error with a plain message (`Custom` kind).
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        EvalError {
            kind: EvalErrorKind::Custom {
                message: message.clone(),
            },
            message,
            pos: None,
        }
    }

    pub fn from_kind(kind: EvalErrorKind) -> Self {
        let message = kind.to_string();
        EvalError {
            kind,
            message,
            pos: None,
        }
    }

    /// Attach `pos` unless a position is already recorded.
    #[must_use]
    pub fn at(mut self, pos: Position) -> Self {
        if self.pos.is_none() && pos.is_known() {
            self.pos = Some(pos);
        }
        self
    }

    /// Frame rewrap: same as [`EvalError::at`], used on every error leaving
    /// an evaluation frame.
    #[inline]
    #[must_use]
    pub fn rewrap(self, pos: Position) -> Self {
        self.at(pos)
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, EvalErrorKind::Cancelled)
    }

    /// Value handed to a `catch` binding: the thrown value, or the message.
    pub fn catch_value(&self) -> Value {
        match &self.kind {
            EvalErrorKind::Thrown { value } => value.clone(),
            _ => Value::string(self.message.clone()),
        }
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pos {
            Some(pos) => write!(f, "{pos} {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for EvalError {}

/// Extension for attaching a frame position to a fallible result.
pub trait ResultExt<T> {
    fn at(self, pos: Position) -> Result<T, EvalError>;
}

impl<T, E: Into<EvalError>> ResultExt<T> for Result<T, E> {
    #[inline]
    fn at(self, pos: Position) -> Result<T, EvalError> {
        self.map_err(|e| e.into().at(pos))
    }
}

// Scope errors

#[cold]
pub fn undefined_symbol(name: &str) -> EvalError {
    EvalError::from_kind(EvalErrorKind::UnknownSymbol {
        name: name.to_string(),
    })
}

#[cold]
pub fn undefined_type(name: &str) -> EvalError {
    EvalError::from_kind(EvalErrorKind::UndefinedType {
        name: name.to_string(),
    })
}

#[cold]
pub fn unaddressable(name: &str) -> EvalError {
    EvalError::from_kind(EvalErrorKind::Unaddressable {
        name: name.to_string(),
    })
}

#[cold]
pub fn type_cannot_be_assigned(from: &str, to: &str) -> EvalError {
    EvalError::from_kind(EvalErrorKind::TypeCannotBeAssigned {
        from: from.to_string(),
        to: to.to_string(),
    })
}

// Access errors

#[cold]
pub fn index_out_of_range(index: i64, len: usize) -> EvalError {
    EvalError::from_kind(EvalErrorKind::IndexOutOfRange { index, len })
}

#[cold]
pub fn no_support_member_op(kind: &str) -> EvalError {
    EvalError::from_kind(EvalErrorKind::NoSupportMemberOp {
        kind: kind.to_string(),
    })
}

#[cold]
pub fn no_such_member(name: &str, kind: &str) -> EvalError {
    EvalError::from_kind(EvalErrorKind::NoSuchMember {
        name: name.to_string(),
        kind: kind.to_string(),
    })
}

#[cold]
pub fn cannot_index(kind: &str, index: &str) -> EvalError {
    EvalError::from_kind(EvalErrorKind::CannotIndex {
        kind: kind.to_string(),
        index: index.to_string(),
    })
}

#[cold]
pub fn invalid_map_key(kind: &str) -> EvalError {
    EvalError::from_kind(EvalErrorKind::InvalidMapKey {
        kind: kind.to_string(),
    })
}

#[cold]
pub fn nil_dereference() -> EvalError {
    EvalError::from_kind(EvalErrorKind::NilDereference)
}

// Operator errors

#[cold]
pub fn invalid_operation(op: BinaryOp, left: &str, right: &str) -> EvalError {
    EvalError::from_kind(EvalErrorKind::InvalidOperation {
        op,
        left: left.to_string(),
        right: right.to_string(),
    })
}

#[cold]
pub fn invalid_unary(op: UnaryOp, kind: &str) -> EvalError {
    EvalError::from_kind(EvalErrorKind::InvalidUnary {
        op,
        kind: kind.to_string(),
    })
}

#[cold]
pub fn modulo_by_zero() -> EvalError {
    EvalError::from_kind(EvalErrorKind::ModuloByZero)
}

#[cold]
pub fn invalid_number(text: &str) -> EvalError {
    EvalError::from_kind(EvalErrorKind::InvalidNumber {
        text: text.to_string(),
    })
}

// Call errors

#[cold]
pub fn not_callable(kind: &str) -> EvalError {
    EvalError::from_kind(EvalErrorKind::NotCallable {
        kind: kind.to_string(),
    })
}

#[cold]
pub fn wrong_argument_count(name: &str, expected: usize, got: usize, variadic: bool) -> EvalError {
    EvalError::from_kind(EvalErrorKind::WrongArgumentCount {
        name: name.to_string(),
        expected,
        got,
        variadic,
    })
}

#[cold]
pub fn wrong_argument_type(name: &str, index: usize, expected: &str, got: &str) -> EvalError {
    EvalError::from_kind(EvalErrorKind::WrongArgumentType {
        name: name.to_string(),
        index,
        expected: expected.to_string(),
        got: got.to_string(),
    })
}

#[cold]
pub fn return_mismatch(name: &str, detail: impl Into<String>) -> EvalError {
    EvalError::from_kind(EvalErrorKind::ReturnMismatch {
        name: name.to_string(),
        detail: detail.into(),
    })
}

#[cold]
pub fn host_failure(name: &str, message: impl Into<String>) -> EvalError {
    EvalError::from_kind(EvalErrorKind::HostFailure {
        name: name.to_string(),
        message: message.into(),
    })
}

#[cold]
pub fn host_panic(name: &str, message: impl Into<String>) -> EvalError {
    EvalError::from_kind(EvalErrorKind::HostPanic {
        name: name.to_string(),
        message: message.into(),
    })
}

// Built-in errors

#[cold]
pub fn invalid_make(detail: impl Into<String>) -> EvalError {
    EvalError::from_kind(EvalErrorKind::InvalidMake {
        detail: detail.into(),
    })
}

#[cold]
pub fn send_on_closed() -> EvalError {
    EvalError::from_kind(EvalErrorKind::SendOnClosed)
}

#[cold]
pub fn close_of_closed() -> EvalError {
    EvalError::from_kind(EvalErrorKind::CloseOfClosed)
}

#[cold]
pub fn invalid_delete(kind: &str) -> EvalError {
    EvalError::from_kind(EvalErrorKind::InvalidDelete {
        kind: kind.to_string(),
    })
}

// Control

#[cold]
pub fn thrown(value: Value) -> EvalError {
    EvalError::from_kind(EvalErrorKind::Thrown { value })
}

#[cold]
pub fn cancelled() -> EvalError {
    EvalError::from_kind(EvalErrorKind::Cancelled)
}

#[cold]
pub fn unexpected_signal(signal: &'static str) -> EvalError {
    EvalError::from_kind(EvalErrorKind::UnexpectedSignal { signal })
}

// Boundary errors

/// A value could not be converted to a type.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("cannot convert {from} to {to}{}", .detail.as_ref().map(|d| format!(": {d}")).unwrap_or_default())]
pub struct ConvertError {
    pub from: String,
    pub to: String,
    pub detail: Option<String>,
}

impl ConvertError {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        ConvertError {
            from: from.into(),
            to: to.into(),
            detail: None,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl From<ConvertError> for EvalError {
    fn from(e: ConvertError) -> Self {
        let message = e.to_string();
        EvalError {
            kind: EvalErrorKind::TypeCannotBeAssigned {
                from: e.from,
                to: e.to,
            },
            message,
            pos: None,
        }
    }
}

/// Failure of an environment operation. Every variant names the symbol.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EnvError {
    #[error("invalid symbol '{0}'")]
    InvalidSymbol(String),
    #[error("undefined symbol '{0}'")]
    UnknownSymbol(String),
    #[error("undefined type '{0}'")]
    UndefinedType(String),
    #[error("cannot take the address of '{0}'")]
    Unaddressable(String),
    #[error("cannot assign to immutable binding '{0}'")]
    ImmutableBinding(String),
    #[error("'{name}': type {from} cannot be assigned to type {to}")]
    TypeCannotBeAssigned {
        name: String,
        from: String,
        to: String,
    },
}

impl From<EnvError> for EvalError {
    fn from(e: EnvError) -> Self {
        let kind = match e {
            EnvError::InvalidSymbol(name) => EvalErrorKind::InvalidSymbol { name },
            EnvError::UnknownSymbol(name) => EvalErrorKind::UnknownSymbol { name },
            EnvError::UndefinedType(name) => EvalErrorKind::UndefinedType { name },
            EnvError::Unaddressable(name) => EvalErrorKind::Unaddressable { name },
            EnvError::ImmutableBinding(name) => EvalErrorKind::ImmutableBinding { name },
            EnvError::TypeCannotBeAssigned { from, to, .. } => {
                EvalErrorKind::TypeCannotBeAssigned { from, to }
            }
        };
        EvalError::from_kind(kind)
    }
}

/// Failure reported by a host function.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Convert(#[from] ConvertError),
    /// A script callback invoked by the host failed; passed through as is.
    #[error(transparent)]
    Eval(Box<EvalError>),
}

impl HostError {
    pub fn msg(message: impl Into<String>) -> Self {
        HostError::Message(message.into())
    }
}

impl From<String> for HostError {
    fn from(message: String) -> Self {
        HostError::Message(message)
    }
}

impl From<&str> for HostError {
    fn from(message: &str) -> Self {
        HostError::Message(message.to_string())
    }
}

impl From<EvalError> for HostError {
    fn from(e: EvalError) -> Self {
        HostError::Eval(Box::new(e))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
