//! Source positions.
//!
//! Positions are carried by every node for diagnostics only. Two trees that
//! differ only in positions evaluate identically.

use std::fmt;

/// Line/column location of a node in the original source.
///
/// Lines and columns are 1-based when produced by a parser; `Position::NONE`
/// marks generated nodes.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct Position {
    pub line: i32,
    pub column: i32,
}

impl Position {
    /// Position for generated nodes.
    pub const NONE: Position = Position { line: 0, column: 0 };

    /// Create a new position.
    #[inline]
    pub const fn new(line: i32, column: i32) -> Self {
        Position { line, column }
    }

    /// Whether this position points into real source.
    #[inline]
    pub const fn is_known(self) -> bool {
        self.line > 0
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Anything that carries a source position.
pub trait Positioned {
    fn position(&self) -> Position;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_display() {
        assert_eq!(Position::new(3, 14).to_string(), "3:14");
    }

    #[test]
    fn test_position_known() {
        assert!(Position::new(1, 1).is_known());
        assert!(!Position::NONE.is_known());
        assert_eq!(Position::default(), Position::NONE);
    }
}
