//! Constant values in SSA form.

use std::fmt;

use super::SsaType;

/// Constant values that can appear in SSA form.
///
/// These are the literal operands a `Const` operation can materialize. String
/// constants carry their text directly so folded builder content can be written
/// back into the IR without a string heap.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConstValue {
    /// Null reference.
    Null,

    /// Boolean.
    Bool(bool),

    /// 16-bit character.
    Char(char),

    /// 32-bit signed integer.
    I32(i32),

    /// 64-bit signed integer.
    I64(i64),

    /// String literal.
    String(String),
}

impl ConstValue {
    /// Returns the string text if this is a string literal.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer value for `I32`/`I64` constants.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I32(v) => Some(*v as i64),
            Self::I64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns `true` for the null literal.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the SSA type of this constant.
    #[must_use]
    pub fn ssa_type(&self) -> SsaType {
        match self {
            Self::Null => SsaType::Null,
            Self::Bool(_) => SsaType::Bool,
            Self::Char(_) => SsaType::Char,
            Self::I32(_) => SsaType::I32,
            Self::I64(_) => SsaType::I64,
            Self::String(_) => SsaType::string(),
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Char(c) => write!(f, "{c:?}"),
            Self::I32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}L"),
            Self::String(s) => write!(f, "{s:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_const_accessors() {
        assert_eq!(ConstValue::String("ab".into()).as_str(), Some("ab"));
        assert_eq!(ConstValue::I32(-3).as_i64(), Some(-3));
        assert!(ConstValue::Null.is_null());
        assert!(ConstValue::String(String::new()).ssa_type().is_string());
    }

    #[test]
    fn test_const_display() {
        assert_eq!(ConstValue::String("x\"y".into()).to_string(), "\"x\\\"y\"");
        assert_eq!(ConstValue::I64(5).to_string(), "5L");
        assert_eq!(ConstValue::Char('a').to_string(), "'a'");
    }
}
