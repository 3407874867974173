//! SSA type system.
//!
//! This module provides a type representation for SSA variables that captures
//! the information the optimizer needs without a class hierarchy or metadata
//! resolution: primitive kinds and named reference types.
//!
//! # Design Rationale
//!
//! The `SsaType` enum is designed to be:
//! - **Fast to compare**: Reference types compare by interned name
//! - **Self-contained**: No resolution context needed for basic operations
//! - **Analysis-friendly**: Includes `Unknown` for values whose type was not inferred
//!
//! Methods and fields are referenced symbolically by holder, name and signature,
//! which is exactly what the builder classifier matches on.

use std::{fmt, sync::Arc};

/// Reference to a named class type.
///
/// Names are stored in an [`Arc<str>`] so cloning a reference is cheap; the
/// same name always denotes the same class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeRef(Arc<str>);

impl TypeRef {
    /// Creates a new type reference from a class name.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    /// Returns the class name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Returns `true` if this reference names `class`.
    #[must_use]
    pub fn is(&self, class: &str) -> bool {
        &*self.0 == class
    }

    /// The immutable string class.
    #[must_use]
    pub fn string() -> Self {
        Self::new("String")
    }

    /// The root object class.
    #[must_use]
    pub fn object() -> Self {
        Self::new("Object")
    }

    /// The character sequence interface implemented by strings and builders.
    #[must_use]
    pub fn char_sequence() -> Self {
        Self::new("CharSequence")
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Type of an SSA variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum SsaType {
    /// No value (method return type only).
    Void,
    /// Boolean.
    Bool,
    /// 16-bit character.
    Char,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
    /// Reference to an instance of the named class.
    Object(TypeRef),
    /// The null literal's type.
    Null,
    /// Type not known.
    #[default]
    Unknown,
}

impl SsaType {
    /// Shorthand for `SsaType::Object(TypeRef::string())`.
    #[must_use]
    pub fn string() -> Self {
        Self::Object(TypeRef::string())
    }

    /// Shorthand for `SsaType::Object(TypeRef::object())`.
    #[must_use]
    pub fn object() -> Self {
        Self::Object(TypeRef::object())
    }

    /// Shorthand for `SsaType::Object(TypeRef::new(name))`.
    #[must_use]
    pub fn class(name: &str) -> Self {
        Self::Object(TypeRef::new(name))
    }

    /// Returns the class if this is a reference type.
    #[must_use]
    pub fn class_ref(&self) -> Option<&TypeRef> {
        match self {
            Self::Object(class) => Some(class),
            _ => None,
        }
    }

    /// Returns `true` if this is a reference to `class`.
    #[must_use]
    pub fn is_class(&self, class: &str) -> bool {
        self.class_ref().is_some_and(|c| c.is(class))
    }

    /// Returns `true` for the string class.
    #[must_use]
    pub fn is_string(&self) -> bool {
        self.is_class("String")
    }

    /// Returns `true` for reference and null types.
    #[must_use]
    pub const fn is_reference(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Null)
    }

    /// Returns `true` for primitive value types.
    #[must_use]
    pub const fn is_primitive(&self) -> bool {
        matches!(self, Self::Bool | Self::Char | Self::I32 | Self::I64)
    }
}

impl fmt::Display for SsaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => f.write_str("void"),
            Self::Bool => f.write_str("bool"),
            Self::Char => f.write_str("char"),
            Self::I32 => f.write_str("i32"),
            Self::I64 => f.write_str("i64"),
            Self::Object(class) => write!(f, "{class}"),
            Self::Null => f.write_str("null"),
            Self::Unknown => f.write_str("?"),
        }
    }
}

/// Symbolic reference to a method.
///
/// Instance methods take their receiver as the first call argument; `params`
/// lists only the declared parameters. Constructors are instance methods named
/// [`MethodRef::CONSTRUCTOR`] returning [`SsaType::Void`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// Declaring class.
    pub holder: TypeRef,
    /// Simple method name.
    pub name: Arc<str>,
    /// Declared parameter types (receiver excluded).
    pub params: Vec<SsaType>,
    /// Return type.
    pub returns: SsaType,
    /// Whether the method is static.
    pub is_static: bool,
}

impl MethodRef {
    /// Name used for instance initializers.
    pub const CONSTRUCTOR: &'static str = "<init>";

    /// Creates an instance method reference.
    #[must_use]
    pub fn instance(holder: TypeRef, name: &str, params: Vec<SsaType>, returns: SsaType) -> Self {
        Self {
            holder,
            name: Arc::from(name),
            params,
            returns,
            is_static: false,
        }
    }

    /// Creates a static method reference.
    #[must_use]
    pub fn static_method(
        holder: TypeRef,
        name: &str,
        params: Vec<SsaType>,
        returns: SsaType,
    ) -> Self {
        Self {
            holder,
            name: Arc::from(name),
            params,
            returns,
            is_static: true,
        }
    }

    /// Creates a constructor reference.
    #[must_use]
    pub fn constructor(holder: TypeRef, params: Vec<SsaType>) -> Self {
        Self::instance(holder, Self::CONSTRUCTOR, params, SsaType::Void)
    }

    /// Returns `true` for instance initializers.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        !self.is_static && &*self.name == Self::CONSTRUCTOR
    }

    /// Returns `true` if this method is `holder::name`.
    #[must_use]
    pub fn is(&self, holder: &str, name: &str) -> bool {
        self.holder.is(holder) && &*self.name == name
    }

    /// Number of call arguments including the receiver.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.params.len() + usize::from(!self.is_static)
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}(", self.holder, self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ")")
    }
}

/// Symbolic reference to a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// Declaring class.
    pub holder: TypeRef,
    /// Field name.
    pub name: Arc<str>,
    /// Field type.
    pub field_type: SsaType,
}

impl FieldRef {
    /// Creates a new field reference.
    #[must_use]
    pub fn new(holder: TypeRef, name: &str, field_type: SsaType) -> Self {
        Self {
            holder,
            name: Arc::from(name),
            field_type,
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.holder, self.name)
    }
}
