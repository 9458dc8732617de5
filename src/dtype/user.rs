//! User-defined element types

use std::fmt;

/// An opaque, fixed-size element type supplied by the caller.
///
/// The optional `definition` is C source declaring the type under `name`
/// (for example `typedef struct { double re, im; } cplx;`). Types without a
/// definition can still be used everywhere, but only through the generic
/// kernels.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct UserType {
    name: String,
    size: usize,
    definition: Option<String>,
}

impl UserType {
    /// Create a user type of `size` bytes
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
            definition: None,
        }
    }

    /// Attach a C definition so kernels on this type can be specialized
    pub fn with_definition(mut self, definition: impl Into<String>) -> Self {
        self.definition = Some(definition.into());
        self
    }

    /// Type name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size of one element in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// C definition, if any
    pub fn definition(&self) -> Option<&str> {
        self.definition.as_deref()
    }
}

impl fmt::Debug for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserType")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("defined", &self.definition.is_some())
            .finish()
    }
}
