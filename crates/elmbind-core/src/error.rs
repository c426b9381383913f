#![forbid(unsafe_code)]

use thiserror::Error;

use crate::value::{ValueType, ValueTypeError};

pub type Result<T> = std::result::Result<T, BindError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    /// The UI asked for a name the view never declared. This is a mismatch
    /// between the binding table and the markup that references it.
    #[error("binding not found: {path}.{name}")]
    BindingNotFound { path: String, name: String },

    #[error("duplicate binding {name} in {path}")]
    DuplicateBinding { path: String, name: String },

    #[error("binding {name} in {path} shadows a reserved property")]
    ReservedName { path: String, name: String },

    #[error("property {name} is not readable")]
    NotReadable { name: String },

    #[error("property {name} is not writable")]
    NotWritable { name: String },

    #[error("property {name} expects {expected}, got {found}")]
    TypeMismatch {
        name: String,
        expected: ValueType,
        found: ValueType,
    },

    #[error("property {name} has no indexer")]
    NotIndexable { name: String },

    #[error("index {index} out of range for {name} (len {len})")]
    IndexOutOfRange { name: String, index: i64, len: usize },

    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl BindError {
    #[must_use]
    pub fn type_mismatch(name: impl Into<String>, err: ValueTypeError) -> Self {
        Self::TypeMismatch {
            name: name.into(),
            expected: err.expected,
            found: err.found,
        }
    }

    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Whether this error signals a view/markup mismatch rather than a bad
    /// runtime value.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::BindingNotFound { .. }
                | Self::DuplicateBinding { .. }
                | Self::ReservedName { .. }
                | Self::InvalidConfig { .. }
        )
    }
}

/// Why a paged collection refused to load more items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("the model reports no more items")]
    NoMoreItems,

    #[error("a load is already in flight")]
    AlreadyLoading,
}
