#![forbid(unsafe_code)]

//! Core data types for elmbind.
//!
//! This crate holds the pieces of the binding adapter that do not depend on a
//! live view-model node:
//!
//! - [`Value`] / [`ValueType`]: the dynamically typed values the UI toolkit
//!   reads and writes.
//! - [`BindingKind`]: the closed set of binding shapes.
//! - [`Dispatch`]: a cloneable, thread-safe message sink.
//! - [`DynamicProperty`] / [`Command`]: the capability objects handed to the
//!   UI toolkit when it asks for a property by name.
//! - [`IncrementalCollection`]: an append-only sequence that pages in more
//!   items on demand.
//! - [`BindConfig`]: adapter configuration.
//! - [`BindError`]: the error type shared by all of the above.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod incremental;
pub mod kind;
pub mod property;
pub mod value;

pub use config::BindConfig;
pub use dispatch::Dispatch;
pub use error::{BindError, LoadError, Result};
pub use incremental::{IncrementalCollection, LoadCompletion, LoadMore};
pub use kind::BindingKind;
pub use property::{Command, DynamicProperty, NodeRef, PropertyProvider};
pub use value::{FromValue, ModelRef, Value, ValueType, ValueTypeError};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Property name that exposes the raw current model of a node.
pub const CURRENT_MODEL: &str = "CurrentModel";

/// Property name that exposes the aggregate "has validation errors" flag.
pub const HAS_ERRORS: &str = "HasErrors";

/// Returns true for names that bypass a node's binding table.
#[must_use]
pub fn is_reserved_name(name: &str) -> bool {
    name == CURRENT_MODEL || name == HAS_ERRORS
}

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
