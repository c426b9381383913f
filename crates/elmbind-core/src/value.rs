#![forbid(unsafe_code)]

//! Dynamically typed values exchanged with the UI toolkit.
//!
//! The UI toolkit discovers properties by name and has no static knowledge of
//! the model types behind them, so every read and write crosses the adapter as
//! a [`Value`]. Scalars convert to and from Rust primitives; composite values
//! carry shared handles (child nodes, commands, paged collections).
//!
//! # Equality
//!
//! Scalars and lists compare by value. Handles (`Node`, `Nodes`, `Command`,
//! `Collection`, `Model`) compare by identity, which is what the UI toolkit
//! uses to decide whether a data source changed.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::incremental::IncrementalCollection;
use crate::property::{Command, NodeRef};

/// Type-erased handle to a model snapshot.
pub type ModelRef = Arc<dyn Any + Send + Sync>;

/// A value read from or written to a dynamic property.
#[derive(Clone, Default)]
pub enum Value {
    /// No value (an absent sub-model, an empty selection).
    #[default]
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// A materialized, read-only sequence.
    List(Vec<Value>),
    /// A paged sequence that loads more items on demand.
    Collection(IncrementalCollection),
    /// An invocable command.
    Command(Command),
    /// A child view-model node.
    Node(NodeRef),
    /// A collection of child view-model nodes.
    Nodes(Vec<NodeRef>),
    /// The raw model snapshot of a node.
    Model(ModelRef),
}

/// The declared or observed type of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Any value; used for scalar bindings whose type is only known at runtime.
    Any,
    Unit,
    Bool,
    Int,
    Float,
    Str,
    List,
    Collection,
    Command,
    Node,
    Nodes,
    Model,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Any => "any",
            Self::Unit => "unit",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "string",
            Self::List => "list",
            Self::Collection => "collection",
            Self::Command => "command",
            Self::Node => "node",
            Self::Nodes => "nodes",
            Self::Model => "model",
        };
        f.write_str(name)
    }
}

/// A value could not be converted to the requested Rust type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("expected {expected}, found {found}")]
pub struct ValueTypeError {
    pub expected: ValueType,
    pub found: ValueType,
}

impl ValueTypeError {
    #[must_use]
    pub fn new(expected: ValueType, found: &Value) -> Self {
        Self {
            expected,
            found: found.value_type(),
        }
    }
}

impl Value {
    /// The runtime type of this value.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Unit => ValueType::Unit,
            Self::Bool(_) => ValueType::Bool,
            Self::Int(_) => ValueType::Int,
            Self::Float(_) => ValueType::Float,
            Self::Str(_) => ValueType::Str,
            Self::List(_) => ValueType::List,
            Self::Collection(_) => ValueType::Collection,
            Self::Command(_) => ValueType::Command,
            Self::Node(_) => ValueType::Node,
            Self::Nodes(_) => ValueType::Nodes,
            Self::Model(_) => ValueType::Model,
        }
    }

    #[must_use]
    pub fn is_unit(&self) -> bool {
        matches!(self, Self::Unit)
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Floats, widening integers.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(x) => Some(*x),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_node(&self) -> Option<&NodeRef> {
        match self {
            Self::Node(node) => Some(node),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_nodes(&self) -> Option<&[NodeRef]> {
        match self {
            Self::Nodes(nodes) => Some(nodes),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_command(&self) -> Option<&Command> {
        match self {
            Self::Command(cmd) => Some(cmd),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_collection(&self) -> Option<&IncrementalCollection> {
        match self {
            Self::Collection(c) => Some(c),
            _ => None,
        }
    }

    /// Downcast a `Model` value to the concrete model type.
    #[must_use]
    pub fn downcast_model<M: Any + Send + Sync>(&self) -> Option<Arc<M>> {
        match self {
            Self::Model(model) => Arc::clone(model).downcast::<M>().ok(),
            _ => None,
        }
    }
}

fn same_node(a: &NodeRef, b: &NodeRef) -> bool {
    Arc::ptr_eq(a, b)
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Unit, Self::Unit) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Collection(a), Self::Collection(b)) => a.ptr_eq(b),
            (Self::Command(a), Self::Command(b)) => a.ptr_eq(b),
            (Self::Node(a), Self::Node(b)) => same_node(a, b),
            (Self::Nodes(a), Self::Nodes(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| same_node(x, y))
            }
            (Self::Model(a), Self::Model(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unit => f.write_str("Unit"),
            Self::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Self::Int(i) => f.debug_tuple("Int").field(i).finish(),
            Self::Float(x) => f.debug_tuple("Float").field(x).finish(),
            Self::Str(s) => f.debug_tuple("Str").field(s).finish(),
            Self::List(items) => f.debug_tuple("List").field(items).finish(),
            Self::Collection(c) => f.debug_tuple("Collection").field(c).finish(),
            Self::Command(c) => f.debug_tuple("Command").field(c).finish(),
            Self::Node(node) => f.debug_tuple("Node").field(&node.path()).finish(),
            Self::Nodes(nodes) => f
                .debug_tuple("Nodes")
                .field(&nodes.iter().map(|n| n.path().to_owned()).collect::<Vec<_>>())
                .finish(),
            Self::Model(_) => f.write_str("Model(..)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Conversions into Value
// ---------------------------------------------------------------------------

impl From<()> for Value {
    fn from((): ()) -> Self {
        Self::Unit
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

macro_rules! int_into_value {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(i: $t) -> Self {
                Self::Int(i64::from(i))
            }
        })*
    };
}

int_into_value!(i8, i16, i32, i64, u8, u16, u32);

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Self::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<u64> for Value {
    fn from(i: u64) -> Self {
        Self::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<f32> for Value {
    fn from(x: f32) -> Self {
        Self::Float(f64::from(x))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Unit, Into::into)
    }
}

impl From<Command> for Value {
    fn from(cmd: Command) -> Self {
        Self::Command(cmd)
    }
}

impl From<IncrementalCollection> for Value {
    fn from(c: IncrementalCollection) -> Self {
        Self::Collection(c)
    }
}

impl From<NodeRef> for Value {
    fn from(node: NodeRef) -> Self {
        Self::Node(node)
    }
}

// ---------------------------------------------------------------------------
// Conversions out of Value
// ---------------------------------------------------------------------------

/// Conversion from a [`Value`] written by the UI toolkit.
///
/// Write paths (two-way setters, command parameters) use this to recover the
/// typed value a setter expects. A failed conversion aborts the write.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, ValueTypeError>;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, ValueTypeError> {
        Ok(value)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, ValueTypeError> {
        value
            .as_bool()
            .ok_or_else(|| ValueTypeError::new(ValueType::Bool, &value))
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self, ValueTypeError> {
        value
            .as_int()
            .ok_or_else(|| ValueTypeError::new(ValueType::Int, &value))
    }
}

macro_rules! int_from_value {
    ($($t:ty),*) => {
        $(impl FromValue for $t {
            fn from_value(value: Value) -> Result<Self, ValueTypeError> {
                value
                    .as_int()
                    .and_then(|i| <$t>::try_from(i).ok())
                    .ok_or_else(|| ValueTypeError::new(ValueType::Int, &value))
            }
        })*
    };
}

int_from_value!(i8, i16, i32, u8, u16, u32, u64, usize);

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, ValueTypeError> {
        value
            .as_float()
            .ok_or_else(|| ValueTypeError::new(ValueType::Float, &value))
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, ValueTypeError> {
        match value {
            Value::Str(s) => Ok(s),
            other => Err(ValueTypeError::new(ValueType::Str, &other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, ValueTypeError> {
        match value {
            Value::Unit => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}
