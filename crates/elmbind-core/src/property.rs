#![forbid(unsafe_code)]

//! Capability objects handed to the UI toolkit.
//!
//! The toolkit never sees model types. It asks a [`PropertyProvider`] for a
//! property by name and receives a [`DynamicProperty`]: a bundle of optional
//! get / set / indexed-get / indexed-set functions plus the declared name,
//! declared type and read/write capability.
//!
//! # Invariants
//!
//! 1. `can_read()` is true iff a getter or an indexed getter is present.
//! 2. `can_write()` is true iff a setter or an indexed setter is present.
//! 3. A property is ephemeral. It is built per query and must not be cached
//!    by the caller; its functions read the owning node's state when invoked,
//!    not when the property was built.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::{BindError, Result};
use crate::value::{Value, ValueType};

type Getter = Arc<dyn Fn() -> Result<Value> + Send + Sync>;
type Setter = Arc<dyn Fn(Value) -> Result<()> + Send + Sync>;
type IndexGetter = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;
type IndexSetter = Arc<dyn Fn(&Value, Value) -> Result<()> + Send + Sync>;

/// A type-erased property capability.
#[derive(Clone)]
pub struct DynamicProperty {
    name: String,
    declared_type: ValueType,
    getter: Option<Getter>,
    setter: Option<Setter>,
    index_getter: Option<IndexGetter>,
    index_setter: Option<IndexSetter>,
}

impl DynamicProperty {
    /// A property with no capabilities at all.
    #[must_use]
    pub fn inert(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: ValueType::Unit,
            getter: None,
            setter: None,
            index_getter: None,
            index_setter: None,
        }
    }

    pub fn read_only(
        name: impl Into<String>,
        declared_type: ValueType,
        get: impl Fn() -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            declared_type,
            getter: Some(Arc::new(get)),
            ..Self::inert(name)
        }
    }

    pub fn read_write(
        name: impl Into<String>,
        declared_type: ValueType,
        get: impl Fn() -> Result<Value> + Send + Sync + 'static,
        set: impl Fn(Value) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            setter: Some(Arc::new(set)),
            ..Self::read_only(name, declared_type, get)
        }
    }

    #[must_use]
    pub fn with_index_getter(
        mut self,
        get: impl Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.index_getter = Some(Arc::new(get));
        self
    }

    #[must_use]
    pub fn with_index_setter(
        mut self,
        set: impl Fn(&Value, Value) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.index_setter = Some(Arc::new(set));
        self
    }

    /// Name of the property as referenced by a binding expression.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn declared_type(&self) -> ValueType {
        self.declared_type
    }

    #[must_use]
    pub fn can_read(&self) -> bool {
        self.getter.is_some() || self.index_getter.is_some()
    }

    #[must_use]
    pub fn can_write(&self) -> bool {
        self.setter.is_some() || self.index_setter.is_some()
    }

    /// Whether this property was resolved to nothing.
    #[must_use]
    pub fn is_inert(&self) -> bool {
        !self.can_read() && !self.can_write()
    }

    pub fn get(&self) -> Result<Value> {
        match &self.getter {
            Some(get) => get(),
            None => Err(BindError::NotReadable {
                name: self.name.clone(),
            }),
        }
    }

    pub fn set(&self, value: Value) -> Result<()> {
        match &self.setter {
            Some(set) => set(value),
            None => Err(BindError::NotWritable {
                name: self.name.clone(),
            }),
        }
    }

    pub fn get_indexed(&self, index: &Value) -> Result<Value> {
        match &self.index_getter {
            Some(get) => get(index),
            None => Err(BindError::NotIndexable {
                name: self.name.clone(),
            }),
        }
    }

    pub fn set_indexed(&self, index: &Value, value: Value) -> Result<()> {
        match &self.index_setter {
            Some(set) => set(index, value),
            None => Err(BindError::NotWritable {
                name: self.name.clone(),
            }),
        }
    }
}

impl fmt::Debug for DynamicProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicProperty")
            .field("name", &self.name)
            .field("declared_type", &self.declared_type)
            .field("can_read", &self.can_read())
            .field("can_write", &self.can_write())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

struct CommandInner {
    execute: Box<dyn Fn(Value) + Send + Sync>,
    can_execute: Box<dyn Fn(&Value) -> bool + Send + Sync>,
}

/// An invocable command exposed as a property value.
///
/// The UI is expected to consult [`can_execute`](Self::can_execute) before
/// calling [`execute`](Self::execute), as with any host command protocol.
#[derive(Clone)]
pub struct Command {
    inner: Arc<CommandInner>,
}

impl Command {
    pub fn new(
        execute: impl Fn(Value) + Send + Sync + 'static,
        can_execute: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(CommandInner {
                execute: Box::new(execute),
                can_execute: Box::new(can_execute),
            }),
        }
    }

    /// A command that can always execute.
    pub fn always(execute: impl Fn(Value) + Send + Sync + 'static) -> Self {
        Self::new(execute, |_| true)
    }

    pub fn execute(&self, param: Value) {
        (self.inner.execute)(param);
    }

    #[must_use]
    pub fn can_execute(&self, param: &Value) -> bool {
        (self.inner.can_execute)(param)
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// PropertyProvider
// ---------------------------------------------------------------------------

/// An object the UI toolkit can query for properties by name.
///
/// View-model nodes implement this; the toolkit holds them as [`NodeRef`]
/// data sources and compares them by identity.
pub trait PropertyProvider: Send + Sync {
    /// Resolve `name` to a property capability.
    fn get_property(&self, name: &str) -> Result<DynamicProperty>;

    /// Same as [`get_property`](Self::get_property); the indexed form of the
    /// host protocol resolves through the same table.
    fn get_indexed_property(&self, name: &str, _index_type: ValueType) -> Result<DynamicProperty> {
        self.get_property(name)
    }

    /// Dotted property-name chain from the root node (`main.Counter`).
    fn path(&self) -> &str;

    /// Names in the binding table, in declaration order.
    fn binding_names(&self) -> Vec<String>;

    /// Whether any validation error is currently recorded.
    fn has_errors(&self) -> bool;

    /// Human-readable rendering of the current model.
    fn string_representation(&self) -> String;

    /// Upcast for recovering the concrete node type.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Shared handle to a property provider.
pub type NodeRef = Arc<dyn PropertyProvider>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn inert_property_has_no_capabilities() {
        let p = DynamicProperty::inert("X");
        assert!(!p.can_read());
        assert!(!p.can_write());
        assert!(p.is_inert());
        assert_eq!(
            p.get(),
            Err(BindError::NotReadable { name: "X".into() })
        );
        assert_eq!(
            p.set(Value::Unit),
            Err(BindError::NotWritable { name: "X".into() })
        );
    }

    #[test]
    fn read_only_reports_capabilities() {
        let p = DynamicProperty::read_only("N", ValueType::Int, || Ok(Value::Int(4)));
        assert!(p.can_read());
        assert!(!p.can_write());
        assert_eq!(p.get(), Ok(Value::Int(4)));
        assert_eq!(p.declared_type(), ValueType::Int);
    }

    #[test]
    fn read_write_invokes_setter() {
        let written = Arc::new(Mutex::new(None));
        let w = Arc::clone(&written);
        let p = DynamicProperty::read_write(
            "N",
            ValueType::Any,
            || Ok(Value::Unit),
            move |v| {
                *w.lock().unwrap() = Some(v);
                Ok(())
            },
        );
        assert!(p.can_write());
        p.set(Value::Int(3)).unwrap();
        assert_eq!(*written.lock().unwrap(), Some(Value::Int(3)));
    }

    #[test]
    fn index_getter_alone_makes_property_readable() {
        let p = DynamicProperty::inert("Items")
            .with_index_getter(|i| Ok(Value::Int(i.as_int().unwrap_or(0) * 10)));
        assert!(p.can_read());
        assert!(p.get().is_err(), "plain get still needs a getter");
        assert_eq!(p.get_indexed(&Value::Int(2)), Ok(Value::Int(20)));
        assert_eq!(
            p.set_indexed(&Value::Int(0), Value::Unit),
            Err(BindError::NotWritable {
                name: "Items".into()
            })
        );
    }

    #[test]
    fn missing_indexer_is_reported() {
        let p = DynamicProperty::read_only("N", ValueType::Int, || Ok(Value::Int(1)));
        assert_eq!(
            p.get_indexed(&Value::Int(0)),
            Err(BindError::NotIndexable { name: "N".into() })
        );
    }

    #[test]
    fn command_executes_with_param() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let cmd = Command::new(
            move |p| s.lock().unwrap().push(p),
            |p| p.as_int().is_some_and(|i| i > 0),
        );
        assert!(cmd.can_execute(&Value::Int(1)));
        assert!(!cmd.can_execute(&Value::Int(0)));
        cmd.execute(Value::Int(5));
        assert_eq!(*seen.lock().unwrap(), vec![Value::Int(5)]);
        assert!(cmd.ptr_eq(&cmd.clone()));
    }
}
