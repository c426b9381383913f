#![forbid(unsafe_code)]

//! Message sinks.
//!
//! A [`Dispatch`] is the entry point by which a UI-originated event becomes a
//! message for the application's update function. It is cheap to clone and
//! safe to call from any thread; where the message is actually processed is
//! decided by whoever built it (see the runtime's dispatch synchronizer).

use std::fmt;
use std::sync::Arc;

/// A cloneable, thread-safe `Msg -> ()` function.
pub struct Dispatch<Msg> {
    f: Arc<dyn Fn(Msg) + Send + Sync>,
}

impl<Msg> Clone for Dispatch<Msg> {
    fn clone(&self) -> Self {
        Self {
            f: Arc::clone(&self.f),
        }
    }
}

impl<Msg> fmt::Debug for Dispatch<Msg> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch")
            .field("msg", &std::any::type_name::<Msg>())
            .finish()
    }
}

impl<Msg: 'static> Dispatch<Msg> {
    /// Wrap a function as a dispatch.
    pub fn new(f: impl Fn(Msg) + Send + Sync + 'static) -> Self {
        Self { f: Arc::new(f) }
    }

    /// A dispatch that drops every message. Used by design-time nodes.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// Send a message.
    pub fn call(&self, msg: Msg) {
        (self.f)(msg);
    }

    /// Derive a dispatch for a child message type.
    ///
    /// Messages sent to the returned dispatch are wrapped with `wrap` and
    /// forwarded here.
    pub fn map<Sub: 'static>(&self, wrap: impl Fn(Sub) -> Msg + Send + Sync + 'static) -> Dispatch<Sub> {
        let parent = self.clone();
        Dispatch::new(move |sub| parent.call(wrap(sub)))
    }

    /// Whether two handles share the same underlying function.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.f, &other.f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn call_forwards_message() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let dispatch = Dispatch::new(move |m: i32| s.lock().unwrap().push(m));
        dispatch.call(1);
        dispatch.clone().call(2);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn map_wraps_child_messages() {
        #[derive(Debug, PartialEq)]
        enum Parent {
            Child(u8),
        }
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let parent = Dispatch::new(move |m: Parent| s.lock().unwrap().push(m));
        let child = parent.map(Parent::Child);
        child.call(9);
        assert_eq!(*seen.lock().unwrap(), vec![Parent::Child(9)]);
    }

    #[test]
    fn clones_share_identity() {
        let d: Dispatch<()> = Dispatch::noop();
        assert!(d.ptr_eq(&d.clone()));
        assert!(!d.ptr_eq(&Dispatch::noop()));
    }
}
