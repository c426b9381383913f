#![forbid(unsafe_code)]

//! Binding adapter runtime.
//!
//! Bridges a model-update-view loop to a UI toolkit that discovers bindable
//! properties by name:
//!
//! - [`BindingSpec`]: one named binding and its kind, built by the view.
//! - [`ViewModelNode`]: the identity-stable data source handed to the UI.
//!   Its model is replaced on every loop tick; the node is not.
//! - [`resolver`]: turns a property name into a [`DynamicProperty`].
//! - [`UiDispatcher`], [`UiPump`], [`UiThread`]: the UI-affine job queue.
//! - [`DispatchSynchronizer`]: posts every dispatched message to that queue.
//! - [`Program`] / [`run`]: a reference application loop.
//! - [`LoopBootstrap`]: attaches the root node on the first state change and
//!   updates it in place afterwards.
//! - [`navigation`]: the page navigation collaborator.
//!
//! [`DynamicProperty`]: elmbind_core::DynamicProperty

pub mod binding;
pub mod bootstrap;
pub mod navigation;
pub mod node;
pub mod program;
pub mod resolver;
pub mod sync;
pub mod ui;

pub use binding::BindingSpec;
pub use bootstrap::{DataContextHost, LoopBootstrap};
pub use navigation::{
    FrameNavigator, NavigableFrame, NavigationError, NavigationFailure, NavigationParams,
    NavigationService,
};
pub use node::{ROOT_PATH, ViewModelNode};
pub use program::{Cmd, LoopHandle, Program, run};
pub use sync::DispatchSynchronizer;
pub use ui::{UiDispatcher, UiPump, UiThread};

use std::sync::{Mutex, MutexGuard, PoisonError};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
