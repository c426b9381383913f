#![forbid(unsafe_code)]

//! Wiring between an application loop and a UI element.
//!
//! The loop knows nothing about UI element identity. [`LoopBootstrap`] owns
//! a single root slot: the first state change builds the root node and
//! attaches it as the element's data source, every later one updates that
//! node in place. Whether the slot is filled is the "already attached" flag.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use elmbind_core::{BindConfig, Dispatch, NodeRef};

use crate::node::ViewModelNode;
use crate::program::Program;
use crate::sync::DispatchSynchronizer;
use crate::ui::UiDispatcher;

/// A UI element that accepts a data source.
pub trait DataContextHost: Send + Sync {
    fn set_data_context(&self, node: NodeRef);
}

pub struct LoopBootstrap<M, Msg, E> {
    config: BindConfig,
    element: Arc<E>,
    root: Arc<OnceLock<ViewModelNode<M, Msg>>>,
}

impl<M, Msg, E> LoopBootstrap<M, Msg, E>
where
    M: fmt::Debug + Send + Sync + 'static,
    Msg: Send + 'static,
    E: DataContextHost + 'static,
{
    pub fn new(config: BindConfig, element: Arc<E>) -> Self {
        Self {
            config,
            element,
            root: Arc::new(OnceLock::new()),
        }
    }

    /// Install the bootstrap hooks on `program` and hand it to `runner`.
    ///
    /// Every message is marshaled onto `ui` before it reaches the loop, so
    /// updates after the first run on the UI thread. The first state change
    /// happens inside `runner`; call this from the UI thread.
    pub fn start<R>(
        &self,
        ui: &UiDispatcher,
        program: Program<M, Msg>,
        runner: impl FnOnce(Program<M, Msg>) -> R,
    ) -> R {
        let view = program.view_fn();
        let config = self.config.clone();
        let element = Arc::clone(&self.element);
        let root = Arc::clone(&self.root);
        let synchronizer = DispatchSynchronizer::new(ui.clone());
        let reported = AtomicBool::new(false);

        let program = program
            .with_set_state(move |model: Arc<M>, dispatch: &Dispatch<Msg>| {
                if let Some(node) = root.get() {
                    node.update(model);
                    return;
                }
                let bindings = view(model.as_ref());
                match ViewModelNode::new(model, dispatch.clone(), bindings, &config) {
                    Ok(node) => {
                        element.set_data_context(node.node_ref());
                        tracing::debug!(path = node.path(), "bootstrap.attach");
                        if root.set(node).is_err() {
                            tracing::warn!("root node attached twice");
                        }
                    }
                    Err(err) if !reported.swap(true, Ordering::Relaxed) => {
                        tracing::error!(error = %err, "bootstrap: invalid binding table");
                    }
                    Err(err) => tracing::trace!(error = %err, "bootstrap: still detached"),
                }
            })
            .with_sync_dispatch(move |inner| synchronizer.wrap(inner));
        runner(program)
    }

    /// The attached root node, once the first state change has happened.
    #[must_use]
    pub fn root(&self) -> Option<ViewModelNode<M, Msg>> {
        self.root.get().cloned()
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.root.get().is_some()
    }
}

impl<M, Msg, E> fmt::Debug for LoopBootstrap<M, Msg, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopBootstrap")
            .field("config", &self.config)
            .field("attached", &self.root.get().is_some())
            .finish_non_exhaustive()
    }
}
