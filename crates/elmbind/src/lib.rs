#![forbid(unsafe_code)]

//! elmbind public facade crate.
//!
//! Re-exports the value model from `elmbind-core` and the node, resolver,
//! dispatch and loop machinery from `elmbind-runtime`.

#[cfg(feature = "logging")]
pub mod logging;

pub use elmbind_core as core;
pub use elmbind_runtime as runtime;

pub mod prelude {
    pub use elmbind_core::{
        BindConfig, BindError, BindingKind, Command, Dispatch, DynamicProperty, FromValue,
        IncrementalCollection, LoadCompletion, LoadError, NodeRef, PropertyProvider, Value,
        ValueType,
    };
    pub use elmbind_runtime::{
        BindingSpec, Cmd, DataContextHost, DispatchSynchronizer, FrameNavigator, LoopBootstrap,
        LoopHandle, NavigableFrame, NavigationError, NavigationParams, NavigationService, Program,
        UiDispatcher, UiPump, UiThread, ViewModelNode, run,
    };
}
