#![forbid(unsafe_code)]

//! The closed set of binding kinds.
//!
//! A binding's kind fixes the shape of the dynamic property the resolver
//! builds for it. The kind of a binding never changes after its node is
//! constructed; only the value it yields does.

use std::fmt;

/// Shape of a named binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    /// Read-only scalar, recomputed on every read.
    OneWay,
    /// Read-only scalar, recomputed only when its dependency changed.
    OneWayLazy,
    /// Read-only sequence, optionally paged.
    OneWaySeq,
    /// Read/write scalar; writes become messages.
    TwoWay,
    /// Read/write scalar with validation errors.
    TwoWayValidate,
    /// Write-only scalar. Declared by view functions but not materialized by
    /// the resolver, which hands out an inert property for it.
    OneWayToSource,
    /// Parameterless command.
    Command,
    /// Command that threads a caller-supplied parameter into its message.
    CommandWithParameter,
    /// Nested child node.
    SubModel,
    /// Keyed collection of child nodes.
    SubModelSeq,
    /// Selection within a `SubModelSeq`, mapped to a model key.
    SubModelSelectedItem,
}

impl BindingKind {
    /// Every kind, in declaration order.
    pub const ALL: [BindingKind; 11] = [
        Self::OneWay,
        Self::OneWayLazy,
        Self::OneWaySeq,
        Self::TwoWay,
        Self::TwoWayValidate,
        Self::OneWayToSource,
        Self::Command,
        Self::CommandWithParameter,
        Self::SubModel,
        Self::SubModelSeq,
        Self::SubModelSelectedItem,
    ];

    /// Kinds whose node keeps per-binding child state across updates.
    #[must_use]
    pub const fn owns_children(self) -> bool {
        matches!(
            self,
            Self::SubModel | Self::SubModelSeq | Self::SubModelSelectedItem
        )
    }

    /// Kinds that produce an invocable command object.
    #[must_use]
    pub const fn is_command(self) -> bool {
        matches!(self, Self::Command | Self::CommandWithParameter)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneWay => "one_way",
            Self::OneWayLazy => "one_way_lazy",
            Self::OneWaySeq => "one_way_seq",
            Self::TwoWay => "two_way",
            Self::TwoWayValidate => "two_way_validate",
            Self::OneWayToSource => "one_way_to_source",
            Self::Command => "cmd",
            Self::CommandWithParameter => "cmd_param",
            Self::SubModel => "sub_model",
            Self::SubModelSeq => "sub_model_seq",
            Self::SubModelSelectedItem => "sub_model_selected_item",
        }
    }
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
