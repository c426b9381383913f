#![forbid(unsafe_code)]

//! Binding specifications.
//!
//! A view function returns a `Vec<BindingSpec<M, Msg>>` describing every
//! property a node exposes. Each spec pairs a unique name with the closures
//! its [`BindingKind`] needs: a getter over the model, a setter turning a
//! written value into a message, a validator, or a nested binding table for
//! sub-models.
//!
//! Specs are built through the constructors on [`BindingSpec`] (one per
//! kind) and are immutable once a node owns them.
//!
//! # Sub-model state
//!
//! `SubModel` and `SubModelSeq` bindings own per-node child state (the child
//! nodes themselves). That state lives in a type-erased slot on the owning
//! node; only the binding that created a slot knows its concrete type, so
//! every slot operation goes through the [`ChildBinding`] trait.
//!
//! # Invariants
//!
//! 1. A sequence slot holds at most one child per key. Duplicate keys in a
//!    model sequence keep the first occurrence.
//! 2. Syncing a slot updates surviving children in place, creates children
//!    for new keys and drops children for vanished keys. Slot order follows
//!    the latest model order.

use std::any::Any;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use ahash::AHashMap;
use elmbind_core::{
    BindConfig, BindingKind, Dispatch, FromValue, LoadCompletion, NodeRef, Value, ValueType,
    ValueTypeError,
};

use crate::lock;
use crate::node::ViewModelNode;

pub(crate) type Getter<M> = Arc<dyn Fn(&M) -> Value + Send + Sync>;
pub(crate) type SeqGetter<M> = Arc<dyn Fn(&M) -> Vec<Value> + Send + Sync>;
pub(crate) type Setter<M, Msg> =
    Arc<dyn Fn(Value, &M) -> Result<Msg, ValueTypeError> + Send + Sync>;
pub(crate) type Validator<M> = Arc<dyn Fn(&M) -> Vec<String> + Send + Sync>;
pub(crate) type CanExecute<M> = Arc<dyn Fn(&Value, &M) -> bool + Send + Sync>;

/// Type-erased per-binding child state owned by a node.
pub(crate) type ChildSlot = Box<dyn Any + Send + Sync>;

pub(crate) struct Paging<M, Msg> {
    pub(crate) has_more: Arc<dyn Fn(&M) -> bool + Send + Sync>,
    pub(crate) load_more: Arc<dyn Fn(u32, LoadCompletion, &M) -> Msg + Send + Sync>,
}

pub(crate) enum BindingData<M, Msg> {
    OneWay {
        get: Getter<M>,
    },
    OneWayLazy {
        get: Getter<M>,
    },
    OneWaySeq {
        get: SeqGetter<M>,
        paging: Option<Paging<M, Msg>>,
    },
    TwoWay {
        get: Getter<M>,
        set: Setter<M, Msg>,
    },
    TwoWayValidate {
        get: Getter<M>,
        set: Setter<M, Msg>,
        validate: Validator<M>,
    },
    OneWayToSource {
        // Kept so the table stays complete; the resolver hands out an inert
        // property for this kind.
        #[allow(dead_code)]
        set: Setter<M, Msg>,
    },
    Command {
        exec: Setter<M, Msg>,
        can_execute: CanExecute<M>,
    },
    CommandWithParameter {
        exec: Setter<M, Msg>,
        can_execute: CanExecute<M>,
    },
    SubModel(Arc<dyn ChildBinding<M, Msg>>),
    SubModelSeq(Arc<dyn ChildBinding<M, Msg>>),
    SubModelSelectedItem(Arc<dyn SelectionBinding<M, Msg>>),
}

/// One named binding.
pub struct BindingSpec<M, Msg> {
    name: String,
    pub(crate) data: BindingData<M, Msg>,
}

impl<M, Msg> BindingSpec<M, Msg> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> BindingKind {
        match &self.data {
            BindingData::OneWay { .. } => BindingKind::OneWay,
            BindingData::OneWayLazy { .. } => BindingKind::OneWayLazy,
            BindingData::OneWaySeq { .. } => BindingKind::OneWaySeq,
            BindingData::TwoWay { .. } => BindingKind::TwoWay,
            BindingData::TwoWayValidate { .. } => BindingKind::TwoWayValidate,
            BindingData::OneWayToSource { .. } => BindingKind::OneWayToSource,
            BindingData::Command { .. } => BindingKind::Command,
            BindingData::CommandWithParameter { .. } => BindingKind::CommandWithParameter,
            BindingData::SubModel(_) => BindingKind::SubModel,
            BindingData::SubModelSeq(_) => BindingKind::SubModelSeq,
            BindingData::SubModelSelectedItem(_) => BindingKind::SubModelSelectedItem,
        }
    }

    /// Whether this spec is a paged `OneWaySeq`.
    pub(crate) fn is_paged(&self) -> bool {
        matches!(
            &self.data,
            BindingData::OneWaySeq {
                paging: Some(_),
                ..
            }
        )
    }

    fn with(name: impl Into<String>, data: BindingData<M, Msg>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

impl<M, Msg> fmt::Debug for BindingSpec<M, Msg> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingSpec")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

impl<M, Msg> BindingSpec<M, Msg>
where
    M: Send + Sync + 'static,
    Msg: Send + 'static,
{
    /// Read-only value recomputed on every read.
    pub fn one_way<V: Into<Value>>(
        name: impl Into<String>,
        get: impl Fn(&M) -> V + Send + Sync + 'static,
    ) -> Self {
        Self::with(
            name,
            BindingData::OneWay {
                get: Arc::new(move |m: &M| get(m).into()),
            },
        )
    }

    /// Read-only value that is remapped only when its dependency changes.
    ///
    /// `get` extracts the dependency, `equals` compares it with the previous
    /// one and `map` turns it into the exposed value.
    pub fn one_way_lazy<D, V>(
        name: impl Into<String>,
        get: impl Fn(&M) -> D + Send + Sync + 'static,
        equals: impl Fn(&D, &D) -> bool + Send + Sync + 'static,
        map: impl Fn(&D) -> V + Send + Sync + 'static,
    ) -> Self
    where
        D: Send + 'static,
        V: Into<Value>,
    {
        let cache: Mutex<Option<(D, Value)>> = Mutex::new(None);
        Self::with(
            name,
            BindingData::OneWayLazy {
                get: Arc::new(move |m: &M| {
                    let dep = get(m);
                    let mut cache = lock(&cache);
                    if let Some((prev, value)) = cache.as_ref()
                        && equals(prev, &dep)
                    {
                        return value.clone();
                    }
                    let value = map(&dep).into();
                    *cache = Some((dep, value.clone()));
                    value
                }),
            },
        )
    }

    /// Read-only sequence, materialized on every read.
    pub fn one_way_seq<T: Into<Value>>(
        name: impl Into<String>,
        get: impl Fn(&M) -> Vec<T> + Send + Sync + 'static,
    ) -> Self {
        Self::with(
            name,
            BindingData::OneWaySeq {
                get: Arc::new(move |m: &M| get(m).into_iter().map(Into::into).collect()),
                paging: None,
            },
        )
    }

    /// Read-only sequence exposed as an incremental collection.
    ///
    /// When the UI asks for more items and `has_more` holds for the latest
    /// model, `load_more` builds the message that fetches the next page. The
    /// collection follows every model update on its own; the update handling
    /// that message, or a command it returns, calls
    /// [`LoadCompletion::complete`] to end the load.
    pub fn one_way_seq_paged<T: Into<Value>>(
        name: impl Into<String>,
        get: impl Fn(&M) -> Vec<T> + Send + Sync + 'static,
        has_more: impl Fn(&M) -> bool + Send + Sync + 'static,
        load_more: impl Fn(u32, LoadCompletion, &M) -> Msg + Send + Sync + 'static,
    ) -> Self {
        Self::with(
            name,
            BindingData::OneWaySeq {
                get: Arc::new(move |m: &M| get(m).into_iter().map(Into::into).collect()),
                paging: Some(Paging {
                    has_more: Arc::new(has_more),
                    load_more: Arc::new(load_more),
                }),
            },
        )
    }

    pub fn two_way<G, V>(
        name: impl Into<String>,
        get: impl Fn(&M) -> G + Send + Sync + 'static,
        set: impl Fn(V, &M) -> Msg + Send + Sync + 'static,
    ) -> Self
    where
        G: Into<Value>,
        V: FromValue,
    {
        Self::with(
            name,
            BindingData::TwoWay {
                get: Arc::new(move |m: &M| get(m).into()),
                set: typed_setter(set),
            },
        )
    }

    /// Two-way binding whose validation errors are recomputed from the
    /// model after every write attempt and every update.
    pub fn two_way_validate<G, V>(
        name: impl Into<String>,
        get: impl Fn(&M) -> G + Send + Sync + 'static,
        set: impl Fn(V, &M) -> Msg + Send + Sync + 'static,
        validate: impl Fn(&M) -> Vec<String> + Send + Sync + 'static,
    ) -> Self
    where
        G: Into<Value>,
        V: FromValue,
    {
        Self::with(
            name,
            BindingData::TwoWayValidate {
                get: Arc::new(move |m: &M| get(m).into()),
                set: typed_setter(set),
                validate: Arc::new(validate),
            },
        )
    }

    pub fn one_way_to_source<V: FromValue>(
        name: impl Into<String>,
        set: impl Fn(V, &M) -> Msg + Send + Sync + 'static,
    ) -> Self {
        Self::with(
            name,
            BindingData::OneWayToSource {
                set: typed_setter(set),
            },
        )
    }

    pub fn cmd(name: impl Into<String>, exec: impl Fn(&M) -> Msg + Send + Sync + 'static) -> Self {
        Self::cmd_if(name, exec, |_| true)
    }

    pub fn cmd_if(
        name: impl Into<String>,
        exec: impl Fn(&M) -> Msg + Send + Sync + 'static,
        can_execute: impl Fn(&M) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::with(
            name,
            BindingData::Command {
                exec: Arc::new(move |_: Value, m: &M| Ok::<_, ValueTypeError>(exec(m))),
                can_execute: Arc::new(move |_: &Value, m: &M| can_execute(m)),
            },
        )
    }

    pub fn cmd_param<P: FromValue>(
        name: impl Into<String>,
        exec: impl Fn(P, &M) -> Msg + Send + Sync + 'static,
    ) -> Self {
        Self::cmd_param_if(name, exec, |_: P, _| true)
    }

    /// Parameterized command. A parameter that does not convert to `P`
    /// disables the command.
    pub fn cmd_param_if<P: FromValue>(
        name: impl Into<String>,
        exec: impl Fn(P, &M) -> Msg + Send + Sync + 'static,
        can_execute: impl Fn(P, &M) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::with(
            name,
            BindingData::CommandWithParameter {
                exec: typed_setter(exec),
                can_execute: Arc::new(move |param: &Value, m: &M| {
                    P::from_value(param.clone()).is_ok_and(|p| can_execute(p, m))
                }),
            },
        )
    }

    /// Nested node that is always present.
    pub fn sub_model<SM, SMsg>(
        name: impl Into<String>,
        get: impl Fn(&M) -> SM + Send + Sync + 'static,
        to_msg: impl Fn(SMsg) -> Msg + Send + Sync + 'static,
        bindings: impl Fn(&SM) -> Vec<BindingSpec<SM, SMsg>> + Send + Sync + 'static,
    ) -> Self
    where
        SM: fmt::Debug + Send + Sync + 'static,
        SMsg: Send + 'static,
    {
        Self::sub_model_opt(name, move |m| Some(get(m)), to_msg, bindings)
    }

    /// Nested node that exists while `get` returns `Some`.
    pub fn sub_model_opt<SM, SMsg>(
        name: impl Into<String>,
        get: impl Fn(&M) -> Option<SM> + Send + Sync + 'static,
        to_msg: impl Fn(SMsg) -> Msg + Send + Sync + 'static,
        bindings: impl Fn(&SM) -> Vec<BindingSpec<SM, SMsg>> + Send + Sync + 'static,
    ) -> Self
    where
        SM: fmt::Debug + Send + Sync + 'static,
        SMsg: Send + 'static,
    {
        Self::with(
            name,
            BindingData::SubModel(Arc::new(SubModelBinding {
                get: Box::new(get),
                to_msg: Arc::new(to_msg),
                bindings: Box::new(bindings),
            })),
        )
    }

    /// Collection of nested nodes, one per element, identified by `key`.
    ///
    /// Messages from an element's node reach the parent as
    /// `to_msg(key, child_msg)`.
    pub fn sub_model_seq<SM, SMsg, K>(
        name: impl Into<String>,
        get: impl Fn(&M) -> Vec<SM> + Send + Sync + 'static,
        key: impl Fn(&SM) -> K + Send + Sync + 'static,
        to_msg: impl Fn(K, SMsg) -> Msg + Send + Sync + 'static,
        bindings: impl Fn(&SM) -> Vec<BindingSpec<SM, SMsg>> + Send + Sync + 'static,
    ) -> Self
    where
        SM: fmt::Debug + Send + Sync + 'static,
        SMsg: Send + 'static,
        K: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static,
    {
        Self::with(
            name,
            BindingData::SubModelSeq(Arc::new(SubModelSeqBinding {
                get: Box::new(get),
                key: Box::new(key),
                to_msg: Arc::new(to_msg),
                bindings: Box::new(bindings),
            })),
        )
    }

    /// Selection within the `SubModelSeq` binding named `seq_name`.
    ///
    /// Reading yields the element node whose key `get` returns. Writing a
    /// node yields `set(Some(key))`; writing `Unit`, or a node that is not
    /// in the sequence, yields `set(None)`.
    pub fn sub_model_selected_item<K>(
        name: impl Into<String>,
        seq_name: impl Into<String>,
        get: impl Fn(&M) -> Option<K> + Send + Sync + 'static,
        set: impl Fn(Option<K>, &M) -> Msg + Send + Sync + 'static,
    ) -> Self
    where
        K: Send + Sync + 'static,
    {
        Self::with(
            name,
            BindingData::SubModelSelectedItem(Arc::new(SelectedItemBinding {
                seq_name: seq_name.into(),
                get: Box::new(get),
                set: Box::new(set),
            })),
        )
    }
}

fn typed_setter<M, Msg, V: FromValue>(
    set: impl Fn(V, &M) -> Msg + Send + Sync + 'static,
) -> Setter<M, Msg> {
    Arc::new(move |value: Value, m: &M| V::from_value(value).map(|v| set(v, m)))
}

// ---------------------------------------------------------------------------
// Child state
// ---------------------------------------------------------------------------

/// Where a child binding lives, for naming and wiring new child nodes.
pub(crate) struct ChildContext<'a, Msg> {
    pub(crate) path: &'a str,
    pub(crate) name: &'a str,
    pub(crate) dispatch: &'a Dispatch<Msg>,
    pub(crate) config: &'a Arc<BindConfig>,
}

/// Operations on the type-erased child slot of a sub-model binding.
pub(crate) trait ChildBinding<M, Msg>: Send + Sync {
    fn empty_slot(&self) -> ChildSlot;

    /// Reconcile the slot with `model`.
    fn sync(&self, model: &M, slot: &mut ChildSlot, ctx: &ChildContext<'_, Msg>);

    /// The slot's current value: `Node`, `Nodes` or `Unit`.
    fn value(&self, slot: &ChildSlot) -> Value;

    fn len(&self, slot: &ChildSlot) -> usize;

    fn value_at(&self, slot: &ChildSlot, index: usize) -> Option<Value>;

    /// Child node stored under `key`, if `key` has the slot's key type.
    fn node_for_key(&self, slot: &ChildSlot, key: &dyn Any) -> Option<NodeRef>;

    /// Key under which `node` is stored.
    fn key_of(&self, slot: &ChildSlot, node: &NodeRef) -> Option<Box<dyn Any + Send>>;
}

/// Maps a selection in a child sequence to and from a model key.
pub(crate) trait SelectionBinding<M, Msg>: Send + Sync {
    fn seq_name(&self) -> &str;

    fn get(&self, model: &M, seq: &dyn ChildBinding<M, Msg>, slot: &ChildSlot) -> Value;

    fn set(
        &self,
        value: Value,
        model: &M,
        seq: &dyn ChildBinding<M, Msg>,
        slot: &ChildSlot,
    ) -> Result<Msg, ValueTypeError>;
}

type SingleSlot<SM, SMsg> = Option<ViewModelNode<SM, SMsg>>;

struct SubModelBinding<M, Msg, SM, SMsg> {
    get: Box<dyn Fn(&M) -> Option<SM> + Send + Sync>,
    to_msg: Arc<dyn Fn(SMsg) -> Msg + Send + Sync>,
    bindings: Box<dyn Fn(&SM) -> Vec<BindingSpec<SM, SMsg>> + Send + Sync>,
}

impl<M, Msg, SM, SMsg> SubModelBinding<M, Msg, SM, SMsg>
where
    Msg: Send + 'static,
    SM: fmt::Debug + Send + Sync + 'static,
    SMsg: Send + 'static,
{
    fn create(&self, sub: SM, ctx: &ChildContext<'_, Msg>) -> Option<ViewModelNode<SM, SMsg>> {
        let path = format!("{}.{}", ctx.path, ctx.name);
        let to_msg = Arc::clone(&self.to_msg);
        let dispatch = ctx.dispatch.map(move |m| to_msg(m));
        let bindings = (self.bindings)(&sub);
        create_child(sub, dispatch, bindings, ctx.config, path)
    }
}

impl<M, Msg, SM, SMsg> ChildBinding<M, Msg> for SubModelBinding<M, Msg, SM, SMsg>
where
    M: Send + Sync + 'static,
    Msg: Send + 'static,
    SM: fmt::Debug + Send + Sync + 'static,
    SMsg: Send + 'static,
{
    fn empty_slot(&self) -> ChildSlot {
        Box::new(SingleSlot::<SM, SMsg>::None)
    }

    fn sync(&self, model: &M, slot: &mut ChildSlot, ctx: &ChildContext<'_, Msg>) {
        let Some(slot) = slot.downcast_mut::<SingleSlot<SM, SMsg>>() else {
            return;
        };
        match (self.get)(model) {
            Some(sub) => {
                if let Some(node) = slot.as_ref() {
                    node.update(sub);
                } else {
                    *slot = self.create(sub, ctx);
                }
            }
            None => {
                if let Some(node) = slot.take() {
                    tracing::debug!(path = node.path(), "child.evict");
                }
            }
        }
    }

    fn value(&self, slot: &ChildSlot) -> Value {
        slot.downcast_ref::<SingleSlot<SM, SMsg>>()
            .and_then(Option::as_ref)
            .map_or(Value::Unit, |node| Value::Node(node.node_ref()))
    }

    fn len(&self, slot: &ChildSlot) -> usize {
        slot.downcast_ref::<SingleSlot<SM, SMsg>>()
            .map_or(0, |s| usize::from(s.is_some()))
    }

    fn value_at(&self, _slot: &ChildSlot, _index: usize) -> Option<Value> {
        None
    }

    fn node_for_key(&self, _slot: &ChildSlot, _key: &dyn Any) -> Option<NodeRef> {
        None
    }

    fn key_of(&self, _slot: &ChildSlot, _node: &NodeRef) -> Option<Box<dyn Any + Send>> {
        None
    }
}

struct SeqSlot<K, SM, SMsg> {
    order: Vec<K>,
    nodes: AHashMap<K, ViewModelNode<SM, SMsg>>,
}

struct SubModelSeqBinding<M, Msg, SM, SMsg, K> {
    get: Box<dyn Fn(&M) -> Vec<SM> + Send + Sync>,
    key: Box<dyn Fn(&SM) -> K + Send + Sync>,
    to_msg: Arc<dyn Fn(K, SMsg) -> Msg + Send + Sync>,
    bindings: Box<dyn Fn(&SM) -> Vec<BindingSpec<SM, SMsg>> + Send + Sync>,
}

impl<M, Msg, SM, SMsg, K> SubModelSeqBinding<M, Msg, SM, SMsg, K>
where
    Msg: Send + 'static,
    SM: fmt::Debug + Send + Sync + 'static,
    SMsg: Send + 'static,
    K: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static,
{
    fn create(
        &self,
        key: &K,
        sub: SM,
        ctx: &ChildContext<'_, Msg>,
    ) -> Option<ViewModelNode<SM, SMsg>> {
        let path = format!("{}.{}[{key:?}]", ctx.path, ctx.name);
        let to_msg = Arc::clone(&self.to_msg);
        let key = key.clone();
        let dispatch = ctx.dispatch.map(move |m| to_msg(key.clone(), m));
        let bindings = (self.bindings)(&sub);
        create_child(sub, dispatch, bindings, ctx.config, path)
    }

    fn slot<'s>(&self, slot: &'s ChildSlot) -> Option<&'s SeqSlot<K, SM, SMsg>> {
        slot.downcast_ref::<SeqSlot<K, SM, SMsg>>()
    }
}

impl<M, Msg, SM, SMsg, K> ChildBinding<M, Msg> for SubModelSeqBinding<M, Msg, SM, SMsg, K>
where
    M: Send + Sync + 'static,
    Msg: Send + 'static,
    SM: fmt::Debug + Send + Sync + 'static,
    SMsg: Send + 'static,
    K: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static,
{
    fn empty_slot(&self) -> ChildSlot {
        Box::new(SeqSlot::<K, SM, SMsg> {
            order: Vec::new(),
            nodes: AHashMap::new(),
        })
    }

    fn sync(&self, model: &M, slot: &mut ChildSlot, ctx: &ChildContext<'_, Msg>) {
        let Some(slot) = slot.downcast_mut::<SeqSlot<K, SM, SMsg>>() else {
            return;
        };
        let items = (self.get)(model);
        let mut order = Vec::with_capacity(items.len());
        let mut nodes = AHashMap::with_capacity(items.len());
        for item in items {
            let key = (self.key)(&item);
            if nodes.contains_key(&key) {
                tracing::warn!(
                    path = ctx.path,
                    name = ctx.name,
                    key = ?key,
                    "duplicate key in sub-model sequence; keeping the first element"
                );
                continue;
            }
            let node = match slot.nodes.remove(&key) {
                Some(node) => {
                    node.update(item);
                    node
                }
                None => match self.create(&key, item, ctx) {
                    Some(node) => node,
                    None => continue,
                },
            };
            order.push(key.clone());
            nodes.insert(key, node);
        }
        for node in slot.nodes.values() {
            tracing::debug!(path = node.path(), "child.evict");
        }
        slot.order = order;
        slot.nodes = nodes;
    }

    fn value(&self, slot: &ChildSlot) -> Value {
        let Some(slot) = self.slot(slot) else {
            return Value::Nodes(Vec::new());
        };
        Value::Nodes(
            slot.order
                .iter()
                .filter_map(|k| slot.nodes.get(k))
                .map(ViewModelNode::node_ref)
                .collect(),
        )
    }

    fn len(&self, slot: &ChildSlot) -> usize {
        self.slot(slot).map_or(0, |s| s.order.len())
    }

    fn value_at(&self, slot: &ChildSlot, index: usize) -> Option<Value> {
        let slot = self.slot(slot)?;
        let key = slot.order.get(index)?;
        slot.nodes.get(key).map(|n| Value::Node(n.node_ref()))
    }

    fn node_for_key(&self, slot: &ChildSlot, key: &dyn Any) -> Option<NodeRef> {
        let key = key.downcast_ref::<K>()?;
        self.slot(slot)?.nodes.get(key).map(ViewModelNode::node_ref)
    }

    fn key_of(&self, slot: &ChildSlot, node: &NodeRef) -> Option<Box<dyn Any + Send>> {
        self.slot(slot)?
            .nodes
            .iter()
            .find(|(_, n)| n.is(node))
            .map(|(k, _)| Box::new(k.clone()) as Box<dyn Any + Send>)
    }
}

struct SelectedItemBinding<M, Msg, K> {
    seq_name: String,
    get: Box<dyn Fn(&M) -> Option<K> + Send + Sync>,
    set: Box<dyn Fn(Option<K>, &M) -> Msg + Send + Sync>,
}

impl<M, Msg, K> SelectionBinding<M, Msg> for SelectedItemBinding<M, Msg, K>
where
    M: Send + Sync + 'static,
    Msg: Send + 'static,
    K: Send + Sync + 'static,
{
    fn seq_name(&self) -> &str {
        &self.seq_name
    }

    fn get(&self, model: &M, seq: &dyn ChildBinding<M, Msg>, slot: &ChildSlot) -> Value {
        (self.get)(model)
            .and_then(|key| seq.node_for_key(slot, &key))
            .map_or(Value::Unit, Value::Node)
    }

    fn set(
        &self,
        value: Value,
        model: &M,
        seq: &dyn ChildBinding<M, Msg>,
        slot: &ChildSlot,
    ) -> Result<Msg, ValueTypeError> {
        match value {
            Value::Unit => Ok((self.set)(None, model)),
            Value::Node(node) => {
                let key = seq
                    .key_of(slot, &node)
                    .and_then(|k| k.downcast::<K>().ok())
                    .map(|k| *k);
                if key.is_none() {
                    tracing::debug!(
                        seq = %self.seq_name,
                        node = node.path(),
                        "selected node is not in the sequence"
                    );
                }
                Ok((self.set)(key, model))
            }
            other => Err(ValueTypeError::new(ValueType::Node, &other)),
        }
    }
}

fn create_child<SM, SMsg>(
    sub: SM,
    dispatch: Dispatch<SMsg>,
    bindings: Vec<BindingSpec<SM, SMsg>>,
    config: &Arc<BindConfig>,
    path: String,
) -> Option<ViewModelNode<SM, SMsg>>
where
    SM: fmt::Debug + Send + Sync + 'static,
    SMsg: Send + 'static,
{
    match ViewModelNode::child(sub, dispatch, bindings, Arc::clone(config), path) {
        Ok(node) => {
            tracing::debug!(path = node.path(), "child.create");
            Some(node)
        }
        Err(err) => {
            tracing::error!(error = %err, "child node construction failed");
            None
        }
    }
}
