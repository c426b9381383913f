#![forbid(unsafe_code)]

//! Identity-stable view-model nodes.
//!
//! A [`ViewModelNode`] is what the UI toolkit holds as the data source of an
//! element. The application loop replaces its model wholesale on every tick;
//! the node absorbs each new model through [`update`](ViewModelNode::update)
//! and stays the same object, so the references the toolkit already holds
//! (to the node and to its unchanged child nodes) remain valid.
//!
//! # Invariants
//!
//! 1. Binding names are unique within a node and never equal a reserved
//!    name (`CurrentModel`, `HasErrors`).
//! 2. The binding table is fixed at construction.
//! 3. A property query issued after `update` returns observes the new model.
//! 4. A child node survives an update for as long as its sub-model (or its
//!    key, in a sequence) is still present.
//! 5. No node lock is held while a message is dispatched.
//!
//! # Failure Modes
//!
//! - **Undeclared name**: `BindError::BindingNotFound`, logged at `error`
//!   level. With `strict_bindings` the query panics instead.
//! - **Child construction fails** (e.g. duplicate names in a child table):
//!   logged, and the child is treated as absent.
//! - **Concurrent `update` calls** on one node are not supported; the loop
//!   that owns the node must serialize them.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use ahash::AHashMap;
use arc_swap::ArcSwap;
use elmbind_core::{
    BindConfig, BindError, BindingKind, Dispatch, DynamicProperty, IncrementalCollection,
    NodeRef, PropertyProvider, Result, is_reserved_name,
};
use web_time::Instant;

use crate::binding::{BindingData, BindingSpec, ChildBinding, ChildContext, ChildSlot};
use crate::lock;
use crate::resolver;

/// Path of a root node.
pub const ROOT_PATH: &str = "main";

pub(crate) struct NodeInner<M, Msg> {
    this: Weak<NodeInner<M, Msg>>,
    pub(crate) path: String,
    model: ArcSwap<M>,
    pub(crate) dispatch: Dispatch<Msg>,
    bindings: Vec<BindingSpec<M, Msg>>,
    index: AHashMap<String, usize>,
    children: Mutex<AHashMap<String, ChildSlot>>,
    errors: Mutex<AHashMap<String, Vec<String>>>,
    config: Arc<BindConfig>,
}

impl<M, Msg> NodeInner<M, Msg> {
    pub(crate) fn current(&self) -> Arc<M> {
        self.model.load_full()
    }

    pub(crate) fn spec(&self, name: &str) -> Option<&BindingSpec<M, Msg>> {
        self.index.get(name).and_then(|&i| self.bindings.get(i))
    }

    fn ctx<'a>(&'a self, name: &'a str) -> ChildContext<'a, Msg> {
        ChildContext {
            path: &self.path,
            name,
            dispatch: &self.dispatch,
            config: &self.config,
        }
    }

    /// Run `f` on the child slot of `name`, materializing it from the
    /// current model on first use.
    pub(crate) fn with_child_slot<R>(
        &self,
        name: &str,
        child: &dyn ChildBinding<M, Msg>,
        f: impl FnOnce(&ChildSlot) -> R,
    ) -> R {
        let mut children = lock(&self.children);
        let slot = children.entry(name.to_owned()).or_insert_with(|| {
            let mut slot = child.empty_slot();
            child.sync(&self.current(), &mut slot, &self.ctx(name));
            slot
        });
        f(slot)
    }

    /// The paged collection cached for `name`, built by `make` on first use.
    pub(crate) fn cached_collection(
        &self,
        name: &str,
        make: impl FnOnce() -> IncrementalCollection,
    ) -> IncrementalCollection {
        let mut children = lock(&self.children);
        if let Some(cached) = children
            .get(name)
            .and_then(|slot| slot.downcast_ref::<IncrementalCollection>())
        {
            return cached.clone();
        }
        let collection = make();
        children.insert(name.to_owned(), Box::new(collection.clone()));
        collection
    }

    pub(crate) fn record_errors(&self, name: &str, found: Vec<String>) {
        let mut errors = lock(&self.errors);
        if found.is_empty() {
            errors.remove(name);
        } else {
            errors.insert(name.to_owned(), found);
        }
    }

    fn refresh_validation(&self, model: &M) {
        for spec in &self.bindings {
            if let BindingData::TwoWayValidate { validate, .. } = &spec.data {
                self.record_errors(spec.name(), validate(model));
            }
        }
    }

    fn errors_for(&self, name: &str) -> Vec<String> {
        lock(&self.errors).get(name).cloned().unwrap_or_default()
    }

    pub(crate) fn any_errors(&self) -> bool {
        lock(&self.errors).values().any(|e| !e.is_empty())
    }

    pub(crate) fn binding_not_found(&self, name: &str) -> BindError {
        tracing::error!(
            path = %self.path,
            name,
            bindings = ?self.bindings.iter().map(BindingSpec::name).collect::<Vec<_>>(),
            "binding not found"
        );
        if self.config.strict_bindings {
            panic!("binding not found: {}.{name}", self.path);
        }
        BindError::BindingNotFound {
            path: self.path.clone(),
            name: name.to_owned(),
        }
    }
}

impl<M, Msg> PropertyProvider for NodeInner<M, Msg>
where
    M: fmt::Debug + Send + Sync + 'static,
    Msg: Send + 'static,
{
    fn get_property(&self, name: &str) -> Result<DynamicProperty> {
        match self.this.upgrade() {
            Some(node) => resolver::resolve_inner(&node, name),
            // Only reachable while the node is being dropped.
            None => Ok(DynamicProperty::inert(name)),
        }
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn binding_names(&self) -> Vec<String> {
        self.bindings.iter().map(|b| b.name().to_owned()).collect()
    }

    fn has_errors(&self) -> bool {
        self.any_errors()
    }

    fn string_representation(&self) -> String {
        format!("{:?}", self.current())
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn std::any::Any + Send + Sync> {
        self
    }
}

// ---------------------------------------------------------------------------
// ViewModelNode
// ---------------------------------------------------------------------------

/// Long-lived data source for one UI element.
///
/// Cloning yields another handle to the same node.
pub struct ViewModelNode<M, Msg> {
    inner: Arc<NodeInner<M, Msg>>,
}

impl<M, Msg> Clone for ViewModelNode<M, Msg> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M, Msg> ViewModelNode<M, Msg>
where
    M: fmt::Debug + Send + Sync + 'static,
    Msg: Send + 'static,
{
    /// Build a root node at path [`ROOT_PATH`].
    pub fn new(
        model: impl Into<Arc<M>>,
        dispatch: Dispatch<Msg>,
        bindings: Vec<BindingSpec<M, Msg>>,
        config: &BindConfig,
    ) -> Result<Self> {
        Self::child(
            model,
            dispatch,
            bindings,
            Arc::new(config.clone()),
            ROOT_PATH.to_owned(),
        )
    }

    /// A root node whose dispatch drops every message. Meant for previews
    /// and tests.
    pub fn design_instance(
        model: impl Into<Arc<M>>,
        bindings: Vec<BindingSpec<M, Msg>>,
    ) -> Result<Self> {
        Self::new(model, Dispatch::noop(), bindings, &BindConfig::default())
    }

    pub(crate) fn child(
        model: impl Into<Arc<M>>,
        dispatch: Dispatch<Msg>,
        bindings: Vec<BindingSpec<M, Msg>>,
        config: Arc<BindConfig>,
        path: String,
    ) -> Result<Self> {
        let index = index_bindings(&path, &bindings)?;
        let model = model.into();
        let inner = Arc::new_cyclic(|this| NodeInner {
            this: this.clone(),
            path,
            model: ArcSwap::new(Arc::clone(&model)),
            dispatch,
            bindings,
            index,
            children: Mutex::new(AHashMap::new()),
            errors: Mutex::new(AHashMap::new()),
            config,
        });
        inner.refresh_validation(&model);
        Ok(Self { inner })
    }

    /// Absorb a new model in place.
    ///
    /// Child nodes that were already materialized are reconciled against the
    /// new model, paged collections are made equal to the new sequence, and
    /// validation errors are recomputed.
    pub fn update(&self, model: impl Into<Arc<M>>) {
        let inner = &self.inner;
        let started = inner.config.measure.then(Instant::now);
        let model = model.into();
        inner.model.store(Arc::clone(&model));

        {
            let mut children = lock(&inner.children);
            for spec in &inner.bindings {
                let Some(slot) = children.get_mut(spec.name()) else {
                    continue;
                };
                match &spec.data {
                    BindingData::SubModel(child) | BindingData::SubModelSeq(child) => {
                        child.sync(&model, slot, &inner.ctx(spec.name()));
                    }
                    BindingData::OneWaySeq {
                        paging: Some(_), ..
                    } => {
                        if let Some(collection) = slot.downcast_ref::<IncrementalCollection>() {
                            collection.refresh();
                        }
                    }
                    _ => {}
                }
            }
        }
        inner.refresh_validation(&model);

        if inner.config.log_updates {
            tracing::debug!(path = %inner.path, model = ?model, "node.update");
        }
        if let Some(started) = started {
            let elapsed = started.elapsed();
            if elapsed > inner.config.measure_limit() {
                tracing::warn!(
                    path = %inner.path,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    limit_ms = inner.config.measure_limit_ms,
                    "node.update exceeded measure limit"
                );
            }
        }
    }

    /// Resolve `name` to a property capability.
    pub fn get_property(&self, name: &str) -> Result<DynamicProperty> {
        resolver::resolve_inner(&self.inner, name)
    }

    /// This node as a toolkit data source. Every call returns a handle to
    /// the same object.
    #[must_use]
    pub fn node_ref(&self) -> NodeRef {
        Arc::clone(&self.inner) as NodeRef
    }

    /// Recover a typed node from a data source handle.
    #[must_use]
    pub fn from_node_ref(node: &NodeRef) -> Option<Self> {
        Arc::clone(node)
            .into_any()
            .downcast::<NodeInner<M, Msg>>()
            .ok()
            .map(|inner| Self { inner })
    }

    #[must_use]
    pub fn string_representation(&self) -> String {
        self.inner.string_representation()
    }
}

impl<M, Msg> ViewModelNode<M, Msg> {
    #[must_use]
    pub fn current_model(&self) -> Arc<M> {
        self.inner.current()
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.inner.any_errors()
    }

    /// Validation errors currently recorded for `name`.
    #[must_use]
    pub fn errors(&self, name: &str) -> Vec<String> {
        self.inner.errors_for(name)
    }

    #[must_use]
    pub fn binding_names(&self) -> Vec<&str> {
        self.inner.bindings.iter().map(BindingSpec::name).collect()
    }

    #[must_use]
    pub fn binding_kind(&self, name: &str) -> Option<BindingKind> {
        self.inner.spec(name).map(BindingSpec::kind)
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether `node` is a handle to this node.
    #[must_use]
    pub fn is(&self, node: &NodeRef) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.inner), Arc::as_ptr(node))
    }
}

impl<M: fmt::Debug, Msg> fmt::Debug for ViewModelNode<M, Msg> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewModelNode")
            .field("path", &self.inner.path)
            .field("model", &self.inner.current())
            .finish_non_exhaustive()
    }
}

fn index_bindings<M, Msg>(
    path: &str,
    bindings: &[BindingSpec<M, Msg>],
) -> Result<AHashMap<String, usize>> {
    let mut index = AHashMap::with_capacity(bindings.len());
    for (i, spec) in bindings.iter().enumerate() {
        if is_reserved_name(spec.name()) {
            return Err(BindError::ReservedName {
                path: path.to_owned(),
                name: spec.name().to_owned(),
            });
        }
        if index.insert(spec.name().to_owned(), i).is_some() {
            return Err(BindError::DuplicateBinding {
                path: path.to_owned(),
                name: spec.name().to_owned(),
            });
        }
    }
    for spec in bindings {
        if let BindingData::SubModelSelectedItem(selection) = &spec.data {
            let seq_name = selection.seq_name();
            let is_seq = index
                .get(seq_name)
                .and_then(|&i| bindings.get(i))
                .is_some_and(|s| s.kind() == BindingKind::SubModelSeq);
            if !is_seq {
                return Err(BindError::BindingNotFound {
                    path: path.to_owned(),
                    name: seq_name.to_owned(),
                });
            }
        }
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use elmbind_core::Value;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: u32,
        label: String,
    }

    #[derive(Debug, Clone)]
    struct Model {
        count: i64,
        detail: Option<i64>,
        items: Vec<Item>,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Msg {
        Detail(i64),
        Item(u32, String),
    }

    fn model(count: i64) -> Model {
        Model {
            count,
            detail: Some(count * 10),
            items: Vec::new(),
        }
    }

    fn item(id: u32, label: &str) -> Item {
        Item {
            id,
            label: label.into(),
        }
    }

    fn bindings() -> Vec<BindingSpec<Model, Msg>> {
        vec![
            BindingSpec::one_way("Count", |m: &Model| m.count),
            BindingSpec::sub_model_opt(
                "Detail",
                |m: &Model| m.detail,
                Msg::Detail,
                |_: &i64| vec![BindingSpec::one_way("Value", |d: &i64| *d)],
            ),
            BindingSpec::sub_model_seq(
                "Items",
                |m: &Model| m.items.clone(),
                |i: &Item| i.id,
                |id, label: String| Msg::Item(id, label),
                |_: &Item| {
                    vec![
                        BindingSpec::one_way("Label", |i: &Item| i.label.clone()),
                        BindingSpec::two_way("Edit", |i: &Item| i.label.clone(), |v: String, _| v),
                    ]
                },
            ),
        ]
    }

    fn recorder() -> (Dispatch<Msg>, Arc<Mutex<Vec<Msg>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        (Dispatch::new(move |m| s.lock().unwrap().push(m)), seen)
    }

    fn node_at(parent: &ViewModelNode<Model, Msg>, name: &str) -> NodeRef {
        parent
            .get_property(name)
            .unwrap()
            .get()
            .unwrap()
            .as_node()
            .cloned()
            .expect("node value")
    }

    fn nodes_at(parent: &ViewModelNode<Model, Msg>, name: &str) -> Vec<NodeRef> {
        parent
            .get_property(name)
            .unwrap()
            .get()
            .unwrap()
            .as_nodes()
            .expect("nodes value")
            .to_vec()
    }

    fn label(node: &NodeRef) -> Value {
        node.get_property("Label").unwrap().get().unwrap()
    }

    #[test]
    fn update_keeps_node_identity_and_exposes_new_model() {
        let node = ViewModelNode::design_instance(model(0), bindings()).unwrap();
        let before = node.node_ref();
        assert_eq!(node.get_property("Count").unwrap().get(), Ok(Value::Int(0)));
        node.update(model(5));
        assert_eq!(node.get_property("Count").unwrap().get(), Ok(Value::Int(5)));
        assert!(node.is(&before));
        assert!(Arc::ptr_eq(&before, &node.node_ref()));
    }

    #[test]
    fn property_reads_late_bound_model() {
        let node = ViewModelNode::design_instance(model(1), bindings()).unwrap();
        let prop = node.get_property("Count").unwrap();
        node.update(model(2));
        assert_eq!(prop.get(), Ok(Value::Int(2)));
    }

    #[test]
    fn sub_model_updates_in_place() {
        let node = ViewModelNode::design_instance(model(1), bindings()).unwrap();
        let child = node_at(&node, "Detail");
        assert_eq!(child.path(), "main.Detail");
        node.update(model(2));
        let again = node_at(&node, "Detail");
        assert!(Arc::ptr_eq(&child, &again));
        assert_eq!(child.get_property("Value").unwrap().get(), Ok(Value::Int(20)));
    }

    #[test]
    fn optional_sub_model_is_evicted_and_recreated() {
        let node = ViewModelNode::design_instance(model(1), bindings()).unwrap();
        let first = node_at(&node, "Detail");
        let mut m = model(1);
        m.detail = None;
        node.update(m);
        assert_eq!(node.get_property("Detail").unwrap().get(), Ok(Value::Unit));
        node.update(model(3));
        let second = node_at(&node, "Detail");
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn child_dispatch_wraps_messages() {
        let (dispatch, seen) = recorder();
        let node =
            ViewModelNode::new(model(4), dispatch, bindings(), &BindConfig::default()).unwrap();
        let mut m = model(4);
        m.items = vec![item(7, "x")];
        node.update(m);
        let items = nodes_at(&node, "Items");
        items[0]
            .get_property("Edit")
            .unwrap()
            .set(Value::from("y"))
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![Msg::Item(7, "y".into())]);
    }

    #[test]
    fn sequence_diff_preserves_identity_by_key() {
        let node = ViewModelNode::design_instance(model(0), bindings()).unwrap();
        let mut m = model(0);
        m.items = vec![item(1, "A"), item(2, "B"), item(3, "C")];
        node.update(m.clone());
        let before = nodes_at(&node, "Items");
        assert_eq!(before[1].path(), "main.Items[2]");

        m.items = vec![item(1, "A"), item(3, "C2"), item(4, "D")];
        node.update(m);
        let after = nodes_at(&node, "Items");
        assert_eq!(after.len(), 3);
        assert!(Arc::ptr_eq(&before[0], &after[0]), "A reused");
        assert!(Arc::ptr_eq(&before[2], &after[1]), "C reused");
        assert!(before.iter().all(|b| !Arc::ptr_eq(b, &after[2])), "D is new");
        assert_eq!(label(&after[1]), Value::from("C2"));
        assert_eq!(after[2].path(), "main.Items[4]");
    }

    #[test]
    fn sequence_indexer_and_range_check() {
        let node = ViewModelNode::design_instance(model(0), bindings()).unwrap();
        let mut m = model(0);
        m.items = vec![item(1, "A"), item(2, "B")];
        node.update(m);
        let prop = node.get_property("Items").unwrap();
        let second = prop.get_indexed(&Value::Int(1)).unwrap();
        assert_eq!(label(second.as_node().unwrap()), Value::from("B"));
        assert_eq!(
            prop.get_indexed(&Value::Int(2)),
            Err(BindError::IndexOutOfRange {
                name: "Items".into(),
                index: 2,
                len: 2,
            })
        );
        assert!(prop.set_indexed(&Value::Int(0), Value::Unit).is_err());
    }

    #[test]
    fn duplicate_keys_keep_first_element() {
        let node = ViewModelNode::design_instance(model(0), bindings()).unwrap();
        let mut m = model(0);
        m.items = vec![item(1, "first"), item(1, "second")];
        node.update(m);
        let items = nodes_at(&node, "Items");
        assert_eq!(items.len(), 1);
        assert_eq!(label(&items[0]), Value::from("first"));
    }

    #[test]
    fn construction_rejects_bad_tables() {
        let dup: Vec<BindingSpec<Model, Msg>> = vec![
            BindingSpec::one_way("A", |m: &Model| m.count),
            BindingSpec::one_way("A", |m: &Model| m.count),
        ];
        assert_eq!(
            ViewModelNode::design_instance(model(0), dup).unwrap_err(),
            BindError::DuplicateBinding {
                path: "main".into(),
                name: "A".into(),
            }
        );

        let reserved: Vec<BindingSpec<Model, Msg>> =
            vec![BindingSpec::one_way("HasErrors", |_: &Model| false)];
        assert!(matches!(
            ViewModelNode::design_instance(model(0), reserved),
            Err(BindError::ReservedName { .. })
        ));

        let orphan: Vec<BindingSpec<Model, Msg>> = vec![BindingSpec::sub_model_selected_item(
            "Selected",
            "Nope",
            |_: &Model| None::<u32>,
            |_, m: &Model| Msg::Detail(m.count),
        )];
        assert!(matches!(
            ViewModelNode::design_instance(model(0), orphan),
            Err(BindError::BindingNotFound { .. })
        ));
    }

    #[test]
    fn validation_errors_follow_the_model() {
        let specs: Vec<BindingSpec<Model, Msg>> = vec![BindingSpec::two_way_validate(
            "Count",
            |m: &Model| m.count,
            |v: i64, _| Msg::Detail(v),
            |m: &Model| {
                if m.count < 0 {
                    vec!["must not be negative".to_owned()]
                } else {
                    Vec::new()
                }
            },
        )];
        let node = ViewModelNode::design_instance(model(-1), specs).unwrap();
        assert!(node.has_errors());
        assert_eq!(node.errors("Count"), vec!["must not be negative".to_owned()]);
        assert_eq!(node.get_property("HasErrors").unwrap().get(), Ok(Value::Bool(true)));
        node.update(model(1));
        assert!(!node.has_errors());
        assert!(node.errors("Count").is_empty());
    }

    #[test]
    fn enumeration_and_representation() {
        let node = ViewModelNode::design_instance(model(3), bindings()).unwrap();
        assert_eq!(node.binding_names(), vec!["Count", "Detail", "Items"]);
        assert_eq!(node.binding_kind("Items"), Some(BindingKind::SubModelSeq));
        assert_eq!(node.binding_kind("Nope"), None);
        assert!(node.string_representation().contains("count: 3"));
        assert_eq!(node.node_ref().binding_names(), vec!["Count", "Detail", "Items"]);
    }

    #[test]
    fn node_ref_round_trips_to_typed_node() {
        let node = ViewModelNode::design_instance(model(3), bindings()).unwrap();
        let back = ViewModelNode::<Model, Msg>::from_node_ref(&node.node_ref()).unwrap();
        assert!(back.ptr_eq(&node));
        assert!(ViewModelNode::<i64, Msg>::from_node_ref(&node.node_ref()).is_none());
    }

    #[test]
    fn current_model_property_exposes_snapshot() {
        let node = ViewModelNode::design_instance(model(8), bindings()).unwrap();
        let value = node.get_property("CurrentModel").unwrap().get().unwrap();
        assert_eq!(value.downcast_model::<Model>().map(|m| m.count), Some(8));
    }

    #[test]
    fn missing_binding_is_an_error() {
        let node = ViewModelNode::design_instance(model(0), bindings()).unwrap();
        assert_eq!(
            node.get_property("Missing").unwrap_err(),
            BindError::BindingNotFound {
                path: "main".into(),
                name: "Missing".into(),
            }
        );
    }

    #[test]
    #[should_panic(expected = "binding not found: main.Missing")]
    fn strict_mode_panics_on_missing_binding() {
        let config = BindConfig::default().with_strict_bindings(true);
        let node = ViewModelNode::new(model(0), Dispatch::noop(), bindings(), &config).unwrap();
        let _ = node.get_property("Missing");
    }

    #[test]
    fn measured_update_still_applies() {
        let config = BindConfig::default().with_measure(0).with_log_updates(true);
        let node = ViewModelNode::new(model(0), Dispatch::noop(), bindings(), &config).unwrap();
        node.update(model(9));
        assert_eq!(node.current_model().count, 9);
    }
}
