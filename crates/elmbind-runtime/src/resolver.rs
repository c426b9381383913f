#![forbid(unsafe_code)]

//! Property resolution.
//!
//! Turns a property name into a [`DynamicProperty`] for a node. Every
//! function inside a returned property reads the node's model when it is
//! invoked, so a property stays correct across updates even though callers
//! are expected to re-resolve instead of caching it.
//!
//! | kind                   | read | write | value          |
//! |------------------------|------|-------|----------------|
//! | `OneWay`, `OneWayLazy` | yes  | no    | scalar         |
//! | `OneWaySeq`            | yes  | no    | `List` or `Collection` (paged) |
//! | `TwoWay`, `TwoWayValidate` | yes | yes | scalar       |
//! | `Command`, `CommandWithParameter` | yes | no | `Command` |
//! | `SubModel`             | yes  | no    | `Node` or `Unit` |
//! | `SubModelSeq`          | yes  | no    | `Nodes`        |
//! | `SubModelSelectedItem` | yes  | yes   | `Node` or `Unit` |
//! | `OneWayToSource`       | no   | no    | (inert)        |
//!
//! `CurrentModel` and `HasErrors` bypass the binding table.

use std::fmt;
use std::sync::Arc;

use elmbind_core::{
    BindError, Command, CURRENT_MODEL, DynamicProperty, HAS_ERRORS, IncrementalCollection,
    ModelRef, Result, Value, ValueType, ValueTypeError,
};

use crate::binding::{
    BindingData, CanExecute, ChildBinding, Getter, Paging, SelectionBinding, SeqGetter, Setter,
    Validator,
};
use crate::node::{NodeInner, ViewModelNode};

/// Resolve `name` against `node`'s binding table.
pub fn resolve<M, Msg>(node: &ViewModelNode<M, Msg>, name: &str) -> Result<DynamicProperty>
where
    M: fmt::Debug + Send + Sync + 'static,
    Msg: Send + 'static,
{
    node.get_property(name)
}

pub(crate) fn resolve_inner<M, Msg>(
    node: &Arc<NodeInner<M, Msg>>,
    name: &str,
) -> Result<DynamicProperty>
where
    M: fmt::Debug + Send + Sync + 'static,
    Msg: Send + 'static,
{
    if name == CURRENT_MODEL {
        let node = Arc::clone(node);
        return Ok(DynamicProperty::read_only(name, ValueType::Model, move || {
            let model: ModelRef = node.current();
            Ok(Value::Model(model))
        }));
    }
    if name == HAS_ERRORS {
        let node = Arc::clone(node);
        return Ok(DynamicProperty::read_only(name, ValueType::Bool, move || {
            Ok(Value::Bool(node.any_errors()))
        }));
    }

    let Some(spec) = node.spec(name) else {
        return Err(node.binding_not_found(name));
    };
    tracing::trace!(path = %node.path, name, kind = %spec.kind(), "resolve");

    let property = match &spec.data {
        BindingData::OneWay { get } | BindingData::OneWayLazy { get } => one_way(node, name, get),
        BindingData::OneWaySeq { get, paging: None } => seq(node, name, get),
        BindingData::OneWaySeq {
            get,
            paging: Some(paging),
        } => paged_seq(node, name, get, paging),
        BindingData::TwoWay { get, set } => two_way(node, name, get, set, None),
        BindingData::TwoWayValidate { get, set, validate } => {
            two_way(node, name, get, set, Some(validate))
        }
        BindingData::Command { exec, can_execute }
        | BindingData::CommandWithParameter { exec, can_execute } => {
            command(node, name, exec, can_execute)
        }
        BindingData::SubModel(child) => sub_model(node, name, child),
        BindingData::SubModelSeq(child) => sub_model_seq(node, name, child),
        BindingData::SubModelSelectedItem(selection) => {
            selected_item(node, name, selection)?
        }
        BindingData::OneWayToSource { .. } => {
            tracing::warn!(
                path = %node.path,
                name,
                kind = %spec.kind(),
                "binding kind is not materialized; returning an inert property"
            );
            DynamicProperty::inert(name)
        }
    };
    Ok(property)
}

fn one_way<M, Msg>(node: &Arc<NodeInner<M, Msg>>, name: &str, get: &Getter<M>) -> DynamicProperty
where
    M: Send + Sync + 'static,
    Msg: Send + 'static,
{
    let (node, get) = (Arc::clone(node), Arc::clone(get));
    DynamicProperty::read_only(name, ValueType::Any, move || Ok(get(&node.current())))
}

fn seq<M, Msg>(node: &Arc<NodeInner<M, Msg>>, name: &str, get: &SeqGetter<M>) -> DynamicProperty
where
    M: Send + Sync + 'static,
    Msg: Send + 'static,
{
    let (read_node, read) = (Arc::clone(node), Arc::clone(get));
    let (index_node, index_read) = (Arc::clone(node), Arc::clone(get));
    let prop = name.to_owned();
    DynamicProperty::read_only(name, ValueType::List, move || {
        Ok(Value::List(read(&read_node.current())))
    })
    .with_index_getter(move |index| {
        let items = index_read(&index_node.current());
        let i = checked_index(&prop, index, items.len())?;
        Ok(items.into_iter().nth(i).unwrap_or_default())
    })
}

fn paged_seq<M, Msg>(
    node: &Arc<NodeInner<M, Msg>>,
    name: &str,
    get: &SeqGetter<M>,
    paging: &Paging<M, Msg>,
) -> DynamicProperty
where
    M: Send + Sync + 'static,
    Msg: Send + 'static,
{
    let collection = node.cached_collection(name, || {
        // The node caches the collection, so the collection must not keep
        // the node alive.
        let weak = Arc::downgrade(node);
        let source = {
            let (weak, get) = (weak.clone(), Arc::clone(get));
            move || {
                weak.upgrade()
                    .map(|n| get(&n.current()))
                    .unwrap_or_default()
            }
        };
        let has_more = {
            let (weak, has_more) = (weak.clone(), Arc::clone(&paging.has_more));
            move || weak.upgrade().is_some_and(|n| has_more(&n.current()))
        };
        let load = {
            let load_more = Arc::clone(&paging.load_more);
            move |count, done| {
                if let Some(n) = weak.upgrade() {
                    let msg = load_more(count, done, &n.current());
                    tracing::trace!(path = %n.path, count, "dispatch.load_more");
                    n.dispatch.call(msg);
                }
            }
        };
        IncrementalCollection::new(source, has_more, load)
    });

    let indexed = collection.clone();
    let prop = name.to_owned();
    DynamicProperty::read_only(name, ValueType::Collection, move || {
        Ok(Value::Collection(collection.clone()))
    })
    .with_index_getter(move |index| {
        let len = indexed.len();
        let i = checked_index(&prop, index, len)?;
        indexed.get(i).ok_or_else(|| out_of_range(&prop, i64::try_from(i).unwrap_or(i64::MAX), len))
    })
}

fn two_way<M, Msg>(
    node: &Arc<NodeInner<M, Msg>>,
    name: &str,
    get: &Getter<M>,
    set: &Setter<M, Msg>,
    validate: Option<&Validator<M>>,
) -> DynamicProperty
where
    M: Send + Sync + 'static,
    Msg: Send + 'static,
{
    let (read_node, get) = (Arc::clone(node), Arc::clone(get));
    let (write_node, set) = (Arc::clone(node), Arc::clone(set));
    let validate = validate.cloned();
    let prop = name.to_owned();
    DynamicProperty::read_write(
        name,
        ValueType::Any,
        move || Ok(get(&read_node.current())),
        move |value| {
            let model = write_node.current();
            let outcome = set(value, &model);
            if let Some(validate) = &validate {
                write_node.record_errors(&prop, validate(&model));
            }
            let msg = outcome.map_err(|err| BindError::type_mismatch(&prop, err))?;
            tracing::trace!(path = %write_node.path, name = %prop, "dispatch.set");
            write_node.dispatch.call(msg);
            Ok(())
        },
    )
}

fn command<M, Msg>(
    node: &Arc<NodeInner<M, Msg>>,
    name: &str,
    exec: &Setter<M, Msg>,
    can_execute: &CanExecute<M>,
) -> DynamicProperty
where
    M: Send + Sync + 'static,
    Msg: Send + 'static,
{
    let (node, exec, can_execute) = (Arc::clone(node), Arc::clone(exec), Arc::clone(can_execute));
    let prop = name.to_owned();
    DynamicProperty::read_only(name, ValueType::Command, move || {
        let (exec_node, exec) = (Arc::clone(&node), Arc::clone(&exec));
        let (query_node, can_execute) = (Arc::clone(&node), Arc::clone(&can_execute));
        let prop = prop.clone();
        Ok(Value::Command(Command::new(
            move |param| match exec(param, &exec_node.current()) {
                Ok(msg) => {
                    tracing::trace!(path = %exec_node.path, name = %prop, "dispatch.command");
                    exec_node.dispatch.call(msg);
                }
                Err(err) => tracing::warn!(
                    path = %exec_node.path,
                    name = %prop,
                    error = %err,
                    "command parameter rejected"
                ),
            },
            move |param| can_execute(param, &query_node.current()),
        )))
    })
}

fn sub_model<M, Msg>(
    node: &Arc<NodeInner<M, Msg>>,
    name: &str,
    child: &Arc<dyn ChildBinding<M, Msg>>,
) -> DynamicProperty
where
    M: Send + Sync + 'static,
    Msg: Send + 'static,
{
    let (node, child) = (Arc::clone(node), Arc::clone(child));
    let slot_name = name.to_owned();
    DynamicProperty::read_only(name, ValueType::Node, move || {
        Ok(node.with_child_slot(&slot_name, child.as_ref(), |slot| child.value(slot)))
    })
}

fn sub_model_seq<M, Msg>(
    node: &Arc<NodeInner<M, Msg>>,
    name: &str,
    child: &Arc<dyn ChildBinding<M, Msg>>,
) -> DynamicProperty
where
    M: Send + Sync + 'static,
    Msg: Send + 'static,
{
    let (read_node, read_child) = (Arc::clone(node), Arc::clone(child));
    let (index_node, index_child) = (Arc::clone(node), Arc::clone(child));
    let read_name = name.to_owned();
    let index_name = name.to_owned();
    DynamicProperty::read_only(name, ValueType::Nodes, move || {
        Ok(read_node.with_child_slot(&read_name, read_child.as_ref(), |slot| {
            read_child.value(slot)
        }))
    })
    .with_index_getter(move |index| {
        index_node.with_child_slot(&index_name, index_child.as_ref(), |slot| {
            let len = index_child.len(slot);
            let i = checked_index(&index_name, index, len)?;
            index_child
                .value_at(slot, i)
                .ok_or_else(|| out_of_range(&index_name, i64::try_from(i).unwrap_or(i64::MAX), len))
        })
    })
}

fn selected_item<M, Msg>(
    node: &Arc<NodeInner<M, Msg>>,
    name: &str,
    selection: &Arc<dyn SelectionBinding<M, Msg>>,
) -> Result<DynamicProperty>
where
    M: Send + Sync + 'static,
    Msg: Send + 'static,
{
    let seq_name = selection.seq_name().to_owned();
    let seq = match node.spec(&seq_name).map(|s| &s.data) {
        Some(BindingData::SubModelSeq(seq)) => Arc::clone(seq),
        _ => return Err(node.binding_not_found(&seq_name)),
    };

    let (read_node, read_seq, read_sel) =
        (Arc::clone(node), Arc::clone(&seq), Arc::clone(selection));
    let (write_node, write_seq, write_sel) = (Arc::clone(node), seq, Arc::clone(selection));
    let read_slot = seq_name.clone();
    let write_slot = seq_name;
    let prop = name.to_owned();
    Ok(DynamicProperty::read_write(
        name,
        ValueType::Node,
        move || {
            let model = read_node.current();
            Ok(read_node.with_child_slot(&read_slot, read_seq.as_ref(), |slot| {
                read_sel.get(&model, read_seq.as_ref(), slot)
            }))
        },
        move |value| {
            let model = write_node.current();
            let msg = write_node
                .with_child_slot(&write_slot, write_seq.as_ref(), |slot| {
                    write_sel.set(value, &model, write_seq.as_ref(), slot)
                })
                .map_err(|err| BindError::type_mismatch(&prop, err))?;
            tracing::trace!(path = %write_node.path, name = %prop, "dispatch.select");
            write_node.dispatch.call(msg);
            Ok(())
        },
    ))
}

fn checked_index(name: &str, index: &Value, len: usize) -> Result<usize> {
    let raw = index
        .as_int()
        .ok_or_else(|| BindError::type_mismatch(name, ValueTypeError::new(ValueType::Int, index)))?;
    usize::try_from(raw)
        .ok()
        .filter(|&i| i < len)
        .ok_or_else(|| out_of_range(name, raw, len))
}

fn out_of_range(name: &str, index: i64, len: usize) -> BindError {
    BindError::IndexOutOfRange {
        name: name.to_owned(),
        index,
        len,
    }
}
