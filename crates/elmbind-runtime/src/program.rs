#![forbid(unsafe_code)]

//! Reference application loop.
//!
//! A [`Program`] bundles `init`, `update` and `view` with two integration
//! hooks:
//!
//! - `set_state(model, dispatch)`: called after every state transition.
//! - `sync_dispatch(inner) -> wrapped`: produces the dispatch handed to the
//!   rest of the program (for marshaling onto a UI thread).
//!
//! [`run`] starts the loop and returns a [`LoopHandle`].
//!
//! # Invariants
//!
//! 1. Messages are processed one at a time, in arrival order (FIFO mailbox).
//! 2. A message dispatched while another is being processed is queued, never
//!    processed re-entrantly.
//! 3. `set_state` sees every model the loop produces, before the commands
//!    returned with that model run.
//!
//! # Failure Modes
//!
//! - **Handle dropped**: the dispatch keeps only a weak reference to the
//!   loop, so messages sent after the handle is gone are dropped.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use arc_swap::ArcSwap;
use elmbind_core::Dispatch;

use crate::binding::BindingSpec;
use crate::lock;

type Effect<Msg> = Box<dyn FnOnce(&Dispatch<Msg>) + Send>;

/// Side effects returned by `init` and `update`.
pub struct Cmd<Msg> {
    effects: Vec<Effect<Msg>>,
}

impl<Msg: Send + 'static> Cmd<Msg> {
    #[must_use]
    pub fn none() -> Self {
        Self {
            effects: Vec::new(),
        }
    }

    /// Dispatch `msg` once the new state is published.
    #[must_use]
    pub fn of_msg(msg: Msg) -> Self {
        Self::of_effect(move |dispatch| dispatch.call(msg))
    }

    /// Run `effect` with the program's dispatch.
    #[must_use]
    pub fn of_effect(effect: impl FnOnce(&Dispatch<Msg>) + Send + 'static) -> Self {
        Self {
            effects: vec![Box::new(effect)],
        }
    }

    #[must_use]
    pub fn batch(cmds: impl IntoIterator<Item = Cmd<Msg>>) -> Self {
        Self {
            effects: cmds.into_iter().flat_map(|c| c.effects).collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    fn execute(self, dispatch: &Dispatch<Msg>) {
        for effect in self.effects {
            effect(dispatch);
        }
    }
}

impl<Msg> fmt::Debug for Cmd<Msg> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cmd")
            .field("effects", &self.effects.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Program
// ---------------------------------------------------------------------------

type Init<M, Msg> = Box<dyn FnOnce() -> (M, Cmd<Msg>) + Send>;
type Update<M, Msg> = Arc<dyn Fn(Msg, &M) -> (M, Cmd<Msg>) + Send + Sync>;
/// Builds a node's binding table from its model.
pub type ViewFn<M, Msg> = Arc<dyn Fn(&M) -> Vec<BindingSpec<M, Msg>> + Send + Sync>;
type SetState<M, Msg> = Arc<dyn Fn(Arc<M>, &Dispatch<Msg>) + Send + Sync>;
type SyncDispatch<Msg> = Arc<dyn Fn(Dispatch<Msg>) -> Dispatch<Msg> + Send + Sync>;

pub struct Program<M, Msg> {
    init: Init<M, Msg>,
    update: Update<M, Msg>,
    view: ViewFn<M, Msg>,
    set_state: SetState<M, Msg>,
    sync_dispatch: SyncDispatch<Msg>,
}

impl<M, Msg> Program<M, Msg>
where
    M: Send + Sync + 'static,
    Msg: Send + 'static,
{
    pub fn new(
        init: impl FnOnce() -> (M, Cmd<Msg>) + Send + 'static,
        update: impl Fn(Msg, &M) -> (M, Cmd<Msg>) + Send + Sync + 'static,
        view: impl Fn(&M) -> Vec<BindingSpec<M, Msg>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            init: Box::new(init),
            update: Arc::new(update),
            view: Arc::new(view),
            set_state: Arc::new(|_, _| {}),
            sync_dispatch: Arc::new(|dispatch| dispatch),
        }
    }

    /// A program without commands.
    pub fn simple(
        init: impl FnOnce() -> M + Send + 'static,
        update: impl Fn(Msg, &M) -> M + Send + Sync + 'static,
        view: impl Fn(&M) -> Vec<BindingSpec<M, Msg>> + Send + Sync + 'static,
    ) -> Self {
        Self::new(
            move || (init(), Cmd::none()),
            move |msg, m: &M| (update(msg, m), Cmd::none()),
            view,
        )
    }

    #[must_use]
    pub fn with_set_state(
        mut self,
        set_state: impl Fn(Arc<M>, &Dispatch<Msg>) + Send + Sync + 'static,
    ) -> Self {
        self.set_state = Arc::new(set_state);
        self
    }

    #[must_use]
    pub fn with_sync_dispatch(
        mut self,
        sync: impl Fn(Dispatch<Msg>) -> Dispatch<Msg> + Send + Sync + 'static,
    ) -> Self {
        self.sync_dispatch = Arc::new(sync);
        self
    }

    /// The program's view function.
    #[must_use]
    pub fn view_fn(&self) -> ViewFn<M, Msg> {
        Arc::clone(&self.view)
    }
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

struct LoopCore<M, Msg> {
    model: ArcSwap<M>,
    mailbox: Mutex<VecDeque<Msg>>,
    processing: AtomicBool,
    update: Update<M, Msg>,
    set_state: SetState<M, Msg>,
    dispatch: OnceLock<Dispatch<Msg>>,
}

impl<M, Msg> LoopCore<M, Msg>
where
    M: Send + Sync + 'static,
    Msg: Send + 'static,
{
    fn enqueue(&self, msg: Msg) {
        lock(&self.mailbox).push_back(msg);
        self.drain();
    }

    fn drain(&self) {
        loop {
            if self.processing.swap(true, Ordering::AcqRel) {
                // Whoever holds the flag drains the mailbox.
                return;
            }
            loop {
                let next = lock(&self.mailbox).pop_front();
                let Some(msg) = next else { break };
                self.process(msg);
            }
            self.processing.store(false, Ordering::Release);
            if lock(&self.mailbox).is_empty() {
                return;
            }
        }
    }

    fn process(&self, msg: Msg) {
        let Some(dispatch) = self.dispatch.get() else {
            tracing::warn!("message received before the loop started; dropped");
            return;
        };
        let current = self.model.load_full();
        let (next, cmd) = (self.update)(msg, &current);
        let next = Arc::new(next);
        self.model.store(Arc::clone(&next));
        tracing::trace!(effects = cmd.effects.len(), "loop.update");
        (self.set_state)(next, dispatch);
        cmd.execute(dispatch);
    }
}

/// A running loop.
///
/// The loop lives as long as this handle.
pub struct LoopHandle<M, Msg> {
    core: Arc<LoopCore<M, Msg>>,
}

impl<M, Msg> LoopHandle<M, Msg>
where
    M: Send + Sync + 'static,
    Msg: Send + 'static,
{
    /// The dispatch given to `set_state` and commands.
    #[must_use]
    pub fn dispatch(&self) -> Dispatch<Msg> {
        self.core
            .dispatch
            .get()
            .cloned()
            .unwrap_or_else(Dispatch::noop)
    }

    /// The latest model.
    #[must_use]
    pub fn model(&self) -> Arc<M> {
        self.core.model.load_full()
    }
}

impl<M, Msg> fmt::Debug for LoopHandle<M, Msg> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopHandle")
            .field("processing", &self.core.processing.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

/// Start `program`: compute the initial model, publish it through
/// `set_state`, run the initial commands, and process messages from then on.
pub fn run<M, Msg>(program: Program<M, Msg>) -> LoopHandle<M, Msg>
where
    M: Send + Sync + 'static,
    Msg: Send + 'static,
{
    let Program {
        init,
        update,
        view: _,
        set_state,
        sync_dispatch,
    } = program;
    let (model, cmd) = init();
    let model = Arc::new(model);
    let core = Arc::new(LoopCore {
        model: ArcSwap::new(Arc::clone(&model)),
        mailbox: Mutex::new(VecDeque::new()),
        processing: AtomicBool::new(false),
        update,
        set_state: Arc::clone(&set_state),
        dispatch: OnceLock::new(),
    });

    let weak = Arc::downgrade(&core);
    let raw = Dispatch::new(move |msg: Msg| match weak.upgrade() {
        Some(core) => core.enqueue(msg),
        None => tracing::trace!("message dropped: loop stopped"),
    });
    let dispatch = core.dispatch.get_or_init(|| sync_dispatch(raw)).clone();

    tracing::debug!("loop.start");
    core.processing.store(true, Ordering::Release);
    set_state(model, &dispatch);
    cmd.execute(&dispatch);
    core.processing.store(false, Ordering::Release);
    core.drain();
    LoopHandle { core }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    enum Msg {
        Add(i64),
        Double,
        Echo(i64),
    }

    fn counter() -> Program<i64, Msg> {
        Program::new(
            || (1, Cmd::of_msg(Msg::Add(1))),
            |msg, m| match msg {
                Msg::Add(n) => (m + n, Cmd::none()),
                Msg::Double => (m * 2, Cmd::none()),
                Msg::Echo(n) => (*m, Cmd::of_msg(Msg::Add(n))),
            },
            |_| Vec::new(),
        )
    }

    #[test]
    fn init_command_runs_after_first_state() {
        let states = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&states);
        let handle = run(counter().with_set_state(move |m, _| s.lock().unwrap().push(*m)));
        assert_eq!(*states.lock().unwrap(), vec![1, 2]);
        assert_eq!(*handle.model(), 2);
    }

    #[test]
    fn messages_are_processed_in_order() {
        let handle = run(counter());
        let d = handle.dispatch();
        d.call(Msg::Add(3));
        d.call(Msg::Double);
        assert_eq!(*handle.model(), 10);
    }

    #[test]
    fn dispatch_from_set_state_is_queued_not_reentrant() {
        let depth = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let max_depth = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let (d, md) = (Arc::clone(&depth), Arc::clone(&max_depth));
        let program = counter().with_set_state(move |m, dispatch| {
            let now = d.fetch_add(1, Ordering::SeqCst) + 1;
            md.fetch_max(now, Ordering::SeqCst);
            if *m < 20 {
                dispatch.call(Msg::Double);
            }
            d.fetch_sub(1, Ordering::SeqCst);
        });
        let handle = run(program);
        // 1 -> Double -> 2 -> Add(1) from init -> 3 -> 6 -> 12 -> 24 -> 48
        assert_eq!(*handle.model(), 48);
        assert_eq!(max_depth.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn commands_feed_back_into_the_loop() {
        let handle = run(counter());
        handle.dispatch().call(Msg::Echo(5));
        assert_eq!(*handle.model(), 7);
    }

    #[test]
    fn sync_dispatch_wraps_every_message() {
        let wrapped = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let w = Arc::clone(&wrapped);
        let program = counter().with_sync_dispatch(move |inner| {
            let w = Arc::clone(&w);
            Dispatch::new(move |msg| {
                w.fetch_add(1, Ordering::SeqCst);
                inner.call(msg);
            })
        });
        let handle = run(program);
        handle.dispatch().call(Msg::Double);
        assert_eq!(wrapped.load(Ordering::SeqCst), 2, "init command and one call");
        assert_eq!(*handle.model(), 4);
    }

    #[test]
    fn dispatch_after_handle_dropped_is_ignored() {
        let handle = run(counter());
        let d = handle.dispatch();
        drop(handle);
        d.call(Msg::Add(1));
    }

    #[test]
    fn batch_keeps_effect_order() {
        let cmd: Cmd<Msg> = Cmd::batch([
            Cmd::of_msg(Msg::Add(1)),
            Cmd::none(),
            Cmd::of_msg(Msg::Double),
        ]);
        assert!(!cmd.is_empty());
        assert_eq!(format!("{cmd:?}"), "Cmd { effects: 2 }");
        let handle = run(Program::simple(
            || 0,
            |msg, m: &i64| match msg {
                Msg::Add(n) => m + n,
                Msg::Double => m * 2,
                Msg::Echo(_) => *m,
            },
            |_| Vec::new(),
        ));
        assert_eq!(*handle.model(), 0);
        let handle = run(Program::new(
            move || (0, cmd),
            |msg, m: &i64| match msg {
                Msg::Add(n) => (m + n, Cmd::none()),
                Msg::Double => (m * 2, Cmd::none()),
                Msg::Echo(_) => (*m, Cmd::none()),
            },
            |_| Vec::new(),
        ));
        assert_eq!(*handle.model(), 2);
    }
}
