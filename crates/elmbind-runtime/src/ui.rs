#![forbid(unsafe_code)]

//! UI-affine execution context.
//!
//! All view-model state is owned by one thread. Other threads reach it by
//! posting jobs through a [`UiDispatcher`]; a single consumer runs them in
//! post order. Two consumers exist:
//!
//! - [`UiPump`]: the host owns the event loop and drains the queue itself
//!   (`run_pending` once per iteration).
//! - [`UiThread`]: a dedicated named thread that runs jobs as they arrive.
//!
//! # Ordering
//!
//! Jobs posted from one thread run in the order they were posted. There is
//! no ordering across posting threads beyond the channel's own.
//!
//! # Teardown
//!
//! Posting is fire-and-forget. Once the consumer is gone, posts return
//! `false` and the job is dropped without running. [`UiThread::shutdown`]
//! runs every job posted before it, then joins.

use std::io;
use std::sync::mpsc;
use std::thread::{self, JoinHandle, ThreadId};

type Job = Box<dyn FnOnce() + Send>;

enum UiMsg {
    Run(Job),
    Shutdown,
}

/// Posts jobs to the UI-affine context.
#[derive(Clone)]
pub struct UiDispatcher {
    tx: mpsc::Sender<UiMsg>,
    ui_thread: ThreadId,
}

impl UiDispatcher {
    /// Queue `job` to run on the UI thread. Returns `false` if the context
    /// has been torn down; the job is dropped in that case.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) -> bool {
        match self.tx.send(UiMsg::Run(Box::new(job))) {
            Ok(()) => true,
            Err(_) => {
                tracing::trace!("ui.post dropped: context torn down");
                false
            }
        }
    }

    /// Whether the calling thread is the UI thread.
    #[must_use]
    pub fn is_ui_thread(&self) -> bool {
        thread::current().id() == self.ui_thread
    }
}

impl std::fmt::Debug for UiDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiDispatcher")
            .field("ui_thread", &self.ui_thread)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// UiPump
// ---------------------------------------------------------------------------

/// A UI queue drained by the host's own loop.
///
/// The thread that creates the pump is the UI thread.
pub struct UiPump {
    dispatcher: UiDispatcher,
    rx: mpsc::Receiver<UiMsg>,
}

impl UiPump {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            dispatcher: UiDispatcher {
                tx,
                ui_thread: thread::current().id(),
            },
            rx,
        }
    }

    #[must_use]
    pub fn dispatcher(&self) -> UiDispatcher {
        self.dispatcher.clone()
    }

    /// Run the jobs queued at call time, in order. Jobs they post are left
    /// for the next call. Returns the number of jobs run.
    pub fn run_pending(&self) -> usize {
        let jobs: Vec<Job> = self
            .rx
            .try_iter()
            .filter_map(|msg| match msg {
                UiMsg::Run(job) => Some(job),
                UiMsg::Shutdown => None,
            })
            .collect();
        let ran = jobs.len();
        for job in jobs {
            job();
        }
        ran
    }

    /// Run jobs until the queue stays empty. Returns the total run.
    pub fn run_until_idle(&self) -> usize {
        let mut total = 0;
        loop {
            let ran = self.run_pending();
            if ran == 0 {
                return total;
            }
            total += ran;
        }
    }
}

impl Default for UiPump {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// UiThread
// ---------------------------------------------------------------------------

/// A dedicated UI thread.
pub struct UiThread {
    dispatcher: UiDispatcher,
    handle: Option<JoinHandle<()>>,
}

impl UiThread {
    /// Spawn the UI thread under `name`.
    pub fn start(name: impl Into<String>) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel::<UiMsg>();
        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || ui_loop(&rx))?;
        let ui_thread = handle.thread().id();
        Ok(Self {
            dispatcher: UiDispatcher { tx, ui_thread },
            handle: Some(handle),
        })
    }

    #[must_use]
    pub fn dispatcher(&self) -> UiDispatcher {
        self.dispatcher.clone()
    }

    /// Run everything posted so far, then stop the thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.dispatcher.tx.send(UiMsg::Shutdown);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::warn!("ui thread panicked");
        }
    }
}

impl Drop for UiThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn ui_loop(rx: &mpsc::Receiver<UiMsg>) {
    while let Ok(msg) = rx.recv() {
        match msg {
            UiMsg::Run(job) => job(),
            UiMsg::Shutdown => break,
        }
    }
    tracing::trace!("ui thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[test]
    fn pump_runs_jobs_in_post_order() {
        let pump = UiPump::new();
        let ui = pump.dispatcher();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let s = Arc::clone(&seen);
            assert!(ui.post(move || s.lock().unwrap().push(i)));
        }
        assert_eq!(pump.run_pending(), 5);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(pump.run_pending(), 0);
    }

    #[test]
    fn jobs_posted_while_running_wait_for_next_pass() {
        let pump = UiPump::new();
        let ui = pump.dispatcher();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (s, inner_ui) = (Arc::clone(&seen), ui.clone());
        ui.post(move || {
            s.lock().unwrap().push("outer");
            let s = Arc::clone(&s);
            inner_ui.post(move || s.lock().unwrap().push("inner"));
        });
        assert_eq!(pump.run_pending(), 1);
        assert_eq!(*seen.lock().unwrap(), vec!["outer"]);
        assert_eq!(pump.run_until_idle(), 1);
        assert_eq!(*seen.lock().unwrap(), vec!["outer", "inner"]);
    }

    #[test]
    fn pump_affinity_is_creating_thread() {
        let pump = UiPump::new();
        let ui = pump.dispatcher();
        assert!(ui.is_ui_thread());
        let other = std::thread::spawn(move || ui.is_ui_thread());
        assert!(!other.join().unwrap());
    }

    #[test]
    fn post_after_pump_dropped_is_rejected() {
        let pump = UiPump::new();
        let ui = pump.dispatcher();
        drop(pump);
        assert!(!ui.post(|| panic!("must not run")));
    }

    #[test]
    fn thread_runs_jobs_on_itself() {
        let ui_thread = UiThread::start("elmbind-ui-test").unwrap();
        let ui = ui_thread.dispatcher();
        let (tx, rx) = mpsc::channel();
        let probe = ui.clone();
        ui.post(move || {
            let name = thread::current().name().map(str::to_owned);
            tx.send((name, probe.is_ui_thread())).unwrap();
        });
        let (name, affine) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("elmbind-ui-test"));
        assert!(affine);
        assert!(!ui.is_ui_thread());
    }

    #[test]
    fn shutdown_drains_earlier_posts_and_drops_later_ones() {
        let ui_thread = UiThread::start("elmbind-ui-drain").unwrap();
        let ui = ui_thread.dispatcher();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..20 {
            let s = Arc::clone(&seen);
            ui.post(move || {
                std::thread::sleep(Duration::from_millis(1));
                s.lock().unwrap().push(i);
            });
        }
        ui_thread.shutdown();
        assert_eq!(*seen.lock().unwrap(), (0..20).collect::<Vec<_>>());
        assert!(!ui.post(|| panic!("must not run")));
    }
}
