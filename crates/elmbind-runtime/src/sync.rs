#![forbid(unsafe_code)]

//! Dispatch marshaling onto the UI thread.
//!
//! The application loop must run its update on one consistent thread, while
//! UI events and timers may originate anywhere. [`DispatchSynchronizer`]
//! wraps a dispatch so that each call posts a job to the UI context and
//! returns immediately; the wrapped dispatch runs inside that job.

use elmbind_core::Dispatch;

use crate::ui::UiDispatcher;

#[derive(Debug, Clone)]
pub struct DispatchSynchronizer {
    ui: UiDispatcher,
}

impl DispatchSynchronizer {
    #[must_use]
    pub fn new(ui: UiDispatcher) -> Self {
        Self { ui }
    }

    /// Wrap `inner` so every message reaches it on the UI thread.
    ///
    /// Messages sent from one thread arrive in the order they were sent.
    /// A message sent after the UI context is gone is dropped.
    pub fn wrap<Msg: Send + 'static>(&self, inner: Dispatch<Msg>) -> Dispatch<Msg> {
        let ui = self.ui.clone();
        Dispatch::new(move |msg: Msg| {
            let inner = inner.clone();
            if !ui.post(move || inner.call(msg)) {
                tracing::trace!(
                    msg = std::any::type_name::<Msg>(),
                    "dispatch dropped: ui context gone"
                );
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::{UiPump, UiThread};
    use std::sync::{Arc, Mutex, mpsc};
    use std::time::Duration;

    #[test]
    fn wrapped_dispatch_waits_for_pump() {
        let pump = UiPump::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let synced =
            DispatchSynchronizer::new(pump.dispatcher()).wrap(Dispatch::new(move |m: u8| {
                s.lock().unwrap().push(m);
            }));
        synced.call(1);
        synced.call(2);
        assert!(seen.lock().unwrap().is_empty(), "nothing runs before the pump");
        pump.run_pending();
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn messages_from_worker_arrive_in_order_on_ui_thread() {
        let ui_thread = UiThread::start("elmbind-sync-test").unwrap();
        let ui = ui_thread.dispatcher();
        let (tx, rx) = mpsc::channel();
        let probe = ui.clone();
        let inner = Dispatch::new(move |m: u32| {
            tx.send((m, probe.is_ui_thread())).unwrap();
        });
        let synced = DispatchSynchronizer::new(ui).wrap(inner);
        let worker = std::thread::spawn(move || {
            for m in 0..50 {
                synced.call(m);
            }
        });
        worker.join().unwrap();
        let received: Vec<(u32, bool)> = (0..50)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert!(received.iter().all(|(_, affine)| *affine));
        assert_eq!(
            received.iter().map(|(m, _)| *m).collect::<Vec<_>>(),
            (0..50).collect::<Vec<_>>()
        );
        ui_thread.shutdown();
    }
}
