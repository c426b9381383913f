#![forbid(unsafe_code)]

//! Paged collections that follow the model.
//!
//! An [`IncrementalCollection`] is what a paged one-way sequence binding hands
//! to the UI toolkit. The toolkit asks whether more items exist and, if so,
//! requests a page; the collection turns that request into a "load more"
//! message for the application loop and resumes once the loop reports the
//! page as loaded through a [`LoadCompletion`].
//!
//! # Invariants
//!
//! 1. `has_more` and the item source are evaluated against the latest model
//!    each time they are called, never against a captured snapshot.
//! 2. The load function is never called while `has_more()` is false.
//! 3. At most one load is in flight at a time.
//! 4. After [`refresh`](IncrementalCollection::refresh) the loaded items equal
//!    the source: changed positions are replaced in place, new items are
//!    appended and a shorter source truncates.
//! 5. A completion takes effect once. Later calls are ignored. It ends the
//!    load and reports how many items were added since the request.
//!
//! # Failure Modes
//!
//! - **Completion never called**: the collection stays in the loading state
//!   and refuses further loads. Nothing times out.
//! - **Completion before the model is published**: the load ends at once,
//!   but the [`LoadMore`] ticket resolves on the next refresh so it counts
//!   the page that refresh brings in.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, Weak};

use web_time::Duration;

use crate::error::LoadError;
use crate::lock;
use crate::value::Value;

type Source = Box<dyn Fn() -> Vec<Value> + Send + Sync>;
type HasMore = Box<dyn Fn() -> bool + Send + Sync>;
type LoadFn = Box<dyn Fn(u32, LoadCompletion) + Send + Sync>;

struct CollectionInner {
    items: Mutex<Vec<Value>>,
    source: Source,
    has_more: HasMore,
    load: LoadFn,
    loading: AtomicBool,
    version: AtomicU64,
    /// Ticket of a load that ended before its page reached the source.
    parked: Mutex<Option<Parked>>,
}

struct Parked {
    requested_at: usize,
    tx: mpsc::SyncSender<u32>,
}

impl Parked {
    fn resolve(self, len: usize) {
        let _ = self.tx.try_send(added_since(self.requested_at, len));
    }
}

fn added_since(requested_at: usize, len: usize) -> u32 {
    u32::try_from(len.saturating_sub(requested_at)).unwrap_or(u32::MAX)
}

impl CollectionInner {
    /// Make the loaded items equal the source. Returns whether anything changed.
    fn reconcile(&self) -> bool {
        let fresh = (self.source)();
        let mut items = lock(&self.items);
        let mut changed = false;
        if fresh.len() < items.len() {
            items.truncate(fresh.len());
            changed = true;
        }
        let kept = items.len();
        let mut fresh = fresh.into_iter();
        for (slot, value) in items.iter_mut().zip(fresh.by_ref()) {
            if *slot != value {
                *slot = value;
                changed = true;
            }
        }
        items.extend(fresh);
        changed |= items.len() > kept;
        if changed {
            self.version.fetch_add(1, Ordering::Release);
        }
        let len = items.len();
        drop(items);
        if let Some(parked) = lock(&self.parked).take() {
            parked.resolve(len);
        }
        changed
    }
}

/// A lazily paged sequence of values.
///
/// Cloning creates a new handle to the same collection.
#[derive(Clone)]
pub struct IncrementalCollection {
    inner: Arc<CollectionInner>,
}

impl IncrementalCollection {
    /// Create a collection seeded with the current source contents.
    ///
    /// - `source` returns the full sequence held by the latest model.
    /// - `has_more` asks the latest model whether another page exists.
    /// - `load` is asked to fetch `count` more items and must eventually call
    ///   the completion it is handed.
    pub fn new(
        source: impl Fn() -> Vec<Value> + Send + Sync + 'static,
        has_more: impl Fn() -> bool + Send + Sync + 'static,
        load: impl Fn(u32, LoadCompletion) + Send + Sync + 'static,
    ) -> Self {
        let items = source();
        Self {
            inner: Arc::new(CollectionInner {
                items: Mutex::new(items),
                source: Box::new(source),
                has_more: Box::new(has_more),
                load: Box::new(load),
                loading: AtomicBool::new(false),
                version: AtomicU64::new(0),
                parked: Mutex::new(None),
            }),
        }
    }

    /// Snapshot of the loaded items.
    #[must_use]
    pub fn items(&self) -> Vec<Value> {
        lock(&self.inner.items).clone()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        lock(&self.inner.items).get(index).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.inner.items).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ask the latest model whether another page exists.
    #[must_use]
    pub fn has_more_items(&self) -> bool {
        (self.inner.has_more)()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.inner.loading.load(Ordering::Acquire)
    }

    /// Bumped on every change to the loaded items.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    /// Request `count` more items.
    ///
    /// Returns a [`LoadMore`] ticket that resolves with the number of items
    /// added since this call once the application ends the load.
    pub fn load_more_items(&self, count: u32) -> Result<LoadMore, LoadError> {
        if !self.has_more_items() {
            return Err(LoadError::NoMoreItems);
        }
        if self
            .inner
            .loading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(LoadError::AlreadyLoading);
        }
        let (tx, rx) = mpsc::sync_channel(1);
        let completion = LoadCompletion {
            inner: Arc::new(CompletionInner {
                fired: AtomicBool::new(false),
                requested_at: self.len(),
                collection: Arc::downgrade(&self.inner),
                tx: Mutex::new(Some(tx)),
            }),
        };
        tracing::debug!(count, "collection.load_more");
        (self.inner.load)(count, completion);
        Ok(LoadMore { rx })
    }

    /// Reconcile loaded items with the latest model.
    ///
    /// Called on every model update. Returns whether the items changed.
    pub fn refresh(&self) -> bool {
        self.inner.reconcile()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for IncrementalCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncrementalCollection")
            .field("len", &self.len())
            .field("loading", &self.is_loading())
            .field("version", &self.version())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// LoadCompletion / LoadMore
// ---------------------------------------------------------------------------

struct CompletionInner {
    fired: AtomicBool,
    requested_at: usize,
    collection: Weak<CollectionInner>,
    tx: Mutex<Option<mpsc::SyncSender<u32>>>,
}

/// Callback the application invokes once a requested page is in the model.
///
/// Carried inside "load more" messages, so it is cloneable, comparable by
/// identity and printable.
#[derive(Clone)]
pub struct LoadCompletion {
    inner: Arc<CompletionInner>,
}

impl LoadCompletion {
    /// End the load. Returns the number of items added since the request, or
    /// `None` if this completion already fired or its collection is gone.
    ///
    /// The collection is reconciled with the source first, so a model that
    /// already holds the page is counted even before the node update. If
    /// nothing was added yet, the ticket waits for the next refresh.
    pub fn complete(&self) -> Option<u32> {
        if self.inner.fired.swap(true, Ordering::AcqRel) {
            return None;
        }
        let collection = self.inner.collection.upgrade()?;
        collection.reconcile();
        let len = lock(&collection.items).len();
        let requested_at = self.inner.requested_at;
        let appended = added_since(requested_at, len);
        collection.loading.store(false, Ordering::Release);
        if let Some(tx) = lock(&self.inner.tx).take() {
            let ticket = Parked { requested_at, tx };
            if appended > 0 {
                ticket.resolve(len);
            } else if let Some(earlier) = lock(&collection.parked).replace(ticket) {
                earlier.resolve(len);
            }
        }
        tracing::debug!(appended, "collection.load_complete");
        Some(appended)
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }
}

impl PartialEq for LoadCompletion {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for LoadCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadCompletion")
            .field("complete", &self.is_complete())
            .finish()
    }
}

/// Ticket for an in-flight page load.
#[derive(Debug)]
pub struct LoadMore {
    rx: mpsc::Receiver<u32>,
}

impl LoadMore {
    /// Number of items added since the request, if the load has completed.
    #[must_use]
    pub fn try_result(&self) -> Option<u32> {
        self.rx.try_recv().ok()
    }

    /// Block up to `timeout` for the load to complete.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> Option<u32> {
        self.rx.recv_timeout(timeout).ok()
    }
}
