#![forbid(unsafe_code)]

//! Page navigation collaborator.
//!
//! [`NavigationService`] is what model and command handlers see: navigate by
//! page name, move through history, save and restore history. It is an
//! opaque service; the adapter never calls it itself.
//!
//! [`FrameNavigator`] implements it over a host container ([`NavigableFrame`])
//! and a map from page names to the host's page type. Unknown names are
//! rejected before the host is touched. Host failures are reported to an
//! optional handler and returned; nothing is retried.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex};

use ahash::AHashMap;
use elmbind_core::Value;

use crate::lock;

/// Parameters handed to the destination page.
pub type NavigationParams = BTreeMap<String, Value>;

/// Error reported by a host container.
pub type FrameError = Box<dyn Error + Send + Sync>;

/// A host container that keeps its own navigation history.
pub trait NavigableFrame: Send {
    /// The host's page descriptor.
    type Page: Send + Sync;

    /// Show `page`. `Ok(false)` means the host declined without failing.
    fn navigate(
        &mut self,
        page: &Self::Page,
        params: Option<&NavigationParams>,
    ) -> Result<bool, FrameError>;

    fn go_back(&mut self);
    fn go_forward(&mut self);
    fn can_go_back(&self) -> bool;
    fn can_go_forward(&self) -> bool;
    fn back_stack_depth(&self) -> usize;
    fn cache_size(&self) -> usize;

    /// Serialized history.
    fn navigation_state(&self) -> String;
    fn set_navigation_state(&mut self, state: &str);
}

/// Navigation as seen by application code.
pub trait NavigationService: Send + Sync {
    fn navigate(&self, page: &str, params: Option<NavigationParams>)
    -> Result<bool, NavigationError>;
    fn go_back(&self);
    fn go_forward(&self);
    fn can_go_back(&self) -> bool;
    fn can_go_forward(&self) -> bool;
    fn back_stack_depth(&self) -> usize;
    fn cache_size(&self) -> usize;
    fn navigation_state(&self) -> String;
    fn set_navigation_state(&self, state: &str);
}

/// A host container refused to navigate.
#[derive(Debug, thiserror::Error)]
#[error("navigation to {page:?} failed: {source}")]
pub struct NavigationFailure {
    pub page: String,
    #[source]
    pub source: FrameError,
}

#[derive(Debug, thiserror::Error)]
pub enum NavigationError {
    #[error("unknown page: {name:?}")]
    UnknownPage { name: String },
    #[error(transparent)]
    Failed(#[from] NavigationFailure),
}

type FailureHandler = Arc<dyn Fn(&NavigationFailure) + Send + Sync>;

/// [`NavigationService`] over a [`NavigableFrame`] and a page map.
pub struct FrameNavigator<F: NavigableFrame> {
    frame: Mutex<F>,
    pages: AHashMap<String, F::Page>,
    on_failure: Option<FailureHandler>,
}

impl<F: NavigableFrame> FrameNavigator<F> {
    pub fn new(frame: F) -> Self {
        Self {
            frame: Mutex::new(frame),
            pages: AHashMap::new(),
            on_failure: None,
        }
    }

    /// Build from a page map.
    pub fn with_pages(frame: F, pages: impl IntoIterator<Item = (String, F::Page)>) -> Self {
        let mut navigator = Self::new(frame);
        navigator.pages.extend(pages);
        navigator
    }

    /// Register `page` under `name`. A later registration replaces an
    /// earlier one.
    #[must_use]
    pub fn with_page(mut self, name: impl Into<String>, page: F::Page) -> Self {
        self.pages.insert(name.into(), page);
        self
    }

    /// Called with every host failure before it is returned.
    #[must_use]
    pub fn with_failure_handler(
        mut self,
        handler: impl Fn(&NavigationFailure) + Send + Sync + 'static,
    ) -> Self {
        self.on_failure = Some(Arc::new(handler));
        self
    }

    #[must_use]
    pub fn has_page(&self, name: &str) -> bool {
        self.pages.contains_key(name)
    }

    /// Run `f` with the host container.
    pub fn with_frame<R>(&self, f: impl FnOnce(&mut F) -> R) -> R {
        f(&mut lock(&self.frame))
    }
}

impl<F: NavigableFrame> NavigationService for FrameNavigator<F> {
    fn navigate(
        &self,
        page: &str,
        params: Option<NavigationParams>,
    ) -> Result<bool, NavigationError> {
        let Some(target) = self.pages.get(page) else {
            tracing::warn!(page, "navigate: unknown page");
            return Err(NavigationError::UnknownPage {
                name: page.to_owned(),
            });
        };
        let outcome = lock(&self.frame).navigate(target, params.as_ref());
        match outcome {
            Ok(navigated) => {
                tracing::debug!(page, navigated, "navigate");
                Ok(navigated)
            }
            Err(source) => {
                let failure = NavigationFailure {
                    page: page.to_owned(),
                    source,
                };
                tracing::warn!(page, error = %failure.source, "navigate failed");
                if let Some(handler) = &self.on_failure {
                    handler(&failure);
                }
                Err(failure.into())
            }
        }
    }

    fn go_back(&self) {
        lock(&self.frame).go_back();
    }

    fn go_forward(&self) {
        lock(&self.frame).go_forward();
    }

    fn can_go_back(&self) -> bool {
        lock(&self.frame).can_go_back()
    }

    fn can_go_forward(&self) -> bool {
        lock(&self.frame).can_go_forward()
    }

    fn back_stack_depth(&self) -> usize {
        lock(&self.frame).back_stack_depth()
    }

    fn cache_size(&self) -> usize {
        lock(&self.frame).cache_size()
    }

    fn navigation_state(&self) -> String {
        lock(&self.frame).navigation_state()
    }

    fn set_navigation_state(&self, state: &str) {
        lock(&self.frame).set_navigation_state(state);
    }
}

impl<F: NavigableFrame> fmt::Debug for FrameNavigator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pages: Vec<&str> = self.pages.keys().map(String::as_str).collect();
        pages.sort_unstable();
        f.debug_struct("FrameNavigator")
            .field("pages", &pages)
            .field("on_failure", &self.on_failure.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// History as a list of page ids with a cursor.
    #[derive(Default)]
    struct TestFrame {
        history: Vec<&'static str>,
        cursor: usize,
        last_params: Option<NavigationParams>,
        refuse: bool,
    }

    impl NavigableFrame for TestFrame {
        type Page = &'static str;

        fn navigate(
            &mut self,
            page: &&'static str,
            params: Option<&NavigationParams>,
        ) -> Result<bool, FrameError> {
            if *page == "broken" {
                return Err("page constructor failed".into());
            }
            if self.refuse {
                return Ok(false);
            }
            self.history.truncate(self.cursor);
            self.history.push(*page);
            self.cursor = self.history.len();
            self.last_params = params.cloned();
            Ok(true)
        }

        fn go_back(&mut self) {
            if self.can_go_back() {
                self.cursor -= 1;
            }
        }

        fn go_forward(&mut self) {
            if self.can_go_forward() {
                self.cursor += 1;
            }
        }

        fn can_go_back(&self) -> bool {
            self.cursor > 1
        }

        fn can_go_forward(&self) -> bool {
            self.cursor < self.history.len()
        }

        fn back_stack_depth(&self) -> usize {
            self.cursor.saturating_sub(1)
        }

        fn cache_size(&self) -> usize {
            10
        }

        fn navigation_state(&self) -> String {
            format!("{}@{}", self.history.join(","), self.cursor)
        }

        fn set_navigation_state(&mut self, state: &str) {
            self.cursor = state
                .rsplit_once('@')
                .and_then(|(_, c)| c.parse().ok())
                .unwrap_or(0)
                .min(self.history.len());
        }
    }

    fn navigator() -> FrameNavigator<TestFrame> {
        FrameNavigator::new(TestFrame::default())
            .with_page("Home", "home-page")
            .with_page("Detail", "detail-page")
            .with_page("Broken", "broken")
    }

    #[test]
    fn navigates_by_name_and_walks_history() {
        let nav = navigator();
        assert!(nav.navigate("Home", None).unwrap());
        assert!(nav.navigate("Detail", None).unwrap());
        assert!(nav.can_go_back());
        assert!(!nav.can_go_forward());
        assert_eq!(nav.back_stack_depth(), 1);

        nav.go_back();
        assert!(nav.can_go_forward());
        assert_eq!(nav.back_stack_depth(), 0);
        nav.go_forward();
        assert_eq!(nav.navigation_state(), "home-page,detail-page@2");
        assert_eq!(nav.cache_size(), 10);
    }

    #[test]
    fn params_reach_the_frame() {
        let nav = navigator();
        let params = NavigationParams::from([("id".to_owned(), Value::Int(4))]);
        nav.navigate("Detail", Some(params)).unwrap();
        let seen = nav.with_frame(|f| f.last_params.clone()).unwrap();
        assert_eq!(seen.get("id"), Some(&Value::Int(4)));
    }

    #[test]
    fn unknown_page_does_not_touch_the_frame() {
        let nav = navigator();
        let err = nav.navigate("Nowhere", None).unwrap_err();
        assert!(matches!(err, NavigationError::UnknownPage { ref name } if name == "Nowhere"));
        assert_eq!(nav.navigation_state(), "@0");
    }

    #[test]
    fn host_failure_reaches_handler_once_and_is_returned() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let nav = navigator().with_failure_handler(move |failure| {
            s.lock().unwrap().push(failure.to_string());
        });
        let err = nav.navigate("Broken", None).unwrap_err();
        assert!(matches!(err, NavigationError::Failed(_)));
        assert!(err.source().is_some());
        assert_eq!(
            *seen.lock().unwrap(),
            vec![r#"navigation to "Broken" failed: page constructor failed"#.to_owned()]
        );
    }

    #[test]
    fn declined_navigation_is_not_an_error() {
        let nav = FrameNavigator::with_pages(
            TestFrame {
                refuse: true,
                ..TestFrame::default()
            },
            [("Home".to_owned(), "home-page")],
        );
        assert!(!nav.navigate("Home", None).unwrap());
        assert!(nav.has_page("Home"));
    }

    #[test]
    fn state_round_trips_through_the_service() {
        let nav = navigator();
        nav.navigate("Home", None).unwrap();
        nav.navigate("Detail", None).unwrap();
        nav.set_navigation_state("home-page,detail-page@1");
        assert!(nav.can_go_forward());
        assert!(!nav.can_go_back());
    }

    #[test]
    fn debug_lists_pages_sorted() {
        assert_eq!(
            format!("{:?}", navigator()),
            r#"FrameNavigator { pages: ["Broken", "Detail", "Home"], on_failure: false, .. }"#
        );
    }
}
