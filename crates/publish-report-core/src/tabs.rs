//! Viewer tab state machine.
//!
//! [`TabController`] holds the report items of one viewer session and the
//! current [`TabState`]. Its methods are pure transitions: they never perform
//! I/O. When a transition needs content it returns [`Selection::Fetch`], the
//! caller retrieves the content (see [`crate::cache`]) and reports the
//! outcome back through [`TabController::apply_fetch`]. While a fetch is
//! outstanding the state is [`TabState::Loading`] and further selections are
//! ignored, so at most one fetch is in flight per session.
//!
//! ```text
//!            catalog ok (>=1) + fetch ok          select(k)
//! Loading ─────────────────────────────▶ Ready(k) ─────────▶ Loading ──▶ Ready(k)
//!    │  catalog ok (0)   ──▶ Empty                              │
//!    │  catalog failed   ──▶ Error          fetch failed ◀──────┘
//!    └─ first fetch failed ─▶ Error ──── select(k) ──▶ Loading ...
//! ```
//!
//! [`ReportSession`] drives the controller sequentially against an
//! [`AttachmentStore`] for callers that do not need to interleave requests.

use crate::cache::fetch_content;
use crate::catalog::build_catalog;
use crate::error::ReportError;
use crate::models::{Environment, ItemKey, ReportItem};
use crate::store::AttachmentStore;

/// Message shown when the run has no published reports.
pub const EMPTY_MESSAGE: &str = "no report found";

/// Viewer state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabState {
    Loading,
    Ready(ItemKey),
    Empty(String),
    Error(String),
}

/// Outcome of a transition that may need content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Nothing to do: the controller is not accepting selections or the key
    /// is unknown.
    Ignored,
    /// The item already held content; the controller is `Ready` again.
    Cached,
    /// The controller is `Loading`; fetch this item's content and call
    /// [`TabController::apply_fetch`].
    Fetch(ReportItem),
}

/// Tab state plus the items of one viewer session.
#[derive(Debug, Clone)]
pub struct TabController {
    state: TabState,
    items: Vec<ReportItem>,
    pending: Option<ItemKey>,
}

impl TabController {
    pub fn new() -> Self {
        Self {
            state: TabState::Loading,
            items: Vec::new(),
            pending: None,
        }
    }

    pub fn state(&self) -> &TabState {
        &self.state
    }

    pub fn items(&self) -> &[ReportItem] {
        &self.items
    }

    pub fn item(&self, key: &ItemKey) -> Option<&ReportItem> {
        self.items.iter().find(|i| &i.key == key)
    }

    /// The item whose content is on display, when `Ready`.
    pub fn selected_item(&self) -> Option<&ReportItem> {
        match &self.state {
            TabState::Ready(key) => self.item(key),
            _ => None,
        }
    }

    /// Key of the item being fetched, if any.
    pub fn pending(&self) -> Option<&ItemKey> {
        self.pending.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.state == TabState::Loading
    }

    /// The catalog call returned `items`.
    ///
    /// An empty catalog moves to `Empty`. Otherwise the first item becomes
    /// the pending selection.
    pub fn catalog_loaded(&mut self, items: Vec<ReportItem>) -> Selection {
        self.items = items;
        self.pending = None;
        match self.items.first().map(|i| i.key.clone()) {
            None => {
                self.state = TabState::Empty(EMPTY_MESSAGE.to_string());
                Selection::Ignored
            }
            Some(first) => {
                self.state = TabState::Loading;
                self.begin(first)
            }
        }
    }

    /// The catalog call failed.
    pub fn catalog_failed(&mut self, err: &ReportError) {
        self.items.clear();
        self.pending = None;
        self.state = TabState::Error(err.message().to_string());
    }

    /// The user picked the tab with `key`.
    ///
    /// Accepted from `Ready` and from `Error` when there are items to show
    /// (retrying a failed fetch); ignored while `Loading` or `Empty`.
    pub fn select(&mut self, key: &ItemKey) -> Selection {
        let accepting = matches!(self.state, TabState::Ready(_) | TabState::Error(_));
        if !accepting || self.pending.is_some() {
            return Selection::Ignored;
        }
        if self.item(key).is_none() {
            tracing::warn!(key = %key, "selection of unknown report ignored");
            return Selection::Ignored;
        }
        self.state = TabState::Loading;
        self.begin(key.clone())
    }

    /// Record the outcome of the fetch requested by the last [`Selection::Fetch`].
    ///
    /// Returns `false` (and changes nothing) if `key` is not the pending one.
    pub fn apply_fetch(&mut self, key: &ItemKey, result: Result<String, ReportError>) -> bool {
        if self.pending.as_ref() != Some(key) {
            return false;
        }
        self.pending = None;
        match result {
            Ok(content) => {
                if let Some(item) = self.items.iter_mut().find(|i| &i.key == key) {
                    if !item.has_content() {
                        item.content = Some(content);
                    }
                }
                self.state = TabState::Ready(key.clone());
            }
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "report fetch failed");
                self.state = TabState::Error(err.message().to_string());
            }
        }
        true
    }

    fn begin(&mut self, key: ItemKey) -> Selection {
        match self.item(&key) {
            Some(item) if item.has_content() => {
                self.state = TabState::Ready(key);
                Selection::Cached
            }
            Some(item) => {
                let item = item.clone();
                self.pending = Some(key);
                Selection::Fetch(item)
            }
            None => Selection::Ignored,
        }
    }
}

impl Default for TabController {
    fn default() -> Self {
        Self::new()
    }
}

/// Sequential driver for one viewer session.
pub struct ReportSession<S> {
    store: S,
    env: Environment,
    controller: TabController,
}

impl<S: AttachmentStore> ReportSession<S> {
    pub fn new(store: S, env: Environment) -> Self {
        Self {
            store,
            env,
            controller: TabController::new(),
        }
    }

    pub fn controller(&self) -> &TabController {
        &self.controller
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Build the catalog and load the first report.
    pub async fn start(&mut self) -> &TabState {
        match build_catalog(&self.store, &self.env).await {
            Ok(items) => {
                tracing::info!(count = items.len(), run = %self.env.name, "report catalog loaded");
                let selection = self.controller.catalog_loaded(items);
                self.run(selection).await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "report catalog failed");
                self.controller.catalog_failed(&err);
            }
        }
        self.controller.state()
    }

    /// Select a tab, fetching its content if it has none yet.
    pub async fn select(&mut self, key: &ItemKey) -> &TabState {
        let selection = self.controller.select(key);
        self.run(selection).await;
        self.controller.state()
    }

    async fn run(&mut self, selection: Selection) {
        if let Selection::Fetch(item) = selection {
            let result = fetch_content(&self.store, &self.env, &item).await;
            self.controller.apply_fetch(&item.key, result);
        }
    }
}
