use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::browser::PageContext;
use crate::models::{SearchSettings, SessionId, StoreId, StoreResult};

pub struct TrackedContext {
    pub handle: Arc<dyn PageContext>,
    pub close_on_completion: bool,
}

/// State of one search, from request to publication. Superseded by the
/// next search; only one session is live at a time.
pub struct SearchSession {
    pub id: SessionId,
    pub term: String,
    pub settings: SearchSettings,
    enabled: Vec<StoreId>,
    results: BTreeMap<StoreId, StoreResult>,
    contexts: HashMap<StoreId, TrackedContext>,
    deadline: Option<JoinHandle<()>>,
    finalized: bool,
}

impl SearchSession {
    /// `settings` should already be resolved.
    pub fn new(term: impl Into<String>, settings: SearchSettings) -> Self {
        Self {
            id: SessionId::new(),
            term: term.into(),
            enabled: settings.enabled_stores(),
            settings,
            results: BTreeMap::new(),
            contexts: HashMap::new(),
            deadline: None,
            finalized: false,
        }
    }

    pub fn enabled_stores(&self) -> &[StoreId] {
        &self.enabled
    }

    /// Last write wins for a store reporting twice.
    pub fn record(&mut self, result: StoreResult) {
        if self.results.insert(result.store, result).is_some() {
            tracing::debug!("Session {}: overwrote an earlier result", self.id);
        }
    }

    pub fn has_result(&self, store: StoreId) -> bool {
        self.results.contains_key(&store)
    }

    /// Every enabled store has reported, and at least one store is enabled.
    pub fn is_complete(&self) -> bool {
        !self.enabled.is_empty() && self.enabled.iter().all(|store| self.results.contains_key(store))
    }

    /// Results in store order.
    pub fn merged(&self) -> Vec<StoreResult> {
        self.results.values().cloned().collect()
    }

    pub fn track_context(&mut self, store: StoreId, handle: Arc<dyn PageContext>) {
        let close_on_completion = self.settings.toggle(store).close_tab;
        self.contexts.insert(
            store,
            TrackedContext {
                handle,
                close_on_completion,
            },
        );
    }

    pub fn take_context(&mut self, store: StoreId) -> Option<TrackedContext> {
        self.contexts.remove(&store)
    }

    /// Hands over every tracked context, e.g. when the session is superseded.
    pub fn drain_contexts(&mut self) -> Vec<(StoreId, TrackedContext)> {
        self.contexts.drain().collect()
    }

    pub fn tracked_contexts(&self) -> usize {
        self.contexts.len()
    }

    pub fn arm_deadline(&mut self, timer: JoinHandle<()>) {
        if let Some(previous) = self.deadline.replace(timer) {
            previous.abort();
        }
    }

    pub fn cancel_deadline(&mut self) {
        if let Some(timer) = self.deadline.take() {
            timer.abort();
        }
    }

    /// Clears the timer handle after it fired on its own.
    pub fn clear_deadline(&mut self) {
        self.deadline = None;
    }

    pub fn has_deadline(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn mark_finalized(&mut self) {
        self.finalized = true;
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}

impl Drop for SearchSession {
    fn drop(&mut self) {
        self.cancel_deadline();
    }
}
