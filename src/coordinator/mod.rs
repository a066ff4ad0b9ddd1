//! The search coordinator: fans a term out to every enabled store, gathers
//! their reports and publishes the merged results once.
//!
//! All session state is owned by one task (see [`service`]); stores, timers
//! and the HTTP layer talk to it only through [`CoordinatorEvent`]s.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::browser::{Browser, PageContext};
use crate::models::{SearchRequest, SessionId, StoreId, StoreResult};
use crate::results_view::ResultsView;
use crate::runner::{Reporter, ScrapeReport, ScrapeRunner};
use crate::storage::SharedState;
use crate::stores::{StoreDescriptor, StoreRegistry};
use crate::utils::error::Result;

pub mod service;
pub mod session;

pub use service::{CoordinatorHandle, spawn};
pub use session::{SearchSession, TrackedContext};

pub enum CoordinatorEvent {
    Search {
        request: SearchRequest,
        reply: Option<oneshot::Sender<Result<SessionId>>>,
    },
    ContextOpened {
        session: SessionId,
        store: StoreId,
        context: Arc<dyn PageContext>,
        close_on_completion: bool,
    },
    Report(ScrapeReport),
    Deadline(SessionId),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeReason {
    Complete,
    Deadline,
}

impl FinalizeReason {
    fn as_str(self) -> &'static str {
        match self {
            FinalizeReason::Complete => "complete",
            FinalizeReason::Deadline => "deadline",
        }
    }
}

pub struct Coordinator {
    registry: StoreRegistry,
    browser: Arc<dyn Browser>,
    state: SharedState,
    view: Arc<dyn ResultsView>,
    events: mpsc::UnboundedSender<CoordinatorEvent>,
    deadline: Duration,
    session: Option<SearchSession>,
    /// Contexts of superseded sessions still waiting on their runner's
    /// final report. Only those marked to close are kept.
    orphaned: HashMap<(SessionId, StoreId), TrackedContext>,
}

impl Coordinator {
    pub fn new(
        registry: StoreRegistry,
        browser: Arc<dyn Browser>,
        state: SharedState,
        view: Arc<dyn ResultsView>,
        events: mpsc::UnboundedSender<CoordinatorEvent>,
        deadline: Duration,
    ) -> Self {
        Self {
            registry,
            browser,
            state,
            view,
            events,
            deadline,
            session: None,
            orphaned: HashMap::new(),
        }
    }

    pub fn session(&self) -> Option<&SearchSession> {
        self.session.as_ref()
    }

    /// Dispatches one event. Errors are logged; the coordinator keeps running.
    /// Returns false on shutdown.
    pub async fn handle(&mut self, event: CoordinatorEvent) -> bool {
        match event {
            CoordinatorEvent::Search { request, reply } => {
                let result = self.start_search(request).await;
                if let Err(e) = &result {
                    error!("Failed to start search: {}", e);
                }
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            CoordinatorEvent::ContextOpened {
                session,
                store,
                context,
                close_on_completion,
            } => {
                self.context_opened(session, store, context, close_on_completion);
            }
            CoordinatorEvent::Report(report) => {
                if let Err(e) = self.report_result(report).await {
                    error!("Failed to record store report: {}", e);
                }
            }
            CoordinatorEvent::Deadline(session) => {
                if let Err(e) = self.deadline_elapsed(session).await {
                    error!("Failed to publish results at deadline: {}", e);
                }
            }
            CoordinatorEvent::Shutdown => return false,
        }
        true
    }

    /// Starts a new search, superseding any in-flight one. Returns without
    /// waiting on any store.
    pub async fn start_search(&mut self, request: SearchRequest) -> Result<SessionId> {
        if let Some(mut previous) = self.session.take() {
            if !previous.is_finalized() {
                info!("Superseding unfinished search '{}' ({})", previous.term, previous.id);
            }
            previous.cancel_deadline();
            self.adopt_orphans(&mut previous);
        }

        let settings = request.settings.resolved();
        let mut session = SearchSession::new(request.term, settings);
        let id = session.id;

        self.state.begin_search(&session.term, &session.settings).await?;
        metrics::counter!("shelfscan_searches_total").increment(1);

        let events = self.events.clone();
        let deadline = self.deadline;
        session.arm_deadline(tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            let _ = events.send(CoordinatorEvent::Deadline(id));
        }));

        let enabled = session.enabled_stores().to_vec();
        info!(
            "Search {} for '{}' across {} store(s): {:?}",
            id,
            session.term,
            enabled.len(),
            enabled
        );

        for store in &enabled {
            let close_on_completion = session.settings.toggle(*store).close_tab;
            self.spawn_store(id, self.registry.describe(*store), &session.term, close_on_completion);
        }
        self.view.open(&session.term);

        self.session = Some(session);
        Ok(id)
    }

    fn spawn_store(&self, session: SessionId, store: Arc<StoreDescriptor>, term: &str, close_on_completion: bool) {
        let browser = Arc::clone(&self.browser);
        let events = self.events.clone();
        let url = store.search_url(term);

        tokio::spawn(async move {
            let reporter = Reporter::new(session, store.id, events.clone());
            match browser.open(&url).await {
                Ok(context) => {
                    debug!("[{}] Opened {}", store.display_name, url);
                    let _ = events.send(CoordinatorEvent::ContextOpened {
                        session,
                        store: store.id,
                        context: Arc::clone(&context),
                        close_on_completion,
                    });
                    ScrapeRunner::new(store, context, url, reporter).run().await;
                }
                Err(e) => {
                    warn!("[{}] Could not open {}: {}", store.display_name, url, e);
                    reporter.send(Vec::new(), url);
                }
            }
        });
    }

    pub fn context_opened(
        &mut self,
        session: SessionId,
        store: StoreId,
        context: Arc<dyn PageContext>,
        close_on_completion: bool,
    ) {
        match self.session.as_mut() {
            Some(current) if current.id == session => {
                if current.has_result(store) {
                    // The report beat us here; nothing left to track.
                    debug!("[{}] Context opened after its report", store);
                } else {
                    current.track_context(store, context);
                }
            }
            _ if close_on_completion => {
                debug!("[{}] Context of superseded session {} will close on its report", store, session);
                self.orphaned.insert(
                    (session, store),
                    TrackedContext {
                        handle: context,
                        close_on_completion,
                    },
                );
            }
            _ => debug!("[{}] Leaving context of superseded session {} open", store, session),
        }
    }

    /// Number of superseded contexts still waiting to be closed.
    pub fn orphaned_contexts(&self) -> usize {
        self.orphaned.len()
    }

    fn adopt_orphans(&mut self, previous: &mut SearchSession) {
        for (store, tracked) in previous.drain_contexts() {
            if tracked.close_on_completion {
                self.orphaned.insert((previous.id, store), tracked);
            }
        }
    }

    async fn release(label: &str, tracked: TrackedContext) {
        if tracked.close_on_completion {
            if let Err(e) = tracked.handle.close().await {
                warn!("[{}] Failed to close context: {}", label, e);
            }
        } else {
            debug!("[{}] Leaving context open", label);
        }
    }

    /// Records one store's report, closes its context if asked to, then
    /// checks whether the search is complete.
    pub async fn report_result(&mut self, report: ScrapeReport) -> Result<()> {
        let live = self.session.as_ref().map(|session| session.id);
        if let Some(id) = report.session {
            if Some(id) != live {
                debug!("[{}] Dropping report from superseded session {}", report.store, id);
                metrics::counter!("shelfscan_stale_reports_total").increment(1);
                if let Some(tracked) = self.orphaned.remove(&(id, report.store)) {
                    Self::release(report.store.as_str(), tracked).await;
                }
                return Ok(());
            }
        }

        let Some(session) = self.session.as_mut() else {
            debug!("[{}] Report with no search in progress", report.store);
            metrics::counter!("shelfscan_stale_reports_total").increment(1);
            return Ok(());
        };

        metrics::counter!("shelfscan_store_reports_total", "store" => report.store.as_str()).increment(1);

        let display_name = self.registry.describe(report.store).display_name;
        let result = StoreResult::new(report.store, display_name, report.products, report.source_url);
        info!(
            "[{}] Reported {} product(s)",
            display_name,
            if result.is_empty() { 0 } else { result.products.len() }
        );
        session.record(result);

        if let Some(tracked) = session.take_context(report.store) {
            Self::release(display_name, tracked).await;
        }

        if session.is_finalized() {
            debug!("[{}] Late report, results already published", display_name);
            return Ok(());
        }

        self.check_completion().await?;
        Ok(())
    }

    /// Publishes the merged results if every enabled store has reported.
    /// Returns true when this call finalized the session.
    pub async fn check_completion(&mut self) -> Result<bool> {
        let Some(session) = self.session.as_mut() else {
            return Ok(false);
        };
        if session.is_finalized() || !session.is_complete() {
            return Ok(false);
        }

        Self::finalize(&self.state, session, FinalizeReason::Complete).await?;
        Ok(true)
    }

    /// Publishes whatever has accumulated for `session`, if it is still the
    /// live, unfinished search.
    pub async fn deadline_elapsed(&mut self, session: SessionId) -> Result<()> {
        let Some(current) = self.session.as_mut() else {
            return Ok(());
        };
        if current.id != session {
            debug!("Ignoring deadline of superseded session {}", session);
            return Ok(());
        }
        current.clear_deadline();
        if current.is_finalized() {
            return Ok(());
        }

        let missing: Vec<StoreId> = current
            .enabled_stores()
            .iter()
            .copied()
            .filter(|store| !current.has_result(*store))
            .collect();
        warn!("Search {} deadline reached; no report from {:?}", session, missing);

        Self::finalize(&self.state, current, FinalizeReason::Deadline).await
    }

    async fn finalize(state: &SharedState, session: &mut SearchSession, reason: FinalizeReason) -> Result<()> {
        let merged = session.merged();
        state.publish_results(&merged).await?;
        session.cancel_deadline();
        session.mark_finalized();

        metrics::counter!("shelfscan_sessions_finalized_total", "reason" => reason.as_str()).increment(1);
        info!(
            "Search {} for '{}' finalized ({}) with {} store result(s)",
            session.id,
            session.term,
            reason.as_str(),
            merged.len()
        );
        Ok(())
    }
}
