use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::browser::Browser;
use crate::config::SearchConfig;
use crate::coordinator::{Coordinator, CoordinatorEvent};
use crate::models::{RuntimeMessage, SearchRequest, SessionId};
use crate::results_view::ResultsView;
use crate::runner::ScrapeReport;
use crate::storage::SharedState;
use crate::stores::StoreRegistry;
use crate::utils::error::{AppError, Result};

/// Cloneable entry point to a running coordinator.
#[derive(Clone)]
pub struct CoordinatorHandle {
    events: mpsc::UnboundedSender<CoordinatorEvent>,
}

impl CoordinatorHandle {
    /// Starts a search and returns its session id once the coordinator has
    /// accepted it. Does not wait for any store.
    pub async fn search(&self, request: SearchRequest) -> Result<SessionId> {
        let (reply, response) = oneshot::channel();
        self.send(CoordinatorEvent::Search {
            request,
            reply: Some(reply),
        })?;
        response
            .await
            .map_err(|_| AppError::Coordinator("search request was dropped".to_string()))?
    }

    /// Routes a runtime message. Returns the new session id for searches.
    pub async fn deliver(&self, message: RuntimeMessage) -> Result<Option<SessionId>> {
        match message {
            RuntimeMessage::Search(request) => self.search(request).await.map(Some),
            RuntimeMessage::StoreResults {
                store,
                products,
                search_url,
                session,
            } => {
                self.send(CoordinatorEvent::Report(ScrapeReport {
                    session,
                    store,
                    products,
                    source_url: search_url,
                }))?;
                Ok(None)
            }
            RuntimeMessage::Unrecognized(action) => {
                debug!("Ignoring runtime message with action '{}'", action);
                Ok(None)
            }
        }
    }

    pub fn shutdown(&self) {
        let _ = self.events.send(CoordinatorEvent::Shutdown);
    }

    fn send(&self, event: CoordinatorEvent) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| AppError::Coordinator("coordinator has stopped".to_string()))
    }
}

/// Spawns the coordinator task. It runs until [`CoordinatorHandle::shutdown`].
pub fn spawn(
    registry: StoreRegistry,
    browser: Arc<dyn Browser>,
    state: SharedState,
    view: Arc<dyn ResultsView>,
    config: &SearchConfig,
) -> (CoordinatorHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut coordinator = Coordinator::new(registry, browser, state, view, tx.clone(), config.deadline());

    let task = tokio::spawn(async move {
        info!("Search coordinator started");
        while let Some(event) = rx.recv().await {
            if !coordinator.handle(event).await {
                break;
            }
        }
        info!("Search coordinator stopped");
    });

    (CoordinatorHandle { events: tx }, task)
}
