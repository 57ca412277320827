use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// How a single async load request ended.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LoadOutcome {
    /// A new cache entry was created.
    Loaded,
    /// An existing entry was reloaded in place.
    Reloaded,
    /// Unregistered extension or no resolvable source; nothing happened.
    Skipped,
    Failed(String),
}

impl LoadOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, LoadOutcome::Failed(_))
    }
}

#[derive(Debug)]
struct TicketState {
    outcome: Mutex<Option<LoadOutcome>>,
    notify: Notify,
}

/// Outer promise for one async load: resolved on the owning thread once
/// the completion pump finishes (or fails) construction.
#[derive(Clone, Debug)]
pub struct LoadTicket {
    state: Arc<TicketState>,
}

impl LoadTicket {
    pub(crate) fn pending() -> LoadTicket {
        LoadTicket {
            state: Arc::new(TicketState {
                outcome: Mutex::new(None),
                notify: Notify::new(),
            }),
        }
    }

    pub(crate) fn resolved(outcome: LoadOutcome) -> LoadTicket {
        let ticket = LoadTicket::pending();
        ticket.resolve(outcome);
        ticket
    }

    pub(crate) fn resolve(&self, outcome: LoadOutcome) {
        *self.state.outcome.lock() = Some(outcome);
        self.state.notify.notify_waiters();
    }

    pub fn is_complete(&self) -> bool {
        self.state.outcome.lock().is_some()
    }

    pub fn outcome(&self) -> Option<LoadOutcome> {
        self.state.outcome.lock().clone()
    }

    pub async fn wait(&self) -> LoadOutcome {
        loop {
            let notified = self.state.notify.notified();
            if let Some(outcome) = self.outcome() {
                return outcome;
            }
            notified.await;
        }
    }
}

/// Aggregate promise over a whole async sweep. Complete once every
/// constituent ticket resolved; constituent failures do not abort
/// siblings.
#[derive(Clone, Debug, Default)]
pub struct BatchTicket {
    tickets: Vec<LoadTicket>,
}

impl BatchTicket {
    pub(crate) fn new(tickets: Vec<LoadTicket>) -> BatchTicket {
        BatchTicket { tickets }
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.tickets.iter().all(|t| t.is_complete())
    }

    pub fn tickets(&self) -> &[LoadTicket] {
        &self.tickets
    }

    pub fn outcomes(&self) -> Vec<Option<LoadOutcome>> {
        self.tickets.iter().map(|t| t.outcome()).collect()
    }

    pub async fn wait(&self) {
        for ticket in &self.tickets {
            ticket.wait().await;
        }
    }
}
