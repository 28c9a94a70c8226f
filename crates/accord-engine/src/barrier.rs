//! Wait-barrier for offer collection

use accord_types::{AgentId, Offer};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

/// How the barrier classified a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// Counted toward completion
    Accepted,
    /// Arrived after the barrier completed and was dropped
    Late,
    /// The agent was never pending, or already responded
    Unknown,
}

/// What the barrier resolved to.
#[derive(Debug, Clone)]
pub struct BarrierOutcome {
    /// Offers that arrived in time, in arrival order
    pub offers: Vec<Offer>,

    /// Agents that explicitly declined
    pub declined: Vec<AgentId>,

    /// Agents that never produced an answer, sorted by id
    pub unresponsive: Vec<AgentId>,

    /// True when the deadline fired with agents still pending
    pub timed_out: bool,
}

struct BarrierState {
    pending: HashSet<AgentId>,
    offers: Vec<Offer>,
    declined: Vec<AgentId>,
    gave_up: Vec<AgentId>,
    completed: bool,
}

/// Collects offers from a fixed set of agents until every agent has
/// resolved or a deadline fires, whichever comes first.
///
/// Completion happens exactly once; anything arriving afterwards is
/// reported [`ResponseOutcome::Late`] and otherwise ignored. An agent
/// resolves by submitting, declining, or being given up on.
pub struct OfferBarrier {
    state: Mutex<BarrierState>,
    notify: Notify,
}

impl OfferBarrier {
    pub fn new(pending: impl IntoIterator<Item = AgentId>) -> Self {
        Self {
            state: Mutex::new(BarrierState {
                pending: pending.into_iter().collect(),
                offers: Vec::new(),
                declined: Vec::new(),
                gave_up: Vec::new(),
                completed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Record an offer from a pending agent.
    pub async fn submit_offer(&self, agent_id: &AgentId, offer: Offer) -> ResponseOutcome {
        let mut state = self.state.lock().await;
        if state.completed {
            return ResponseOutcome::Late;
        }
        if !state.pending.remove(agent_id) {
            return ResponseOutcome::Unknown;
        }
        state.offers.push(offer);
        if state.pending.is_empty() {
            self.notify.notify_one();
        }
        ResponseOutcome::Accepted
    }

    /// Record an explicit non-answer from a pending agent.
    pub async fn decline(&self, agent_id: &AgentId) -> ResponseOutcome {
        let mut state = self.state.lock().await;
        if state.completed {
            return ResponseOutcome::Late;
        }
        if !state.pending.remove(agent_id) {
            return ResponseOutcome::Unknown;
        }
        state.declined.push(agent_id.clone());
        if state.pending.is_empty() {
            self.notify.notify_one();
        }
        ResponseOutcome::Accepted
    }

    /// Resolve an agent that will never answer, without waiting for the
    /// deadline to sweep it.
    pub async fn give_up(&self, agent_id: &AgentId) {
        let mut state = self.state.lock().await;
        if state.completed || !state.pending.remove(agent_id) {
            return;
        }
        state.gave_up.push(agent_id.clone());
        if state.pending.is_empty() {
            self.notify.notify_one();
        }
    }

    /// Wait until every agent has resolved or `timeout` elapses.
    ///
    /// Intended for a single waiter; the returned outcome drains the
    /// collected state.
    pub async fn wait(&self, timeout: Duration) -> BarrierOutcome {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let mut state = self.state.lock().await;
                if state.pending.is_empty() {
                    return Self::complete(&mut state, false);
                }
            }
            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                let mut state = self.state.lock().await;
                return Self::complete(&mut state, true);
            }
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    fn complete(state: &mut BarrierState, timed_out: bool) -> BarrierOutcome {
        state.completed = true;
        let mut unresponsive: Vec<AgentId> = state.gave_up.drain(..).collect();
        unresponsive.extend(state.pending.drain());
        unresponsive.sort();
        BarrierOutcome {
            offers: std::mem::take(&mut state.offers),
            declined: std::mem::take(&mut state.declined),
            unresponsive,
            timed_out,
        }
    }
}
