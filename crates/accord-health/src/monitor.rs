//! Agent health monitor

use crate::config::HealthConfig;
use crate::error::{HealthError, HealthResult};
use crate::probe::AgentProbe;
use accord_types::{AgentHealth, AgentId, AgentStatus, FailureKind, ProbeFailure, ProbeReport};
use chrono::Utc;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// Capacity of the health event broadcast channel
pub const HEALTH_EVENT_CAPACITY: usize = 1024;

/// Events emitted as agent liveness changes
#[derive(Debug, Clone)]
pub enum HealthEvent {
    /// An agent gained a health record
    Tracked { agent_id: AgentId },

    /// A probe round-trip succeeded
    ProbeSucceeded { agent_id: AgentId, latency: Duration },

    /// A probe or retried operation failed
    ProbeFailed {
        agent_id: AgentId,
        kind: FailureKind,
        consecutive_failures: u32,
    },

    /// The agent's status flipped
    StatusChanged {
        agent_id: AgentId,
        from: AgentStatus,
        to: AgentStatus,
    },

    /// An operator reset cleared the agent's history
    Reset { agent_id: AgentId },
}

/// Tracks per-agent liveness: `active <-> unavailable`, with `exiting` as a
/// voluntary terminal state only an explicit reset revives.
pub struct HealthMonitor {
    config: HealthConfig,
    probe: Arc<dyn AgentProbe>,
    records: DashMap<AgentId, AgentHealth>,
    event_tx: broadcast::Sender<HealthEvent>,
}

impl HealthMonitor {
    pub fn new(config: HealthConfig, probe: Arc<dyn AgentProbe>) -> Self {
        let (event_tx, _) = broadcast::channel(HEALTH_EVENT_CAPACITY);
        Self {
            config,
            probe,
            records: DashMap::new(),
            event_tx,
        }
    }

    /// Subscribe to liveness events.
    pub fn subscribe(&self) -> broadcast::Receiver<HealthEvent> {
        self.event_tx.subscribe()
    }

    /// Seed an Active record for the agent if none exists.
    pub fn track(&self, agent_id: &AgentId) {
        let mut inserted = false;
        self.records.entry(agent_id.clone()).or_insert_with(|| {
            inserted = true;
            AgentHealth::new(agent_id.clone())
        });
        if inserted {
            tracing::debug!(agent_id = %agent_id, "tracking agent");
            self.emit(HealthEvent::Tracked {
                agent_id: agent_id.clone(),
            });
        }
    }

    /// Drop the agent's record entirely.
    pub fn untrack(&self, agent_id: &AgentId) -> bool {
        self.records.remove(agent_id).is_some()
    }

    pub fn status(&self, agent_id: &AgentId) -> Option<AgentStatus> {
        self.records.get(agent_id).map(|r| r.status)
    }

    /// Whether the agent may be solicited. Untracked agents are not.
    pub fn is_active(&self, agent_id: &AgentId) -> bool {
        self.status(agent_id).is_some_and(|s| s.is_active())
    }

    pub fn health(&self, agent_id: &AgentId) -> Option<AgentHealth> {
        self.records.get(agent_id).map(|r| r.clone())
    }

    pub fn all_health(&self) -> Vec<AgentHealth> {
        self.records.iter().map(|r| r.clone()).collect()
    }

    /// Probe the agent once, bounded by the configured probe timeout.
    ///
    /// Success resets the consecutive-failure counter and restores
    /// `Active` (an exiting agent stays exiting). Failure increments the
    /// counter, classifies the cause, appends to the bounded error log,
    /// and flips the agent to `Unavailable` at the threshold.
    pub async fn check_agent_health(&self, agent_id: &AgentId) -> HealthResult<ProbeReport> {
        self.track(agent_id);
        let started = Instant::now();

        match tokio::time::timeout(self.config.probe_timeout, self.probe.probe(agent_id)).await {
            Ok(Ok(())) => {
                let latency = started.elapsed();
                let status = self.record_success(agent_id, Some(latency));
                Ok(ProbeReport {
                    agent_id: agent_id.clone(),
                    status,
                    latency,
                    checked_at: Utc::now(),
                })
            }
            Ok(Err(err)) => {
                self.record_failure(agent_id, classify(&err), &err.to_string());
                Err(err)
            }
            Err(_) => {
                let err = HealthError::ProbeTimeout {
                    agent_id: agent_id.clone(),
                    timeout_ms: self.config.probe_timeout.as_millis() as u64,
                };
                self.record_failure(agent_id, FailureKind::Timeout, &err.to_string());
                Err(err)
            }
        }
    }

    /// Run `operation` with exponential backoff.
    ///
    /// Eventual success resets the agent's failure counters and returns
    /// `Some`. Exhausting the retries marks the agent `Unavailable` and
    /// returns `None`: the caller sees a missing result, not an error.
    pub async fn with_retry<T, F, Fut>(&self, agent_id: &AgentId, mut operation: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = HealthResult<T>>,
    {
        self.track(agent_id);
        let retry = self.config.retry.clone();
        let mut delay = retry.retry_delay;

        for attempt in 0..=retry.max_retries {
            match operation().await {
                Ok(value) => {
                    self.record_success(agent_id, None);
                    return Some(value);
                }
                Err(err) => {
                    self.record_failure(agent_id, classify(&err), &err.to_string());
                    tracing::debug!(
                        agent_id = %agent_id,
                        attempt,
                        error = %err,
                        "retried operation failed"
                    );
                    if attempt < retry.max_retries {
                        tokio::time::sleep(delay).await;
                        delay = delay.mul_f64(retry.backoff_multiplier);
                    }
                }
            }
        }

        self.mark_unavailable(agent_id);
        tracing::warn!(agent_id = %agent_id, "retries exhausted, treating as no result");
        None
    }

    /// Voluntary departure announced by the agent itself.
    pub fn mark_exiting(&self, agent_id: &AgentId) {
        let mut change = None;
        {
            let mut record = self
                .records
                .entry(agent_id.clone())
                .or_insert_with(|| AgentHealth::new(agent_id.clone()));
            if record.status != AgentStatus::Exiting {
                change = Some((record.status, AgentStatus::Exiting));
                record.status = AgentStatus::Exiting;
            }
        }
        if let Some((from, to)) = change {
            tracing::info!(agent_id = %agent_id, "agent exiting");
            self.emit(HealthEvent::StatusChanged {
                agent_id: agent_id.clone(),
                from,
                to,
            });
        }
    }

    /// Operator reset: back to Active with counters and error log cleared.
    pub fn reset_agent_status(&self, agent_id: &AgentId) {
        let mut change = None;
        {
            let mut record = self
                .records
                .entry(agent_id.clone())
                .or_insert_with(|| AgentHealth::new(agent_id.clone()));
            record.consecutive_failures = 0;
            record.recent_errors.clear();
            record.reachable = true;
            if record.status != AgentStatus::Active {
                change = Some((record.status, AgentStatus::Active));
                record.status = AgentStatus::Active;
            }
        }
        self.emit(HealthEvent::Reset {
            agent_id: agent_id.clone(),
        });
        if let Some((from, to)) = change {
            tracing::info!(agent_id = %agent_id, %from, "agent status reset");
            self.emit(HealthEvent::StatusChanged {
                agent_id: agent_id.clone(),
                from,
                to,
            });
        }
    }

    fn record_success(&self, agent_id: &AgentId, latency: Option<Duration>) -> AgentStatus {
        let mut change = None;
        let status = {
            let mut record = self
                .records
                .entry(agent_id.clone())
                .or_insert_with(|| AgentHealth::new(agent_id.clone()));
            record.consecutive_failures = 0;
            record.reachable = true;
            record.last_probe_at = Some(Utc::now());
            if latency.is_some() {
                record.last_latency = latency;
            }
            // a successful probe revives an unavailable agent, never an
            // exiting one
            if record.status == AgentStatus::Unavailable {
                change = Some((record.status, AgentStatus::Active));
                record.status = AgentStatus::Active;
            }
            record.status
        };

        if let Some(latency) = latency {
            self.emit(HealthEvent::ProbeSucceeded {
                agent_id: agent_id.clone(),
                latency,
            });
        }
        if let Some((from, to)) = change {
            tracing::info!(agent_id = %agent_id, "agent recovered");
            self.emit(HealthEvent::StatusChanged {
                agent_id: agent_id.clone(),
                from,
                to,
            });
        }
        status
    }

    fn record_failure(&self, agent_id: &AgentId, kind: FailureKind, message: &str) {
        let mut change = None;
        let failures = {
            let mut record = self
                .records
                .entry(agent_id.clone())
                .or_insert_with(|| AgentHealth::new(agent_id.clone()));
            record.consecutive_failures += 1;
            record.reachable = false;
            record.last_probe_at = Some(Utc::now());
            record.recent_errors.push(ProbeFailure {
                kind,
                message: message.to_string(),
                at: Utc::now(),
            });
            if record.recent_errors.len() > self.config.max_error_log {
                let excess = record.recent_errors.len() - self.config.max_error_log;
                record.recent_errors.drain(..excess);
            }
            if record.status == AgentStatus::Active
                && record.consecutive_failures >= self.config.failure_threshold
            {
                change = Some((record.status, AgentStatus::Unavailable));
                record.status = AgentStatus::Unavailable;
            }
            record.consecutive_failures
        };

        self.emit(HealthEvent::ProbeFailed {
            agent_id: agent_id.clone(),
            kind,
            consecutive_failures: failures,
        });
        if let Some((from, to)) = change {
            tracing::warn!(
                agent_id = %agent_id,
                consecutive_failures = failures,
                "agent crossed failure threshold"
            );
            self.emit(HealthEvent::StatusChanged {
                agent_id: agent_id.clone(),
                from,
                to,
            });
        }
    }

    fn mark_unavailable(&self, agent_id: &AgentId) {
        let mut change = None;
        {
            let mut record = self
                .records
                .entry(agent_id.clone())
                .or_insert_with(|| AgentHealth::new(agent_id.clone()));
            if record.status == AgentStatus::Active {
                change = Some((record.status, AgentStatus::Unavailable));
                record.status = AgentStatus::Unavailable;
            }
        }
        if let Some((from, to)) = change {
            self.emit(HealthEvent::StatusChanged {
                agent_id: agent_id.clone(),
                from,
                to,
            });
        }
    }

    fn emit(&self, event: HealthEvent) {
        // no receivers is fine
        let _ = self.event_tx.send(event);
    }
}

fn classify(error: &HealthError) -> FailureKind {
    match error {
        HealthError::ProbeTimeout { .. } => FailureKind::Timeout,
        HealthError::Unreachable { .. } => FailureKind::Unreachable,
        HealthError::OperationFailed { .. } => FailureKind::Error,
    }
}
