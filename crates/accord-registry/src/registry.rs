//! Concurrent agent registry

use crate::agent::{AgentDescriptor, AgentRegistration, RegisterOutcome};
use crate::error::{RegistryError, RegistryResult};
use crate::loader::AgentLoader;
use accord_health::HealthMonitor;
use accord_signal::{HyperVector, HypervectorEncoder};
use accord_types::AgentId;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Registry of agents and their derived signals.
///
/// All reads run against the concurrent map or a detached snapshot, so a
/// registration in flight never blocks matching.
pub struct AgentRegistry {
    agents: DashMap<AgentId, AgentDescriptor>,
    next_seq: AtomicU64,
    init: OnceCell<()>,
    loader: Arc<dyn AgentLoader>,
    encoder: Arc<HypervectorEncoder>,
    health: Arc<HealthMonitor>,
}

impl AgentRegistry {
    pub fn new(
        encoder: Arc<HypervectorEncoder>,
        health: Arc<HealthMonitor>,
        loader: Arc<dyn AgentLoader>,
    ) -> Self {
        Self {
            agents: DashMap::new(),
            next_seq: AtomicU64::new(0),
            init: OnceCell::new(),
            loader,
            encoder,
            health,
        }
    }

    /// Load the initial agent population.
    ///
    /// Safe to call from any number of tasks: exactly one caller runs the
    /// loader, the rest wait for it to finish. A failed load leaves the
    /// registry uninitialized so a later call can retry.
    pub async fn initialize(&self) -> RegistryResult<()> {
        self.init
            .get_or_try_init(|| async {
                let registrations = self.loader.load().await?;
                let count = registrations.len();
                for registration in registrations {
                    self.register(registration).await?;
                }
                tracing::info!(agents = count, "registry initialized");
                Ok::<(), RegistryError>(())
            })
            .await?;
        Ok(())
    }

    /// Upsert a registration.
    ///
    /// A new agent gets the next registration sequence number; an existing
    /// one keeps its sequence and original registration time while profile
    /// and signal are replaced.
    pub async fn register(&self, registration: AgentRegistration) -> RegistryResult<RegisterOutcome> {
        let signal = self
            .encoder
            .encode(&registration.profile.resonance_text())
            .await?;
        let now = Utc::now();
        let AgentRegistration { id, profile } = registration;

        let (descriptor, refreshed) = match self.agents.entry(id.clone()) {
            Entry::Occupied(mut entry) => {
                let descriptor = entry.get_mut();
                descriptor.profile = profile;
                descriptor.signal = signal;
                descriptor.refreshed_at = now;
                (descriptor.clone(), true)
            }
            Entry::Vacant(entry) => {
                let descriptor = AgentDescriptor {
                    id: id.clone(),
                    profile,
                    signal,
                    registration_seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
                    registered_at: now,
                    refreshed_at: now,
                };
                entry.insert(descriptor.clone());
                (descriptor, false)
            }
        };

        self.health.track(&id);
        tracing::info!(agent_id = %id, refreshed, "agent registered");
        Ok(RegisterOutcome {
            descriptor,
            refreshed,
        })
    }

    pub fn agent(&self, id: &AgentId) -> Option<AgentDescriptor> {
        self.agents.get(id).map(|d| d.clone())
    }

    /// Every registered agent, in registration order.
    pub fn all_agents(&self) -> Vec<AgentDescriptor> {
        let mut agents: Vec<_> = self.agents.iter().map(|d| d.clone()).collect();
        agents.sort_by_key(|d| d.registration_seq);
        agents
    }

    /// Agents the health monitor currently reports as active, in
    /// registration order.
    pub fn available_agents(&self) -> Vec<AgentDescriptor> {
        let mut agents: Vec<_> = self
            .agents
            .iter()
            .filter(|d| self.health.is_active(&d.id))
            .map(|d| d.clone())
            .collect();
        agents.sort_by_key(|d| d.registration_seq);
        agents
    }

    /// Detached view of the available agents for matching.
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            agents: self.available_agents(),
        }
    }

    pub fn remove(&self, id: &AgentId) -> bool {
        let removed = self.agents.remove(id).is_some();
        if removed {
            self.health.untrack(id);
            tracing::info!(agent_id = %id, "agent removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// Point-in-time view used for matching. Holds clones, so registry writes
/// after the snapshot do not affect it.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    agents: Vec<AgentDescriptor>,
}

impl RegistrySnapshot {
    pub fn agents(&self) -> &[AgentDescriptor] {
        &self.agents
    }

    pub fn descriptor(&self, id: &AgentId) -> Option<&AgentDescriptor> {
        self.agents.iter().find(|d| &d.id == id)
    }

    /// Candidate tuples in the shape the matcher consumes.
    pub fn candidates(&self) -> impl Iterator<Item = (AgentId, &HyperVector, u64)> {
        self.agents
            .iter()
            .map(|d| (d.id.clone(), &d.signal, d.registration_seq))
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
