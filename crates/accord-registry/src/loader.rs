//! Sources the registry can bootstrap itself from

use crate::agent::AgentRegistration;
use crate::error::RegistryResult;
use async_trait::async_trait;

/// Supplies the initial agent population during [`initialize`].
///
/// [`initialize`]: crate::registry::AgentRegistry::initialize
#[async_trait]
pub trait AgentLoader: Send + Sync {
    async fn load(&self) -> RegistryResult<Vec<AgentRegistration>>;
}

/// Loader over a fixed list. Suitable for configuration-driven deployments
/// and tests.
pub struct StaticLoader {
    registrations: Vec<AgentRegistration>,
}

impl StaticLoader {
    pub fn new(registrations: Vec<AgentRegistration>) -> Self {
        Self { registrations }
    }

    /// A loader that supplies no agents.
    pub fn empty() -> Self {
        Self {
            registrations: Vec::new(),
        }
    }
}

#[async_trait]
impl AgentLoader for StaticLoader {
    async fn load(&self) -> RegistryResult<Vec<AgentRegistration>> {
        Ok(self.registrations.clone())
    }
}
