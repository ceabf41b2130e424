//! Agent directory
//!
//! Agent profiles live outside the engine. It only needs to know whether an
//! identifier refers to a registered agent.

use async_trait::async_trait;
use dashmap::DashSet;
use parley_types::{AgentId, Result};

/// Lookup of registered agents
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn agent_exists(&self, agent: &AgentId) -> Result<bool>;
}

/// Directory backed by an in-process set
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    agents: DashSet<AgentId>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent; returns false if it was already known
    pub fn register(&self, agent: AgentId) -> bool {
        self.agents.insert(agent)
    }

    pub fn deregister(&self, agent: &AgentId) -> bool {
        self.agents.remove(agent).is_some()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl FromIterator<AgentId> for InMemoryDirectory {
    fn from_iter<I: IntoIterator<Item = AgentId>>(iter: I) -> Self {
        Self {
            agents: iter.into_iter().collect(),
        }
    }
}

#[async_trait]
impl AgentDirectory for InMemoryDirectory {
    async fn agent_exists(&self, agent: &AgentId) -> Result<bool> {
        Ok(self.agents.contains(agent))
    }
}

/// Accepts every identifier. For deployments where registration is checked
/// upstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenDirectory;

#[async_trait]
impl AgentDirectory for OpenDirectory {
    async fn agent_exists(&self, _agent: &AgentId) -> Result<bool> {
        Ok(true)
    }
}
