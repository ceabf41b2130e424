//! Influence ledger
//!
//! `score = Σ delta_i * exp(-(now - recorded_at_i) / half_life)`
//!
//! Scores are recomputed from the event log on every read. The per-agent
//! event cache is read-through only and is dropped whenever new events for
//! that agent are committed.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parley_types::{AgentId, InfluenceEvent, InfluenceReason};
use serde::{Deserialize, Serialize};

use crate::{LedgerStore, StoreResult};

/// Decay factor for an event `elapsed_secs` old. Future events are not boosted.
pub fn decay(elapsed_secs: f64, half_life_secs: f64) -> f64 {
    (-(elapsed_secs.max(0.0)) / half_life_secs).exp()
}

/// Pure fold of an event history at evaluation time `at`
pub fn decayed_score(events: &[InfluenceEvent], at: DateTime<Utc>, half_life_secs: f64) -> f64 {
    events
        .iter()
        .map(|e| e.delta * decay(elapsed_secs(e, at), half_life_secs))
        .sum()
}

fn elapsed_secs(event: &InfluenceEvent, at: DateTime<Utc>) -> f64 {
    (at - event.recorded_at).num_milliseconds() as f64 / 1000.0
}

/// Score with its per-reason contributions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfluenceBreakdown {
    pub agent_id: AgentId,
    pub score: f64,
    pub by_reason: BTreeMap<InfluenceReason, f64>,
    pub event_count: usize,
    pub evaluated_at: DateTime<Utc>,
}

/// Read side of the influence ledger
pub struct InfluenceLedger {
    store: Arc<dyn LedgerStore>,
    half_life_secs: f64,
    cache: DashMap<AgentId, Arc<Vec<InfluenceEvent>>>,
    /// Bumped on every invalidation so a slow read cannot re-insert stale events
    generation: AtomicU64,
}

impl InfluenceLedger {
    pub fn new(store: Arc<dyn LedgerStore>, half_life_secs: f64) -> Self {
        Self {
            store,
            half_life_secs,
            cache: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    pub fn half_life_secs(&self) -> f64 {
        self.half_life_secs
    }

    /// Full event history of an agent, oldest first
    pub async fn history(&self, agent: &AgentId) -> StoreResult<Arc<Vec<InfluenceEvent>>> {
        if let Some(events) = self.cache.get(agent) {
            return Ok(events.clone());
        }

        let generation = self.generation.load(Ordering::Acquire);
        let events = Arc::new(self.store.influence_events(agent).await?);
        // The shard guard is held across the check and the insert, and
        // `invalidate` removes under the same guard after bumping.
        if let Entry::Vacant(slot) = self.cache.entry(*agent) {
            if self.generation.load(Ordering::Acquire) == generation {
                slot.insert(events.clone());
            }
        }
        Ok(events)
    }

    /// Decayed score at `at`
    pub async fn score_at(&self, agent: &AgentId, at: DateTime<Utc>) -> StoreResult<f64> {
        let events = self.history(agent).await?;
        Ok(decayed_score(&events, at, self.half_life_secs))
    }

    /// Decayed score now
    pub async fn score(&self, agent: &AgentId) -> StoreResult<f64> {
        self.score_at(agent, Utc::now()).await
    }

    pub async fn breakdown_at(&self, agent: &AgentId, at: DateTime<Utc>) -> StoreResult<InfluenceBreakdown> {
        let events = self.history(agent).await?;
        let mut by_reason = BTreeMap::new();
        for event in events.iter() {
            *by_reason.entry(event.reason).or_insert(0.0) +=
                event.delta * decay(elapsed_secs(event, at), self.half_life_secs);
        }
        Ok(InfluenceBreakdown {
            agent_id: *agent,
            score: by_reason.values().sum(),
            by_reason,
            event_count: events.len(),
            evaluated_at: at,
        })
    }

    /// Drop cached history for agents that just received events
    pub fn invalidate<'a>(&self, agents: impl IntoIterator<Item = &'a AgentId>) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        for agent in agents {
            self.cache.remove(agent);
        }
    }
}
