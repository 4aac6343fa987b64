// Per-client topic registry and the derived demand view.
// Every mutation ends in `recompute`, so the demand snapshot is never stale.

use std::collections::{BTreeSet, HashMap};
use tokio::time::{Duration, Instant};

use crate::error::DockerError;
use crate::models::{ClientId, Topic};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub topic: Topic,
    pub last_seen: Instant,
}

/// Subscriber counts per static topic plus the set of individually watched containers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemandSnapshot {
    pub info: usize,
    pub images: usize,
    pub containers: usize,
    pub watched: BTreeSet<String>,
}

impl DemandSnapshot {
    /// Keys that need a polling timer.
    pub fn keys(&self) -> BTreeSet<Topic> {
        let mut keys = BTreeSet::new();
        if self.info > 0 {
            keys.insert(Topic::Info);
        }
        if self.images > 0 {
            keys.insert(Topic::Images);
        }
        if self.containers > 0 {
            keys.insert(Topic::Containers);
        }
        keys.extend(self.watched.iter().cloned().map(Topic::Container));
        keys
    }

    pub fn is_demanded(&self, topic: &Topic) -> bool {
        match topic {
            Topic::Info => self.info > 0,
            Topic::Images => self.images > 0,
            Topic::Containers => self.containers > 0,
            Topic::Container(id) => self.watched.contains(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeOutcome {
    /// The client's topic differs from what it had before (or it is new).
    pub changed: bool,
    pub demand: DemandSnapshot,
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    ready: bool,
    clients: HashMap<ClientId, Subscription>,
    demand: DemandSnapshot,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_ready(&mut self) {
        self.ready = true;
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Inserts or replaces the client's single topic and refreshes `last_seen`.
    pub fn subscribe(
        &mut self,
        client: &str,
        topic: Topic,
        now: Instant,
    ) -> Result<SubscribeOutcome, DockerError> {
        if !self.ready {
            return Err(DockerError::NotReady);
        }
        let previous = self.clients.insert(
            client.to_string(),
            Subscription {
                topic: topic.clone(),
                last_seen: now,
            },
        );
        let changed = previous.is_none_or(|p| p.topic != topic);
        self.recompute();
        Ok(SubscribeOutcome {
            changed,
            demand: self.demand.clone(),
        })
    }

    /// Idempotent; unknown clients are fine.
    pub fn unsubscribe(&mut self, client: &str) -> DemandSnapshot {
        if self.clients.remove(client).is_some() {
            tracing::debug!(client_id = client, "client unsubscribed");
        }
        self.recompute();
        self.demand.clone()
    }

    pub fn current_demand(&self) -> DemandSnapshot {
        self.demand.clone()
    }

    pub fn topic_of(&self, client: &str) -> Option<&Topic> {
        self.clients.get(client).map(|s| &s.topic)
    }

    pub fn subscribers_of(&self, topic: &Topic) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|(_, s)| s.topic == *topic)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Clients whose last subscribe is older than `timeout`.
    pub fn stale_clients(&self, now: Instant, timeout: Duration) -> Vec<ClientId> {
        self.clients
            .iter()
            .filter(|(_, s)| now.saturating_duration_since(s.last_seen) > timeout)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    fn recompute(&mut self) {
        let mut demand = DemandSnapshot::default();
        for sub in self.clients.values() {
            match &sub.topic {
                Topic::Info => demand.info += 1,
                Topic::Images => demand.images += 1,
                Topic::Containers => demand.containers += 1,
                Topic::Container(id) => {
                    demand.watched.insert(id.clone());
                }
            }
        }
        self.demand = demand;
    }
}
