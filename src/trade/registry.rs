use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::{
    select,
    sync::{mpsc, watch, RwLock},
    task::JoinHandle,
};
use tracing::{debug, info, trace};

use super::{DedupKey, ParsedTrade, TradeEntry, TradeState};
use crate::common::{error::HelperError, persist::PersistQueue, types::TradeId};

/// Result of offering a parsed line to the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    Added(TradeId),
    DuplicateIgnored(TradeId),
}

impl AddOutcome {
    pub fn trade_id(&self) -> TradeId {
        match self {
            AddOutcome::Added(id) | AddOutcome::DuplicateIgnored(id) => *id,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RegistrySettings {
    pub dedup_bucket: Duration,
    pub max_age: Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            dedup_bucket: Duration::from_secs(60),
            max_age: Duration::from_secs(15 * 60),
        }
    }
}

#[derive(Default)]
struct RegistryStore {
    entries: HashMap<TradeId, TradeEntry>,
    // Arrival order, oldest first. Log lines arrive in file order.
    arrival: Vec<TradeId>,
    live_keys: HashMap<DedupKey, TradeId>,
}

impl RegistryStore {
    fn live_duplicate(&self, key: &DedupKey) -> Option<TradeId> {
        [key.clone(), key.previous()]
            .iter()
            .filter_map(|candidate| self.live_keys.get(candidate))
            .find(|id| {
                self.entries
                    .get(id)
                    .map(|entry| !entry.state.is_terminal())
                    .unwrap_or(false)
            })
            .copied()
    }

    fn next_id(&self, key: &DedupKey) -> TradeId {
        let mut generation = 0;
        loop {
            let id = key.trade_id(generation);
            if !self.entries.contains_key(&id) {
                return id;
            }
            generation += 1;
        }
    }

    fn insert(&mut self, key: DedupKey, entry: TradeEntry) {
        if !entry.state.is_terminal() {
            self.live_keys.insert(key, entry.id);
        }
        self.arrival.push(entry.id);
        self.entries.insert(entry.id, entry);
    }

    fn apply_transition(
        &mut self,
        id: TradeId,
        target: TradeState,
        now: DateTime<Utc>,
    ) -> Result<TradeEntry, HelperError> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(HelperError::TradeNotFound(id))?;

        if !entry.state.can_transition_to(target) {
            return Err(HelperError::InvalidTransition {
                id,
                from: entry.state,
                to: target,
            });
        }

        entry.state = target;
        entry.updated_at = now;
        let entry = entry.clone();

        if target.is_terminal() {
            self.live_keys.retain(|_, live_id| *live_id != id);
        }
        Ok(entry)
    }

    fn remove(&mut self, id: TradeId) -> Option<TradeEntry> {
        let entry = self.entries.remove(&id)?;
        self.arrival.retain(|arrived| *arrived != id);
        self.live_keys.retain(|_, live_id| *live_id != id);
        Some(entry)
    }
}

/// Concurrency-safe store of trade entries and their lifecycle.
///
/// Cloning yields another handle onto the same store. Reads share the lock;
/// writes are serialized. No method holds the lock across an await on
/// anything but the lock itself.
#[derive(Clone)]
pub struct TradeRegistry {
    store: Arc<RwLock<RegistryStore>>,
    settings: RegistrySettings,
    persist_queue: Option<PersistQueue>,
}

impl TradeRegistry {
    const SWEEP_BATCH_SIZE: usize = 64;

    pub fn new(settings: RegistrySettings) -> Self {
        Self {
            store: Arc::new(RwLock::new(RegistryStore::default())),
            settings,
            persist_queue: None,
        }
    }

    pub(crate) fn with_persistence(
        settings: RegistrySettings,
        persist_queue: PersistQueue,
    ) -> Self {
        Self {
            store: Arc::new(RwLock::new(RegistryStore::default())),
            settings,
            persist_queue: Some(persist_queue),
        }
    }

    pub fn settings(&self) -> RegistrySettings {
        self.settings
    }

    /// Seeds the registry with previously saved entries. Terminal entries and
    /// IDs already present are skipped.
    pub async fn restore(&self, entries: Vec<TradeEntry>) -> usize {
        let mut restored = 0;
        let mut store = self.store.write().await;
        for entry in entries {
            if entry.state.is_terminal() || store.entries.contains_key(&entry.id) {
                continue;
            }
            let key = DedupKey::new(
                &entry.player_name,
                &entry.item_name,
                entry.received_at,
                self.settings.dedup_bucket,
            );
            store.insert(key, entry);
            restored += 1;
        }
        let RegistryStore {
            entries, arrival, ..
        } = &mut *store;
        arrival.sort_by_key(|id| entries.get(id).map(|entry| entry.received_at));
        restored
    }

    pub async fn add_trade(&self, parsed: ParsedTrade) -> AddOutcome {
        let key = DedupKey::for_trade(&parsed, self.settings.dedup_bucket);

        let entry = {
            let mut store = self.store.write().await;
            if let Some(existing) = store.live_duplicate(&key) {
                debug!(
                    trade_id = %existing,
                    player = %parsed.player_name,
                    item = %parsed.item_name,
                    "Duplicate trade line ignored"
                );
                return AddOutcome::DuplicateIgnored(existing);
            }

            let id = store.next_id(&key);
            let entry = TradeEntry::new(id, parsed);
            store.insert(key, entry.clone());
            entry
        };

        info!(
            trade_id = %entry.id,
            player = %entry.player_name,
            item = %entry.item_name,
            kind = %entry.kind,
            "Trade added"
        );
        self.persist(entry.clone());
        AddOutcome::Added(entry.id)
    }

    pub async fn transition(
        &self,
        id: TradeId,
        target: TradeState,
    ) -> Result<TradeEntry, HelperError> {
        let entry = {
            let mut store = self.store.write().await;
            store.apply_transition(id, target, Utc::now())?
        };
        info!(trade_id = %id, state = %target, "Trade transitioned");
        self.persist(entry.clone());
        Ok(entry)
    }

    pub async fn remove_trade(&self, id: TradeId) -> Result<TradeEntry, HelperError> {
        let mut store = self.store.write().await;
        let entry = store.remove(id).ok_or(HelperError::TradeNotFound(id))?;
        debug!(trade_id = %id, "Trade removed");
        Ok(entry)
    }

    pub async fn get(&self, id: TradeId) -> Option<TradeEntry> {
        self.store.read().await.entries.get(&id).cloned()
    }

    /// Point-in-time copy of every non-terminal entry, most recent first.
    pub async fn list_active(&self) -> Vec<TradeEntry> {
        let store = self.store.read().await;
        store
            .arrival
            .iter()
            .rev()
            .filter_map(|id| store.entries.get(id))
            .filter(|entry| !entry.state.is_terminal())
            .cloned()
            .collect()
    }

    pub async fn active_count(&self) -> usize {
        let store = self.store.read().await;
        store
            .entries
            .values()
            .filter(|entry| !entry.state.is_terminal())
            .count()
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.entries.is_empty()
    }

    /// Expires every `New`/`Active` entry received more than `max_age`
    /// before `now`. The write lock is released between batches.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<TradeId> {
        let max_age = to_chrono(self.settings.max_age);
        let cutoff = now.checked_sub_signed(max_age).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut expired = Vec::new();

        loop {
            let batch = {
                let mut store = self.store.write().await;
                let due: Vec<TradeId> = store
                    .arrival
                    .iter()
                    .filter_map(|id| store.entries.get(id))
                    .filter(|entry| !entry.state.is_terminal() && entry.received_at <= cutoff)
                    .map(|entry| entry.id)
                    .take(Self::SWEEP_BATCH_SIZE)
                    .collect();

                due.into_iter()
                    .filter_map(|id| store.apply_transition(id, TradeState::Expired, now).ok())
                    .collect::<Vec<TradeEntry>>()
            };

            let batch_len = batch.len();
            for entry in batch {
                expired.push(entry.id);
                self.persist(entry);
            }

            if batch_len < Self::SWEEP_BATCH_SIZE {
                break;
            }
            tokio::task::yield_now().await;
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "Expired stale trades");
        }
        expired
    }

    /// Drops terminal entries last updated before `older_than`.
    pub async fn prune_terminal(&self, older_than: DateTime<Utc>) -> usize {
        let mut store = self.store.write().await;
        let stale: Vec<TradeId> = store
            .entries
            .values()
            .filter(|entry| entry.state.is_terminal() && entry.updated_at < older_than)
            .map(|entry| entry.id)
            .collect();
        for id in stale.iter() {
            store.remove(*id);
        }
        if !stale.is_empty() {
            trace!(count = stale.len(), "Pruned terminal trades");
        }
        stale.len()
    }

    /// Drains parsed trades from the watcher into the registry, in order,
    /// until every sender is gone.
    pub fn spawn_ingest(&self, mut rx: mpsc::Receiver<ParsedTrade>) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            while let Some(parsed) = rx.recv().await {
                registry.add_trade(parsed).await;
            }
            debug!("Trade ingest channel closed, ingest task exiting");
        })
    }

    /// Runs the expiry sweep every `interval` until shutdown is signalled.
    pub fn spawn_sweeper(
        &self,
        interval: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                select! {
                    _ = ticker.tick() => {
                        let now = Utc::now();
                        registry.sweep_expired(now).await;
                        let retention = to_chrono(registry.settings.max_age.saturating_mul(4));
                        if let Some(older_than) = now.checked_sub_signed(retention) {
                            registry.prune_terminal(older_than).await;
                        }
                    },
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    },
                }
            }
            debug!("Expiry sweeper exiting");
        })
    }

    fn persist(&self, entry: TradeEntry) {
        if let Some(queue) = &self.persist_queue {
            queue.queue(entry);
        } else {
            trace!(trade_id = %entry.id, "No persistence configured");
        }
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::weeks(52 * 100))
}

impl Default for TradeRegistry {
    fn default() -> Self {
        Self::new(RegistrySettings::default())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::trade::MessageKind;

    fn parsed(player: &str, item: &str, secs: i64) -> ParsedTrade {
        ParsedTrade {
            player_name: player.to_string(),
            item_name: item.to_string(),
            kind: MessageKind::Incoming,
            price: Some("5 chaos".to_string()),
            league: Some("Standard".to_string()),
            trigger: "incoming".to_string(),
            raw_line: format!("@From {}: Hi, I would like to buy your {}", player, item),
            received_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_within_bucket_collapses() {
        let registry = TradeRegistry::default();
        let first = registry.add_trade(parsed("Buyer", "Tabula Rasa", 600)).await;
        let second = registry.add_trade(parsed("Buyer", "Tabula Rasa", 610)).await;

        assert!(matches!(first, AddOutcome::Added(_)));
        assert_eq!(second, AddOutcome::DuplicateIgnored(first.trade_id()));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_across_bucket_boundary_collapses() {
        let registry = TradeRegistry::default();
        let first = registry.add_trade(parsed("Buyer", "Tabula Rasa", 659)).await;
        let second = registry.add_trade(parsed("Buyer", "Tabula Rasa", 661)).await;
        assert_eq!(second, AddOutcome::DuplicateIgnored(first.trade_id()));
    }

    #[tokio::test]
    async fn test_terminal_entry_does_not_absorb_new_request() {
        let registry = TradeRegistry::default();
        let first = registry.add_trade(parsed("Buyer", "Tabula Rasa", 600)).await;
        registry
            .transition(first.trade_id(), TradeState::Active)
            .await
            .unwrap();
        registry
            .transition(first.trade_id(), TradeState::Completed)
            .await
            .unwrap();

        let second = registry.add_trade(parsed("Buyer", "Tabula Rasa", 605)).await;
        assert!(matches!(second, AddOutcome::Added(_)));
        assert_ne!(second.trade_id(), first.trade_id());
        assert_eq!(registry.len().await, 2);
        assert_eq!(registry.active_count().await, 1);
    }

    #[tokio::test]
    async fn test_list_active_is_most_recent_first() {
        let registry = TradeRegistry::default();
        registry.add_trade(parsed("A", "Item", 100)).await;
        registry.add_trade(parsed("B", "Item", 200)).await;
        let third = registry.add_trade(parsed("C", "Item", 300)).await;
        registry
            .transition(third.trade_id(), TradeState::Active)
            .await
            .unwrap();

        let players: Vec<String> = registry
            .list_active()
            .await
            .into_iter()
            .map(|entry| entry.player_name)
            .collect();
        assert_eq!(players, vec!["C", "B", "A"]);
    }

    #[tokio::test]
    async fn test_transition_not_found_and_invalid() {
        let registry = TradeRegistry::default();
        let missing = DedupKey::new("X", "Y", Utc::now(), Duration::from_secs(60)).trade_id(0);
        assert!(matches!(
            registry.transition(missing, TradeState::Active).await,
            Err(HelperError::TradeNotFound(_))
        ));

        let added = registry.add_trade(parsed("Buyer", "Item", 100)).await;
        assert!(matches!(
            registry
                .transition(added.trade_id(), TradeState::Completed)
                .await,
            Err(HelperError::InvalidTransition { .. })
        ));
        assert_eq!(
            registry.get(added.trade_id()).await.unwrap().state,
            TradeState::New
        );
    }

    #[tokio::test]
    async fn test_sweep_expires_only_eligible_entries() {
        let registry = TradeRegistry::new(RegistrySettings {
            dedup_bucket: Duration::from_secs(60),
            max_age: Duration::from_secs(100),
        });
        let old_new = registry.add_trade(parsed("A", "Item", 0)).await.trade_id();
        let old_active = registry.add_trade(parsed("B", "Item", 10)).await.trade_id();
        let old_done = registry.add_trade(parsed("C", "Item", 20)).await.trade_id();
        let fresh = registry.add_trade(parsed("D", "Item", 150)).await.trade_id();

        registry.transition(old_active, TradeState::Active).await.unwrap();
        registry.transition(old_done, TradeState::Active).await.unwrap();
        registry
            .transition(old_done, TradeState::Cancelled)
            .await
            .unwrap();

        let now = Utc.timestamp_opt(200, 0).unwrap();
        let mut expired = registry.sweep_expired(now).await;
        expired.sort();
        let mut expected = vec![old_new, old_active];
        expected.sort();
        assert_eq!(expired, expected);

        assert_eq!(registry.get(old_done).await.unwrap().state, TradeState::Cancelled);
        assert_eq!(registry.get(fresh).await.unwrap().state, TradeState::New);
        assert!(registry.sweep_expired(now).await.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_handles_more_than_one_batch() {
        let registry = TradeRegistry::default();
        for i in 0..(TradeRegistry::SWEEP_BATCH_SIZE * 2 + 5) {
            registry
                .add_trade(parsed(&format!("Player{}", i), "Item", 0))
                .await;
        }
        let expired = registry.sweep_expired(Utc::now()).await;
        assert_eq!(expired.len(), TradeRegistry::SWEEP_BATCH_SIZE * 2 + 5);
        assert_eq!(registry.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_remove_trade() {
        let registry = TradeRegistry::default();
        let added = registry.add_trade(parsed("Buyer", "Item", 100)).await;
        registry.remove_trade(added.trade_id()).await.unwrap();
        assert!(registry.is_empty().await);
        assert!(matches!(
            registry.remove_trade(added.trade_id()).await,
            Err(HelperError::TradeNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_restore_skips_terminal_entries() {
        let source = TradeRegistry::default();
        let kept = source.add_trade(parsed("A", "Item", 100)).await.trade_id();
        let done = source.add_trade(parsed("B", "Item", 100)).await.trade_id();
        source.transition(done, TradeState::Active).await.unwrap();
        source.transition(done, TradeState::Completed).await.unwrap();

        let entries = vec![
            source.get(kept).await.unwrap(),
            source.get(done).await.unwrap(),
        ];
        let registry = TradeRegistry::default();
        assert_eq!(registry.restore(entries).await, 1);
        assert_eq!(registry.list_active().await[0].id, kept);
    }
}
