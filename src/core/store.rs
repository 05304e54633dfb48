//! In-memory entity-indexed transaction store.
//!
//! One reader-writer lock guards every map, so a reader can never see a
//! record in an index without it also being in the primary table.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use super::{BlocklistEntry, DeliveryTarget, EntityType, ListType, ScoredTransaction};
use crate::error::StoreError;

type History = Vec<Arc<ScoredTransaction>>;

#[derive(Debug, Default)]
struct StoreInner {
    transactions: HashMap<String, Arc<ScoredTransaction>>,
    by_email: HashMap<String, History>,
    by_ip: HashMap<String, History>,
    by_bin: HashMap<String, History>,
    by_device: HashMap<String, History>,
    /// Distinct card BINs ever seen per IP address.
    bins_by_ip: HashMap<String, HashSet<String>>,
    blocklist: HashMap<String, BlocklistEntry>,
    delivery_targets: HashMap<String, DeliveryTarget>,
}

impl StoreInner {
    fn index(&self, entity: EntityType) -> &HashMap<String, History> {
        match entity {
            EntityType::Email => &self.by_email,
            EntityType::Ip => &self.by_ip,
            EntityType::Bin => &self.by_bin,
            EntityType::Device => &self.by_device,
        }
    }

    fn index_mut(&mut self, entity: EntityType) -> &mut HashMap<String, History> {
        match entity {
            EntityType::Email => &mut self.by_email,
            EntityType::Ip => &mut self.by_ip,
            EntityType::Bin => &mut self.by_bin,
            EntityType::Device => &mut self.by_device,
        }
    }
}

/// Shared store of scored transactions, block/allow rules and delivery targets.
#[derive(Debug, Default)]
pub struct EntityStore {
    inner: RwLock<StoreInner>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Transactions ---

    /// Insert a scored transaction into the primary table and every index.
    /// A duplicate identifier leaves the store untouched.
    pub fn save(&self, tx: ScoredTransaction) -> Result<Arc<ScoredTransaction>, StoreError> {
        let mut inner = self.inner.write();
        let id = tx.id().to_string();
        if inner.transactions.contains_key(&id) {
            return Err(StoreError::DuplicateIdentifier(id));
        }

        let tx = Arc::new(tx);
        for entity in EntityType::ALL {
            let key = tx.request.entity_value(entity).to_string();
            inner
                .index_mut(entity)
                .entry(key)
                .or_default()
                .push(Arc::clone(&tx));
        }
        inner
            .bins_by_ip
            .entry(tx.request.ip_address.clone())
            .or_default()
            .insert(tx.request.card_bin.clone());
        inner.transactions.insert(id, Arc::clone(&tx));

        Ok(tx)
    }

    pub fn get(&self, id: &str) -> Option<Arc<ScoredTransaction>> {
        self.inner.read().transactions.get(id).cloned()
    }

    /// All records for one entity at or after `since`, in no particular order.
    pub fn query_by_entity(
        &self,
        entity: EntityType,
        value: &str,
        since: DateTime<Utc>,
    ) -> Vec<Arc<ScoredTransaction>> {
        let inner = self.inner.read();
        inner
            .index(entity)
            .get(value)
            .map(|history| {
                history
                    .iter()
                    .filter(|tx| tx.request.timestamp >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn query_by_entity_days(
        &self,
        entity: EntityType,
        value: &str,
        days: u32,
        now: DateTime<Utc>,
    ) -> Vec<Arc<ScoredTransaction>> {
        self.query_by_entity(entity, value, now - Duration::days(i64::from(days)))
    }

    /// Count of distinct card BINs ever used from `ip`. Not time-windowed.
    pub fn distinct_card_prefix_count(&self, ip: &str) -> usize {
        self.inner
            .read()
            .bins_by_ip
            .get(ip)
            .map_or(0, HashSet::len)
    }

    /// Full scan of every record at or after `since`.
    pub fn query_all(&self, since: DateTime<Utc>) -> Vec<Arc<ScoredTransaction>> {
        self.inner
            .read()
            .transactions
            .values()
            .filter(|tx| tx.request.timestamp >= since)
            .cloned()
            .collect()
    }

    pub fn query_all_days(&self, days: u32, now: DateTime<Utc>) -> Vec<Arc<ScoredTransaction>> {
        self.query_all(now - Duration::days(i64::from(days)))
    }

    pub fn len(&self) -> usize {
        self.inner.read().transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // --- Blocklist / allowlist ---

    pub fn upsert_blocklist_entry(&self, entry: BlocklistEntry) {
        self.inner.write().blocklist.insert(entry.id.clone(), entry);
    }

    /// Returns false if no entry had this id.
    pub fn delete_blocklist_entry(&self, id: &str) -> bool {
        self.inner.write().blocklist.remove(id).is_some()
    }

    pub fn check_blocklist(&self, entity: EntityType, value: &str) -> Option<BlocklistEntry> {
        self.check_blocklist_at(entity, value, Utc::now())
    }

    /// Live entry for an entity as of `now`. A block outranks an allow for the same value.
    pub fn check_blocklist_at(
        &self,
        entity: EntityType,
        value: &str,
        now: DateTime<Utc>,
    ) -> Option<BlocklistEntry> {
        let inner = self.inner.read();
        let mut hit: Option<&BlocklistEntry> = None;
        for entry in inner.blocklist.values() {
            if entry.entity_type != entity || entry.value != value || !entry.is_active_at(now) {
                continue;
            }
            if entry.list_type == ListType::Block {
                return Some(entry.clone());
            }
            hit.get_or_insert(entry);
        }
        hit.cloned()
    }

    /// Every non-expired entry, oldest first.
    pub fn list_active_blocklist_entries(&self) -> Vec<BlocklistEntry> {
        let now = Utc::now();
        let mut entries: Vec<BlocklistEntry> = self
            .inner
            .read()
            .blocklist
            .values()
            .filter(|e| e.is_active_at(now))
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        entries
    }

    // --- Delivery targets ---

    pub fn upsert_delivery_target(&self, target: DeliveryTarget) {
        self.inner
            .write()
            .delivery_targets
            .insert(target.id.clone(), target);
    }

    pub fn delete_delivery_target(&self, id: &str) -> bool {
        self.inner.write().delivery_targets.remove(id).is_some()
    }

    pub fn list_active_delivery_targets(&self) -> Vec<DeliveryTarget> {
        self.inner
            .read()
            .delivery_targets
            .values()
            .filter(|t| t.active)
            .cloned()
            .collect()
    }
}
