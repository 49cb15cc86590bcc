//! Persistent state: baskets, risk profiles, target allocations, trade
//! previews, and basket-trade groups.
//!
//! A narrow [`Store`] trait with two backends: [`MemoryStore`] for tests
//! and demos, [`RedbStore`] for durable single-file storage.
//! Transactions are scoped per mutation.

use crate::error::{ServiceError, ServiceResult};
use chrono::{DateTime, Utc};
use palisade_core::RiskProfile;
use palisade_intel::Basket;
use parking_lot::RwLock;
use redb::{Database, ReadableTable, TableDefinition};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

const BASKETS: TableDefinition<&str, &[u8]> = TableDefinition::new("baskets");
const PROFILES: TableDefinition<&str, &[u8]> = TableDefinition::new("risk_profiles");
const ALLOCATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("target_allocations");
const PREVIEWS: TableDefinition<&str, &[u8]> = TableDefinition::new("trade_previews");
const GROUPS: TableDefinition<&str, &[u8]> = TableDefinition::new("basket_trade_groups");

/// Order side of a trade preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeSide {
    /// Buy.
    Buy,
    /// Sell.
    Sell,
}

/// A persisted trade preview with a TTL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePreview {
    /// Preview id.
    pub id: String,
    /// Owning user.
    pub user_id: String,
    /// Symbol to trade.
    pub symbol: String,
    /// Quantity (contracts or shares).
    pub quantity: f64,
    /// Side.
    pub side: TradeSide,
    /// Price used for the estimate.
    pub estimated_price: f64,
    /// Estimated total cost.
    pub estimated_cost: f64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Expiry time.
    pub expires_at: DateTime<Utc>,
    /// Set when the preview has been executed.
    pub executed: bool,
    /// Linking id for multi-leg basket trades.
    pub group_id: Option<String>,
}

impl TradePreview {
    /// True when the preview is past its TTL.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// A persisted target allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetAllocation {
    /// Owning user.
    pub user_id: String,
    /// Allocation name.
    pub name: String,
    /// Target weights by symbol.
    pub weights: BTreeMap<String, f64>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

/// A group linking the legs of a multi-leg basket trade preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasketTradeGroup {
    /// Group id.
    pub id: String,
    /// Owning user.
    pub user_id: String,
    /// Member preview ids.
    pub preview_ids: Vec<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Narrow persistence interface; one transaction per mutation.
pub trait Store: Send + Sync {
    /// Inserts or replaces a basket.
    fn put_basket(&self, basket: &Basket) -> ServiceResult<()>;
    /// Fetches one basket.
    fn get_basket(&self, user_id: &str, name: &str) -> ServiceResult<Option<Basket>>;
    /// Lists a user's baskets.
    fn list_baskets(&self, user_id: &str) -> ServiceResult<Vec<Basket>>;
    /// Deletes a basket; returns whether it existed.
    fn delete_basket(&self, user_id: &str, name: &str) -> ServiceResult<bool>;

    /// Inserts or replaces a user's risk profile.
    fn put_risk_profile(&self, user_id: &str, profile: &RiskProfile) -> ServiceResult<()>;
    /// Fetches a user's risk profile.
    fn get_risk_profile(&self, user_id: &str) -> ServiceResult<Option<RiskProfile>>;

    /// Inserts or replaces a target allocation.
    fn put_target_allocation(&self, allocation: &TargetAllocation) -> ServiceResult<()>;
    /// Lists a user's target allocations.
    fn list_target_allocations(&self, user_id: &str) -> ServiceResult<Vec<TargetAllocation>>;

    /// Inserts or replaces a trade preview.
    fn put_trade_preview(&self, preview: &TradePreview) -> ServiceResult<()>;
    /// Fetches a trade preview by id.
    fn get_trade_preview(&self, id: &str) -> ServiceResult<Option<TradePreview>>;

    /// Inserts or replaces a basket-trade group.
    fn put_trade_group(&self, group: &BasketTradeGroup) -> ServiceResult<()>;
    /// Fetches a basket-trade group by id.
    fn get_trade_group(&self, id: &str) -> ServiceResult<Option<BasketTradeGroup>>;
}

fn scoped_key(user_id: &str, name: &str) -> String {
    format!("{user_id}/{name}")
}

// =============================================================================
// MEMORY BACKEND
// =============================================================================

/// In-memory backend for tests and demo mode.
#[derive(Default)]
pub struct MemoryStore {
    baskets: RwLock<BTreeMap<String, Basket>>,
    profiles: RwLock<BTreeMap<String, RiskProfile>>,
    allocations: RwLock<BTreeMap<String, TargetAllocation>>,
    previews: RwLock<BTreeMap<String, TradePreview>>,
    groups: RwLock<BTreeMap<String, BasketTradeGroup>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn put_basket(&self, basket: &Basket) -> ServiceResult<()> {
        self.baskets
            .write()
            .insert(scoped_key(&basket.user_id, &basket.name), basket.clone());
        Ok(())
    }

    fn get_basket(&self, user_id: &str, name: &str) -> ServiceResult<Option<Basket>> {
        Ok(self.baskets.read().get(&scoped_key(user_id, name)).cloned())
    }

    fn list_baskets(&self, user_id: &str) -> ServiceResult<Vec<Basket>> {
        let prefix = format!("{user_id}/");
        Ok(self
            .baskets
            .read()
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(_, v)| v.clone())
            .collect())
    }

    fn delete_basket(&self, user_id: &str, name: &str) -> ServiceResult<bool> {
        Ok(self
            .baskets
            .write()
            .remove(&scoped_key(user_id, name))
            .is_some())
    }

    fn put_risk_profile(&self, user_id: &str, profile: &RiskProfile) -> ServiceResult<()> {
        self.profiles
            .write()
            .insert(user_id.to_string(), profile.clone());
        Ok(())
    }

    fn get_risk_profile(&self, user_id: &str) -> ServiceResult<Option<RiskProfile>> {
        Ok(self.profiles.read().get(user_id).cloned())
    }

    fn put_target_allocation(&self, allocation: &TargetAllocation) -> ServiceResult<()> {
        self.allocations.write().insert(
            scoped_key(&allocation.user_id, &allocation.name),
            allocation.clone(),
        );
        Ok(())
    }

    fn list_target_allocations(&self, user_id: &str) -> ServiceResult<Vec<TargetAllocation>> {
        let prefix = format!("{user_id}/");
        Ok(self
            .allocations
            .read()
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(_, v)| v.clone())
            .collect())
    }

    fn put_trade_preview(&self, preview: &TradePreview) -> ServiceResult<()> {
        self.previews
            .write()
            .insert(preview.id.clone(), preview.clone());
        Ok(())
    }

    fn get_trade_preview(&self, id: &str) -> ServiceResult<Option<TradePreview>> {
        Ok(self.previews.read().get(id).cloned())
    }

    fn put_trade_group(&self, group: &BasketTradeGroup) -> ServiceResult<()> {
        self.groups.write().insert(group.id.clone(), group.clone());
        Ok(())
    }

    fn get_trade_group(&self, id: &str) -> ServiceResult<Option<BasketTradeGroup>> {
        Ok(self.groups.read().get(id).cloned())
    }
}

// =============================================================================
// REDB BACKEND
// =============================================================================

/// Durable single-file backend over redb.
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Opens (or creates) the database file and its tables.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be created or opened.
    pub fn open(path: impl AsRef<Path>) -> ServiceResult<Self> {
        let db = Database::create(path).map_err(|e| ServiceError::Storage {
            reason: e.to_string(),
        })?;
        let store = Self { db: Arc::new(db) };
        // Create tables up front so reads never race table creation.
        let tx = store.begin_write()?;
        for table in [BASKETS, PROFILES, ALLOCATIONS, PREVIEWS, GROUPS] {
            tx.open_table(table).map_err(storage_err)?;
        }
        tx.commit().map_err(storage_err)?;
        Ok(store)
    }

    fn begin_write(&self) -> ServiceResult<redb::WriteTransaction> {
        self.db.begin_write().map_err(storage_err)
    }

    fn put<T: Serialize>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
        value: &T,
    ) -> ServiceResult<()> {
        let encoded = serde_json::to_vec(value).map_err(storage_err)?;
        let tx = self.begin_write()?;
        {
            let mut t = tx.open_table(table).map_err(storage_err)?;
            t.insert(key, encoded.as_slice()).map_err(storage_err)?;
        }
        tx.commit().map_err(storage_err)
    }

    fn get<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> ServiceResult<Option<T>> {
        let tx = self.db.begin_read().map_err(storage_err)?;
        let t = tx.open_table(table).map_err(storage_err)?;
        match t.get(key).map_err(storage_err)? {
            Some(guard) => {
                let value = serde_json::from_slice(guard.value()).map_err(storage_err)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn list_prefix<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        prefix: &str,
    ) -> ServiceResult<Vec<T>> {
        let tx = self.db.begin_read().map_err(storage_err)?;
        let t = tx.open_table(table).map_err(storage_err)?;
        let mut out = Vec::new();
        for item in t.iter().map_err(storage_err)? {
            let (key, value) = item.map_err(storage_err)?;
            if key.value().starts_with(prefix) {
                out.push(serde_json::from_slice(value.value()).map_err(storage_err)?);
            }
        }
        Ok(out)
    }

    fn delete(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> ServiceResult<bool> {
        let tx = self.begin_write()?;
        let existed = {
            let mut t = tx.open_table(table).map_err(storage_err)?;
            let removed = t.remove(key).map_err(storage_err)?.is_some();
            removed
        };
        tx.commit().map_err(storage_err)?;
        Ok(existed)
    }
}

fn storage_err(err: impl std::fmt::Display) -> ServiceError {
    ServiceError::Storage {
        reason: err.to_string(),
    }
}

impl Store for RedbStore {
    fn put_basket(&self, basket: &Basket) -> ServiceResult<()> {
        self.put(BASKETS, &scoped_key(&basket.user_id, &basket.name), basket)
    }

    fn get_basket(&self, user_id: &str, name: &str) -> ServiceResult<Option<Basket>> {
        self.get(BASKETS, &scoped_key(user_id, name))
    }

    fn list_baskets(&self, user_id: &str) -> ServiceResult<Vec<Basket>> {
        self.list_prefix(BASKETS, &format!("{user_id}/"))
    }

    fn delete_basket(&self, user_id: &str, name: &str) -> ServiceResult<bool> {
        self.delete(BASKETS, &scoped_key(user_id, name))
    }

    fn put_risk_profile(&self, user_id: &str, profile: &RiskProfile) -> ServiceResult<()> {
        self.put(PROFILES, user_id, profile)
    }

    fn get_risk_profile(&self, user_id: &str) -> ServiceResult<Option<RiskProfile>> {
        self.get(PROFILES, user_id)
    }

    fn put_target_allocation(&self, allocation: &TargetAllocation) -> ServiceResult<()> {
        self.put(
            ALLOCATIONS,
            &scoped_key(&allocation.user_id, &allocation.name),
            allocation,
        )
    }

    fn list_target_allocations(&self, user_id: &str) -> ServiceResult<Vec<TargetAllocation>> {
        self.list_prefix(ALLOCATIONS, &format!("{user_id}/"))
    }

    fn put_trade_preview(&self, preview: &TradePreview) -> ServiceResult<()> {
        self.put(PREVIEWS, &preview.id, preview)
    }

    fn get_trade_preview(&self, id: &str) -> ServiceResult<Option<TradePreview>> {
        self.get(PREVIEWS, id)
    }

    fn put_trade_group(&self, group: &BasketTradeGroup) -> ServiceResult<()> {
        self.put(GROUPS, &group.id, group)
    }

    fn get_trade_group(&self, id: &str) -> ServiceResult<Option<BasketTradeGroup>> {
        self.get(GROUPS, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use palisade_intel::WeightingMethod;

    fn basket(user: &str, name: &str) -> Basket {
        Basket {
            user_id: user.to_string(),
            name: name.to_string(),
            tickers: vec!["AAA".to_string()],
            weights: None,
            weighting_method: WeightingMethod::Equal,
            updated_at: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
        }
    }

    fn roundtrip(store: &dyn Store) {
        store.put_basket(&basket("u1", "Tech")).unwrap();
        store.put_basket(&basket("u1", "Energy")).unwrap();
        store.put_basket(&basket("u2", "Other")).unwrap();

        assert!(store.get_basket("u1", "Tech").unwrap().is_some());
        assert_eq!(store.list_baskets("u1").unwrap().len(), 2);
        assert!(store.delete_basket("u1", "Tech").unwrap());
        assert!(!store.delete_basket("u1", "Tech").unwrap());
        assert_eq!(store.list_baskets("u1").unwrap().len(), 1);

        let profile = RiskProfile::default();
        store.put_risk_profile("u1", &profile).unwrap();
        assert_eq!(store.get_risk_profile("u1").unwrap(), Some(profile));
        assert_eq!(store.get_risk_profile("u3").unwrap(), None);

        let preview = TradePreview {
            id: "p1".to_string(),
            user_id: "u1".to_string(),
            symbol: "SPY".to_string(),
            quantity: 10.0,
            side: TradeSide::Buy,
            estimated_price: 500.0,
            estimated_cost: 5_000.0,
            created_at: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
            expires_at: Utc.with_ymd_and_hms(2025, 6, 1, 0, 15, 0).unwrap(),
            executed: false,
            group_id: None,
        };
        store.put_trade_preview(&preview).unwrap();
        assert_eq!(store.get_trade_preview("p1").unwrap(), Some(preview));
    }

    #[test]
    fn test_memory_roundtrip() {
        roundtrip(&MemoryStore::new());
    }

    #[test]
    fn test_redb_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("palisade.redb")).unwrap();
        roundtrip(&store);
    }

    #[test]
    fn test_preview_expiry() {
        let preview = TradePreview {
            id: "p1".to_string(),
            user_id: "u1".to_string(),
            symbol: "SPY".to_string(),
            quantity: 10.0,
            side: TradeSide::Buy,
            estimated_price: 500.0,
            estimated_cost: 5_000.0,
            created_at: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
            expires_at: Utc.with_ymd_and_hms(2025, 6, 1, 0, 15, 0).unwrap(),
            executed: false,
            group_id: None,
        };
        let before = Utc.with_ymd_and_hms(2025, 6, 1, 0, 10, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 6, 1, 0, 20, 0).unwrap();
        assert!(!preview.is_expired(before));
        assert!(preview.is_expired(after));
    }
}
