//! Persistence interface and an in-memory implementation

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{debug, warn};

use punchwire_types::{PunchLog, Template, UserRecord, Vendor};

use crate::drain::RecordSink;
use crate::error::{Error, Result};

/// Transactional store the engine writes downloaded data into
///
/// Writes are only valid between [`Store::begin`] and
/// [`Store::commit`]/[`Store::rollback`]; reads see uncommitted writes of the
/// open transaction.
#[async_trait]
pub trait Store: Send {
    async fn begin(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// Insert the user or update its credential and card
    async fn upsert_user(&mut self, user: &UserRecord) -> Result<()>;

    /// Users among `ids`; unknown ids are skipped
    async fn load_users(&mut self, ids: &[u64]) -> Result<Vec<UserRecord>>;

    /// Ids of every user that is not deleted
    async fn active_user_ids(&mut self) -> Result<Vec<u64>>;

    /// Soft-delete the user's templates for `vendor`, then insert `templates`
    async fn replace_templates(
        &mut self,
        user_id: u64,
        vendor: Vendor,
        templates: &[Template],
    ) -> Result<()>;

    /// Live templates of `vendor` belonging to `ids`
    async fn load_templates(&mut self, vendor: Vendor, ids: &[u64]) -> Result<Vec<Template>>;

    async fn insert_punch(&mut self, punch: &PunchLog) -> Result<()>;
}

/// Commit `result` on success, roll back on failure
///
/// A failing rollback is logged and never replaces the original error.
pub async fn settle<T>(store: &mut dyn Store, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            store.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = store.rollback().await {
                warn!("Rollback failed after {}: {}", e, rollback);
            }
            Err(e)
        }
    }
}

/// Inserts every drained punch
pub struct PunchSink<'s> {
    pub store: &'s mut dyn Store,
}

#[async_trait]
impl RecordSink<PunchLog> for PunchSink<'_> {
    async fn accept(&mut self, record: PunchLog) -> Result<()> {
        self.store.insert_punch(&record).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MemoryStoreError {
    #[error("No transaction is open")]
    NoTransaction,

    #[error("A transaction is already open")]
    TransactionOpen,
}

#[derive(Debug, Clone)]
struct TemplateRow {
    vendor: Vendor,
    template: Template,
    deleted: bool,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    users: BTreeMap<u64, UserRecord>,
    templates: Vec<TemplateRow>,
    punches: Vec<PunchLog>,
}

/// Snapshot-transaction store kept in memory
///
/// `begin` copies the committed tables; `commit` swaps the copy in and
/// `rollback` drops it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    committed: Tables,
    open: Option<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a committed user
    pub fn with_user(mut self, user: UserRecord) -> Self {
        self.committed.users.insert(user.user_id, user);
        self
    }

    /// Seed a committed template
    pub fn with_template(mut self, vendor: Vendor, template: Template) -> Self {
        self.committed.templates.push(TemplateRow {
            vendor,
            template,
            deleted: false,
        });
        self
    }

    /// Committed punches
    pub fn punches(&self) -> &[PunchLog] {
        &self.committed.punches
    }

    /// Committed users, ordered by id
    pub fn users(&self) -> Vec<UserRecord> {
        self.committed.users.values().cloned().collect()
    }

    /// Committed live templates of `vendor`
    pub fn templates(&self, vendor: Vendor) -> Vec<Template> {
        live(&self.committed, vendor)
            .map(|row| row.template.clone())
            .collect()
    }

    /// Committed soft-deleted templates of `vendor`
    pub fn deleted_templates(&self, vendor: Vendor) -> usize {
        self.committed
            .templates
            .iter()
            .filter(|row| row.vendor == vendor && row.deleted)
            .count()
    }

    pub fn in_transaction(&self) -> bool {
        self.open.is_some()
    }

    fn tables(&self) -> &Tables {
        self.open.as_ref().unwrap_or(&self.committed)
    }

    fn writable(&mut self) -> Result<&mut Tables> {
        self.open
            .as_mut()
            .ok_or_else(|| Error::store(MemoryStoreError::NoTransaction))
    }
}

fn live(tables: &Tables, vendor: Vendor) -> impl Iterator<Item = &TemplateRow> {
    tables
        .templates
        .iter()
        .filter(move |row| row.vendor == vendor && !row.deleted)
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&mut self) -> Result<()> {
        if self.open.is_some() {
            return Err(Error::store(MemoryStoreError::TransactionOpen));
        }
        self.open = Some(self.committed.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let tables = self
            .open
            .take()
            .ok_or_else(|| Error::store(MemoryStoreError::NoTransaction))?;
        self.committed = tables;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        match self.open.take() {
            Some(_) => {
                debug!("Rolled back memory store transaction");
                Ok(())
            }
            None => Err(Error::store(MemoryStoreError::NoTransaction)),
        }
    }

    async fn upsert_user(&mut self, user: &UserRecord) -> Result<()> {
        self.writable()?.users.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn load_users(&mut self, ids: &[u64]) -> Result<Vec<UserRecord>> {
        let users = &self.tables().users;
        Ok(ids.iter().filter_map(|id| users.get(id).cloned()).collect())
    }

    async fn active_user_ids(&mut self) -> Result<Vec<u64>> {
        Ok(self.tables().users.keys().copied().collect())
    }

    async fn replace_templates(
        &mut self,
        user_id: u64,
        vendor: Vendor,
        templates: &[Template],
    ) -> Result<()> {
        let tables = self.writable()?;
        for row in tables
            .templates
            .iter_mut()
            .filter(|row| row.vendor == vendor && row.template.user_id == user_id)
        {
            row.deleted = true;
        }
        tables
            .templates
            .extend(templates.iter().cloned().map(|template| TemplateRow {
                vendor,
                template,
                deleted: false,
            }));
        Ok(())
    }

    async fn load_templates(&mut self, vendor: Vendor, ids: &[u64]) -> Result<Vec<Template>> {
        Ok(live(self.tables(), vendor)
            .filter(|row| ids.contains(&row.template.user_id))
            .map(|row| row.template.clone())
            .collect())
    }

    async fn insert_punch(&mut self, punch: &PunchLog) -> Result<()> {
        self.writable()?.punches.push(punch.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let mut store = MemoryStore::new();

        store.begin().await.unwrap();
        store.upsert_user(&UserRecord::new(7)).await.unwrap();
        assert_eq!(store.active_user_ids().await.unwrap(), vec![7]);
        store.rollback().await.unwrap();

        assert!(store.users().is_empty());
        assert!(!store.in_transaction());
    }

    #[tokio::test]
    async fn test_writes_require_transaction() {
        let mut store = MemoryStore::new();
        let result = store.upsert_user(&UserRecord::new(1)).await;
        assert!(matches!(result, Err(Error::Store(_))));

        store.begin().await.unwrap();
        assert!(store.begin().await.is_err());
    }

    #[tokio::test]
    async fn test_replace_templates_soft_deletes() {
        let mut store = MemoryStore::new()
            .with_user(UserRecord::new(3))
            .with_template(Vendor::Soyal, Template::new(3, 0, vec![1u8; 384]))
            .with_template(Vendor::Anviz, Template::new(3, 1, vec![2u8; 338]));

        store.begin().await.unwrap();
        store
            .replace_templates(3, Vendor::Soyal, &[Template::new(3, 0, vec![9u8; 768])])
            .await
            .unwrap();
        store.commit().await.unwrap();

        let soyal = store.templates(Vendor::Soyal);
        assert_eq!(soyal.len(), 1);
        assert_eq!(soyal[0].data.len(), 768);
        assert_eq!(store.deleted_templates(Vendor::Soyal), 1);
        assert_eq!(store.templates(Vendor::Anviz).len(), 1);
    }

    #[tokio::test]
    async fn test_settle_commits_or_rolls_back() {
        let mut store = MemoryStore::new();

        store.begin().await.unwrap();
        store.upsert_user(&UserRecord::new(1)).await.unwrap();
        settle(&mut store, Ok(())).await.unwrap();
        assert_eq!(store.users().len(), 1);

        store.begin().await.unwrap();
        store.upsert_user(&UserRecord::new(2)).await.unwrap();
        let failed: Result<()> = Err(Error::NotSupported("test".into()));
        assert!(settle(&mut store, failed).await.is_err());
        assert_eq!(store.users().len(), 1);
    }
}
