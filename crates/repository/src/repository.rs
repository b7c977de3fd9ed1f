//! Entity repository
//!
//! An [`EntityRepository`] is the typed front door to one table. It creates
//! rows, finds them by key, id, locator or partition scan, and wraps every
//! row it returns into the caller's own type through an [`EntityFactory`].
//!
//! Finding never fails on absence: a missing row (or a missing table) is
//! `Ok(None)` or an empty iterator.

use crate::config::StoreConfig;
use std::sync::Arc;
use tablekeep_concurrency::{OptimisticEntity, RetryPolicy};
use tablekeep_core::{
    reference, ConditionalStore, EntityReference, Error, Locator, ObjectId, PartitionKey,
    Result, Row, RowAddress, RowIter, RowKey, Value,
};
use tracing::{debug, trace};

/// Turns a row handle into the caller's domain type
///
/// Implemented for every `Fn(OptimisticEntity<S>) -> W`, so a constructor
/// function or a closure can be passed directly.
pub trait EntityFactory<S: ConditionalStore + ?Sized> {
    /// Domain type produced
    type Output;

    /// Wrap `entity`
    fn wrap(&self, entity: OptimisticEntity<S>) -> Self::Output;
}

impl<S, W, F> EntityFactory<S> for F
where
    S: ConditionalStore + ?Sized,
    F: Fn(OptimisticEntity<S>) -> W,
{
    type Output = W;

    fn wrap(&self, entity: OptimisticEntity<S>) -> W {
        self(entity)
    }
}

/// Factory that hands out the row handles themselves
#[derive(Debug, Clone, Copy, Default)]
pub struct Handles;

impl<S: ConditionalStore + ?Sized> EntityFactory<S> for Handles {
    type Output = OptimisticEntity<S>;

    fn wrap(&self, entity: OptimisticEntity<S>) -> OptimisticEntity<S> {
        entity
    }
}

/// Typed access to one table
pub struct EntityRepository<S: ConditionalStore + ?Sized, F = Handles> {
    store: Arc<S>,
    name: String,
    table: String,
    factory: F,
    policy: RetryPolicy,
}

impl<S: ConditionalStore + ?Sized> EntityRepository<S, Handles> {
    /// Repository over `table` returning plain row handles
    pub fn new(store: Arc<S>, table: impl Into<String>) -> Self {
        Self::with_factory(store, table, Handles)
    }
}

impl<S, F> EntityRepository<S, F>
where
    S: ConditionalStore + ?Sized,
    F: EntityFactory<S>,
{
    /// Repository over `table` wrapping rows with `factory`
    pub fn with_factory(store: Arc<S>, table: impl Into<String>, factory: F) -> Self {
        let name = table.into();
        Self {
            store,
            table: name.clone(),
            name,
            factory,
            policy: RetryPolicy::default(),
        }
    }

    /// Apply the table prefix and retry bound from `config`
    pub fn with_config(mut self, config: &StoreConfig) -> Self {
        self.table = config.table_name(&self.name);
        self.policy = config.retry.clone();
        self
    }

    /// Full table name
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Backend
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Insert a new row and return it wrapped
    ///
    /// Creates the table on first use.
    ///
    /// # Errors
    ///
    /// - `DuplicateResource` if the row's keys are taken; the stored row is
    ///   left unchanged
    /// - any other backend error, unchanged
    pub fn create(&self, row: Row) -> Result<F::Output> {
        self.store.ensure_table(&self.table)?;

        let receipt = match self.store.insert(&self.table, &row) {
            Ok(receipt) => receipt,
            Err(e) if e.is_already_exists() => {
                debug!(table = %self.table, address = %row.address(), "Duplicate resource");
                return Err(Error::DuplicateResource(row.location(&self.table)));
            }
            Err(e) => return Err(e),
        };

        debug!(table = %self.table, address = %row.address(), version = %receipt.version, "Created entity");
        let mut stored = row;
        stored.apply_receipt(&receipt);
        Ok(self.wrap(&self.table, stored))
    }

    /// Find the row at (`partition_key`, `row_key`)
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn find(&self, partition_key: &PartitionKey, row_key: &RowKey) -> Result<Option<F::Output>> {
        self.find_in(&self.table, partition_key, row_key)
    }

    /// Find the row at `address`
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn find_at(&self, address: &RowAddress) -> Result<Option<F::Output>> {
        self.find(&address.partition_key, &address.row_key)
    }

    /// Find the row whose keys derive from `id`
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn find_by_id(&self, id: ObjectId) -> Result<Option<F::Output>> {
        self.find_at(&RowAddress::for_id(id))
    }

    /// Find by row key alone, deriving the partition key by hashing
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn find_by_hashed_row_key(&self, row_key: &RowKey) -> Result<Option<F::Output>> {
        self.find_at(&RowAddress::for_row_key(row_key.clone()))
    }

    /// Find the row a locator points at
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn find_by_locator(&self, locator: &Locator) -> Result<Option<F::Output>> {
        self.find_at(locator.address())
    }

    /// Parse a URN and find the row it points at
    ///
    /// # Errors
    ///
    /// Returns `InvalidLocator` / `InvalidKey` if `urn` does not parse.
    pub fn find_by_urn(&self, urn: &str) -> Result<Option<F::Output>> {
        self.find_by_locator(&Locator::parse(urn)?)
    }

    /// First row (in row-key order) of a partition
    ///
    /// For rows whose partition key is known but whose row key is not.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn find_by_partition_scan(&self, partition_key: &PartitionKey) -> Result<Option<F::Output>> {
        let any_row = |_: &Row| true;
        let mut rows = match self.store.scan_partition(&self.table, partition_key, &any_row) {
            Ok(rows) => rows,
            Err(Error::TableNotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        rows.next()
            .transpose()
            .map(|row| row.map(|row| self.wrap(&self.table, row)))
    }

    /// Every row of the table, lazily
    ///
    /// Creates the table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn all(&self) -> Result<impl Iterator<Item = Result<F::Output>> + '_> {
        self.store.ensure_table(&self.table)?;
        let rows = self.store.scan_all(&self.table)?;
        Ok(rows.map(move |row| row.map(|row| self.wrap(&self.table, row))))
    }

    /// Rows whose `property` holds the encoded `target` reference
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn query_on<'a>(
        &'a self,
        property: &'a str,
        target: &EntityReference,
    ) -> Result<impl Iterator<Item = Result<F::Output>> + 'a> {
        let encoded = reference::encode(target);
        let rows: RowIter<'a> = match self.store.scan_all(&self.table) {
            Ok(rows) => rows,
            Err(Error::TableNotFound(_)) => Box::new(std::iter::empty()),
            Err(e) => return Err(e),
        };
        Ok(rows
            .filter(move |row| match row {
                Ok(row) => matches!(row.get(property), Some(Value::String(s)) if *s == encoded),
                Err(_) => true,
            })
            .map(move |row| row.map(|row| self.wrap(&self.table, row))))
    }

    /// Resolve a reference, against the table it names
    ///
    /// The empty reference resolves to `None`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if the reference names a table but an empty key.
    pub fn get_referenced_object(&self, target: &EntityReference) -> Result<Option<F::Output>> {
        if target.is_empty() {
            return Ok(None);
        }
        let address = target.address()?;
        let table = if target.table_name.is_empty() {
            self.table.as_str()
        } else {
            target.table_name.as_str()
        };
        self.find_in(table, &address.partition_key, &address.row_key)
    }

    /// Reference to the row at `address` in this repository's table
    pub fn reference_to(&self, address: &RowAddress) -> EntityReference {
        EntityReference::to(self.table.as_str(), address)
    }

    /// Delete the row at `address`
    ///
    /// Returns false if there was nothing to delete.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn delete(&self, address: &RowAddress) -> Result<bool> {
        let removed = self
            .store
            .delete(&self.table, &address.partition_key, &address.row_key)?;
        debug!(table = %self.table, address = %address, removed, "Deleted entity");
        Ok(removed)
    }

    fn find_in(
        &self,
        table: &str,
        partition_key: &PartitionKey,
        row_key: &RowKey,
    ) -> Result<Option<F::Output>> {
        let row = self.store.get(table, partition_key, row_key)?;
        trace!(
            table = %table,
            partition_key = %partition_key,
            row_key = %row_key,
            found = row.is_some(),
            "Find entity"
        );
        Ok(row.map(|row| self.wrap(table, row)))
    }

    fn wrap(&self, table: &str, row: Row) -> F::Output {
        let entity = OptimisticEntity::from_row(Arc::clone(&self.store), table, row)
            .with_policy(self.policy.clone());
        self.factory.wrap(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablekeep_storage::InMemoryTableStore;

    fn repository() -> EntityRepository<InMemoryTableStore> {
        EntityRepository::new(Arc::new(InMemoryTableStore::new()), "users")
    }

    fn user(id: ObjectId, name: &str) -> Row {
        Row::new(RowAddress::for_id(id)).with("Name", name)
    }

    #[test]
    fn test_create_then_find_by_id() {
        let users = repository();
        let id = ObjectId::new();
        let created = users.create(user(id, "ada")).unwrap();
        assert!(created.cached().unwrap().version().is_some());

        let mut found = users.find_by_id(id).unwrap().unwrap();
        assert_eq!(found.row().unwrap().get_str("Name"), Some("ada"));
        assert_eq!(found.object_id().unwrap(), id);
        assert_eq!(found.table(), "users");
    }

    #[test]
    fn test_created_cache_equals_stored_row() {
        let users = repository();
        let id = ObjectId::new();
        let created = users.create(user(id, "ada")).unwrap();

        let address = RowAddress::for_id(id);
        let stored = users
            .store()
            .get("users", &address.partition_key, &address.row_key)
            .unwrap();
        assert_eq!(created.cached(), stored.as_ref());
    }

    #[test]
    fn test_create_duplicate_leaves_row_unchanged() {
        let users = repository();
        let id = ObjectId::new();
        users.create(user(id, "ada")).unwrap();

        let err = users.create(user(id, "grace")).err().unwrap();
        assert!(matches!(err, Error::DuplicateResource(ref loc) if loc.table == "users"));

        let mut found = users.find_by_id(id).unwrap().unwrap();
        assert_eq!(found.row().unwrap().get_str("Name"), Some("ada"));
    }

    #[test]
    fn test_find_absent_is_none() {
        let users = repository();
        // Table does not even exist yet.
        assert!(users.find_by_id(ObjectId::new()).unwrap().is_none());
        users.create(user(ObjectId::new(), "ada")).unwrap();
        assert!(users.find_by_id(ObjectId::new()).unwrap().is_none());
        let pk = PartitionKey::new("nothing-here").unwrap();
        assert!(users.find_by_partition_scan(&pk).unwrap().is_none());
    }

    #[test]
    fn test_find_by_hashed_row_key_and_urn() {
        let users = repository();
        let id = ObjectId::new();
        let created = users.create(user(id, "ada")).unwrap();

        let found = users
            .find_by_hashed_row_key(&RowKey::from_id(id))
            .unwrap()
            .unwrap();
        assert_eq!(found.address(), created.address());

        let urn = created.locator("users", "acme.table.example.net").unwrap().to_string();
        let via_urn = users.find_by_urn(&urn).unwrap().unwrap();
        assert_eq!(via_urn.address(), created.address());

        assert!(matches!(
            users.find_by_urn("not-a-urn"),
            Err(Error::InvalidLocator(_))
        ));
    }

    #[test]
    fn test_find_by_partition_scan_returns_first_row() {
        let users = repository();
        for rk in ["b", "a", "c"] {
            users
                .create(Row::new(RowAddress::parse("team", rk).unwrap()))
                .unwrap();
        }
        let first = users
            .find_by_partition_scan(&PartitionKey::new("team").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(first.address().row_key.as_str(), "a");
    }

    #[test]
    fn test_all_creates_table_and_wraps_rows() {
        let users = EntityRepository::with_factory(
            Arc::new(InMemoryTableStore::new()),
            "users",
            |mut entity: OptimisticEntity<InMemoryTableStore>| {
                entity
                    .row()
                    .ok()
                    .and_then(|row| row.get_str("Name").map(str::to_string))
            },
        );
        assert_eq!(users.all().unwrap().count(), 0);
        assert!(users.store().table_exists("users").unwrap());

        users.create(user(ObjectId::new(), "ada")).unwrap();
        users.create(user(ObjectId::new(), "grace")).unwrap();
        let mut names: Vec<String> = users
            .all()
            .unwrap()
            .map(|r| r.unwrap().unwrap())
            .collect();
        names.sort();
        assert_eq!(names, vec!["ada", "grace"]);
    }

    #[test]
    fn test_query_on_matches_encoded_reference() {
        let store = Arc::new(InMemoryTableStore::new());
        let teams = EntityRepository::new(Arc::clone(&store), "teams");
        let members = EntityRepository::new(Arc::clone(&store), "members");

        let red = teams.create(user(ObjectId::new(), "red")).unwrap().reference();
        let blue = teams.create(user(ObjectId::new(), "blue")).unwrap().reference();

        for (name, team) in [("ada", &red), ("grace", &blue), ("alan", &red)] {
            members
                .create(user(ObjectId::new(), name).with("Team", team.encode()))
                .unwrap();
        }

        let mut names: Vec<String> = members
            .query_on("Team", &red)
            .unwrap()
            .map(|m| m.unwrap().cached().unwrap().get_str("Name").unwrap().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["ada", "alan"]);

        assert_eq!(
            EntityRepository::new(store, "absent")
                .query_on("Team", &red)
                .unwrap()
                .count(),
            0
        );
    }

    #[test]
    fn test_get_referenced_object_uses_reference_table() {
        let store = Arc::new(InMemoryTableStore::new());
        let teams = EntityRepository::new(Arc::clone(&store), "teams");
        let members = EntityRepository::new(Arc::clone(&store), "members");

        let team = teams.create(user(ObjectId::new(), "red")).unwrap();
        let resolved = members
            .get_referenced_object(&team.reference())
            .unwrap()
            .unwrap();
        assert_eq!(resolved.table(), "teams");
        assert_eq!(resolved.cached().unwrap().get_str("Name"), Some("red"));

        assert!(members
            .get_referenced_object(&EntityReference::default())
            .unwrap()
            .is_none());
        assert!(members
            .get_referenced_object(&EntityReference::new("", "", "teams"))
            .is_err());
    }

    #[test]
    fn test_delete_and_reference_to() {
        let users = repository();
        let id = ObjectId::new();
        let created = users.create(user(id, "ada")).unwrap();
        let reference = users.reference_to(created.address());
        assert_eq!(reference, created.reference());

        assert!(users.delete(created.address()).unwrap());
        assert!(!users.delete(created.address()).unwrap());
        assert!(users.get_referenced_object(&reference).unwrap().is_none());
    }

    #[test]
    fn test_with_config_prefixes_table() {
        let config = StoreConfig::from_toml_str("table_prefix = \"staging\"").unwrap();
        let users = repository().with_config(&config);
        assert_eq!(users.table(), "stagingusers");
        users.create(user(ObjectId::new(), "ada")).unwrap();
        assert!(users.store().table_exists("stagingusers").unwrap());
        assert!(!users.store().table_exists("users").unwrap());
    }
}
