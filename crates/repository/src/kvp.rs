//! Key-value pairs grouped in containers
//!
//! The smallest complete model on top of [`EntityRepository`]: each pair is
//! one row in the `kvp` table, partitioned by container, keyed by lookup
//! key, with the value in the `Value` property.
//!
//! ```
//! use std::sync::Arc;
//! use tablekeep_repository::KvpStore;
//! use tablekeep_storage::InMemoryTableStore;
//!
//! let kvps = KvpStore::new(Arc::new(InMemoryTableStore::new()));
//! kvps.create("container-A", "key-1", "v1").unwrap();
//! assert_eq!(kvps.get("container-A", "key-1").unwrap().as_deref(), Some("v1"));
//!
//! let mut pair = kvps.find("container-A", "key-1").unwrap().unwrap();
//! pair.set_value(|current| format!("{}+", current.unwrap_or_default())).unwrap();
//! assert_eq!(kvps.get("container-A", "key-1").unwrap().as_deref(), Some("v1+"));
//! ```

use crate::config::StoreConfig;
use crate::repository::EntityRepository;
use std::sync::Arc;
use tablekeep_concurrency::{CasOutcome, OptimisticEntity, Property};
use tablekeep_core::{ConditionalStore, Result, Row, RowAddress, Timestamp};

/// Table holding key-value pairs
pub const KVP_TABLE: &str = "kvp";

/// Property holding a pair's value
pub const VALUE_PROPERTY: &str = "Value";

type KvpFactory<S> = fn(OptimisticEntity<S>) -> Kvp<S>;

/// Store of key-value pairs
pub struct KvpStore<S: ConditionalStore + ?Sized> {
    repository: EntityRepository<S, KvpFactory<S>>,
}

impl<S: ConditionalStore + ?Sized> KvpStore<S> {
    /// Store over the default `kvp` table
    pub fn new(store: Arc<S>) -> Self {
        let factory: KvpFactory<S> = Kvp::new;
        Self {
            repository: EntityRepository::with_factory(store, KVP_TABLE, factory),
        }
    }

    /// Apply the table prefix and retry bound from `config`
    pub fn with_config(self, config: &StoreConfig) -> Self {
        Self {
            repository: self.repository.with_config(config),
        }
    }

    /// Underlying repository
    pub fn repository(&self) -> &EntityRepository<S, KvpFactory<S>> {
        &self.repository
    }

    /// Value stored under (`container`, `key`), if any
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if either part is empty.
    pub fn get(&self, container: &str, key: &str) -> Result<Option<String>> {
        match self.find(container, key)? {
            Some(pair) => pair.value(),
            None => Ok(None),
        }
    }

    /// Create the pair (`container`, `key`) holding `value`
    ///
    /// # Errors
    ///
    /// Returns `DuplicateResource` if the pair already exists.
    pub fn create(&self, container: &str, key: &str, value: &str) -> Result<Kvp<S>> {
        let row = Row::new(RowAddress::parse(container, key)?).with(VALUE_PROPERTY, value);
        self.repository.create(row)
    }

    /// Find the pair (`container`, `key`)
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if either part is empty.
    pub fn find(&self, container: &str, key: &str) -> Result<Option<Kvp<S>>> {
        self.repository.find_at(&RowAddress::parse(container, key)?)
    }

    /// Every pair, lazily
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn all(&self) -> Result<impl Iterator<Item = Result<Kvp<S>>> + '_> {
        self.repository.all()
    }
}

/// One key-value pair
pub struct Kvp<S: ConditionalStore + ?Sized> {
    entity: OptimisticEntity<S>,
}

impl<S: ConditionalStore + ?Sized> Kvp<S> {
    /// Wrap a row handle
    pub fn new(entity: OptimisticEntity<S>) -> Self {
        Self { entity }
    }

    /// Container (partition key)
    pub fn container(&self) -> &str {
        self.entity.address().partition_key.as_str()
    }

    /// Lookup key (row key)
    pub fn lookup_key(&self) -> &str {
        self.entity.address().row_key.as_str()
    }

    /// Value as last read or written through this handle
    ///
    /// # Errors
    ///
    /// Returns `PropertyType` if the value is not a string.
    pub fn value(&self) -> Result<Option<String>> {
        match self.entity.cached() {
            Some(row) => row.get_as(VALUE_PROPERTY),
            None => Ok(None),
        }
    }

    /// Time of the last write
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the pair was deleted.
    pub fn last_modified(&mut self) -> Result<Timestamp> {
        self.entity.last_modified()
    }

    /// Reread the pair
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the pair was deleted.
    pub fn refresh(&mut self) -> Result<()> {
        self.entity.refresh().map(|_| ())
    }

    /// Atomically replace the value with `update(current)`
    ///
    /// `update` sees the freshly read value and may run more than once.
    ///
    /// # Errors
    ///
    /// Same as [`OptimisticEntity::atomic_modify`].
    pub fn set_value<F>(&mut self, mut update: F) -> Result<()>
    where
        F: FnMut(Option<&str>) -> String,
    {
        self.entity.atomic_modify(
            |_| true,
            |row| {
                let next = update(row.get_str(VALUE_PROPERTY));
                row.set(VALUE_PROPERTY, next);
            },
        )?;
        Ok(())
    }

    /// Replace the value with `desired` only if it is currently `expected`
    ///
    /// # Errors
    ///
    /// Same as [`OptimisticEntity::compare_and_swap`].
    pub fn replace_value(
        &mut self,
        expected: &str,
        desired: &str,
    ) -> Result<CasOutcome<Option<String>>> {
        let value = Property::<Option<String>>::new(VALUE_PROPERTY);
        self.entity.compare_and_swap(
            &Some(expected.to_string()),
            Some(desired.to_string()),
            &value,
        )
    }

    /// Row handle
    pub fn entity(&self) -> &OptimisticEntity<S> {
        &self.entity
    }

    /// Consume into the row handle
    pub fn into_entity(self) -> OptimisticEntity<S> {
        self.entity
    }
}
