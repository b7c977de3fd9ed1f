//! End-to-end tests for the repository layer
//!
//! A small customer/order model built the way applications use this crate:
//! a factory wraps row handles into domain types, orders reference their
//! customer, order numbers come from a counter, and customer emails are
//! claimed through the uniqueness registry.

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

use proptest::prelude::*;
use tablekeep_concurrency::{AutoIncrement, OptimisticEntity, RetryPolicy};
use tablekeep_core::{
    reference, ConditionalStore, EntityReference, Error, ObjectId, PartitionKey, Row, RowAddress,
    RowKey,
};
use tablekeep_repository::{EntityRepository, KvpStore, StoreConfig, UniquenessRegistry};
use tablekeep_storage::InMemoryTableStore;

// ============================================================================
// Domain model
// ============================================================================

struct Customer {
    entity: OptimisticEntity<InMemoryTableStore>,
}

impl Customer {
    fn new(entity: OptimisticEntity<InMemoryTableStore>) -> Self {
        Self { entity }
    }

    fn name(&self) -> String {
        self.entity
            .cached()
            .and_then(|row| row.get_str("Name"))
            .unwrap_or_default()
            .to_string()
    }
}

struct Order {
    entity: OptimisticEntity<InMemoryTableStore>,
}

impl Order {
    fn new(entity: OptimisticEntity<InMemoryTableStore>) -> Self {
        Self { entity }
    }

    fn number(&self) -> i64 {
        self.entity.cached().unwrap().get_as("Number").unwrap()
    }

    fn customer(&self) -> EntityReference {
        let row = self.entity.cached().unwrap();
        let encoded = row.get_str("Customer").unwrap_or_default();
        reference::decode(encoded).unwrap()
    }
}

type Handle = OptimisticEntity<InMemoryTableStore>;
type Customers = EntityRepository<InMemoryTableStore, fn(Handle) -> Customer>;
type Orders = EntityRepository<InMemoryTableStore, fn(Handle) -> Order>;

fn customers(store: &Arc<InMemoryTableStore>) -> Customers {
    let factory: fn(Handle) -> Customer = Customer::new;
    EntityRepository::with_factory(Arc::clone(store), "customers", factory)
}

fn orders(store: &Arc<InMemoryTableStore>) -> Orders {
    let factory: fn(Handle) -> Order = Order::new;
    EntityRepository::with_factory(Arc::clone(store), "orders", factory)
}

fn place_order(
    store: &Arc<InMemoryTableStore>,
    orders: &Orders,
    customer: &EntityReference,
) -> Order {
    let numbers = AutoIncrement::new(Arc::clone(store));
    let number = numbers
        .allocate(
            "counters",
            &PartitionKey::new("orders").unwrap(),
            &RowKey::new("next").unwrap(),
        )
        .unwrap();
    let row = Row::new(RowAddress::for_id(ObjectId::new()))
        .with("Number", number)
        .with("Customer", customer.encode());
    orders.create(row).unwrap()
}

// ============================================================================
// Entity repository
// ============================================================================

mod entity_repository {
    use super::*;

    #[test]
    fn test_order_resolves_its_customer() {
        let store = Arc::new(InMemoryTableStore::new());
        let customers = customers(&store);
        let orders = orders(&store);

        let id = ObjectId::new();
        let ada = customers
            .create(Row::new(RowAddress::for_id(id)).with("Name", "Ada"))
            .unwrap();
        let ada_ref = ada.entity.reference();

        let order = place_order(&store, &orders, &ada_ref);
        assert_eq!(order.number(), 1);

        let owner = customers
            .get_referenced_object(&order.customer())
            .unwrap()
            .unwrap();
        assert_eq!(owner.name(), "Ada");
        assert_eq!(owner.entity.object_id().unwrap(), id);
    }

    #[test]
    fn test_query_on_finds_orders_of_one_customer() {
        let store = Arc::new(InMemoryTableStore::new());
        let customers = customers(&store);
        let orders = orders(&store);

        let ada = customers
            .create(Row::new(RowAddress::for_id(ObjectId::new())).with("Name", "Ada"))
            .unwrap()
            .entity
            .reference();
        let bob = customers
            .create(Row::new(RowAddress::for_id(ObjectId::new())).with("Name", "Bob"))
            .unwrap()
            .entity
            .reference();

        for customer in [&ada, &bob, &ada, &ada] {
            place_order(&store, &orders, customer);
        }

        let mut numbers: Vec<i64> = orders
            .query_on("Customer", &ada)
            .unwrap()
            .map(|order| order.unwrap().number())
            .collect();
        numbers.sort_unstable();
        assert_eq!(numbers, vec![1, 3, 4]);
        assert_eq!(orders.query_on("Customer", &bob).unwrap().count(), 1);
    }

    #[test]
    fn test_find_by_urn_and_locator() {
        let store = Arc::new(InMemoryTableStore::new());
        let customers = customers(&store);
        let created = customers
            .create(Row::new(RowAddress::for_id(ObjectId::new())).with("Name", "Ada"))
            .unwrap();

        let locator = created.entity.locator("tablekeep", "example.org").unwrap();
        let urn = locator.to_string();
        assert!(urn.starts_with("urn:tablekeep:example.org:"));

        assert_eq!(customers.find_by_urn(&urn).unwrap().unwrap().name(), "Ada");
        assert_eq!(
            customers.find_by_locator(&locator).unwrap().unwrap().name(),
            "Ada"
        );
        assert!(customers.find_by_urn("not-a-urn").is_err());
    }

    #[test]
    fn test_missing_table_reads_as_empty() {
        let store = Arc::new(InMemoryTableStore::new());
        let orders = orders(&store);
        let anyone = EntityReference::to("customers", &RowAddress::for_id(ObjectId::new()));

        assert!(orders.find_by_id(ObjectId::new()).unwrap().is_none());
        assert_eq!(orders.query_on("Customer", &anyone).unwrap().count(), 0);
        assert!(!store.table_exists("orders").unwrap());
    }
}

// ============================================================================
// Concurrency through the repository
// ============================================================================

mod concurrent_use {
    use super::*;

    fn patient() -> StoreConfig {
        StoreConfig {
            retry: RetryPolicy::new()
                .with_max_attempts(100_000)
                .with_base_delay_ms(0),
            ..StoreConfig::default()
        }
    }

    #[test]
    fn test_concurrent_kvp_updates_are_all_applied() {
        const THREADS: usize = 8;
        const UPDATES: usize = 25;

        let store = Arc::new(InMemoryTableStore::new());
        let kvps = Arc::new(KvpStore::new(Arc::clone(&store)).with_config(&patient()));
        kvps.create("container-A", "key-1", "").unwrap();
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let kvps = Arc::clone(&kvps);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let mut pair = kvps.find("container-A", "key-1").unwrap().unwrap();
                    barrier.wait();
                    for _ in 0..UPDATES {
                        pair.set_value(|current| format!("{}{}", current.unwrap_or_default(), t))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let value = kvps.get("container-A", "key-1").unwrap().unwrap();
        assert_eq!(value.len(), THREADS * UPDATES);
        for t in 0..THREADS {
            let digit = char::from_digit(t as u32, 10).unwrap();
            assert_eq!(value.chars().filter(|c| *c == digit).count(), UPDATES);
        }
    }

    #[test]
    fn test_racing_creates_have_one_winner() {
        const THREADS: usize = 8;

        let store = Arc::new(InMemoryTableStore::new());
        let kvps = Arc::new(KvpStore::new(Arc::clone(&store)));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let kvps = Arc::clone(&kvps);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    match kvps.create("container-A", "key-1", &t.to_string()) {
                        Ok(_) => Some(t),
                        Err(Error::DuplicateResource(_)) => None,
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                })
            })
            .collect();
        let winners: Vec<usize> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();

        assert_eq!(winners.len(), 1);
        assert_eq!(
            kvps.get("container-A", "key-1").unwrap(),
            Some(winners[0].to_string())
        );
    }

    #[test]
    fn test_racing_registrations_have_one_winner() {
        const THREADS: usize = 8;

        let store = Arc::new(InMemoryTableStore::new());
        let registry = Arc::new(UniquenessRegistry::new(Arc::clone(&store)));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    registry.try_register("email", "ada@example.com").unwrap()
                })
            })
            .collect();
        let claimed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(claimed, 1);
    }

    #[test]
    fn test_concurrent_orders_get_distinct_numbers() {
        const THREADS: usize = 4;
        const ORDERS: usize = 20;

        let store = Arc::new(InMemoryTableStore::new());
        let ada = EntityReference::to("customers", &RowAddress::for_id(ObjectId::new()));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let store = Arc::clone(&store);
                let ada = ada.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let orders = orders(&store);
                    barrier.wait();
                    (0..ORDERS)
                        .map(|_| place_order(&store, &orders, &ada).number())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            for n in h.join().unwrap() {
                assert!(seen.insert(n), "order number {} issued twice", n);
            }
        }
        assert_eq!(seen.len(), THREADS * ORDERS);
        assert_eq!(seen.iter().max().copied(), Some((THREADS * ORDERS) as i64));
    }
}

// ============================================================================
// Configuration file
// ============================================================================

mod configuration {
    use super::*;

    #[test]
    fn test_config_file_drives_table_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(tablekeep_repository::CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            "table_prefix = \"staging\"\n\n[retry]\nmax_attempts = 5\n",
        )
        .unwrap();

        let config = StoreConfig::from_file(&path).unwrap();
        let store = Arc::new(InMemoryTableStore::new());
        let kvps = KvpStore::new(Arc::clone(&store)).with_config(&config);
        let registry = UniquenessRegistry::new(Arc::clone(&store)).with_config(&config);

        kvps.create("c", "k", "v").unwrap();
        registry.try_register("email", "ada").unwrap();

        let mut tables = store.table_names();
        tables.sort();
        assert_eq!(tables, vec!["stagingkvp", "staginguniqueness"]);

        let pair = kvps.find("c", "k").unwrap().unwrap();
        assert_eq!(pair.entity().policy().max_attempts, 5);
    }
}

// ============================================================================
// Property-based tests
// ============================================================================

proptest! {
    #[test]
    fn prop_created_pairs_are_found(
        container in "[a-zA-Z0-9-]{1,12}",
        key in "[a-zA-Z0-9-]{1,12}",
        value in "[ -~]{0,32}",
    ) {
        let kvps = KvpStore::new(Arc::new(InMemoryTableStore::new()));
        kvps.create(&container, &key, &value).unwrap();
        prop_assert_eq!(kvps.get(&container, &key).unwrap(), Some(value));
    }

    #[test]
    fn prop_references_resolve_to_their_row(n in 1usize..20) {
        let store = Arc::new(InMemoryTableStore::new());
        let customers = customers(&store);
        let ids: Vec<ObjectId> = (0..n).map(|_| ObjectId::new()).collect();
        for (i, id) in ids.iter().enumerate() {
            customers
                .create(Row::new(RowAddress::for_id(*id)).with("Name", format!("c{}", i)))
                .unwrap();
        }
        for (i, id) in ids.iter().enumerate() {
            let target = customers.reference_to(&RowAddress::for_id(*id));
            let found = customers.get_referenced_object(&target).unwrap().unwrap();
            prop_assert_eq!(found.name(), format!("c{}", i));
        }
    }
}
