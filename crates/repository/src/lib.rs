//! Repository layer for tablekeep
//!
//! This crate turns rows into application objects:
//! - EntityRepository: create, find and query one table through a factory
//! - KvpStore / Kvp: string key-value pairs grouped in containers
//! - UniquenessRegistry: claim a value once per namespace
//! - StoreConfig: table prefix, retry bound and connection string from TOML

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod kvp;
pub mod repository;
pub mod unique;

pub use config::{ConnectionString, StoreConfig, CONFIG_FILE_NAME};
pub use kvp::{Kvp, KvpStore, KVP_TABLE, VALUE_PROPERTY};
pub use repository::{EntityFactory, EntityRepository, Handles};
pub use unique::{UniquenessRegistry, UNIQUENESS_TABLE};
