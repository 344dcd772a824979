//! Keyed-table storage abstraction
//!
//! # Tables
//!
//! - `bonds` - bond rows (key: issuer|bondId)
//! - `contracts` - fractional-unit rows (key: issuer|contractId)
//! - `trades` - trade rows (key: big-endian trade id)
//! - `sequences` - monotonic counters (key: sequence name)
//! - `instructions` - payment-instruction outbox (key: contractId|type)
//! - `meta` - singleton settings such as the callback target id
//!
//! All rows are bincode-serialized structs written with full-row replace.
//! `StateStore` is the injection seam: registries take `Arc<dyn StateStore>`
//! so unit tests run against [`MemoryStore`] while production uses
//! [`RocksStore`].

use crate::{
    config::Config,
    error::{Error, Result},
};
use parking_lot::RwLock;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, DB};
use std::collections::{BTreeMap, HashMap};

/// Bond rows
pub const TABLE_BONDS: &str = "bonds";
/// Contract rows
pub const TABLE_CONTRACTS: &str = "contracts";
/// Trade rows
pub const TABLE_TRADES: &str = "trades";
/// Monotonic counters
pub const TABLE_SEQUENCES: &str = "sequences";
/// Payment-instruction outbox
pub const TABLE_INSTRUCTIONS: &str = "instructions";
/// Singleton settings
pub const TABLE_META: &str = "meta";

const ALL_TABLES: [&str; 6] = [
    TABLE_BONDS,
    TABLE_CONTRACTS,
    TABLE_TRADES,
    TABLE_SEQUENCES,
    TABLE_INSTRUCTIONS,
    TABLE_META,
];

/// Composite key `a|b` for two-part table keys
pub fn composite_key(a: &str, b: &str) -> Vec<u8> {
    let mut key = a.as_bytes().to_vec();
    key.push(b'|');
    key.extend_from_slice(b.as_bytes());
    key
}

/// Keyed mapping store consumed by the registries
pub trait StateStore: Send + Sync {
    /// Point lookup
    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Insert a new row; fails with `DuplicateKey` if the key exists
    fn insert(&self, table: &str, key: &[u8], value: &[u8]) -> Result<()>;

    /// Full-row upsert
    fn replace(&self, table: &str, key: &[u8], value: &[u8]) -> Result<()>;

    /// Delete a row; fails with `NotFound` if the key is absent
    fn delete(&self, table: &str, key: &[u8]) -> Result<()>;

    /// Range scan of all rows whose key starts with `prefix` (empty prefix
    /// scans the whole table)
    fn scan(&self, table: &str, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// In-memory store for unit tests and embedded use
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let tables = self.tables.read();
        Ok(tables.get(table).and_then(|t| t.get(key).cloned()))
    }

    fn insert(&self, table: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let mut tables = self.tables.write();
        let t = tables.entry(table.to_string()).or_default();
        if t.contains_key(key) {
            return Err(Error::DuplicateKey(format!(
                "{}/{}",
                table,
                String::from_utf8_lossy(key)
            )));
        }
        t.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn replace(&self, table: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let mut tables = self.tables.write();
        tables
            .entry(table.to_string())
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, table: &str, key: &[u8]) -> Result<()> {
        let mut tables = self.tables.write();
        let removed = tables.get_mut(table).and_then(|t| t.remove(key));
        if removed.is_none() {
            return Err(Error::NotFound(format!(
                "{}/{}",
                table,
                String::from_utf8_lossy(key)
            )));
        }
        Ok(())
    }

    fn scan(&self, table: &str, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let tables = self.tables.read();
        let mut rows = Vec::new();
        if let Some(t) = tables.get(table) {
            for (key, value) in t.range(prefix.to_vec()..) {
                if !key.starts_with(prefix) {
                    break;
                }
                rows.push((key.clone(), value.clone()));
            }
        }
        Ok(rows)
    }
}

/// RocksDB-backed store, one column family per table
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Open or create the database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_TABLES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name)))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!("Opened RocksDB at {:?} with {} tables", path, ALL_TABLES.len());

        Ok(Self { db })
    }

    fn cf_options(table: &str) -> Options {
        let mut opts = Options::default();
        match table {
            // Entity rows are read-heavy, favor fast decompression
            TABLE_BONDS | TABLE_CONTRACTS | TABLE_TRADES => {
                opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
            }
            // Counters and settings are tiny, skip compression
            _ => {
                opts.set_compression_type(rocksdb::DBCompressionType::None);
            }
        }
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }
}

impl StateStore for RocksStore {
    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.cf_handle(table)?;
        Ok(self.db.get_cf(cf, key)?)
    }

    fn insert(&self, table: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let cf = self.cf_handle(table)?;
        if self.db.get_cf(cf, key)?.is_some() {
            return Err(Error::DuplicateKey(format!(
                "{}/{}",
                table,
                String::from_utf8_lossy(key)
            )));
        }
        self.db.put_cf(cf, key, value)?;
        Ok(())
    }

    fn replace(&self, table: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let cf = self.cf_handle(table)?;
        self.db.put_cf(cf, key, value)?;
        Ok(())
    }

    fn delete(&self, table: &str, key: &[u8]) -> Result<()> {
        let cf = self.cf_handle(table)?;
        if self.db.get_cf(cf, key)?.is_none() {
            return Err(Error::NotFound(format!(
                "{}/{}",
                table,
                String::from_utf8_lossy(key)
            )));
        }
        self.db.delete_cf(cf, key)?;
        Ok(())
    }

    fn scan(&self, table: &str, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let cf = self.cf_handle(table)?;
        let mode = if prefix.is_empty() {
            IteratorMode::Start
        } else {
            IteratorMode::From(prefix, Direction::Forward)
        };

        let mut rows = Vec::new();
        for item in self.db.iterator_cf(cf, mode) {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            rows.push((key.to_vec(), value.to_vec()));
        }
        Ok(rows)
    }
}
