//! SQLite-backed record store whose tables mirror the catalog

pub mod schema_gen;

use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::parser::{calendar_day, Record, Value};
use crate::schema::Catalog;
use schema_gen::{generate_create_table, generate_indexes, quote_ident};

/// SQL function mapping a `DD.MM.YYYY` string to a comparable day number
pub const CALENDAR_DAY_FN: &str = "calendar_day";

/// A populated (or empty) store for one catalog.
///
/// Ingestion takes `&mut Store`, queries take `&Store`.
pub struct Store {
    conn: Connection,
    catalog: Catalog,
}

impl Store {
    /// Memory-backed store, discarded when dropped
    pub fn open_in_memory(catalog: Catalog) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, catalog)
    }

    /// File-backed store. Existing tables are kept, so re-importing the same
    /// sources into the same file is idempotent.
    pub fn open(db_path: &Path, catalog: Catalog) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;",
        )?;
        Self::init(conn, catalog)
    }

    /// File-backed store starting from an empty database
    pub fn create(db_path: &Path, catalog: Catalog) -> Result<Self> {
        // Remove existing database and any WAL leftovers
        for path in sidecar_paths(db_path) {
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
        }
        Self::open(db_path, catalog)
    }

    fn init(conn: Connection, catalog: Catalog) -> Result<Self> {
        catalog.validate()?;

        // Referential integrity is checked by the ingestion pipeline so that
        // permissive imports can keep orphan rows
        conn.execute_batch("PRAGMA foreign_keys = OFF;")?;

        conn.create_scalar_function(
            CALENDAR_DAY_FN,
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let day = match ctx.get_raw(0) {
                    rusqlite::types::ValueRef::Text(t) => {
                        std::str::from_utf8(t).ok().and_then(calendar_day)
                    }
                    _ => None,
                };
                Ok(day)
            },
        )?;

        let store = Self { conn, catalog };
        store.create_tables()?;
        Ok(store)
    }

    /// Create all tables, parents first
    fn create_tables(&self) -> Result<()> {
        let ordered = self.catalog.dependency_order()?;
        tracing::debug!(tables = ordered.len(), "creating tables");

        for entity in ordered {
            let relationships = entity
                .foreign_keys
                .iter()
                .map(|fk| self.catalog.relationship(&entity, fk))
                .collect::<Result<Vec<_>>>()?;

            self.conn
                .execute(&generate_create_table(&entity, &relationships), [])?;
            for index_sql in generate_indexes(&entity) {
                self.conn.execute(&index_sql, [])?;
            }
        }

        Ok(())
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Number of records of an entity
    pub fn record_count(&self, entity: &str) -> Result<u64> {
        let entity = self.catalog.resolve(entity)?;
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(&entity.name));
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// All records of an entity in insertion order
    pub fn scan(&self, entity: &str) -> Result<Vec<Record>> {
        let entity = self.catalog.resolve(entity)?;
        let columns: Vec<String> = entity
            .attributes
            .iter()
            .map(|a| quote_ident(&a.name))
            .collect();
        let sql = format!(
            "SELECT {} FROM {} ORDER BY rowid",
            columns.join(", "),
            quote_ident(&entity.name)
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let values = (0..columns.len())
                .map(|idx| row.get_ref(idx).map(Value::from))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            records.push(Record {
                entity: entity.clone(),
                values,
            });
        }
        Ok(records)
    }

    /// Finalize the database
    pub fn finalize(self) -> Result<()> {
        self.conn.execute_batch("PRAGMA optimize;")?;
        Ok(())
    }
}

/// The database file followed by its `-wal` and `-shm` companions
fn sidecar_paths(db_path: &Path) -> [PathBuf; 3] {
    let with_suffix = |suffix: &str| {
        let mut name = db_path.as_os_str().to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    };
    [db_path.to_path_buf(), with_suffix("-wal"), with_suffix("-shm")]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, AttributeType, ForeignKey};
    use crate::Error;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog
            .define_entity(
                "move",
                vec![
                    Attribute::required("ID операции", AttributeType::Integer),
                    Attribute::new("Артикул", AttributeType::Text),
                ],
                &["ID операции"],
                vec![ForeignKey::new("Артикул", "product")],
            )
            .unwrap();
        catalog
            .define_entity(
                "product",
                vec![
                    Attribute::required("Артикул", AttributeType::Text),
                    Attribute::new("Цена за упаковку", AttributeType::Decimal),
                ],
                &["Артикул"],
                vec![],
            )
            .unwrap();
        catalog
    }

    #[test]
    fn test_tables_created_in_memory() {
        let store = Store::open_in_memory(catalog()).unwrap();
        assert_eq!(store.record_count("move").unwrap(), 0);
        assert_eq!(store.record_count("product").unwrap(), 0);
        assert!(matches!(
            store.record_count("shop"),
            Err(Error::UnknownEntity(_))
        ));
    }

    #[test]
    fn test_invalid_catalog_rejected() {
        let mut catalog = Catalog::new();
        catalog
            .define_entity(
                "move",
                vec![
                    Attribute::required("id", AttributeType::Integer),
                    Attribute::new("shop", AttributeType::Text),
                ],
                &["id"],
                vec![ForeignKey::new("shop", "shop")],
            )
            .unwrap();
        assert!(matches!(
            Store::open_in_memory(catalog),
            Err(Error::UnknownEntity(_))
        ));
    }

    #[test]
    fn test_calendar_day_function() {
        let store = Store::open_in_memory(catalog()).unwrap();
        let (a, b): (Option<i64>, Option<i64>) = store
            .connection()
            .query_row(
                "SELECT calendar_day('10.08.2023') - calendar_day('02.08.2023'), calendar_day('garbage')",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(a, Some(8));
        assert_eq!(b, None);
    }

    #[test]
    fn test_file_store_reopens_existing_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");

        {
            let store = Store::create(&path, catalog()).unwrap();
            store
                .connection()
                .execute("INSERT INTO product VALUES ('A1', 12.5)", [])
                .unwrap();
            store.finalize().unwrap();
        }

        let store = Store::open(&path, catalog()).unwrap();
        assert_eq!(store.record_count("product").unwrap(), 1);
        let records = store.scan("product").unwrap();
        assert_eq!(records[0].get("Цена за упаковку"), Some(&Value::Decimal(12.5)));

        drop(store);
        let store = Store::create(&path, catalog()).unwrap();
        assert_eq!(store.record_count("product").unwrap(), 0);
    }

    #[test]
    fn test_create_discards_wal_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let [_, wal, shm] = sidecar_paths(&path);
        assert_eq!(wal, dir.path().join("store.db-wal"));
        assert_eq!(shm, dir.path().join("store.db-shm"));

        std::fs::write(&wal, b"stale").unwrap();
        std::fs::write(&shm, b"stale").unwrap();

        let store = Store::create(&path, catalog()).unwrap();
        assert_eq!(store.record_count("product").unwrap(), 0);
        for leftover in [&wal, &shm] {
            assert!(std::fs::read(leftover).map_or(true, |bytes| bytes != b"stale"));
        }
    }
}
