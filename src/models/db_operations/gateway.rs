use chrono::DateTime;
use redb::{
    CommitError, Database, DatabaseError, ReadableTable, StorageError, TableDefinition, TableError,
    TransactionError,
};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

/// An untyped row as it travels to and from the store.
pub type Record = Map<String, Value>;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Redb database error: {0}")]
    RedbDatabase(#[from] DatabaseError),
    #[error("Redb storage error: {0}")]
    RedbStorage(#[from] StorageError),
    #[error("Redb transaction error: {0}")]
    RedbTransaction(#[from] TransactionError),
    #[error("Redb table error: {0}")]
    RedbTable(#[from] TableError),
    #[error("Redb commit error: {0}")]
    RedbCommit(#[from] CommitError),
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("Stored row is not a JSON object")]
    NotAnObject,
    #[error("Another row already holds {column} '{value}'")]
    Conflict { column: &'static str, value: String },
}

impl GatewayError {
    /// True when another process holds the database file open.
    pub fn is_store_locked(&self) -> bool {
        matches!(self, GatewayError::RedbDatabase(DatabaseError::DatabaseAlreadyOpen))
    }
}

pub const POSTS: TableDefinition<&[u8; 16], &str> = TableDefinition::new("posts");
pub const CATEGORIES: TableDefinition<&[u8; 16], &str> = TableDefinition::new("categories");
pub const USER_ROLES: TableDefinition<&[u8; 16], &str> = TableDefinition::new("user_roles");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Posts,
    Categories,
    UserRoles,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Posts, Collection::Categories, Collection::UserRoles];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Posts => "posts",
            Self::Categories => "categories",
            Self::UserRoles => "user_roles",
        }
    }

    fn table(&self) -> TableDefinition<'static, &'static [u8; 16], &'static str> {
        match self {
            Self::Posts => POSTS,
            Self::Categories => CATEGORIES,
            Self::UserRoles => USER_ROLES,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: &'static str,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: &'static str, value: impl Into<Value>) -> Self {
        Filter { column, value: value.into() }
    }

    fn matches(&self, record: &Record) -> bool {
        record.get(self.column).unwrap_or(&Value::Null) == &self.value
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: &'static str,
    pub descending: bool,
}

/// Equality filters, at most one ordering and an optional limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::eq(column, value));
        self
    }

    pub fn order_asc(mut self, column: &'static str) -> Self {
        self.order = Some(Order { column, descending: false });
        self
    }

    pub fn order_desc(mut self, column: &'static str) -> Self {
        self.order = Some(Order { column, descending: true });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, record: &Record) -> bool {
        self.filters.iter().all(|f| f.matches(record))
    }

    fn apply(&self, mut rows: Vec<Record>) -> Vec<Record> {
        rows.retain(|row| self.matches(row));
        if let Some(order) = &self.order {
            rows.sort_by(|a, b| compare_column(a.get(order.column), b.get(order.column), order.descending));
        }
        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }
        rows
    }
}

/// Row-level CRUD over named collections. Every row carries a string `id`
/// assigned on insert.
pub trait PersistenceGateway: Send + Sync {
    fn select(&self, collection: Collection, query: &Query) -> Result<Vec<Record>, GatewayError>;

    fn insert(&self, collection: Collection, record: Record) -> Result<Record, GatewayError>;

    /// Shallow-merges `patch` into the row. Returns `None` when no row has `id`.
    fn update(&self, collection: Collection, id: &str, patch: Record) -> Result<Option<Record>, GatewayError>;

    /// `insert`, refused with `GatewayError::Conflict` when another row
    /// already holds the record's value in `column`. The check and the write
    /// share one transaction.
    fn insert_unique(&self, collection: Collection, record: Record, column: &'static str) -> Result<Record, GatewayError>;

    /// `update` with the same guard applied to the merged row.
    fn update_unique(
        &self,
        collection: Collection,
        id: &str,
        patch: Record,
        column: &'static str,
    ) -> Result<Option<Record>, GatewayError>;

    /// Removes every row matching all `filters` and returns how many went.
    fn delete(&self, collection: Collection, filters: &[Filter]) -> Result<usize, GatewayError>;
}

// Nulls sort last in both directions. Strings that both parse as RFC 3339
// compare chronologically.
fn compare_column(a: Option<&Value>, b: Option<&Value>, descending: bool) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    let ordering = match (a, b) {
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Greater,
        (Some(_), None) => return Ordering::Less,
        (Some(a), Some(b)) => compare_values(a, b),
    };
    if descending {
        ordering.reverse()
    } else {
        ordering
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => {
            match (DateTime::parse_from_rfc3339(x), DateTime::parse_from_rfc3339(y)) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.to_lowercase().cmp(&y.to_lowercase()),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn parse_record(raw: &str) -> Result<Record, GatewayError> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        _ => Err(GatewayError::NotAnObject),
    }
}

fn key_for(id: &str) -> Option<[u8; 16]> {
    Uuid::parse_str(id).ok().map(|uuid| uuid.into_bytes())
}

/// Stores each collection as a redb table keyed by UUID bytes with the row
/// serialized as JSON text.
pub struct RedbGateway {
    db: Database,
}

impl RedbGateway {
    /// Opens the database file, creating it and its tables if needed.
    pub fn open(path: &Path) -> Result<Self, GatewayError> {
        let db = Database::create(path)?;
        let gateway = RedbGateway { db };
        gateway.ensure_tables()?;
        Ok(gateway)
    }

    pub fn ensure_tables(&self) -> Result<(), GatewayError> {
        let write_txn = self.db.begin_write()?;
        for collection in Collection::ALL {
            log::debug!("Ensuring '{}' table exists in Redb", collection.name());
            write_txn.open_table(collection.table())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn write_new(&self, collection: Collection, mut record: Record, unique: Option<&'static str>) -> Result<Record, GatewayError> {
        let row_uuid = Uuid::new_v4();
        let row_id_bytes = row_uuid.into_bytes();
        record.insert("id".to_string(), Value::String(row_uuid.to_string()));
        let row_json = serde_json::to_string(&record)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(collection.table())?;
            if let Some(column) = unique {
                ensure_unclaimed(&table, column, &record, &row_id_bytes)?;
            }
            table.insert(&row_id_bytes, row_json.as_str())?;
        }
        write_txn.commit()?;

        Ok(record)
    }

    fn merge_existing(
        &self,
        collection: Collection,
        id: &str,
        patch: Record,
        unique: Option<&'static str>,
    ) -> Result<Option<Record>, GatewayError> {
        let Some(row_id_bytes) = key_for(id) else {
            return Ok(None);
        };

        let write_txn = self.db.begin_write()?;
        let merged = {
            let mut table = write_txn.open_table(collection.table())?;
            let current = table
                .get(&row_id_bytes)?
                .map(|guard| parse_record(guard.value()))
                .transpose()?;

            match current {
                Some(mut row) => {
                    for (column, value) in patch {
                        if column != "id" {
                            row.insert(column, value);
                        }
                    }
                    if let Some(column) = unique {
                        ensure_unclaimed(&table, column, &row, &row_id_bytes)?;
                    }
                    let row_json = serde_json::to_string(&row)?;
                    table.insert(&row_id_bytes, row_json.as_str())?;
                    Some(row)
                }
                None => None,
            }
        };
        write_txn.commit()?;

        Ok(merged)
    }
}

// Fails when a row other than `own_key` holds the same non-null value in
// `column`. Runs inside the caller's write transaction.
fn ensure_unclaimed(
    table: &impl ReadableTable<&'static [u8; 16], &'static str>,
    column: &'static str,
    record: &Record,
    own_key: &[u8; 16],
) -> Result<(), GatewayError> {
    let Some(value) = record.get(column).filter(|v| !v.is_null()) else {
        return Ok(());
    };
    for entry in table.iter()? {
        let (row_id, raw) = entry?;
        if row_id.value() == own_key {
            continue;
        }
        if parse_record(raw.value())?.get(column) == Some(value) {
            return Err(GatewayError::Conflict {
                column,
                value: value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string()),
            });
        }
    }
    Ok(())
}

impl PersistenceGateway for RedbGateway {
    fn select(&self, collection: Collection, query: &Query) -> Result<Vec<Record>, GatewayError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(collection.table())?;

        let mut rows = Vec::new();
        for entry in table.iter()? {
            let (_id, raw) = entry?;
            rows.push(parse_record(raw.value())?);
        }
        Ok(query.apply(rows))
    }

    fn insert(&self, collection: Collection, record: Record) -> Result<Record, GatewayError> {
        self.write_new(collection, record, None)
    }

    fn update(&self, collection: Collection, id: &str, patch: Record) -> Result<Option<Record>, GatewayError> {
        self.merge_existing(collection, id, patch, None)
    }

    fn insert_unique(&self, collection: Collection, record: Record, column: &'static str) -> Result<Record, GatewayError> {
        self.write_new(collection, record, Some(column))
    }

    fn update_unique(
        &self,
        collection: Collection,
        id: &str,
        patch: Record,
        column: &'static str,
    ) -> Result<Option<Record>, GatewayError> {
        self.merge_existing(collection, id, patch, Some(column))
    }


    fn delete(&self, collection: Collection, filters: &[Filter]) -> Result<usize, GatewayError> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(collection.table())?;

            let mut doomed: Vec<[u8; 16]> = Vec::new();
            for entry in table.iter()? {
                let (row_id, raw) = entry?;
                let row = parse_record(raw.value())?;
                if filters.iter().all(|f| f.matches(&row)) {
                    doomed.push(*row_id.value());
                }
            }

            for row_id_bytes in &doomed {
                table.remove(row_id_bytes)?;
            }
            doomed.len()
        };
        write_txn.commit()?;

        Ok(removed)
    }
}
