//! SQLite-backed document store.
//!
//! Every collection shares one `documents` table keyed by
//! `(collection, id)`. Each row carries a version that increases on every
//! overwrite; [`LedgerStore::commit`] re-checks those versions inside an
//! `IMMEDIATE` transaction before writing anything.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};

use super::{migrations, DocKey, Filter, LedgerStore, Query, ReadStamp, Versioned, WriteOp};
use crate::error::StoreError;

/// SQLite database for ledger documents.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database at `path`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        migrations::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn current_version(conn: &Connection, key: &DocKey) -> Result<Option<i64>, rusqlite::Error> {
    conn.query_row(
        "SELECT version FROM documents WHERE collection = ?1 AND id = ?2",
        params![key.collection, key.id],
        |row| row.get(0),
    )
    .optional()
}

/// Render `filter` as a SQL condition over `json_extract`, pushing its
/// parameters onto `args`.
fn filter_sql(filter: &Filter, args: &mut Vec<SqlValue>) -> String {
    match filter {
        Filter::Eq(field, value) => {
            args.push(SqlValue::Text(format!("$.{field}")));
            match json_to_sql(value) {
                Some(value) => {
                    args.push(value);
                    "json_extract(body, ?) = ?".to_string()
                }
                None => "json_extract(body, ?) IS NULL".to_string(),
            }
        }
        Filter::Any(filters) if filters.is_empty() => "0".to_string(),
        Filter::All(filters) if filters.is_empty() => "1".to_string(),
        Filter::Any(filters) => join_filters(filters, " OR ", args),
        Filter::All(filters) => join_filters(filters, " AND ", args),
    }
}

fn join_filters(filters: &[Filter], op: &str, args: &mut Vec<SqlValue>) -> String {
    let parts: Vec<String> = filters.iter().map(|f| filter_sql(f, args)).collect();
    format!("({})", parts.join(op))
}

/// SQL value `json_extract` yields for a JSON scalar; `None` for null.
fn json_to_sql(value: &serde_json::Value) -> Option<SqlValue> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(flag) => Some(SqlValue::Integer(i64::from(*flag))),
        serde_json::Value::Number(n) => Some(match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
        }),
        serde_json::Value::String(s) => Some(SqlValue::Text(s.clone())),
        other => Some(SqlValue::Text(other.to_string())),
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(code, _) if code.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

impl LedgerStore for SqliteStore {
    fn read(&self, key: &DocKey) -> Result<Option<Versioned>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT body, version FROM documents WHERE collection = ?1 AND id = ?2",
                params![key.collection, key.id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;

        match row {
            Some((body, version)) => Ok(Some(Versioned {
                body: serde_json::from_str(&body)?,
                version,
            })),
            None => Ok(None),
        }
    }

    fn commit(&self, stamps: &[ReadStamp], writes: &[WriteOp]) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        for stamp in stamps {
            if current_version(&tx, &stamp.key)? != stamp.version {
                // Dropping `tx` rolls back.
                return Err(StoreError::Conflict {
                    key: stamp.key.to_string(),
                });
            }
        }

        let now = Utc::now().to_rfc3339();
        for write in writes {
            match write {
                WriteOp::Put { key, body } => {
                    tx.execute(
                        "INSERT INTO documents (collection, id, body, version, updated_at)
                         VALUES (?1, ?2, ?3, 1, ?4)
                         ON CONFLICT(collection, id) DO UPDATE SET
                            body = excluded.body,
                            version = documents.version + 1,
                            updated_at = excluded.updated_at",
                        params![key.collection, key.id, body.to_string(), now],
                    )?;
                }
                WriteOp::Insert { key, body } => {
                    let inserted = tx.execute(
                        "INSERT INTO documents (collection, id, body, version, updated_at)
                         VALUES (?1, ?2, ?3, 1, ?4)",
                        params![key.collection, key.id, body.to_string(), now],
                    );
                    match inserted {
                        Ok(_) => {}
                        Err(err) if is_constraint_violation(&err) => {
                            return Err(StoreError::Conflict {
                                key: key.to_string(),
                            });
                        }
                        Err(err) => return Err(err.into()),
                    }
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn append(
        &self,
        collection: &'static str,
        body: &serde_json::Value,
    ) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO documents (collection, id, body, version, updated_at)
             VALUES (?1, ?2, ?3, 1, ?4)",
            params![collection, id, body.to_string(), Utc::now().to_rfc3339()],
        )?;
        Ok(id)
    }

    fn query(&self, query: &Query) -> Result<Vec<(String, serde_json::Value)>, StoreError> {
        let mut args = vec![SqlValue::Text(query.collection.to_string())];
        let mut sql = String::from("SELECT id, body FROM documents WHERE collection = ?");
        if let Some(filter) = &query.filter {
            sql.push_str(" AND ");
            sql.push_str(&filter_sql(filter, &mut args));
        }
        sql.push_str(if query.newest_first {
            " ORDER BY rowid DESC"
        } else {
            " ORDER BY rowid ASC"
        });
        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            args.push(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut docs = Vec::new();
        for row in rows {
            let (id, body) = row?;
            docs.push((id, serde_json::from_str(&body)?));
        }
        Ok(docs)
    }
}
