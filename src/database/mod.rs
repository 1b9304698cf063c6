use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool, TypeInfo, ValueRef};
use tracing::{debug, info, warn};

use crate::error::{DataError, Result};
use crate::frame::{Cell, Frame};

// Keep each INSERT under SQLite's bind-variable ceiling.
const MAX_BINDS_PER_STATEMENT: usize = 500;

/// Table-oriented cache store. One table per (ticker, kind); every write is
/// a wholesale replace, so concurrent writers race to last-writer-wins
/// without partial-write visibility.
#[derive(Clone)]
pub struct CacheStore {
    pool: SqlitePool,
}

impl CacheStore {
    /// Connect via connection string, creating the database if missing.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);
        Self::connect_with(options, database_url).await
    }

    /// Connect without write access. Useful for read replicas of the cache;
    /// any `replace_table` call will fail with a persistence error.
    pub async fn connect_read_only(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.read_only(true);
        Self::connect_with(options, database_url).await
    }

    async fn connect_with(options: SqliteConnectOptions, database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        info!("cache store connected at {}", database_url);
        Ok(Self { pool })
    }

    /// Check whether a cache table exists.
    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let row = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(table)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Replace a cache table with the given frame: drop, recreate, insert in
    /// chunks, all inside one transaction. Stale rows never survive a write.
    pub async fn replace_table(&self, table: &str, frame: &Frame) -> Result<()> {
        let qtable = quote_ident(table)?;
        let qcolumns = frame
            .columns()
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Result<Vec<_>>>()?;

        let column_defs = frame
            .columns()
            .iter()
            .enumerate()
            .map(|(i, _)| format!("{} {}", qcolumns[i], column_sql_type(frame, i)))
            .collect::<Vec<_>>()
            .join(", ");

        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DROP TABLE IF EXISTS {qtable}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("CREATE TABLE {qtable} ({column_defs})"))
            .execute(&mut *tx)
            .await?;

        let width = frame.columns().len();
        if width > 0 && !frame.is_empty() {
            let rows_per_statement = (MAX_BINDS_PER_STATEMENT / width).max(1);
            let row_placeholder = format!("({})", vec!["?"; width].join(", "));
            for chunk in frame.rows().chunks(rows_per_statement) {
                let sql = format!(
                    "INSERT INTO {qtable} ({}) VALUES {}",
                    qcolumns.join(", "),
                    vec![row_placeholder.as_str(); chunk.len()].join(", ")
                );
                let mut query = sqlx::query(&sql);
                for row in chunk {
                    for cell in row {
                        query = match cell {
                            Cell::Null => query.bind(Option::<String>::None),
                            Cell::Int(i) => query.bind(*i),
                            Cell::Float(f) => query.bind(*f),
                            Cell::Text(s) => query.bind(s.as_str()),
                        };
                    }
                }
                query.execute(&mut *tx).await?;
            }
        }
        tx.commit().await?;

        info!("stored {} rows into table {}", frame.len(), table);
        Ok(())
    }

    /// Read a whole cache table back, or `None` if it does not exist.
    pub async fn read_table(&self, table: &str) -> Result<Option<Frame>> {
        if !self.table_exists(table).await? {
            return Ok(None);
        }
        let qtable = quote_ident(table)?;

        let columns: Vec<String> = sqlx::query(&format!("PRAGMA table_info({qtable})"))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|r| r.try_get::<String, _>("name"))
            .collect::<std::result::Result<_, _>>()?;

        let rows = sqlx::query(&format!("SELECT * FROM {qtable}"))
            .fetch_all(&self.pool)
            .await?;

        let mut frame = Frame::new(columns);
        for row in rows {
            let mut cells = Vec::with_capacity(row.columns().len());
            for i in 0..row.columns().len() {
                cells.push(decode_cell(&row, i)?);
            }
            frame.push_row(cells)?;
        }
        debug!("read {} rows from table {}", frame.len(), table);
        Ok(Some(frame))
    }
}

fn decode_cell(row: &sqlx::sqlite::SqliteRow, index: usize) -> Result<Cell> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Cell::Null);
    }
    let cell = match raw.type_info().name() {
        "INTEGER" => Cell::Int(row.try_get::<i64, _>(index)?),
        "REAL" => Cell::Float(row.try_get::<f64, _>(index)?),
        "TEXT" => Cell::Text(row.try_get::<String, _>(index)?),
        other => {
            warn!("unsupported storage class {} in cache table, treating as null", other);
            Cell::Null
        }
    };
    Ok(cell)
}

/// Quote an identifier for dynamic DDL/DML. Ticker-derived table names can
/// contain characters like '-' or '.', so everything is double-quoted.
fn quote_ident(name: &str) -> Result<String> {
    if name.is_empty() || name.contains('"') || name.contains('\0') {
        return Err(DataError::Malformed(format!("invalid identifier '{name}'")));
    }
    Ok(format!("\"{name}\""))
}

/// Infer the SQL type from the first non-null cell in a column.
fn column_sql_type(frame: &Frame, index: usize) -> &'static str {
    for row in frame.rows() {
        match row[index] {
            Cell::Int(_) => return "INTEGER",
            Cell::Float(_) => return "REAL",
            Cell::Text(_) => return "TEXT",
            Cell::Null => continue,
        }
    }
    "TEXT"
}
