use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::config::TableNames;
use crate::data::DBConnection;
use crate::internal_error::{InternalError, SyncError};

use super::data::*;
use super::ids;
use super::normalize::{normalize_item_at, normalize_objective_at};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Key failed its shape check. Nothing was sent to the store.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(&'static str),

    #[error(transparent)]
    Backend(#[from] InternalError),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> StoreError {
        StoreError::Backend(e.into())
    }
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> SyncError {
        match e {
            StoreError::InvalidIdentifier(what) => SyncError::InvalidIdentifier(what),
            StoreError::Backend(e) => SyncError::Internal(e),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

fn check(valid: bool, what: &'static str) -> StoreResult<()> {
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(what))
    }
}

/// Single-row access to objectives and items. No call spans more than one row, so callers
/// get no atomicity across calls.
#[async_trait]
pub trait ObjectiveStore: Send + Sync {
    async fn query_objectives(&self, user_id: &str) -> StoreResult<Vec<Objective>>;

    async fn get_objective(
        &self,
        user_id: &str,
        objective_id: &str,
    ) -> StoreResult<Option<Objective>>;

    async fn put_objective(&self, objective: &Objective) -> StoreResult<()>;

    /// Whether a row was removed.
    async fn delete_objective(&self, user_id: &str, objective_id: &str) -> StoreResult<bool>;

    async fn query_items(&self, user_id_objective_id: &str) -> StoreResult<Vec<Item>>;

    async fn get_item(&self, user_id_objective_id: &str, item_id: &str)
        -> StoreResult<Option<Item>>;

    async fn put_item(&self, item: &Item) -> StoreResult<()>;

    /// Whether a row was removed.
    async fn delete_item(&self, user_id_objective_id: &str, item_id: &str) -> StoreResult<bool>;
}

fn is_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Key-value layout over SQLite: one table per record kind, keyed by partition and sort key,
/// with the record body kept as JSON text.
pub struct SqliteStore {
    connection: DBConnection,
    tables: TableNames,
    page_size: u32,
}

impl SqliteStore {
    pub fn new(
        connection: DBConnection,
        tables: TableNames,
        page_size: u32,
    ) -> Result<SqliteStore, InternalError> {
        if !is_table_name(&tables.objectives) || !is_table_name(&tables.items) {
            return Err(InternalError::from("table names must be plain identifiers"));
        }

        {
            let db_connection = connection.lock()?;
            create_tables(&db_connection, &tables)?;
        }

        Ok(SqliteStore {
            connection,
            tables,
            page_size,
        })
    }

    fn read_page(
        &self,
        sql: &str,
        partition: &str,
        what: &str,
    ) -> Result<Vec<Value>, InternalError> {
        let db_connection = self.connection.lock()?;
        let mut statement = db_connection.prepare(sql)?;

        let rows = statement.query_map(params![partition, self.page_size], |row| {
            row.get::<usize, String>(0)
        })?;

        let mut bodies = vec![];
        for row_result in rows {
            bodies.push(serde_json::from_str(&row_result?)?);
        }

        if bodies.len() as u64 >= self.page_size as u64 {
            warn!(
                partition,
                page_size = self.page_size,
                "{} query filled a whole page; later rows are not read",
                what
            );
        }

        Ok(bodies)
    }

    fn read_one(
        &self,
        sql: &str,
        partition: &str,
        key: &str,
    ) -> Result<Option<Value>, InternalError> {
        let db_connection = self.connection.lock()?;
        let body: Option<String> = db_connection
            .query_row(sql, params![partition, key], |row| row.get(0))
            .optional()?;

        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    fn write(
        &self,
        sql: &str,
        partition: &str,
        key: &str,
        body: Option<String>,
    ) -> Result<usize, InternalError> {
        let db_connection = self.connection.lock()?;
        let changed = match body {
            Some(body) => db_connection.execute(sql, params![partition, key, body])?,
            None => db_connection.execute(sql, params![partition, key])?,
        };
        Ok(changed)
    }
}

pub fn create_tables(db_connection: &Connection, tables: &TableNames) -> rusqlite::Result<()> {
    db_connection.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {} (user_id TEXT NOT NULL, objective_id TEXT NOT NULL, body TEXT NOT NULL, PRIMARY KEY (user_id, objective_id))",
            tables.objectives
        ),
        params![],
    )?;
    db_connection.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {} (user_id_objective_id TEXT NOT NULL, item_id TEXT NOT NULL, body TEXT NOT NULL, PRIMARY KEY (user_id_objective_id, item_id))",
            tables.items
        ),
        params![],
    )?;

    Ok(())
}

#[async_trait]
impl ObjectiveStore for SqliteStore {
    async fn query_objectives(&self, user_id: &str) -> StoreResult<Vec<Objective>> {
        check(ids::is_user_id(user_id), "UserId")?;

        let sql = format!(
            "SELECT body FROM {} WHERE user_id = (?1) ORDER BY objective_id LIMIT (?2)",
            self.tables.objectives
        );
        let bodies = self.read_page(&sql, user_id, "objective")?;

        Ok(bodies
            .iter()
            .map(|body| normalize_objective_at(body, ""))
            .collect())
    }

    async fn get_objective(
        &self,
        user_id: &str,
        objective_id: &str,
    ) -> StoreResult<Option<Objective>> {
        check(ids::is_user_id(user_id), "UserId")?;
        check(ids::is_objective_id(objective_id), "ObjectiveId")?;

        let sql = format!(
            "SELECT body FROM {} WHERE user_id = (?1) AND objective_id = (?2)",
            self.tables.objectives
        );
        let body = self.read_one(&sql, user_id, objective_id)?;

        Ok(body.map(|body| normalize_objective_at(&body, "")))
    }

    async fn put_objective(&self, objective: &Objective) -> StoreResult<()> {
        check(ids::is_user_id(&objective.user_id), "UserId")?;
        check(ids::is_objective_id(&objective.objective_id), "ObjectiveId")?;

        let body = serde_json::to_string(objective).map_err(InternalError::from)?;
        let sql = format!(
            "INSERT OR REPLACE INTO {} (user_id, objective_id, body) VALUES (?1, ?2, ?3)",
            self.tables.objectives
        );
        self.write(&sql, &objective.user_id, &objective.objective_id, Some(body))?;

        Ok(())
    }

    async fn delete_objective(&self, user_id: &str, objective_id: &str) -> StoreResult<bool> {
        check(ids::is_user_id(user_id), "UserId")?;
        check(ids::is_objective_id(objective_id), "ObjectiveId")?;

        let sql = format!(
            "DELETE FROM {} WHERE user_id = (?1) AND objective_id = (?2)",
            self.tables.objectives
        );
        let removed = self.write(&sql, user_id, objective_id, None)?;

        Ok(removed > 0)
    }

    async fn query_items(&self, user_id_objective_id: &str) -> StoreResult<Vec<Item>> {
        check(
            ids::is_user_id_objective_id(user_id_objective_id),
            "UserIdObjectiveId",
        )?;

        let sql = format!(
            "SELECT body FROM {} WHERE user_id_objective_id = (?1) ORDER BY item_id LIMIT (?2)",
            self.tables.items
        );
        let bodies = self.read_page(&sql, user_id_objective_id, "item")?;

        Ok(bodies
            .iter()
            .map(|body| normalize_item_at(body, ""))
            .collect())
    }

    async fn get_item(
        &self,
        user_id_objective_id: &str,
        item_id: &str,
    ) -> StoreResult<Option<Item>> {
        check(
            ids::is_user_id_objective_id(user_id_objective_id),
            "UserIdObjectiveId",
        )?;
        check(ids::is_item_id(item_id), "ItemId")?;

        let sql = format!(
            "SELECT body FROM {} WHERE user_id_objective_id = (?1) AND item_id = (?2)",
            self.tables.items
        );
        let body = self.read_one(&sql, user_id_objective_id, item_id)?;

        Ok(body.map(|body| normalize_item_at(&body, "")))
    }

    async fn put_item(&self, item: &Item) -> StoreResult<()> {
        check(
            ids::is_user_id_objective_id(&item.user_id_objective_id),
            "UserIdObjectiveId",
        )?;
        check(ids::is_item_id(&item.item_id), "ItemId")?;

        let body = serde_json::to_string(item).map_err(InternalError::from)?;
        let sql = format!(
            "INSERT OR REPLACE INTO {} (user_id_objective_id, item_id, body) VALUES (?1, ?2, ?3)",
            self.tables.items
        );
        self.write(&sql, &item.user_id_objective_id, &item.item_id, Some(body))?;

        Ok(())
    }

    async fn delete_item(&self, user_id_objective_id: &str, item_id: &str) -> StoreResult<bool> {
        check(
            ids::is_user_id_objective_id(user_id_objective_id),
            "UserIdObjectiveId",
        )?;
        check(ids::is_item_id(item_id), "ItemId")?;

        let sql = format!(
            "DELETE FROM {} WHERE user_id_objective_id = (?1) AND item_id = (?2)",
            self.tables.items
        );
        let removed = self.write(&sql, user_id_objective_id, item_id, None)?;

        Ok(removed > 0)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::objectives::normalize::{normalize_item, normalize_objective};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    pub const USER: &str = "UserUserUserUserUserUserUserUserUserUser";

    pub fn memory_store(page_size: u32) -> SqliteStore {
        let connection = Connection::open_in_memory().unwrap();
        SqliteStore::new(
            Arc::new(Mutex::new(connection)),
            TableNames::default(),
            page_size,
        )
        .unwrap()
    }

    fn objective(id: &str) -> Objective {
        let mut objective = normalize_objective(&json!({ "Title": "Groceries" }));
        objective.user_id = USER.to_string();
        objective.objective_id = id.to_string();
        objective
    }

    #[tokio::test]
    async fn put_then_read_objective() {
        let store = memory_store(1000);
        let id = ids::generate_id();
        let written = objective(&id);
        store.put_objective(&written).await.unwrap();

        let read = store.get_objective(USER, &id).await.unwrap().unwrap();
        assert_eq!(read, written);
        assert_eq!(store.query_objectives(USER).await.unwrap().len(), 1);

        assert!(store.delete_objective(USER, &id).await.unwrap());
        assert!(store.get_objective(USER, &id).await.unwrap().is_none());
        assert!(!store.delete_objective(USER, &id).await.unwrap());
    }

    #[tokio::test]
    async fn put_is_a_total_overwrite() {
        let store = memory_store(1000);
        let partition = format!("{}{}", USER, ids::generate_id());
        let mut item = normalize_item(&json!({ "Type": 6, "Title": "Milk", "Unit": "l" }));
        item.item_id = ids::generate_id();
        item.user_id_objective_id = partition.clone();
        store.put_item(&item).await.unwrap();

        let mut replacement = normalize_item(&json!({ "Type": 3, "Text": "no more milk" }));
        replacement.item_id = item.item_id.clone();
        replacement.user_id_objective_id = partition.clone();
        store.put_item(&replacement).await.unwrap();

        let items = store.query_items(&partition).await.unwrap();
        assert_eq!(items, vec![replacement]);
    }

    #[tokio::test]
    async fn malformed_keys_never_reach_the_table() {
        let store = memory_store(1000);

        let err = store.query_objectives("'; DROP TABLE objectives; --").await;
        assert!(matches!(err, Err(StoreError::InvalidIdentifier("UserId"))));

        let err = store.delete_item(USER, &ids::generate_id()).await;
        assert!(matches!(
            err,
            Err(StoreError::InvalidIdentifier("UserIdObjectiveId"))
        ));

        let err = store.put_objective(&objective("")).await;
        assert!(matches!(err, Err(StoreError::InvalidIdentifier("ObjectiveId"))));
    }

    #[tokio::test]
    async fn legacy_rows_keep_an_empty_timestamp() {
        let store = memory_store(1000);
        let id = ids::generate_id();
        {
            let db_connection = store.connection.lock().unwrap();
            db_connection
                .execute(
                    "INSERT INTO objectives (user_id, objective_id, body) VALUES (?1, ?2, ?3)",
                    params![USER, id, json!({ "Title": "old" }).to_string()],
                )
                .unwrap();
        }

        let read = store.get_objective(USER, &id).await.unwrap().unwrap();
        assert_eq!(read.last_modified, "");
        assert_eq!(read.title, "old");
    }

    #[tokio::test]
    async fn partition_queries_stop_at_the_page_size() {
        let store = memory_store(2);
        for _ in 0..3 {
            store.put_objective(&objective(&ids::generate_id())).await.unwrap();
        }

        assert_eq!(store.query_objectives(USER).await.unwrap().len(), 2);
    }

    #[test]
    fn table_names_are_checked() {
        let connection = Arc::new(Mutex::new(Connection::open_in_memory().unwrap()));
        let tables = TableNames {
            objectives: "objectives; DROP TABLE x".to_string(),
            items: "items".to_string(),
        };

        assert!(SqliteStore::new(connection, tables, 10).is_err());
    }
}
