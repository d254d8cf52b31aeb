use anyhow::Error;
use rusqlite::{OptionalExtension, Row, params};
use stack_string::StackString;
use time::{
    OffsetDateTime, PrimitiveDateTime, UtcOffset, format_description::FormatItem,
    macros::format_description,
};

use crate::dbpool::DbPool;

/// Fixed-width UTC text, so lexical order equals time order.
const TIMESTAMP_FORMAT: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
);

pub const DEFAULT_CREATED_BY: &str = "web";

fn timestamp_to_sql(dt: OffsetDateTime) -> Result<String, rusqlite::Error> {
    dt.to_offset(UtcOffset::UTC)
        .format(TIMESTAMP_FORMAT)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

fn timestamp_from_sql(idx: usize, s: &str) -> Result<OffsetDateTime, rusqlite::Error> {
    PrimitiveDateTime::parse(s, TIMESTAMP_FORMAT)
        .map(PrimitiveDateTime::assume_utc)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TodoItem {
    pub id: i64,
    pub title: StackString,
    pub completed: bool,
    pub created_by: StackString,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateTodoItem {
    pub title: Option<StackString>,
    pub completed: Option<bool>,
}

const SELECT_TODO: &str =
    "SELECT id, title, completed, created_by, created_at, updated_at FROM todos";

impl TodoItem {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        let title: String = row.get(1)?;
        let created_by: String = row.get(3)?;
        let created_at: String = row.get(4)?;
        let updated_at: String = row.get(5)?;
        Ok(Self {
            id: row.get(0)?,
            title: title.into(),
            completed: row.get(2)?,
            created_by: created_by.into(),
            created_at: timestamp_from_sql(4, &created_at)?,
            updated_at: timestamp_from_sql(5, &updated_at)?,
        })
    }

    /// # Errors
    /// Return error if db query fails
    pub async fn get_by_id(id: i64, pool: &DbPool) -> Result<Option<Self>, Error> {
        pool.interact(move |conn| {
            let query = format!("{SELECT_TODO} WHERE id = ?1");
            conn.query_row(&query, params![id], Self::from_row)
                .optional()
        })
        .await
    }

    /// Newest first; `completed` filters on status when given.
    ///
    /// # Errors
    /// Return error if db query fails
    pub async fn get_todos(completed: Option<bool>, pool: &DbPool) -> Result<Vec<Self>, Error> {
        pool.interact(move |conn| {
            let query = format!(
                "{SELECT_TODO} WHERE (?1 IS NULL OR completed = ?1) \
                 ORDER BY created_at DESC, id DESC"
            );
            let mut stmt = conn.prepare(&query)?;
            let items = stmt
                .query_map(params![completed], Self::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(items)
        })
        .await
    }

    /// Apply the supplied fields, leaving the others untouched.
    ///
    /// # Errors
    /// Return error if db query fails
    pub async fn update(
        id: i64,
        update: UpdateTodoItem,
        pool: &DbPool,
    ) -> Result<Option<Self>, Error> {
        pool.interact(move |conn| {
            let tx = conn.transaction()?;
            let now = timestamp_to_sql(OffsetDateTime::now_utc())?;
            let title = update.title.as_ref().map(StackString::as_str);
            let changed = tx.execute(
                "UPDATE todos SET title = COALESCE(?2, title), \
                 completed = COALESCE(?3, completed), updated_at = ?4 WHERE id = ?1",
                params![id, title, update.completed, now],
            )?;
            let item = if changed == 0 {
                None
            } else {
                let query = format!("{SELECT_TODO} WHERE id = ?1");
                Some(tx.query_row(&query, params![id], Self::from_row)?)
            };
            tx.commit()?;
            Ok(item)
        })
        .await
    }

    /// Returns whether a row was removed.
    ///
    /// # Errors
    /// Return error if db query fails
    pub async fn delete(id: i64, pool: &DbPool) -> Result<bool, Error> {
        pool.interact(move |conn| {
            conn.execute("DELETE FROM todos WHERE id = ?1", params![id])
                .map(|n| n > 0)
        })
        .await
    }
}

#[derive(Clone, Debug)]
pub struct InsertTodoItem {
    pub title: StackString,
    pub created_by: StackString,
}

impl InsertTodoItem {
    pub fn new(title: &str, created_by: &str) -> Self {
        Self {
            title: title.into(),
            created_by: created_by.into(),
        }
    }

    /// # Errors
    /// Return error if db query fails
    pub async fn insert(self, pool: &DbPool) -> Result<TodoItem, Error> {
        pool.interact(move |conn| {
            let tx = conn.transaction()?;
            let now = timestamp_to_sql(OffsetDateTime::now_utc())?;
            tx.execute(
                "INSERT INTO todos (title, completed, created_by, created_at, updated_at) \
                 VALUES (?1, 0, ?2, ?3, ?3)",
                params![self.title.as_str(), self.created_by.as_str(), now],
            )?;
            let id = tx.last_insert_rowid();
            let query = format!("{SELECT_TODO} WHERE id = ?1");
            let item = tx.query_row(&query, params![id], TodoItem::from_row)?;
            tx.commit()?;
            Ok(item)
        })
        .await
    }
}
