use super::model::{record_from_row, ColumnValue};
use super::StoreError;
use crate::model::{PendingChanges, Record};
use sqlx::SqlitePool;
use tracing::instrument;

pub type Pool = SqlitePool;

#[instrument(skip_all, fields(record_id = %id))]
pub async fn fetch_record(pool: &Pool, id: &str) -> Result<Option<Record>, StoreError> {
    let row = sqlx::query("SELECT * FROM records WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(record_from_row).transpose()
}

/// Write only the columns named in `changes`, creating the row if needed.
///
/// Columns absent from `changes` keep whatever a concurrent writer stored.
#[instrument(skip_all, fields(record_id = %id, fields = changes.len()))]
pub async fn save_changes(pool: &Pool, id: &str, changes: &PendingChanges) -> Result<(), StoreError> {
    let values = changes
        .changes()
        .map(|c| Ok((c.field(), ColumnValue::from_change(c)?)))
        .collect::<Result<Vec<_>, StoreError>>()?;

    let mut tx = pool.begin().await?;
    sqlx::query("INSERT OR IGNORE INTO records (id) VALUES (?)")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    for (field, value) in values {
        // Column names come from the closed `Field` set, never from input.
        let sql = format!(
            "UPDATE records SET {} = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            field.as_str()
        );
        let query = sqlx::query(&sql);
        let query = match value {
            ColumnValue::Text(v) => query.bind(v),
            ColumnValue::OptionalText(v) => query.bind(v),
            ColumnValue::Real(v) => query.bind(v),
            ColumnValue::Integer(v) => query.bind(v),
            ColumnValue::Bool(v) => query.bind(v),
        };
        query.bind(id).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn list_record_ids(pool: &Pool) -> Result<Vec<String>, StoreError> {
    let ids = sqlx::query_scalar::<_, String>("SELECT id FROM records ORDER BY updated_at DESC, id")
        .fetch_all(pool)
        .await?;
    Ok(ids)
}
