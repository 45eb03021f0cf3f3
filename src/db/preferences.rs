use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

pub async fn get(db: &SqlitePool, key: &str) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT value FROM preferences WHERE key = ?1")
        .bind(key)
        .fetch_optional(db)
        .await
}

pub async fn set(db: &SqlitePool, key: &str, value: &str) -> Result<(), sqlx::Error> {
    let mut conn = db.acquire().await?;
    set_in(&mut conn, key, value).await
}

/// Same as [`set`], on a caller-owned connection so the write can share a
/// transaction with other statements.
pub async fn set_in(conn: &mut SqliteConnection, key: &str, value: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO preferences (key, value, updated_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(key)
    .bind(value)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn delete(db: &SqlitePool, key: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM preferences WHERE key = ?1")
        .bind(key)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub fn last_sync_succeeded_key(group: &str) -> String {
    format!("last_sync_{}_succeeded_at", group)
}
