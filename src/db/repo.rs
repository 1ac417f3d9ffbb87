use super::model::Subscriber;
use crate::model::{SubscribeOutcome, UnsubscribeOutcome};
use anyhow::Result;
use sqlx::SqlitePool;
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") {
        return url.to_string();
    }

    // In-memory URLs like sqlite::memory: or sqlite::memory:?cache=shared
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = if let Some(rest) = path_part.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            format!("{}/{}", home.trim_end_matches('/'), rest)
        } else {
            path_part.to_string()
        }
    } else {
        path_part.to_string()
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Idempotent subscribe. Reports whether the row was new.
#[instrument(skip_all)]
pub async fn add_subscriber(
    pool: &Pool,
    chat_id: i64,
    username: Option<&str>,
    first_name: Option<&str>,
) -> Result<SubscribeOutcome> {
    let mut tx = pool.begin().await?;
    let existing = sqlx::query_scalar::<_, i64>("SELECT id FROM subscribers WHERE chat_id = ?")
        .bind(chat_id)
        .fetch_optional(&mut *tx)
        .await?;
    if existing.is_some() {
        return Ok(SubscribeOutcome::AlreadySubscribed);
    }
    sqlx::query("INSERT INTO subscribers (chat_id, username, first_name) VALUES (?, ?, ?)")
        .bind(chat_id)
        .bind(username)
        .bind(first_name)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(SubscribeOutcome::Subscribed)
}

/// Reports whether a row existed.
#[instrument(skip_all)]
pub async fn remove_subscriber(pool: &Pool, chat_id: i64) -> Result<UnsubscribeOutcome> {
    let res = sqlx::query("DELETE FROM subscribers WHERE chat_id = ?")
        .bind(chat_id)
        .execute(pool)
        .await?;
    if res.rows_affected() > 0 {
        Ok(UnsubscribeOutcome::Unsubscribed)
    } else {
        Ok(UnsubscribeOutcome::NotSubscribed)
    }
}

#[instrument(skip_all)]
pub async fn is_subscribed(pool: &Pool, chat_id: i64) -> Result<bool> {
    let id = sqlx::query_scalar::<_, i64>("SELECT id FROM subscribers WHERE chat_id = ?")
        .bind(chat_id)
        .fetch_optional(pool)
        .await?;
    Ok(id.is_some())
}

/// All subscriber chat ids in subscription order.
#[instrument(skip_all)]
pub async fn list_subscriber_chat_ids(pool: &Pool) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar::<_, i64>("SELECT chat_id FROM subscribers ORDER BY id ASC")
        .fetch_all(pool)
        .await?;
    Ok(ids)
}

#[instrument(skip_all)]
pub async fn get_subscriber(pool: &Pool, chat_id: i64) -> Result<Option<Subscriber>> {
    let row = sqlx::query_as::<_, Subscriber>(
        "SELECT id, chat_id, username, first_name, created_at FROM subscribers WHERE chat_id = ?",
    )
    .bind(chat_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

#[instrument(skip_all)]
pub async fn count_subscribers(pool: &Pool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscribers")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_pool() -> Pool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn subscribe_is_idempotent() {
        let pool = setup_pool().await;

        let first = add_subscriber(&pool, 42, Some("alice"), Some("Alice"))
            .await
            .unwrap();
        assert_eq!(first, SubscribeOutcome::Subscribed);

        let second = add_subscriber(&pool, 42, Some("alice"), Some("Alice"))
            .await
            .unwrap();
        assert_eq!(second, SubscribeOutcome::AlreadySubscribed);

        assert_eq!(count_subscribers(&pool).await.unwrap(), 1);
        assert!(is_subscribed(&pool, 42).await.unwrap());
    }

    #[tokio::test]
    async fn unsubscribe_reports_missing_rows() {
        let pool = setup_pool().await;

        add_subscriber(&pool, 7, None, None).await.unwrap();
        assert_eq!(
            remove_subscriber(&pool, 7).await.unwrap(),
            UnsubscribeOutcome::Unsubscribed
        );
        assert_eq!(
            remove_subscriber(&pool, 7).await.unwrap(),
            UnsubscribeOutcome::NotSubscribed
        );
        assert!(!is_subscribed(&pool, 7).await.unwrap());
    }

    #[tokio::test]
    async fn list_keeps_subscription_order() {
        let pool = setup_pool().await;

        for chat_id in [30, 10, 20] {
            add_subscriber(&pool, chat_id, None, None).await.unwrap();
        }
        let ids = list_subscriber_chat_ids(&pool).await.unwrap();
        assert_eq!(ids, vec![30, 10, 20]);
    }

    #[tokio::test]
    async fn get_subscriber_returns_profile() {
        let pool = setup_pool().await;

        add_subscriber(&pool, 99, Some("bob"), Some("Bob")).await.unwrap();
        let sub = get_subscriber(&pool, 99).await.unwrap().unwrap();
        assert_eq!(sub.chat_id, 99);
        assert_eq!(sub.username.as_deref(), Some("bob"));

        assert!(get_subscriber(&pool, 100).await.unwrap().is_none());
    }
}
