use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

pub mod models;
pub mod queries;

static DATABASE_POOL: OnceCell<Arc<PgPool>> = OnceCell::const_new();

/// Connect to the externally operated database and run migrations.
/// No-op success when `DATABASE_URL` is unset: the gateway serves its
/// capability routes without persistence.
pub async fn initialize_database() -> Result<Option<Arc<PgPool>>, Box<dyn std::error::Error + Send + Sync>>
{
    let Some(database_url) = crate::config::DATABASE_URL.clone() else {
        tracing::warn!("DATABASE_URL not set; persistence disabled");
        return Ok(None);
    };

    let pool = DATABASE_POOL
        .get_or_try_init(|| async {
            let pool = connect_with_retry(&database_url).await?;

            tracing::info!("running database migrations");
            sqlx::migrate!("./migrations").run(&pool).await?;

            Ok::<Arc<PgPool>, Box<dyn std::error::Error + Send + Sync>>(Arc::new(pool))
        })
        .await?;

    sqlx::query("SELECT 1").execute(pool.as_ref()).await?;
    tracing::info!("database initialized");

    Ok(Some(pool.clone()))
}

async fn connect_with_retry(
    database_url: &str,
) -> Result<PgPool, Box<dyn std::error::Error + Send + Sync>> {
    let max_retries = 10;
    let mut retry_count = 0;

    let pool_options = PgPoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(30));

    loop {
        retry_count += 1;
        tracing::debug!(attempt = retry_count, "connecting to database");

        match pool_options.clone().connect(database_url).await {
            Ok(pool) => match sqlx::query("SELECT 1").execute(&pool).await {
                Ok(_) => return Ok(pool),
                Err(e) => {
                    tracing::warn!(attempt = retry_count, error = %e, "connection test failed");
                    if retry_count >= max_retries {
                        return Err(format!(
                            "database connection test failed after {} attempts: {}",
                            max_retries, e
                        )
                        .into());
                    }
                }
            },
            Err(e) => {
                tracing::warn!(attempt = retry_count, error = %e, "connection attempt failed");
                if retry_count >= max_retries {
                    return Err(format!(
                        "failed to connect to database after {} attempts: {}",
                        max_retries, e
                    )
                    .into());
                }
            }
        }

        // Exponential backoff, capped at ~6.4 seconds
        let delay = Duration::from_millis(100 * (1 << (retry_count - 1).min(6)));
        tokio::time::sleep(delay).await;
    }
}

pub fn get_database_pool() -> Result<Arc<PgPool>, sqlx::Error> {
    DATABASE_POOL
        .get()
        .cloned()
        .ok_or(sqlx::Error::PoolTimedOut)
}

/// The pool if persistence is configured and initialized.
pub fn maybe_pool() -> Option<Arc<PgPool>> {
    DATABASE_POOL.get().cloned()
}

pub async fn cleanup_database() {
    if let Some(pool) = DATABASE_POOL.get() {
        pool.close().await;
        tracing::info!("database pool closed");
    }
}
