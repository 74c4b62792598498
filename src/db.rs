//! Connection pool setup and schema migrations for the booking store.
//!
//! Both SQLite and PostgreSQL URLs are accepted; the pool tuning comes from
//! the `db_*` settings in [`AppConfig`].

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::migrator::Migrator;
use metrics::{counter, gauge};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub type DbPool = DatabaseConnection;

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

impl DbConfig {
    fn backend(&self) -> &'static str {
        if self.url.starts_with("sqlite:") {
            "sqlite"
        } else if self.url.starts_with("postgres") {
            "postgres"
        } else {
            "unknown"
        }
    }
}

async fn timed<T, Fut>(work: Fut) -> (Result<T, ServiceError>, Duration)
where
    Fut: Future<Output = Result<T, sea_orm::DbErr>>,
{
    let start = Instant::now();
    let result = work.await.map_err(ServiceError::db_error);
    (result, start.elapsed())
}

/// Opens the pool described by `config`.
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    let backend = config.backend();
    if backend == "sqlite" && config.url.contains(":memory:") && config.max_connections > 1 {
        warn!("in-memory sqlite with a multi-connection pool: each connection sees its own database");
    }

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    gauge!("textile_db.max_connections", config.max_connections as f64);
    let (pool, elapsed) = timed(Database::connect(opt)).await;
    match &pool {
        Ok(_) => info!(
            backend,
            max_connections = config.max_connections,
            "booking store connected in {:?}",
            elapsed
        ),
        Err(e) => error!(backend, "booking store connection failed: {}", e),
    }
    pool
}

pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    establish_connection_with_config(&DbConfig::from(cfg)).await
}

/// Applies every pending migration. Already-applied ones are skipped.
pub async fn run_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    let (result, elapsed) = timed(Migrator::up(pool, None)).await;
    match &result {
        Ok(()) => info!("migrations applied in {:?}", elapsed),
        Err(e) => error!("migrations failed after {:?}: {}", elapsed, e),
    }
    result
}

/// Pings the pool; used by the readiness probe.
pub async fn check_connection(pool: &DbPool) -> Result<(), ServiceError> {
    let (result, elapsed) = timed(pool.ping()).await;
    match &result {
        Ok(()) => {
            debug!("database ping took {:?}", elapsed);
            gauge!("textile_db.connection_latency", elapsed.as_millis() as f64);
        }
        Err(e) => {
            error!("database ping failed: {}", e);
            counter!("textile_db.connection_failures", 1);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config() -> DbConfig {
        DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn migrations_run_twice_without_error() {
        let pool = establish_connection_with_config(&memory_config())
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();
        check_connection(&pool).await.unwrap();
    }

    #[test]
    fn db_config_follows_app_config_tuning() {
        let mut app = AppConfig::new(
            "sqlite::memory:".into(),
            "x".repeat(64),
            "127.0.0.1".into(),
            8080,
            "development".into(),
        );
        app.db_max_connections = 3;
        app.db_acquire_timeout_secs = 2;
        let cfg = DbConfig::from(&app);
        assert_eq!(cfg.max_connections, 3);
        assert_eq!(cfg.acquire_timeout, Duration::from_secs(2));
        assert_eq!(cfg.backend(), "sqlite");
    }
}
