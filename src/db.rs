use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use dashmap::DashMap;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Schema,
};
use tracing::{info, instrument};

use crate::{config::AppConfig, entities, errors::ServiceError, AppState};

/// Request header selecting the tenant database. There is no default
/// tenant; requests without the header are rejected.
pub const TENANT_HEADER: &str = "x-store-db";

/// Explicit, constructed registry of per-tenant database connections.
/// Connections are opened lazily on first use and cached for the life of
/// the process.
pub struct TenantRegistry {
    urls: HashMap<String, String>,
    pools: DashMap<String, Arc<DatabaseConnection>>,
    auto_migrate: bool,
}

impl TenantRegistry {
    pub fn new(urls: HashMap<String, String>, auto_migrate: bool) -> Self {
        Self {
            urls,
            pools: DashMap::new(),
            auto_migrate,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(cfg.tenants.clone(), cfg.auto_migrate)
    }

    /// Resolve a tenant key to its database connection, connecting on first
    /// use. Unknown keys are a caller error.
    #[instrument(skip(self))]
    pub async fn resolve(&self, key: &str) -> Result<Arc<DatabaseConnection>, ServiceError> {
        if let Some(pool) = self.pools.get(key) {
            return Ok(pool.clone());
        }

        let url = self
            .urls
            .get(key)
            .ok_or_else(|| ServiceError::UnknownTenant(key.to_string()))?;

        let db = connect(url).await?;
        if self.auto_migrate {
            run_migrations(&db).await?;
        }
        info!(tenant = %key, "connected tenant database");

        // Two racing resolvers may both connect; the first insert wins and
        // the loser's connection is dropped.
        let db = Arc::new(db);
        let entry = self.pools.entry(key.to_string()).or_insert(db);
        Ok(entry.clone())
    }

    /// Register an already-open connection (used by tests).
    pub fn insert(&self, key: &str, db: Arc<DatabaseConnection>) {
        self.pools.insert(key.to_string(), db);
    }

    /// Currently connected tenants. The poll-mode notifier scans these.
    pub fn snapshot(&self) -> Vec<(String, Arc<DatabaseConnection>)> {
        self.pools
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

pub async fn connect(url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opts = ConnectOptions::new(url.to_string());
    opts.max_connections(20)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(10))
        .acquire_timeout(Duration::from_secs(10))
        .sqlx_logging(false);
    Database::connect(opts).await
}

/// Create the schema for a tenant database when it does not exist yet.
pub async fn run_migrations(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut statements = vec![
        schema.create_table_from_entity(entities::customer::Entity),
        schema.create_table_from_entity(entities::guest::Entity),
        schema.create_table_from_entity(entities::product::Entity),
        schema.create_table_from_entity(entities::order::Entity),
        schema.create_table_from_entity(entities::order_item::Entity),
        schema.create_table_from_entity(entities::payment_instrument::Entity),
    ];
    for stmt in &mut statements {
        stmt.if_not_exists();
        db.execute(backend.build(&*stmt)).await?;
    }
    Ok(())
}

/// Extractor binding a request to its tenant database via the
/// `X-Store-Db` header. Absence is a hard 400.
pub struct Tenant {
    pub key: String,
    pub db: Arc<DatabaseConnection>,
}

#[async_trait]
impl FromRequestParts<AppState> for Tenant {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(ServiceError::MissingTenant)?;

        let db = state.tenants.resolve(key).await?;
        Ok(Tenant {
            key: key.to_string(),
            db,
        })
    }
}
