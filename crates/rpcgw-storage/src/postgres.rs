use std::time::Duration;

use async_trait::async_trait;
use sea_orm::{
    ConnectOptions, Database, DatabaseBackend, DatabaseConnection, FromQueryResult, Statement,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{StoreError, StoreResult};
use crate::metadata::MetadataRepository;
use crate::models::Organization;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const ORGANIZATION_BY_ID: &str = r#"
SELECT
    o.id::text AS id,
    o.name AS name,
    o.slug AS slug,
    COALESCE(p.slug, '') AS plan_slug,
    o.status AS status,
    o.created_at AS created_at
FROM organizations o
LEFT JOIN subscriptions s ON o.id = s.organization_id AND s.status = 'active'
LEFT JOIN plans p ON s.plan_id = p.id
WHERE o.id::text = $1
LIMIT 1
"#;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub sslmode: String,
    pub max_conns: u32,
    pub min_conns: u32,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "rpc_gateway".to_string(),
            username: "rpcuser".to_string(),
            password: "rpcpass".to_string(),
            sslmode: "disable".to_string(),
            max_conns: 10,
            min_conns: 2,
        }
    }
}

impl PostgresConfig {
    pub fn dsn(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.password),
            self.host.trim(),
            self.port,
            urlencoding::encode(&self.database),
            urlencoding::encode(&self.sslmode),
        )
    }
}

#[derive(Debug, FromQueryResult)]
struct OrganizationRow {
    id: String,
    name: String,
    slug: String,
    plan_slug: String,
    status: String,
    created_at: OffsetDateTime,
}

impl From<OrganizationRow> for Organization {
    fn from(row: OrganizationRow) -> Self {
        Organization {
            id: row.id,
            name: row.name,
            slug: row.slug,
            plan_slug: row.plan_slug,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

#[derive(Clone)]
pub struct PostgresRepository {
    db: DatabaseConnection,
}

impl PostgresRepository {
    pub async fn connect(config: &PostgresConfig) -> StoreResult<Self> {
        if config.host.trim().is_empty() {
            return Err(StoreError::Config("postgresql host is required".to_string()));
        }
        let mut options = ConnectOptions::new(config.dsn());
        options
            .max_connections(config.max_conns.max(1))
            .min_connections(config.min_conns.min(config.max_conns.max(1)))
            .connect_timeout(CONNECT_TIMEOUT)
            .sqlx_logging(false);
        let db = Database::connect(options).await?;
        db.ping().await?;
        Ok(Self { db })
    }
}

#[async_trait]
impl MetadataRepository for PostgresRepository {
    async fn ping(&self) -> StoreResult<()> {
        self.db.ping().await?;
        Ok(())
    }

    async fn organization(&self, id: &str) -> StoreResult<Option<Organization>> {
        let statement = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            ORGANIZATION_BY_ID,
            [id.into()],
        );
        let row = OrganizationRow::find_by_statement(statement)
            .one(&self.db)
            .await?;
        Ok(row.map(Organization::from))
    }
}
