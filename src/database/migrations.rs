use anyhow::Result;
use sqlx::{PgPool, Row};
use tracing::{error, info};

pub struct MigrationRunner {
    pool: PgPool,
}

impl MigrationRunner {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("Starting database migrations");

        self.create_migrations_table().await?;

        let migrations = vec![("001_flex_schema", include_str!("../../sql/flex_schema.sql"))];

        for (name, sql) in migrations {
            if !self.is_migration_applied(name).await? {
                info!("Applying migration: {}", name);
                self.apply_migration(name, sql).await?;
            } else {
                info!("Migration {} already applied, skipping", name);
            }
        }

        info!("All migrations completed successfully");
        Ok(())
    }

    async fn create_migrations_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS flex_migrations (
                id SERIAL PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn is_migration_applied(&self, name: &str) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM flex_migrations WHERE name = $1")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;

        let count: i64 = row.get("count");
        Ok(count > 0)
    }

    async fn apply_migration(&self, name: &str, sql: &str) -> Result<()> {
        if let Err(e) = sqlx::raw_sql(sql).execute(&self.pool).await {
            error!("Migration {} failed: {}", name, e);
            return Err(e.into());
        }

        sqlx::query("INSERT INTO flex_migrations (name) VALUES ($1)")
            .bind(name)
            .execute(&self.pool)
            .await?;

        info!("Successfully applied migration: {}", name);
        Ok(())
    }
}
