//! Durable, sqlite-backed catalog.
//!
//! Every mutating operation runs inside a `BEGIN IMMEDIATE` transaction,
//! sqlite's practical equivalent of `SELECT ... FOR UPDATE`: it takes the
//! write lock up front rather than on first write, so two connections
//! racing to claim the same container's build serialize instead of
//! deadlocking. This is what lets [`Self::try_start_build`] recognize a
//! foreign `building` tag left behind by a crashed process and reclaim it
//! — the row survives the crash, unlike [`super::MemoryCatalog`]'s.
//!
//! Queries are written against the runtime `sqlx::query`/`query_as` API
//! rather than the compile-time `query!`/`query_as!` macros, since those
//! require a live `DATABASE_URL` at build time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};

use super::model::{Container, StatusResponse};
use super::CatalogStore;
use crate::errors::{CatalogError, Result};
use crate::hasher::hash_spec;
use crate::owner_tag;
use crate::spec::{CanonicalSpec, ContainerSpec};

/// sqlite-backed [`CatalogStore`].
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    /// Open (creating if absent) the sqlite database at `path` and run
    /// schema migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(url)
            .await?;
        let catalog = Self { pool };
        catalog.migrate().await?;
        Ok(catalog)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS containers (
                id TEXT PRIMARY KEY,
                last_used TEXT NOT NULL,
                specification TEXT,
                tarball TEXT,
                docker_url TEXT,
                docker_log TEXT,
                docker_size INTEGER,
                singularity_url TEXT,
                singularity_log TEXT,
                singularity_size INTEGER,
                building TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS builds (
                id TEXT PRIMARY KEY,
                container_hash TEXT NOT NULL REFERENCES containers(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_container(&self, id: &str) -> Result<Option<Container>> {
        let row = sqlx::query(
            "SELECT id, last_used, specification, tarball, docker_url, docker_log, \
             docker_size, singularity_url, singularity_log, singularity_size, building \
             FROM containers WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_container).transpose()?)
    }

    async fn container_for_build(&self, build_id: &str) -> Result<Container> {
        let row = sqlx::query("SELECT container_hash FROM builds WHERE id = ?")
            .bind(build_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found("unknown build"))?;
        let container_hash: String = row.get("container_hash");
        self.load_container(&container_hash)
            .await?
            .ok_or_else(|| not_found("unknown container"))
    }
}

fn not_found(what: &str) -> CatalogError {
    CatalogError::NotFound {
        message: what.to_string(),
    }
}

fn row_to_container(row: sqlx::sqlite::SqliteRow) -> Result<Container> {
    let specification: Option<String> = row.get("specification");
    let specification = specification
        .map(|s| serde_json::from_str::<ContainerSpec>(&s))
        .transpose()
        .map_err(|e| CatalogError::Spec {
            message: format!("corrupt stored specification: {e}"),
        })?;
    let last_used: String = row.get("last_used");
    let last_used = DateTime::parse_from_rfc3339(&last_used)
        .map_err(|e| CatalogError::Storage {
            source: sqlx::Error::Decode(Box::new(e)),
        })?
        .with_timezone(&Utc);

    Ok(Container {
        id: row.get("id"),
        last_used,
        specification,
        tarball: row.get("tarball"),
        docker_url: row.get("docker_url"),
        docker_log: row.get("docker_log"),
        docker_size: row.get::<Option<i64>, _>("docker_size").map(|v| v as u64),
        singularity_url: row.get("singularity_url"),
        singularity_log: row.get("singularity_log"),
        singularity_size: row.get::<Option<i64>, _>("singularity_size").map(|v| v as u64),
        building: row.get("building"),
    })
}

#[async_trait]
impl CatalogStore for SqliteCatalog {
    async fn store_spec(&self, spec: &ContainerSpec) -> Result<(String, bool)> {
        let canonical = CanonicalSpec::new(spec)?;
        let id = hash_spec(&canonical);

        let mut tx = self.pool.begin().await?;
        let exists = sqlx::query("SELECT 1 FROM containers WHERE id = ?")
            .bind(&id)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if exists {
            tx.commit().await?;
            return Ok((id, false));
        }

        let now = Utc::now().to_rfc3339();
        let body = serde_json::to_string(spec).map_err(|e| CatalogError::Spec {
            message: format!("failed to serialize spec: {e}"),
        })?;
        sqlx::query("INSERT INTO containers (id, last_used, specification) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(&now)
            .bind(&body)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok((id, true))
    }

    async fn store_tarball(&self, container_id: String) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let exists = sqlx::query("SELECT 1 FROM containers WHERE id = ?")
            .bind(&container_id)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if exists {
            tx.commit().await?;
            return Ok(false);
        }
        let now = Utc::now().to_rfc3339();
        sqlx::query("INSERT INTO containers (id, last_used) VALUES (?, ?)")
            .bind(&container_id)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn add_build(&self, container_id: &str) -> Result<String> {
        let mut tx = self.pool.begin().await?;
        let exists = sqlx::query("SELECT 1 FROM containers WHERE id = ?")
            .bind(container_id)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if !exists {
            return Err(not_found("unknown container"));
        }
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE containers SET last_used = ? WHERE id = ?")
            .bind(&now)
            .bind(container_id)
            .execute(&mut *tx)
            .await?;
        let build_id = uuid::Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO builds (id, container_hash) VALUES (?, ?)")
            .bind(&build_id)
            .bind(container_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(build_id)
    }

    async fn get_spec(&self, build_id: &str) -> Result<ContainerSpec> {
        let container = self.container_for_build(build_id).await?;
        container.specification.ok_or_else(|| CatalogError::BadRequest {
            message: "container has no stored specification".into(),
        })
    }

    async fn status(&self, build_id: &str) -> Result<StatusResponse> {
        let container = self.container_for_build(build_id).await?;
        Ok(StatusResponse {
            id: build_id.to_string(),
            recipe_checksum: container.id,
            last_used: container.last_used,
            docker_url: container.docker_url,
            docker_size: container.docker_size,
            docker_log: container.docker_log,
            singularity_url: container.singularity_url,
            singularity_size: container.singularity_size,
            singularity_log: container.singularity_log,
        })
    }

    async fn docker_url(&self, build_id: &str) -> Result<(String, Option<String>)> {
        let container = self.container_for_build(build_id).await?;
        if container.docker_log.is_some() && container.docker_url.is_none() {
            return Err(CatalogError::Gone {
                message: "docker build finished without an image".into(),
            });
        }
        Ok((container.id, container.docker_url))
    }

    async fn singularity_url(&self, build_id: &str) -> Result<(String, Option<String>)> {
        let container = self.container_for_build(build_id).await?;
        if container.singularity_log.is_some() && container.singularity_url.is_none() {
            return Err(CatalogError::Gone {
                message: "singularity build finished without an image".into(),
            });
        }
        Ok((container.id, container.singularity_url))
    }

    async fn build_log(&self, build_id: &str) -> Result<String> {
        let container = self.container_for_build(build_id).await?;
        if container.docker_log.is_none() {
            return Err(not_found("no build log available yet"));
        }
        Ok(container.id)
    }

    async fn try_start_build(&self, container_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let row = sqlx::query("SELECT building FROM containers WHERE id = ?")
            .bind(container_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| not_found("unknown container"))?;
        let building: Option<String> = row.get("building");
        let mine = owner_tag::current().to_string();

        let claimed = match building {
            Some(tag) if tag == mine => false,
            _ => true,
        };
        if claimed {
            sqlx::query("UPDATE containers SET building = ? WHERE id = ?")
                .bind(&mine)
                .bind(container_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(claimed)
    }

    async fn finish_build(
        &self,
        container_id: &str,
        docker_url: Option<String>,
        docker_log: Option<String>,
        docker_size: Option<u64>,
        singularity_url: Option<String>,
        singularity_log: Option<String>,
        singularity_size: Option<u64>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE containers SET docker_url = ?, docker_log = ?, docker_size = ?, \
             singularity_url = ?, singularity_log = ?, singularity_size = ?, building = NULL \
             WHERE id = ?",
        )
        .bind(docker_url)
        .bind(docker_log)
        .bind(docker_size.map(|v| v as i64))
        .bind(singularity_url)
        .bind(singularity_log)
        .bind(singularity_size.map(|v| v as i64))
        .bind(container_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear_artifacts(&self, container_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE containers SET docker_url = NULL, docker_log = NULL, docker_size = NULL, \
             singularity_url = NULL, singularity_log = NULL, singularity_size = NULL WHERE id = ?",
        )
        .bind(container_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn total_storage(&self) -> Result<u64> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(COALESCE(docker_size, 0) + COALESCE(singularity_size, 0)), 0) AS total \
             FROM containers",
        )
        .fetch_one(&self.pool)
        .await?;
        let total: i64 = row.get("total");
        Ok(total as u64)
    }

    async fn oldest_evictable(&self) -> Result<Option<Container>> {
        let row = sqlx::query(
            "SELECT id FROM containers \
             WHERE (docker_size IS NOT NULL OR singularity_size IS NOT NULL) AND building IS NULL \
             ORDER BY last_used ASC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => {
                let id: String = row.get("id");
                self.load_container(&id).await
            }
            None => Ok(None),
        }
    }

    async fn matchable_containers(&self) -> Result<Vec<Container>> {
        let rows = sqlx::query(
            "SELECT id, last_used, specification, tarball, docker_url, docker_log, \
             docker_size, singularity_url, singularity_log, singularity_size, building \
             FROM containers \
             WHERE (docker_size IS NOT NULL OR singularity_size IS NOT NULL) \
             AND specification IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_container).collect()
    }

    async fn get_container(&self, container_id: &str) -> Result<Container> {
        self.load_container(container_id)
            .await?
            .ok_or_else(|| not_found("unknown container"))
    }
}
