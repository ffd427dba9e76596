//! In-process catalog backend.
//!
//! An in-memory map behind one mutex is adequate for a single-instance
//! deployment or a test suite; it is not durable across restarts, so the
//! owner-tag reclaim path in [`Self::try_start_build`] can never actually
//! observe a foreign tag here (nothing survives the crash it would be
//! recovering from) but is implemented identically to [`super::SqliteCatalog`]
//! for parity.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::model::{Build, Container, StatusResponse};
use super::CatalogStore;
use crate::errors::{CatalogError, Result};
use crate::hasher::{hash_reader, hash_spec};
use crate::owner_tag;
use crate::spec::{CanonicalSpec, ContainerSpec};

#[derive(Default)]
struct CatalogState {
    containers: HashMap<String, Container>,
    builds: HashMap<String, Build>,
}

/// `tokio::sync::Mutex<CatalogState>` over an in-process `HashMap`.
pub struct MemoryCatalog {
    state: Mutex<CatalogState>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CatalogState::default()),
        }
    }
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(what: &str) -> CatalogError {
    CatalogError::NotFound {
        message: what.to_string(),
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn store_spec(&self, spec: &ContainerSpec) -> Result<(String, bool)> {
        let canonical = CanonicalSpec::new(spec)?;
        let id = hash_spec(&canonical);
        let mut state = self.state.lock().await;
        if state.containers.contains_key(&id) {
            return Ok((id, false));
        }
        let mut container = Container::new(id.clone(), Utc::now());
        container.specification = Some(spec.clone());
        state.containers.insert(id.clone(), container);
        Ok((id, true))
    }

    async fn store_tarball(&self, container_id: String) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.containers.contains_key(&container_id) {
            return Ok(false);
        }
        state
            .containers
            .insert(container_id.clone(), Container::new(container_id, Utc::now()));
        Ok(true)
    }

    async fn add_build(&self, container_id: &str) -> Result<String> {
        let mut state = self.state.lock().await;
        let container = state
            .containers
            .get_mut(container_id)
            .ok_or_else(|| not_found("unknown container"))?;
        container.last_used = Utc::now();
        let build_id = Uuid::new_v4().to_string();
        state.builds.insert(
            build_id.clone(),
            Build {
                id: build_id.clone(),
                container_hash: container_id.to_string(),
            },
        );
        Ok(build_id)
    }

    async fn get_spec(&self, build_id: &str) -> Result<ContainerSpec> {
        let state = self.state.lock().await;
        let build = state.builds.get(build_id).ok_or_else(|| not_found("unknown build"))?;
        let container = state
            .containers
            .get(&build.container_hash)
            .ok_or_else(|| not_found("unknown container"))?;
        container
            .specification
            .clone()
            .ok_or_else(|| CatalogError::BadRequest {
                message: "container has no stored specification".into(),
            })
    }

    async fn status(&self, build_id: &str) -> Result<StatusResponse> {
        let state = self.state.lock().await;
        let build = state.builds.get(build_id).ok_or_else(|| not_found("unknown build"))?;
        let container = state
            .containers
            .get(&build.container_hash)
            .ok_or_else(|| not_found("unknown container"))?;
        Ok(StatusResponse {
            id: build.id.clone(),
            recipe_checksum: container.id.clone(),
            last_used: container.last_used,
            docker_url: container.docker_url.clone(),
            docker_size: container.docker_size,
            docker_log: container.docker_log.clone(),
            singularity_url: container.singularity_url.clone(),
            singularity_size: container.singularity_size,
            singularity_log: container.singularity_log.clone(),
        })
    }

    async fn docker_url(&self, build_id: &str) -> Result<(String, Option<String>)> {
        let state = self.state.lock().await;
        let build = state.builds.get(build_id).ok_or_else(|| not_found("unknown build"))?;
        let container = state
            .containers
            .get(&build.container_hash)
            .ok_or_else(|| not_found("unknown container"))?;
        if container.docker_log.is_some() && container.docker_url.is_none() {
            return Err(CatalogError::Gone {
                message: "docker build finished without an image".into(),
            });
        }
        Ok((container.id.clone(), container.docker_url.clone()))
    }

    async fn singularity_url(&self, build_id: &str) -> Result<(String, Option<String>)> {
        let state = self.state.lock().await;
        let build = state.builds.get(build_id).ok_or_else(|| not_found("unknown build"))?;
        let container = state
            .containers
            .get(&build.container_hash)
            .ok_or_else(|| not_found("unknown container"))?;
        if container.singularity_log.is_some() && container.singularity_url.is_none() {
            return Err(CatalogError::Gone {
                message: "singularity build finished without an image".into(),
            });
        }
        Ok((container.id.clone(), container.singularity_url.clone()))
    }

    async fn build_log(&self, build_id: &str) -> Result<String> {
        let state = self.state.lock().await;
        let build = state.builds.get(build_id).ok_or_else(|| not_found("unknown build"))?;
        let container = state
            .containers
            .get(&build.container_hash)
            .ok_or_else(|| not_found("unknown container"))?;
        if container.docker_log.is_none() {
            return Err(not_found("no build log available yet"));
        }
        Ok(container.id.clone())
    }

    async fn try_start_build(&self, container_id: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        let container = state
            .containers
            .get_mut(container_id)
            .ok_or_else(|| not_found("unknown container"))?;
        let mine = owner_tag::current().to_string();
        match &container.building {
            Some(tag) if *tag == mine => Ok(false),
            Some(_other) => {
                // A foreign, presumed-crashed owner tag: reclaim the slot.
                container.building = Some(mine);
                Ok(true)
            }
            None => {
                container.building = Some(mine);
                Ok(true)
            }
        }
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
        let mut state = self.state.lock().await;
        let container = state
            .containers
            .get_mut(container_id)
            .ok_or_else(|| not_found("unknown container"))?;
        container.docker_url = docker_url;
        container.docker_log = docker_log;
        container.docker_size = docker_size;
        container.singularity_url = singularity_url;
        container.singularity_log = singularity_log;
        container.singularity_size = singularity_size;
        container.building = None;
        Ok(())
    }

    async fn clear_artifacts(&self, container_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let container = state
            .containers
            .get_mut(container_id)
            .ok_or_else(|| not_found("unknown container"))?;
        container.docker_url = None;
        container.docker_log = None;
        container.docker_size = None;
        container.singularity_url = None;
        container.singularity_log = None;
        container.singularity_size = None;
        Ok(())
    }

    async fn total_storage(&self) -> Result<u64> {
        let state = self.state.lock().await;
        Ok(state.containers.values().map(Container::artifact_size).sum())
    }

    async fn oldest_evictable(&self) -> Result<Option<Container>> {
        let state = self.state.lock().await;
        Ok(state
            .containers
            .values()
            .filter(|c| c.has_evictable_artifact() && c.building.is_none())
            .min_by_key(|c| c.last_used)
            .cloned())
    }

    async fn matchable_containers(&self) -> Result<Vec<Container>> {
        let state = self.state.lock().await;
        Ok(state
            .containers
            .values()
            .filter(|c| c.has_evictable_artifact() && c.specification.is_some())
            .cloned()
            .collect())
    }

    async fn get_container(&self, container_id: &str) -> Result<Container> {
        let state = self.state.lock().await;
        state
            .containers
            .get(container_id)
            .cloned()
            .ok_or_else(|| not_found("unknown container"))
    }
}

/// Hash an already-materialized tarball on disk, mirroring the original's
/// `hash_file` + `store_tarball` pairing.
pub fn hash_tarball_file(path: &std::path::Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    hash_reader(&mut file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::sync::Arc;

    fn spec() -> ContainerSpec {
        ContainerSpec {
            apt: vec!["curl".into()],
            conda: vec![],
            pip: vec![],
        }
    }

    #[tokio::test]
    async fn dedups_identical_specs() {
        let cat = MemoryCatalog::new();
        let (id1, new1) = cat.store_spec(&spec()).await.unwrap();
        let (id2, new2) = cat.store_spec(&spec()).await.unwrap();
        assert_eq!(id1, id2);
        assert!(new1);
        assert!(!new2);
    }

    #[tokio::test]
    async fn single_flight_across_concurrent_claims() {
        let cat = Arc::new(MemoryCatalog::new());
        let (id, _) = cat.store_spec(&spec()).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let cat = Arc::clone(&cat);
            let id = id.clone();
            tasks.push(tokio::spawn(async move { cat.try_start_build(&id).await.unwrap() }));
        }
        let results = join_all(tasks).await;
        let wins = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn finish_build_clears_claim_and_allows_restart() {
        let cat = MemoryCatalog::new();
        let (id, _) = cat.store_spec(&spec()).await.unwrap();
        assert!(cat.try_start_build(&id).await.unwrap());
        cat.finish_build(&id, Some("u".into()), Some("l".into()), Some(10), None, None, None)
            .await
            .unwrap();
        assert!(cat.try_start_build(&id).await.unwrap());
    }

    #[tokio::test]
    async fn docker_url_gone_after_failed_build() {
        let cat = MemoryCatalog::new();
        let (id, _) = cat.store_spec(&spec()).await.unwrap();
        cat.finish_build(&id, None, Some("log".into()), None, None, None, None)
            .await
            .unwrap();
        let build_id = cat.add_build(&id).await.unwrap();
        let err = cat.docker_url(&build_id).await.unwrap_err();
        assert!(matches!(err, CatalogError::Gone { .. }));
    }

    #[tokio::test]
    async fn total_storage_sums_both_artifacts() {
        let cat = MemoryCatalog::new();
        let (id, _) = cat.store_spec(&spec()).await.unwrap();
        cat.finish_build(
            &id,
            Some("d".into()),
            Some("dl".into()),
            Some(100),
            Some("s".into()),
            Some("sl".into()),
            Some(50),
        )
        .await
        .unwrap();
        assert_eq!(cat.total_storage().await.unwrap(), 150);
    }
}
