//! End-to-end scenarios against `MemoryCatalog`, using fake build tools and
//! a filesystem-backed object store so no real Docker/Singularity
//! installation is required.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use catalogd_core::builder::Builder;
use catalogd_core::catalog::{CatalogStore, MemoryCatalog};
use catalogd_core::errors::{CatalogError, Result};
use catalogd_core::landlord::Landlord;
use catalogd_core::matcher::find_match;
use catalogd_core::object_store::LocalObjectStore;
use catalogd_core::spec::ContainerSpec;
use catalogd_core::tools::{BuildOutcome, BuildTools};

/// Always succeeds, producing a fixed-size artifact, and counts how many
/// times a real build ran so single-flight behavior can be asserted.
struct FakeBuildTools {
    docker_calls: AtomicUsize,
    singularity_calls: AtomicUsize,
    fail_docker: bool,
}

impl FakeBuildTools {
    fn new() -> Self {
        Self {
            docker_calls: AtomicUsize::new(0),
            singularity_calls: AtomicUsize::new(0),
            fail_docker: false,
        }
    }

    fn failing() -> Self {
        Self {
            docker_calls: AtomicUsize::new(0),
            singularity_calls: AtomicUsize::new(0),
            fail_docker: true,
        }
    }
}

#[async_trait]
impl BuildTools for FakeBuildTools {
    async fn build_docker(&self, _container_id: &str, _context_dir: &Path) -> Result<BuildOutcome> {
        self.docker_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_docker {
            // A real failed repo2docker run still exits and leaves a log;
            // it just never produces an image. `artifact_size: None` is
            // what a failed `build_docker` looks like, not an `Err`.
            return Ok(BuildOutcome {
                log: b"repo2docker exited nonzero".to_vec(),
                artifact_size: None,
            });
        }
        Ok(BuildOutcome {
            log: b"docker ok".to_vec(),
            artifact_size: Some(100),
        })
    }

    async fn convert_singularity(&self, _container_id: &str, sif_path: &Path) -> Result<BuildOutcome> {
        self.singularity_calls.fetch_add(1, Ordering::SeqCst);
        tokio::fs::write(sif_path, b"sif-bytes").await?;
        Ok(BuildOutcome {
            log: b"singularity ok".to_vec(),
            artifact_size: Some(50),
        })
    }
}

fn spec(apt: &[&str]) -> ContainerSpec {
    ContainerSpec {
        apt: apt.iter().map(|s| s.to_string()).collect(),
        conda: vec![],
        pip: vec![],
    }
}

fn test_builder(tools: Arc<FakeBuildTools>) -> (Arc<MemoryCatalog>, Arc<Builder>, Arc<Landlord>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Arc::new(MemoryCatalog::new());
    let object_store = Arc::new(LocalObjectStore::new(dir.path().to_path_buf()));
    let landlord = Arc::new(Landlord::new(catalog.clone(), object_store.clone(), 1_000_000));
    let builder = Arc::new(Builder::new(catalog.clone(), tools, object_store, landlord.clone(), None));
    (catalog, builder, landlord, dir)
}

#[tokio::test]
async fn identical_specs_dedup_to_one_container() {
    let (catalog, _builder, _landlord, _dir) = test_builder(Arc::new(FakeBuildTools::new()));

    let (id1, is_new1) = catalog.store_spec(&spec(&["curl"])).await.unwrap();
    let (id2, is_new2) = catalog.store_spec(&spec(&["curl"])).await.unwrap();

    assert_eq!(id1, id2);
    assert!(is_new1);
    assert!(!is_new2);
}

#[tokio::test]
async fn superset_match_avoids_rebuild() {
    let tools = Arc::new(FakeBuildTools::new());
    let (catalog, builder, _landlord, _dir) = test_builder(tools.clone());

    let (wide_id, _) = catalog.store_spec(&spec(&["curl", "zlib"])).await.unwrap();
    builder.build_from_spec(&wide_id, &spec(&["curl", "zlib"])).await.unwrap();

    let target = spec(&["curl"]);
    let candidates = catalog.matchable_containers().await.unwrap();
    let matched = find_match(&target, &candidates, 0.5).expect("expected a superset match");
    assert_eq!(matched.id, wide_id);

    // Only the one real build ran; the narrower request never triggers its own.
    assert_eq!(tools.docker_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn non_superset_is_refused_and_builds_independently() {
    let tools = Arc::new(FakeBuildTools::new());
    let (catalog, builder, _landlord, _dir) = test_builder(tools.clone());

    let (existing_id, _) = catalog.store_spec(&spec(&["curl"])).await.unwrap();
    builder.build_from_spec(&existing_id, &spec(&["curl"])).await.unwrap();

    let target = spec(&["openssl"]);
    let candidates = catalog.matchable_containers().await.unwrap();
    assert!(find_match(&target, &candidates, 0.5).is_none());

    let (new_id, is_new) = catalog.store_spec(&target).await.unwrap();
    assert!(is_new);
    assert_ne!(new_id, existing_id);
    builder.build_from_spec(&new_id, &target).await.unwrap();
    assert_eq!(tools.docker_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn successful_build_without_registry_still_yields_a_docker_url() {
    let tools = Arc::new(FakeBuildTools::new());
    let (catalog, builder, _landlord, _dir) = test_builder(tools);

    let (id, _) = catalog.store_spec(&spec(&["curl"])).await.unwrap();
    builder.build_from_spec(&id, &spec(&["curl"])).await.unwrap();

    let build_id = catalog.add_build(&id).await.unwrap();
    let (_, url) = catalog.docker_url(&build_id).await.unwrap();
    assert!(url.is_some(), "docker_size is set, so docker_url must not be null");
}

#[tokio::test]
async fn failed_docker_build_surfaces_as_gone_and_skips_singularity() {
    let tools = Arc::new(FakeBuildTools::failing());
    let (catalog, builder, _landlord, _dir) = test_builder(tools.clone());

    let (id, _) = catalog.store_spec(&spec(&["curl"])).await.unwrap();
    builder.build_from_spec(&id, &spec(&["curl"])).await.unwrap();

    assert_eq!(tools.singularity_calls.load(Ordering::SeqCst), 0);

    let build_id = catalog.add_build(&id).await.unwrap();
    let err = catalog.docker_url(&build_id).await.unwrap_err();
    assert!(matches!(err, CatalogError::Gone { .. }));
}

#[tokio::test]
async fn invalid_input_is_recorded_as_a_terminal_failure_without_touching_build_tools() {
    let tools = Arc::new(FakeBuildTools::new());
    let (catalog, builder, _landlord, _dir) = test_builder(tools.clone());

    let (id, _) = catalog.store_spec(&spec(&["curl"])).await.unwrap();
    builder.fail_invalid_input(&id, "invalid tarball: archive is empty").await.unwrap();

    assert_eq!(tools.docker_calls.load(Ordering::SeqCst), 0);
    assert_eq!(tools.singularity_calls.load(Ordering::SeqCst), 0);

    let build_id = catalog.add_build(&id).await.unwrap();
    let err = catalog.docker_url(&build_id).await.unwrap_err();
    assert!(matches!(err, CatalogError::Gone { .. }));
}

#[tokio::test]
async fn concurrent_submissions_single_flight_the_real_build() {
    let tools = Arc::new(FakeBuildTools::new());
    let (catalog, builder, _landlord, _dir) = test_builder(tools.clone());

    let (id, _) = catalog.store_spec(&spec(&["curl"])).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let builder = builder.clone();
        let id = id.clone();
        let s = spec(&["curl"]);
        handles.push(tokio::spawn(async move { builder.build_from_spec(&id, &s).await }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }

    assert_eq!(tools.docker_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn eviction_at_storage_boundary_keeps_usage_under_budget() {
    let tools = Arc::new(FakeBuildTools::new());
    let dir = tempfile::tempdir().unwrap();
    let catalog = Arc::new(MemoryCatalog::new());
    let object_store = Arc::new(LocalObjectStore::new(dir.path().to_path_buf()));
    // budget smaller than two builds' combined artifact size (100 + 50 = 150 each).
    let landlord = Arc::new(Landlord::new(catalog.clone(), object_store.clone(), 200));
    let builder = Arc::new(Builder::new(catalog.clone(), tools, object_store, landlord.clone(), None));

    let (id_a, _) = catalog.store_spec(&spec(&["a"])).await.unwrap();
    builder.build_from_spec(&id_a, &spec(&["a"])).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(2)).await;

    let (id_b, _) = catalog.store_spec(&spec(&["b"])).await.unwrap();
    builder.build_from_spec(&id_b, &spec(&["b"])).await.unwrap();

    assert!(catalog.total_storage().await.unwrap() <= 200);
    let a = catalog.get_container(&id_a).await.unwrap();
    assert!(!a.has_evictable_artifact());
}
