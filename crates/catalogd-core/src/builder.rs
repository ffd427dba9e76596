//! Build orchestration.
//!
//! Mirrors the original `background_build`: materialize inputs, build a
//! Docker image, convert it to Singularity, record the outcome, then run
//! eviction. Two deliberate departures from the original, both required
//! rather than incidental:
//!
//! - if the Docker build fails, Singularity conversion is skipped outright
//!   (the original always attempted it, even after a failed Docker build);
//! - a build never retries itself. `retry::retry_async` is reserved for
//!   the object-store uploads this module makes along the way, never for
//!   the docker/singularity invocations themselves.
//!
//! A build-tool failure is not propagated as an `Err` here: the container
//! always reaches "released" with whatever partial outcome it got, and the
//! failure is visible to callers only as missing URLs alongside a present
//! log (the `Gone` surfaced by `CatalogStore::docker_url`/`singularity_url`).
//! Only a catalog I/O failure while recording that outcome propagates, and
//! it leaves `building` set, which is exactly what makes crash-inheritance
//! meaningful on restart.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::catalog::CatalogStore;
use crate::errors::Result;
use crate::landlord::Landlord;
use crate::object_store::{Bucket, ObjectStore};
use crate::retry::{retry_async, RetryConfig};
use crate::spec::ContainerSpec;
use crate::tools::BuildTools;

/// Coordinates a single container's build against the catalog, the
/// external build tools, and the object store.
pub struct Builder {
    catalog: Arc<dyn CatalogStore>,
    tools: Arc<dyn BuildTools>,
    object_store: Arc<dyn ObjectStore>,
    landlord: Arc<Landlord>,
    retry_config: RetryConfig,
    /// Registry builds are pushed to, if configured. The original left its
    /// equivalent ("push to ECR") as a TODO and always returned `None`
    /// here; a configured registry lets `docker_url` resolve to something
    /// a caller can actually pull.
    registry_endpoint: Option<String>,
}

impl Builder {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        tools: Arc<dyn BuildTools>,
        object_store: Arc<dyn ObjectStore>,
        landlord: Arc<Landlord>,
        registry_endpoint: Option<String>,
    ) -> Self {
        Self {
            catalog,
            tools,
            object_store,
            landlord,
            retry_config: RetryConfig::default(),
            registry_endpoint,
        }
    }

    /// Build `container_id` from a stored spec, materializing `apt.txt`
    /// and `environment.yml` into a scratch directory the way the
    /// original's `build_spec` did.
    #[instrument(skip(self, spec))]
    pub async fn build_from_spec(&self, container_id: &str, spec: &ContainerSpec) -> Result<()> {
        if !self.catalog.try_start_build(container_id).await? {
            return Ok(());
        }

        let scratch = tempfile::tempdir()?;
        materialize_spec_context(spec, scratch.path())?;
        self.run_build(container_id, scratch.path()).await
    }

    /// Build `container_id` from an already-extracted tarball context
    /// directory, the advanced-build path.
    #[instrument(skip(self))]
    pub async fn build_from_tarball_context(&self, container_id: &str, context_dir: &Path) -> Result<()> {
        if !self.catalog.try_start_build(container_id).await? {
            return Ok(());
        }
        self.run_build(container_id, context_dir).await
    }

    async fn run_build(&self, container_id: &str, context_dir: &Path) -> Result<()> {
        let docker_outcome = self.tools.build_docker(container_id, context_dir).await;

        let (docker_url, docker_log_url, docker_size) = match docker_outcome {
            Ok(outcome) => {
                let log_url = self.upload_log(Bucket::DockerLogs, container_id, &outcome.log).await?;
                // docker_url must be non-null whenever an image was actually produced,
                // even with no registry configured to push it to.
                let image_url = outcome.artifact_size.map(|_| match &self.registry_endpoint {
                    Some(endpoint) => format!("{endpoint}/catalogd_{container_id}:latest"),
                    None => format!("docker-daemon://catalogd_{container_id}:latest"),
                });
                (image_url, Some(log_url), outcome.artifact_size)
            }
            Err(e) => {
                warn!(error = %e, "docker build failed");
                (None, None, None)
            }
        };

        let (singularity_url, singularity_log_url, singularity_size) = if docker_size.is_some() {
            self.run_singularity(container_id).await?
        } else {
            info!("skipping singularity conversion: docker build did not produce an image");
            (None, None, None)
        };

        self.catalog
            .finish_build(
                container_id,
                docker_url,
                docker_log_url,
                docker_size,
                singularity_url,
                singularity_log_url,
                singularity_size,
            )
            .await?;

        self.landlord.cleanup().await?;
        Ok(())
    }

    async fn run_singularity(&self, container_id: &str) -> Result<(Option<String>, Option<String>, Option<u64>)> {
        let sif_path = std::env::temp_dir().join(format!("catalogd-{container_id}.sif"));
        let outcome = self.tools.convert_singularity(container_id, &sif_path).await;
        let result = match outcome {
            Ok(outcome) => {
                let log_url = self
                    .upload_log(Bucket::SingularityLogs, container_id, &outcome.log)
                    .await?;
                if let Some(size) = outcome.artifact_size.filter(|s| *s > 0) {
                    let bytes = tokio::fs::read(&sif_path).await?;
                    let url = self.upload_artifact(Bucket::Singularity, container_id, bytes).await?;
                    (Some(url), Some(log_url), Some(size))
                } else {
                    (None, Some(log_url), outcome.artifact_size)
                }
            }
            Err(e) => {
                warn!(error = %e, "singularity conversion failed");
                (None, None, None)
            }
        };
        let _ = tokio::fs::remove_file(&sif_path).await;
        Ok(result)
    }

    async fn upload_log(&self, bucket: Bucket, container_id: &str, log: &[u8]) -> Result<String> {
        let log = log.to_vec();
        retry_async(
            &self.retry_config,
            || {
                let log = log.clone();
                async { self.object_store.upload(bucket, container_id, log).await }
            },
            |_| crate::retry::RetryDecision::Retry,
        )
        .await
    }

    async fn upload_artifact(&self, bucket: Bucket, container_id: &str, bytes: Vec<u8>) -> Result<String> {
        retry_async(
            &self.retry_config,
            || {
                let bytes = bytes.clone();
                async { self.object_store.upload(bucket, container_id, bytes).await }
            },
            |_| crate::retry::RetryDecision::Retry,
        )
        .await
    }

    /// Delete a container's artifacts from the object store and null its
    /// catalog fields. Safe to call more than once.
    pub async fn remove(&self, container_id: &str) -> Result<()> {
        self.landlord.remove(container_id).await
    }

    /// Release `container_id`'s build as a terminal failure without ever
    /// invoking the build tools, for input that is well-formed but unusable
    /// (an empty build context). Same shape as a failed docker build: log
    /// set, every artifact field null, `building` cleared.
    pub async fn fail_invalid_input(&self, container_id: &str, message: &str) -> Result<()> {
        if !self.catalog.try_start_build(container_id).await? {
            return Ok(());
        }
        let log_url = self.upload_log(Bucket::DockerLogs, container_id, message.as_bytes()).await?;
        self.catalog
            .finish_build(container_id, None, Some(log_url), None, None, None, None)
            .await?;
        self.landlord.cleanup().await?;
        Ok(())
    }
}

/// Write `apt.txt` (if non-empty) and `environment.yml` into `dir`, the
/// repo2docker build context the original's `build_spec` produced.
fn materialize_spec_context(spec: &ContainerSpec, dir: &Path) -> Result<()> {
    if !spec.apt.is_empty() {
        let mut contents = String::new();
        for pkg in &spec.apt {
            contents.push_str(pkg);
            contents.push('\n');
        }
        std::fs::write(dir.join("apt.txt"), contents)?;
    }

    let mut dependencies = vec!["pip".to_string()];
    dependencies.extend(spec.conda.iter().cloned());
    let mut environment = serde_json::json!({
        "name": "catalogd-container",
        "channels": ["conda-forge"],
        "dependencies": dependencies,
    });
    if !spec.pip.is_empty() {
        environment["dependencies"]
            .as_array_mut()
            .unwrap()
            .push(serde_json::json!({ "pip": spec.pip }));
    }
    std::fs::write(
        dir.join("environment.yml"),
        serde_json::to_string_pretty(&environment)?,
    )?;
    Ok(())
}
