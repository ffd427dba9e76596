//! External build-tool invocation.
//!
//! The builder never talks to `repo2docker`/`docker`/`singularity`
//! directly; it goes through [`BuildTools`], matching the
//! trait-plus-CLI-implementation split the teacher uses for Docker
//! (`Docker` trait / `CliDocker`). The default implementation shells out
//! with `tokio::process::Command`, suspending at the subprocess wait so no
//! catalog lock is ever held across it.

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::errors::{CatalogError, Result};

/// Outcome of a build-tool invocation: the raw combined stdout/stderr log
/// and, on success, the size in bytes of whatever artifact was produced.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub log: Vec<u8>,
    pub artifact_size: Option<u64>,
}

/// Abstraction over the external tools that turn a materialized build
/// context into container artifacts.
#[async_trait]
pub trait BuildTools: Send + Sync {
    /// Run `repo2docker` (or equivalent) over `context_dir`, producing a
    /// Docker image tagged for `container_id`.
    async fn build_docker(&self, container_id: &str, context_dir: &Path) -> Result<BuildOutcome>;

    /// Convert the Docker image for `container_id` into a Singularity
    /// image, writing it to `sif_path`.
    async fn convert_singularity(&self, container_id: &str, sif_path: &Path) -> Result<BuildOutcome>;
}

/// Shells out to the `repo2docker`/`singularity` binaries on `$PATH`,
/// mirroring the original's `REPO2DOCKER_CMD` / `SINGULARITY_CMD` shell
/// templates.
#[derive(Debug, Clone)]
pub struct CliBuildTools {
    image_prefix: String,
}

impl CliBuildTools {
    pub fn new(image_prefix: impl Into<String>) -> Self {
        Self {
            image_prefix: image_prefix.into(),
        }
    }

    fn image_tag(&self, container_id: &str) -> String {
        format!("{}_{}", self.image_prefix, container_id)
    }
}

impl Default for CliBuildTools {
    fn default() -> Self {
        Self::new("catalogd")
    }
}

#[async_trait]
impl BuildTools for CliBuildTools {
    #[instrument(skip(self))]
    async fn build_docker(&self, container_id: &str, context_dir: &Path) -> Result<BuildOutcome> {
        let tag = self.image_tag(container_id);
        debug!(%tag, dir = %context_dir.display(), "running repo2docker");

        let output = tokio::process::Command::new("jupyter-repo2docker")
            .arg("--no-run")
            .arg("--image-name")
            .arg(&tag)
            .arg(context_dir)
            .output()
            .await
            .map_err(|e| CatalogError::BuildTool {
                message: format!("failed to spawn jupyter-repo2docker: {e}"),
            })?;

        let mut log = output.stdout;
        log.extend_from_slice(&output.stderr);

        let size = docker_image_size(&tag).await?;
        Ok(BuildOutcome {
            log,
            artifact_size: size,
        })
    }

    #[instrument(skip(self))]
    async fn convert_singularity(&self, container_id: &str, sif_path: &Path) -> Result<BuildOutcome> {
        let tag = self.image_tag(container_id);
        debug!(%tag, sif = %sif_path.display(), "running singularity build");

        let output = tokio::process::Command::new("singularity")
            .arg("build")
            .arg("--force")
            .arg(sif_path)
            .arg(format!("docker-daemon://{tag}:latest"))
            .output()
            .await
            .map_err(|e| CatalogError::BuildTool {
                message: format!("failed to spawn singularity: {e}"),
            })?;

        let mut log = output.stdout;
        log.extend_from_slice(&output.stderr);

        let size = match tokio::fs::metadata(sif_path).await {
            Ok(meta) if meta.len() > 0 => Some(meta.len()),
            _ => None,
        };
        Ok(BuildOutcome {
            log,
            artifact_size: size,
        })
    }
}

async fn docker_image_size(tag: &str) -> Result<Option<u64>> {
    let output = tokio::process::Command::new("docker")
        .arg("image")
        .arg("inspect")
        .arg("--format={{.Size}}")
        .arg(tag)
        .output()
        .await
        .map_err(|e| CatalogError::BuildTool {
            message: format!("failed to spawn docker: {e}"),
        })?;

    if !output.status.success() {
        return Ok(None);
    }
    let text = String::from_utf8_lossy(&output.stdout);
    Ok(text.trim().parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_tag_uses_configured_prefix() {
        let tools = CliBuildTools::new("myprefix");
        assert_eq!(tools.image_tag("abc123"), "myprefix_abc123");
    }
}
