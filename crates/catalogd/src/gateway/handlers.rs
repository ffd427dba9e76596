//! Gateway handlers: thin request/response glue around `catalogd-core`.
//!
//! No routing logic or business logic lives here; handlers parse/validate,
//! call into the catalog/builder, map errors via [`GatewayError`], and
//! background-spawn the builder rather than awaiting it inline, so a slow
//! build never holds an HTTP connection open.

use axum::extract::{Multipart, Path, State};
use axum::response::IntoResponse;
use axum::Json;
use uuid::Uuid;

use catalogd_core::dockerfile;
use catalogd_core::spec::ContainerSpec;

use super::errors::GatewayError;
use super::state::AppState;

/// `POST /build` — submit a package-list spec.
pub async fn build(
    State(state): State<AppState>,
    Json(spec): Json<ContainerSpec>,
) -> Result<Json<Uuid>, GatewayError> {
    let (container_id, is_new) = state.catalog.store_spec(&spec).await?;

    if is_new {
        let candidates = state.catalog.matchable_containers().await?;
        if let Some(existing) = catalogd_core::matcher::find_match(&spec, &candidates, state.config.alpha) {
            let build_id = state.catalog.add_build(&existing.id).await?;
            return Ok(Json(Uuid::parse_str(&build_id).unwrap_or_else(|_| Uuid::nil())));
        }

        let builder = state.builder.clone();
        let container_id_bg = container_id.clone();
        tokio::spawn(async move {
            if let Err(err) = builder.build_from_spec(&container_id_bg, &spec).await {
                tracing::error!(container_id = %container_id_bg, error = %err, "background build failed");
            }
        });
    }

    let build_id = state.catalog.add_build(&container_id).await?;
    Ok(Json(Uuid::parse_str(&build_id).unwrap_or_else(|_| Uuid::nil())))
}

/// `POST /build_advanced` — submit a `.tar.gz` repo2docker build context.
pub async fn build_advanced(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Uuid>, GatewayError> {
    let mut tarball_bytes: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| catalogd_core::errors::CatalogError::BadRequest {
            message: format!("invalid multipart body: {e}"),
        })?
    {
        if field.name() == Some("repo") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| catalogd_core::errors::CatalogError::BadRequest {
                    message: format!("failed to read upload: {e}"),
                })?;
            tarball_bytes = Some(bytes.to_vec());
        }
    }
    let bytes = tarball_bytes.ok_or_else(|| catalogd_core::errors::CatalogError::BadRequest {
        message: "missing `repo` field".into(),
    })?;

    let scratch = tempfile::tempdir().map_err(catalogd_core::errors::CatalogError::from)?;
    let archive_path = scratch.path().join("repo.tar.gz");
    tokio::fs::write(&archive_path, &bytes)
        .await
        .map_err(catalogd_core::errors::CatalogError::from)?;

    let container_id = {
        let path = archive_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut file = std::fs::File::open(&path)?;
            catalogd_core::hasher::hash_reader(&mut file)
        })
        .await
        .map_err(|e| catalogd_core::errors::CatalogError::BuildTool {
            message: format!("hashing task panicked: {e}"),
        })??
    };

    let is_new = state.catalog.store_tarball(container_id.clone()).await?;

    if is_new {
        let extract_dir = scratch.into_path();
        let context_dir = extract_dir.join("context");
        tokio::fs::create_dir_all(&context_dir)
            .await
            .map_err(catalogd_core::errors::CatalogError::from)?;
        extract_tarball(&extract_dir.join("repo.tar.gz"), &context_dir)?;

        if !has_entries(&context_dir)? {
            state
                .builder
                .fail_invalid_input(&container_id, "invalid tarball: archive is empty")
                .await?;
            let _ = tokio::fs::remove_dir_all(&extract_dir).await;
            return Err(catalogd_core::errors::CatalogError::InvalidInput {
                message: "invalid tarball: archive is empty".into(),
            }
            .into());
        }

        let builder = state.builder.clone();
        let container_id_bg = container_id.clone();
        tokio::spawn(async move {
            if let Err(err) = builder
                .build_from_tarball_context(&container_id_bg, &context_dir)
                .await
            {
                tracing::error!(container_id = %container_id_bg, error = %err, "background build failed");
            }
            let _ = tokio::fs::remove_dir_all(&extract_dir).await;
        });
    }

    let build_id = state.catalog.add_build(&container_id).await?;
    Ok(Json(Uuid::parse_str(&build_id).unwrap_or_else(|_| Uuid::nil())))
}

/// Unpack a `.tar.gz` build context. Only surfaces an error for a
/// genuinely malformed archive (bad gzip/tar framing); an archive that
/// unpacks cleanly but empty is a builder-level concern, not a gateway one.
fn extract_tarball(archive: &std::path::Path, dest: &std::path::Path) -> Result<(), GatewayError> {
    let file = std::fs::File::open(archive).map_err(catalogd_core::errors::CatalogError::from)?;
    let decoder = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);
    archive
        .unpack(dest)
        .map_err(catalogd_core::errors::CatalogError::from)?;
    Ok(())
}

fn has_entries(dir: &std::path::Path) -> Result<bool, GatewayError> {
    Ok(std::fs::read_dir(dir)
        .map_err(catalogd_core::errors::CatalogError::from)?
        .next()
        .is_some())
}

/// `GET /{build_id}/dockerfile`
pub async fn get_dockerfile(
    State(state): State<AppState>,
    Path(build_id): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let spec = state.catalog.get_spec(&build_id).await?;
    Ok(([(axum::http::header::CONTENT_TYPE, "text/plain")], dockerfile::emit(&spec)))
}

/// `GET /{build_id}/status`
pub async fn get_status(
    State(state): State<AppState>,
    Path(build_id): Path<String>,
) -> Result<Json<catalogd_core::catalog::StatusResponse>, GatewayError> {
    Ok(Json(state.catalog.status(&build_id).await?))
}

/// `GET /{build_id}/build_log` — the combined docker build log, fetched
/// from the object store rather than served as a stored URL.
pub async fn get_build_log(
    State(state): State<AppState>,
    Path(build_id): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let container_id = state.catalog.build_log(&build_id).await?;
    let bytes = state
        .object_store
        .fetch(catalogd_core::object_store::Bucket::DockerLogs, &container_id)
        .await?;
    Ok(([(axum::http::header::CONTENT_TYPE, "text/plain")], bytes))
}

/// `GET /{build_id}/docker` — returns the image URL if ready, else `null`
/// and (re-)triggers a build.
pub async fn get_docker(
    State(state): State<AppState>,
    Path(build_id): Path<String>,
) -> Result<Json<Option<String>>, GatewayError> {
    let (container_id, url) = state.catalog.docker_url(&build_id).await?;
    if url.is_none() {
        maybe_rebuild(&state, &container_id).await?;
    }
    Ok(Json(url))
}

/// `GET /{build_id}/singularity` — symmetric with `/docker`, supplementing
/// the distillation's Docker-only route with the Singularity artifact the
/// catalog already tracks.
pub async fn get_singularity(
    State(state): State<AppState>,
    Path(build_id): Path<String>,
) -> Result<Json<Option<String>>, GatewayError> {
    let (container_id, url) = state.catalog.singularity_url(&build_id).await?;
    if url.is_none() {
        maybe_rebuild(&state, &container_id).await?;
    }
    Ok(Json(url))
}

async fn maybe_rebuild(state: &AppState, container_id: &str) -> Result<(), GatewayError> {
    let container = state.catalog.get_container(container_id).await?;
    let Some(spec) = container.specification else {
        return Ok(());
    };
    let builder = state.builder.clone();
    let container_id = container_id.to_string();
    tokio::spawn(async move {
        if let Err(err) = builder.build_from_spec(&container_id, &spec).await {
            tracing::error!(container_id = %container_id, error = %err, "background build failed");
        }
    });
    Ok(())
}
