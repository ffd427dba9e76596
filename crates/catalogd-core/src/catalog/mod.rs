//! The catalog: the one piece of shared state every other component reads
//! or writes through. It owns container/build persistence, the
//! single-flight `try_start_build` compare-and-swap, and the storage
//! aggregate the landlord polls.

pub mod memory;
pub mod model;
pub mod sqlite;

pub use memory::MemoryCatalog;
pub use model::{Build, Container, StatusResponse};
pub use sqlite::SqliteCatalog;

use async_trait::async_trait;

use crate::errors::Result;
use crate::spec::ContainerSpec;

/// Storage backend for containers and builds.
///
/// Every method that mutates catalog state does so under whatever
/// transactional scope the backend provides (a mutex for
/// [`MemoryCatalog`], `BEGIN IMMEDIATE` for [`SqliteCatalog`]); callers
/// never need to coordinate locking themselves.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Register a spec, creating its container row if this is the first
    /// time this content hash has been seen. Returns the container id and
    /// whether a container row was newly created (i.e. a build is needed
    /// unless a superset match is found).
    async fn store_spec(&self, spec: &ContainerSpec) -> Result<(String, bool)>;

    /// Register an already-hashed tarball upload, creating its container
    /// row if new. Returns the container id and whether it is new.
    async fn store_tarball(&self, container_id: String) -> Result<bool>;

    /// Create a new build row pointing at `container_id`, bump the
    /// container's `last_used`, and return the new build id.
    async fn add_build(&self, container_id: &str) -> Result<String>;

    /// Look up the spec a build resolved to.
    async fn get_spec(&self, build_id: &str) -> Result<ContainerSpec>;

    /// Full status snapshot for a build.
    async fn status(&self, build_id: &str) -> Result<StatusResponse>;

    /// Docker URL for a build's container. Per the original, a log present
    /// without a URL means the build finished and failed: a
    /// [`crate::errors::CatalogError::Gone`] is surfaced in that case.
    async fn docker_url(&self, build_id: &str) -> Result<(String, Option<String>)>;

    /// Singularity URL for a build's container, with the same
    /// finished-and-failed semantics as [`Self::docker_url`].
    async fn singularity_url(&self, build_id: &str) -> Result<(String, Option<String>)>;

    /// Resolve a build to the container id its combined build log is
    /// stored under (in the object store's `DockerLogs` bucket), erroring
    /// if no log has been recorded yet. The catalog only tracks where the
    /// log lives; callers fetch the bytes from the object store.
    async fn build_log(&self, build_id: &str) -> Result<String>;

    /// Attempt to claim the right to build `container_id`. Returns `true`
    /// if the caller now owns the build (either the row was unclaimed, or
    /// it was claimed by a different, presumed-crashed, owner tag and has
    /// now been reclaimed). Returns `false` if this process already owns
    /// the in-flight build.
    async fn try_start_build(&self, container_id: &str) -> Result<bool>;

    /// Record a finished build's outcome and clear the `building` claim.
    #[allow(clippy::too_many_arguments)]
    async fn finish_build(
        &self,
        container_id: &str,
        docker_url: Option<String>,
        docker_log: Option<String>,
        docker_size: Option<u64>,
        singularity_url: Option<String>,
        singularity_log: Option<String>,
        singularity_size: Option<u64>,
    ) -> Result<()>;

    /// Null out all five artifact fields for a container, idempotently.
    async fn clear_artifacts(&self, container_id: &str) -> Result<()>;

    /// Sum of `docker_size + singularity_size` across every container.
    async fn total_storage(&self) -> Result<u64>;

    /// The single least-recently-used container holding an evictable
    /// artifact, if any. Excludes containers with `building` set: a
    /// container a reclaim build is currently rebuilding must never be
    /// evicted out from under it.
    async fn oldest_evictable(&self) -> Result<Option<Container>>;

    /// All containers holding an evictable artifact plus a stored spec,
    /// the candidate set the matcher searches.
    async fn matchable_containers(&self) -> Result<Vec<Container>>;

    /// Fetch a container by id, for tests and diagnostics.
    async fn get_container(&self, container_id: &str) -> Result<Container>;
}
