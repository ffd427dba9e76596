//! Gateway and catalog configuration.
//!
//! Every field is a `clap` long option that also reads from an environment
//! variable, following the `#[arg(long, env = "...")]` pattern used
//! throughout the wider build-tooling corpus rather than a devcontainer.json
//! style config file (there is no analogous file format here).

use clap::Parser;
use std::path::PathBuf;

/// Runtime configuration for the catalogd gateway and builder.
#[derive(Parser, Debug, Clone)]
#[command(name = "catalogd", about = "Content-addressed container-build coordinator")]
pub struct AppConfig {
    /// Storage budget in bytes. The landlord evicts least-recently-used
    /// containers once total artifact storage exceeds this value.
    #[arg(long, env = "CATALOGD_MAX_STORAGE", default_value_t = 2_000_000_000)]
    pub max_storage: u64,

    /// Jaccard-distance threshold below which a candidate container is
    /// accepted as a superset match.
    #[arg(long, env = "CATALOGD_ALPHA", default_value_t = 0.5)]
    pub alpha: f64,

    /// Docker host/socket the build tools connect to.
    #[arg(long, env = "CATALOGD_DOCKER_HOST", default_value = "unix:///var/run/docker.sock")]
    pub docker_host: String,

    /// Endpoint URL of the S3-compatible object store.
    #[arg(long, env = "CATALOGD_OBJECT_STORE_ENDPOINT")]
    pub object_store_endpoint: Option<String>,

    /// Access key for the object store. Registered with the redaction
    /// registry at startup so it never reaches logs.
    #[arg(long, env = "CATALOGD_OBJECT_STORE_ACCESS_KEY")]
    pub object_store_access_key: Option<String>,

    /// Secret key for the object store. Registered with the redaction
    /// registry at startup so it never reaches logs.
    #[arg(long, env = "CATALOGD_OBJECT_STORE_SECRET_KEY")]
    pub object_store_secret_key: Option<String>,

    /// Bucket name within the object store that holds spec blobs, tarballs
    /// and build artifacts.
    #[arg(long, env = "CATALOGD_OBJECT_STORE_BUCKET", default_value = "catalogd")]
    pub object_store_bucket: String,

    /// Registry endpoint builds are pushed to after a successful build.
    #[arg(long, env = "CATALOGD_REGISTRY_ENDPOINT")]
    pub registry_endpoint: Option<String>,

    /// Address the HTTP gateway binds to.
    #[arg(long, env = "CATALOGD_BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: String,

    /// Catalog backend location. `:memory:` selects the in-process
    /// `MemoryCatalog`; any other value is treated as a sqlite file path and
    /// selects `SqliteCatalog`.
    #[arg(long, env = "CATALOGD_CATALOG_URL", default_value = ":memory:")]
    pub catalog_url: String,
}

impl AppConfig {
    /// Whether `catalog_url` selects the durable sqlite-backed catalog.
    pub fn uses_sqlite(&self) -> bool {
        self.catalog_url != ":memory:"
    }

    /// Path form of `catalog_url`, valid only when [`Self::uses_sqlite`] is true.
    pub fn catalog_path(&self) -> PathBuf {
        PathBuf::from(&self.catalog_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_is_valid() {
        AppConfig::command().debug_assert();
    }

    #[test]
    fn memory_catalog_by_default() {
        let cfg = AppConfig::parse_from(["catalogd"]);
        assert!(!cfg.uses_sqlite());
    }

    #[test]
    fn sqlite_url_detected() {
        let cfg = AppConfig::parse_from(["catalogd", "--catalog-url", "/tmp/catalogd.db"]);
        assert!(cfg.uses_sqlite());
        assert_eq!(cfg.catalog_path(), PathBuf::from("/tmp/catalogd.db"));
    }
}
