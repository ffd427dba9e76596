//! Shared gateway state handed to every handler via `axum::extract::State`.

use std::sync::Arc;

use catalogd_core::builder::Builder;
use catalogd_core::catalog::CatalogStore;
use catalogd_core::config::AppConfig;
use catalogd_core::landlord::Landlord;
use catalogd_core::object_store::ObjectStore;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn CatalogStore>,
    pub builder: Arc<Builder>,
    pub landlord: Arc<Landlord>,
    pub object_store: Arc<dyn ObjectStore>,
    pub config: Arc<AppConfig>,
}
