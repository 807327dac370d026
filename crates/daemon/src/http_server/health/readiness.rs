//! Readiness: every dependency the request path touches must answer
//! within the probe deadline.

use std::sync::Arc;
use std::time::Duration;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;
use futures::future::join_all;
use object_store::Storage;
use tokio::time::timeout;

use super::ProbeBody;
use crate::database::Database;
use crate::ServiceState;

const READINESS_TIMEOUT: Duration = Duration::from_secs(10);
/// Object looked up to prove the storage tier answers; it never exists.
const STORAGE_PROBE_ID: &str = "readiness-probe";

#[async_trait]
pub trait Dependency: Send + Sync {
    fn name(&self) -> &'static str;

    async fn check(&self) -> bool;
}

pub type DynDependency = Arc<dyn Dependency>;

struct Catalog(Database);

#[async_trait]
impl Dependency for Catalog {
    fn name(&self) -> &'static str {
        "catalog"
    }

    async fn check(&self) -> bool {
        match sqlx::query("SELECT 1").execute(&*self.0).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("catalog readiness check failed: {}", e);
                false
            }
        }
    }
}

struct ObjectStorage(Storage);

#[async_trait]
impl Dependency for ObjectStorage {
    fn name(&self) -> &'static str {
        "storage"
    }

    async fn check(&self) -> bool {
        match self.0.exists(STORAGE_PROBE_ID).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("storage readiness check failed: {}", e);
                false
            }
        }
    }
}

/// The dependencies of the running service, pulled from state per request.
pub struct Dependencies(Vec<DynDependency>);

impl std::fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.0.iter().map(|d| d.name()))
            .finish()
    }
}

#[async_trait]
impl FromRequestParts<ServiceState> for Dependencies {
    type Rejection = ();

    async fn from_request_parts(
        _parts: &mut Parts,
        state: &ServiceState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Dependencies(vec![
            Arc::new(Catalog(state.database().clone())),
            Arc::new(ObjectStorage(state.storage().clone())),
        ]))
    }
}

impl Dependencies {
    /// Names of the dependencies that failed or did not answer in time.
    async fn failing(&self, deadline: Duration) -> Vec<&'static str> {
        let checks = self.0.iter().map(|dep| async move {
            match timeout(deadline, dep.check()).await {
                Ok(true) => None,
                Ok(false) | Err(_) => Some(dep.name()),
            }
        });
        join_all(checks).await.into_iter().flatten().collect()
    }
}

#[tracing::instrument]
pub async fn handler(deps: Dependencies) -> (StatusCode, Json<ProbeBody>) {
    let failing = deps.failing(READINESS_TIMEOUT).await;
    if failing.is_empty() {
        (StatusCode::OK, Json(ProbeBody::ok()))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ProbeBody::failure(format!(
                "unavailable: {}",
                failing.join(", ")
            ))),
        )
    }
}
