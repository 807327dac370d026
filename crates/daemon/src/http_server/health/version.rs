use axum::Json;

use common::version::BuildInfo;

pub async fn handler() -> Json<BuildInfo> {
    Json(common::prelude::build_info())
}
