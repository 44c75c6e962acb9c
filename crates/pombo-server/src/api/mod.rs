//! HTTP surfaces: the admin API under `/api` and the peer-facing cluster
//! RPC under `/cluster`.

pub mod admin;
pub mod cluster;

use actix_web::{HttpRequest, HttpResponse, web};
use serde::Serialize;

use pombo_api::{failure, success};
use pombo_common::PomboError;
use pombo_common::error::PARAMETER_MISSING;

use crate::middleware::SystemAccess;
use crate::model::SYSTEM_ID_HEADER;

/// Mount both surfaces onto an actix App.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api").service(admin::register).service(
            web::scope("")
                .wrap(SystemAccess)
                .service(admin::send_to_client)
                .service(admin::send_to_clients)
                .service(admin::send_to_group)
                .service(admin::send_to_system)
                .service(admin::bind_to_group)
                .service(admin::get_online_list)
                .service(admin::close_client),
        ),
    )
    .service(
        web::scope("/cluster")
            .service(cluster::send_to_client)
            .service(cluster::close_client)
            .service(cluster::bind_to_group)
            .service(cluster::send_to_group)
            .service(cluster::send_to_system)
            .service(cluster::online_list),
    );
}

pub(crate) fn render<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(success(data))
}

pub(crate) fn render_error(err: &PomboError) -> HttpResponse {
    HttpResponse::Ok().json(failure(
        err.code(),
        err.to_string(),
        serde_json::Value::Null,
    ))
}

pub(crate) fn render_validation(err: &validator::ValidationErrors) -> HttpResponse {
    HttpResponse::Ok().json(failure(
        PARAMETER_MISSING.code,
        err.to_string(),
        serde_json::Value::Null,
    ))
}

/// The caller's system id, guaranteed non-empty behind [`SystemAccess`].
pub(crate) fn system_id(req: &HttpRequest) -> String {
    req.headers()
        .get(SYSTEM_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}
