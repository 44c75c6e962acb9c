//! Peer-facing cluster RPC handlers.
//!
//! Each handler answers only for connections this process owns; the
//! calling node already decided the target (or the fan-out) belongs here.
//! Message ids are generated by the originating node and passed through so
//! a broadcast keeps one id across the whole cluster.

use actix_web::{HttpResponse, post, web};
use serde_json::json;
use tracing::debug;

use pombo_api::cluster::{
    PeerBindRequest, PeerCloseRequest, PeerGroupMessageRequest, PeerOnlineListRequest,
    PeerOnlineListResponse, PeerSendRequest, PeerSystemMessageRequest,
};
use pombo_common::PomboError;
use pombo_core::OutboundMessage;

use super::{render, render_error};
use crate::model::AppState;

#[post("/send_to_client")]
pub async fn send_to_client(
    data: web::Data<AppState>,
    body: web::Json<PeerSendRequest>,
) -> HttpResponse {
    let body = body.into_inner();
    debug!(client_id = %body.client_id, message_id = %body.message_id, "peer delivery accepted");
    data.manager.enqueue_message(OutboundMessage {
        message_id: body.message_id,
        client_id: body.client_id,
        send_user_id: body.send_user_id,
        code: body.code,
        msg: body.msg,
        data: body.data,
    });
    render(json!({}))
}

#[post("/close_client")]
pub async fn close_client(
    data: web::Data<AppState>,
    body: web::Json<PeerCloseRequest>,
) -> HttpResponse {
    if let Some(conn) = data.manager.get_by_client_id(&body.client_id)
        && conn.system_id() == body.system_id
    {
        data.manager.disconnect(conn).await;
    }
    render(json!({}))
}

#[post("/bind_to_group")]
pub async fn bind_to_group(
    data: web::Data<AppState>,
    body: web::Json<PeerBindRequest>,
) -> HttpResponse {
    let Some(conn) = data.manager.get_by_client_id(&body.client_id) else {
        return render_error(&PomboError::ClientNotFound(body.client_id.clone()));
    };
    data.manager.add_to_local_group(
        &body.system_id,
        &body.group_name,
        &conn,
        &body.user_id,
        &body.extend,
    );
    render(json!({}))
}

#[post("/send_to_group")]
pub async fn send_to_group(
    data: web::Data<AppState>,
    body: web::Json<PeerGroupMessageRequest>,
) -> HttpResponse {
    data.manager.send_to_local_group(
        &body.system_id,
        &body.group_name,
        &body.message_id,
        &body.send_user_id,
        body.code,
        &body.msg,
        body.data.as_deref(),
    );
    render(json!({}))
}

#[post("/send_to_system")]
pub async fn send_to_system(
    data: web::Data<AppState>,
    body: web::Json<PeerSystemMessageRequest>,
) -> HttpResponse {
    data.manager.send_to_local_system(
        &body.system_id,
        &body.message_id,
        &body.send_user_id,
        body.code,
        &body.msg,
        body.data.as_deref(),
    );
    render(json!({}))
}

#[post("/online_list")]
pub async fn online_list(
    data: web::Data<AppState>,
    body: web::Json<PeerOnlineListRequest>,
) -> HttpResponse {
    let list = data
        .manager
        .local_group_clients(&body.system_id, &body.group_name);
    render(PeerOnlineListResponse { list })
}
