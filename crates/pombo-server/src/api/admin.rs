//! Admin API handlers.
//!
//! Responses always carry HTTP 200 with the `{code, message, data}`
//! envelope; failures surface as non-zero codes so callers switch on one
//! field regardless of failure class.

use actix_web::{HttpRequest, HttpResponse, post, web};
use serde_json::json;
use validator::Validate;

use pombo_api::admin::{
    BindToGroupRequest, CloseClientRequest, OnlineListRequest, RegisterRequest,
    SendToClientRequest, SendToClientsRequest, SendToGroupRequest, SendToSystemRequest,
};

use super::{render, render_error, render_validation, system_id};
use crate::model::AppState;

#[post("/register")]
pub async fn register(
    data: web::Data<AppState>,
    body: web::Json<RegisterRequest>,
) -> HttpResponse {
    if let Err(e) = body.validate() {
        return render_validation(&e);
    }

    match data.account.register(&body.system_id).await {
        Ok(()) => render(json!({})),
        Err(e) => render_error(&e),
    }
}

#[post("/send_to_client")]
pub async fn send_to_client(
    data: web::Data<AppState>,
    body: web::Json<SendToClientRequest>,
) -> HttpResponse {
    if let Err(e) = body.validate() {
        return render_validation(&e);
    }

    match data
        .router
        .send_to_client(
            &body.client_id,
            &body.send_user_id,
            body.code,
            &body.msg,
            body.data.as_deref(),
        )
        .await
    {
        Ok(message_id) => render(json!({ "messageId": message_id })),
        Err(e) => render_error(&e),
    }
}

#[post("/send_to_clients")]
pub async fn send_to_clients(
    data: web::Data<AppState>,
    body: web::Json<SendToClientsRequest>,
) -> HttpResponse {
    if let Err(e) = body.validate() {
        return render_validation(&e);
    }

    match data
        .router
        .send_to_clients(
            &body.client_ids,
            &body.send_user_id,
            body.code,
            &body.msg,
            body.data.as_deref(),
        )
        .await
    {
        Ok(message_id) => render(json!({ "messageId": message_id })),
        Err(e) => render_error(&e),
    }
}

#[post("/send_to_group")]
pub async fn send_to_group(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Json<SendToGroupRequest>,
) -> HttpResponse {
    if let Err(e) = body.validate() {
        return render_validation(&e);
    }

    match data
        .router
        .send_to_group(
            &system_id(&req),
            &body.group_name,
            &body.send_user_id,
            body.code,
            &body.msg,
            body.data.as_deref(),
        )
        .await
    {
        Ok(message_id) => render(json!({ "messageId": message_id })),
        Err(e) => render_error(&e),
    }
}

#[post("/send_to_system")]
pub async fn send_to_system(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Json<SendToSystemRequest>,
) -> HttpResponse {
    if let Err(e) = body.validate() {
        return render_validation(&e);
    }

    match data
        .router
        .send_to_system(
            &system_id(&req),
            &body.send_user_id,
            body.code,
            &body.msg,
            body.data.as_deref(),
        )
        .await
    {
        Ok(message_id) => render(json!({ "messageId": message_id })),
        Err(e) => render_error(&e),
    }
}

#[post("/bind_to_group")]
pub async fn bind_to_group(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Json<BindToGroupRequest>,
) -> HttpResponse {
    if let Err(e) = body.validate() {
        return render_validation(&e);
    }

    match data
        .router
        .bind_to_group(
            &system_id(&req),
            &body.group_name,
            &body.client_id,
            &body.user_id,
            &body.extend,
        )
        .await
    {
        Ok(()) => render(json!({})),
        Err(e) => render_error(&e),
    }
}

#[post("/get_online_list")]
pub async fn get_online_list(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Json<OnlineListRequest>,
) -> HttpResponse {
    if let Err(e) = body.validate() {
        return render_validation(&e);
    }

    let list = data
        .router
        .online_list(&system_id(&req), &body.group_name)
        .await;
    render(list)
}

#[post("/close_client")]
pub async fn close_client(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Json<CloseClientRequest>,
) -> HttpResponse {
    if let Err(e) = body.validate() {
        return render_validation(&e);
    }

    match data
        .router
        .close_client(&body.client_id, &system_id(&req))
        .await
    {
        Ok(()) => render(json!({})),
        Err(e) => render_error(&e),
    }
}
