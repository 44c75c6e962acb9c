//! HTTP server wiring: admin API + cluster RPC on one listener.

use std::sync::Arc;

use actix_web::{App, HttpServer, web};

use crate::api;
use crate::model::AppState;

pub fn http_server(
    app_state: Arc<AppState>,
    address: String,
    port: u16,
) -> std::io::Result<actix_web::dev::Server> {
    let data = web::Data::from(app_state);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .configure(api::configure)
    })
    .bind((address, port))?
    .run();

    Ok(server)
}
