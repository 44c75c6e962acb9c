//! Access middleware for the admin API.
//!
//! Every admin route except registration must name the system it acts for
//! through the `SystemId` header. Requests without one are answered with
//! the access-denied envelope before reaching a handler.

use actix_service::forward_ready;
use actix_utils::future::{Ready, ok};
use actix_web::{
    Error, HttpResponse,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http::Method,
};
use futures::future::LocalBoxFuture;

use pombo_api::failure;
use pombo_common::error::ACCESS_DENIED;

use crate::model::SYSTEM_ID_HEADER;

pub struct SystemAccess;

impl<S, B> Transform<S, ServiceRequest> for SystemAccess
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = SystemAccessMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(SystemAccessMiddleware { service })
    }
}

pub struct SystemAccessMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for SystemAccessMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let mut authenticate_pass = Method::OPTIONS == *req.method();

        if !authenticate_pass
            && let Some(header) = req.headers().get(SYSTEM_ID_HEADER)
            && let Ok(value) = header.to_str()
            && !value.trim().is_empty()
        {
            authenticate_pass = true;
        }

        if authenticate_pass {
            let fut = self.service.call(req);
            Box::pin(async move {
                let res = fut.await?;
                Ok(res.map_into_left_body())
            })
        } else {
            Box::pin(async move {
                let (request, _) = req.into_parts();
                let response = HttpResponse::Ok()
                    .json(failure(
                        ACCESS_DENIED.code,
                        format!("{} header is required", SYSTEM_ID_HEADER),
                        serde_json::Value::Null,
                    ))
                    .map_into_right_body();
                Ok(ServiceResponse::new(request, response))
            })
        }
    }
}
