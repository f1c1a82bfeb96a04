//! Access log middleware
//!
//! One line per HTTP exchange, keyed by the `RequestId` extension so it
//! joins up with the `request` span the handlers open. Must be wrapped
//! inside [`RequestIdMiddleware`](super::RequestIdMiddleware).

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::StatusCode,
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::time::Instant;
use tracing::Level;

use super::RequestId;

/// Severity of an access line: server errors are errors, client errors
/// warnings, everything else info.
pub fn access_level(status: StatusCode) -> Level {
    if status.is_server_error() {
        Level::ERROR
    } else if status.is_client_error() {
        Level::WARN
    } else {
        Level::INFO
    }
}

macro_rules! access_event {
    ($level:expr, $($field:tt)*) => {{
        let level = $level;
        if level == Level::ERROR {
            tracing::error!($($field)*)
        } else if level == Level::WARN {
            tracing::warn!($($field)*)
        } else {
            tracing::info!($($field)*)
        }
    }};
}

#[derive(Clone, Default)]
pub struct AccessLog;

impl<S, B> Transform<S, ServiceRequest> for AccessLog
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AccessLogService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AccessLogService { service }))
    }
}

pub struct AccessLogService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for AccessLogService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let started_at = Instant::now();
        let rec_id = req
            .extensions()
            .get::<RequestId>()
            .map(|id| id.0.clone())
            .unwrap_or_default();
        let method = req.method().clone();
        // Route template keeps high-cardinality ids out of the path field.
        let route = req
            .match_pattern()
            .unwrap_or_else(|| req.path().to_string());

        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;
            let elapsed_ms = started_at.elapsed().as_millis() as u64;

            match &result {
                Ok(res) => {
                    let status = res.status();
                    access_event!(
                        access_level(status),
                        rec_id = %rec_id,
                        method = %method,
                        route = %route,
                        status = status.as_u16(),
                        elapsed_ms,
                        "HTTP request completed"
                    );
                }
                Err(err) => {
                    tracing::error!(
                        rec_id = %rec_id,
                        method = %method,
                        route = %route,
                        error = %err,
                        elapsed_ms,
                        "HTTP request failed"
                    );
                }
            }

            result
        })
    }
}
