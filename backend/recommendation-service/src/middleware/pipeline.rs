//! Request middleware chain around the orchestrator entry points.
//!
//! Each middleware gets a `before` hook (in registration order) and an
//! `after` hook (in reverse order) that may edit the response envelope:
//!
//! ```text
//!   RequestContext ──► before(1) ──► before(2) ──► handler
//!                                                     │
//!   ApiResponse    ◄── after(1)  ◄── after(2)  ◄──────┘
//! ```
//!
//! The handler result body is never touched, only `metadata` and
//! `debug_info`.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, trace, Instrument};
use uuid::Uuid;

use super::DebugTrace;
use crate::error::Result;
use crate::models::{ApiResponse, Envelope};

/// State of one inbound request, shared by the middleware hooks and the
/// handler.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub rec_id: String,
    pub endpoint: &'static str,
    pub debug: bool,
    pub trace: DebugTrace,
    pub started_at: Instant,
}

impl RequestContext {
    pub fn new(rec_id: Option<String>, endpoint: &'static str, debug: bool) -> Self {
        Self {
            rec_id: rec_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            endpoint,
            debug,
            trace: DebugTrace::disabled(),
            started_at: Instant::now(),
        }
    }
}

pub trait RequestMiddleware: Send + Sync {
    fn name(&self) -> &'static str;

    fn before(&self, _ctx: &mut RequestContext) {}

    fn after(&self, _ctx: &RequestContext, _envelope: &mut Envelope) {}
}

/// Ordered list of request middleware.
#[derive(Clone, Default)]
pub struct MiddlewareStack {
    middlewares: Vec<Arc<dyn RequestMiddleware>>,
}

impl MiddlewareStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request id stamping, debug capture and latency logging.
    pub fn standard() -> Self {
        let mut stack = Self::new();
        stack.add(Arc::new(RequestIdStamp));
        stack.add(Arc::new(DebugCapture));
        stack.add(Arc::new(LatencyLog));
        stack
    }

    pub fn add(&mut self, middleware: Arc<dyn RequestMiddleware>) {
        self.middlewares.push(middleware);
    }

    /// Run `handler` inside the chain. Errors skip the `after` hooks and are
    /// returned unchanged.
    pub async fn run<T, F, Fut>(&self, mut ctx: RequestContext, handler: F) -> Result<ApiResponse<T>>
    where
        F: FnOnce(RequestContext) -> Fut,
        Fut: Future<Output = Result<ApiResponse<T>>>,
    {
        let span = info_span!("request", rec_id = %ctx.rec_id, endpoint = ctx.endpoint);

        async move {
            for middleware in &self.middlewares {
                trace!(middleware = middleware.name(), "before");
                middleware.before(&mut ctx);
            }

            let mut response = match handler(ctx.clone()).await {
                Ok(response) => response,
                Err(err) => {
                    error!(
                        error = %err,
                        elapsed_ms = ctx.started_at.elapsed().as_millis() as u64,
                        "Request failed"
                    );
                    return Err(err);
                }
            };

            for middleware in self.middlewares.iter().rev() {
                trace!(middleware = middleware.name(), "after");
                middleware.after(&ctx, &mut response.envelope);
            }

            Ok(response)
        }
        .instrument(span)
        .await
    }
}

/// Writes the request id into `metadata.rec_id`.
pub struct RequestIdStamp;

impl RequestMiddleware for RequestIdStamp {
    fn name(&self) -> &'static str {
        "request_id"
    }

    fn after(&self, ctx: &RequestContext, envelope: &mut Envelope) {
        envelope.metadata.rec_id = Some(ctx.rec_id.clone());
    }
}

/// Collects debug lines for `debug=true` requests into `debug_info`.
pub struct DebugCapture;

impl RequestMiddleware for DebugCapture {
    fn name(&self) -> &'static str {
        "debug_capture"
    }

    fn before(&self, ctx: &mut RequestContext) {
        if ctx.debug {
            ctx.trace = DebugTrace::enabled();
        }
    }

    fn after(&self, ctx: &RequestContext, envelope: &mut Envelope) {
        if ctx.trace.is_enabled() {
            envelope.debug_info = Some(ctx.trace.lines());
        }
    }
}

pub struct LatencyLog;

impl RequestMiddleware for LatencyLog {
    fn name(&self) -> &'static str {
        "latency_log"
    }

    fn after(&self, ctx: &RequestContext, _envelope: &mut Envelope) {
        info!(
            elapsed_ms = ctx.started_at.elapsed().as_millis() as u64,
            "Request completed"
        );
    }
}
