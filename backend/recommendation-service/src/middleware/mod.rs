pub mod access_log;
pub mod debug_trace;
pub mod pipeline;
pub mod request_id;

pub use access_log::AccessLog;
pub use debug_trace::DebugTrace;
pub use pipeline::{
    DebugCapture, LatencyLog, MiddlewareStack, RequestContext, RequestIdStamp, RequestMiddleware,
};
pub use request_id::{request_id, RequestId, RequestIdMiddleware, REQUEST_ID_HEADER};
