//! Logging setup and per-request correlation
use axum::{
    extract::Request,
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

pub const TRACE_ID_HEADER: &str = "X-Trace-Id";
pub const TIMESTAMP_HEADER: &str = "X-Timestamp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Initializes the process-wide subscriber, filtered by `RUST_LOG` (default `info`).
/// Calling it again is a no-op.
pub fn init(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let _ = match format {
        LogFormat::Json => builder.json().with_target(false).try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
}

/// Correlation data for one inbound request.
/// It is passed explicitly down to the publisher, never stored in thread-locals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub trace_id: String,
    pub operation: String,
    pub path: String,
}

impl RequestContext {
    pub fn new(method: &str, path: &str, trace_id: Option<&str>) -> Self {
        let trace_id = match trace_id.map(str::trim) {
            Some(id) if !id.is_empty() => id.to_owned(),
            _ => generate_trace_id(),
        };
        RequestContext {
            trace_id,
            operation: format!("{}_{}", method, path.replace('/', "_").to_uppercase()),
            path: path.to_owned(),
        }
    }

    /// Context for work that did not arrive over HTTP (CLI runs, the topic monitor).
    pub fn detached(operation: &str) -> Self {
        RequestContext {
            trace_id: generate_trace_id(),
            operation: operation.to_owned(),
            path: String::new(),
        }
    }

    pub fn from_headers(method: &str, path: &str, headers: &HeaderMap) -> Self {
        let incoming = headers
            .get(TRACE_ID_HEADER)
            .and_then(|v| v.to_str().ok());
        Self::new(method, path, incoming)
    }
}

/// 32 lowercase hex chars
pub fn generate_trace_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Attaches a [RequestContext] to every request, runs the handler inside a span
/// carrying the trace id and echoes the id back in the `X-Trace-Id` header.
pub async fn trace_middleware(mut req: Request, next: Next) -> Response {
    let ctx = RequestContext::from_headers(req.method().as_str(), req.uri().path(), req.headers());
    let span = tracing::info_span!(
        "request",
        trace_id = %ctx.trace_id,
        operation = %ctx.operation,
    );
    let trace_id = ctx.trace_id.clone();
    req.extensions_mut().insert(ctx);

    let mut response = async move {
        tracing::info!(method = %req.method(), uri = %req.uri(), "request started");
        let response = next.run(req).await;
        let status = response.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "request completed with error");
        } else {
            tracing::info!(status = status.as_u16(), "request completed");
        }
        response
    }
    .instrument(span)
    .await;

    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static("x-trace-id"), value);
    }
    response
}
