use crate::constants::REQUEST_ID_HEADER;
use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, Request, Response},
    middleware::Next,
};
use std::panic;
use std::path::Path;
use tracing::{error, info, info_span, warn, Instrument};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::Layer;
use uuid::Uuid;

const DEFAULT_FILTER: &str = "vaidya=info";

/// Daily-rolling file log, plus stderr when `console` is set.
///
/// The returned guard flushes the background writer on drop; keep it alive
/// for the life of the process.
pub fn init_tracing(log_dir: &Path, json: bool, console: bool) -> WorkerGuard {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => DEFAULT_FILTER.into(),
    };

    if let Err(e) = std::fs::create_dir_all(log_dir) {
        eprintln!("Could not create log directory {}: {}", log_dir.display(), e);
    }
    let file_appender = tracing_appender::rolling::daily(log_dir, "vaidya.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .boxed()
    };

    let console_layer = console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .with(tracing_error::ErrorLayer::default())
        .init();

    guard
}

/// Sets up a global panic hook that logs panics using tracing.
pub fn setup_panic_hook() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let backtrace = std::backtrace::Backtrace::capture();

        let payload = panic_info.payload();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            *s
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.as_str()
        } else {
            "Unknown panic payload"
        };

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown location".to_string());

        error!(
            target: "panic",
            message = %message,
            location = %location,
            backtrace = %backtrace,
            "FATAL: Application panicked"
        );

        original_hook(panic_info);
    }));
}

/// Tags every request with a fresh id, both as a header visible to handlers
/// and as the `request` span everything downstream logs under.
pub async fn request_id_middleware(mut req: Request<Body>, next: Next) -> Response<Body> {
    let request_id = Uuid::new_v4().to_string();
    if let Ok(val) = request_id.parse() {
        req.headers_mut().insert(REQUEST_ID_HEADER, val);
    }

    let span = info_span!("request", request_id = %request_id, method = %req.method(), path = %req.uri().path());
    let mut response = next.run(req).instrument(span).await;
    if let Ok(val) = request_id.parse() {
        response.headers_mut().insert(REQUEST_ID_HEADER, val);
    }
    response
}

/// Counters for one relayed stream. The summary is logged when the stream is
/// dropped, which covers completion, upstream failure and the caller going away.
pub struct StreamMetric {
    request_id: String,
    chunks: usize,
    bytes: usize,
    error: Option<String>,
}

impl StreamMetric {
    pub fn new(request_id: String) -> Self {
        Self {
            request_id,
            chunks: 0,
            bytes: 0,
            error: None,
        }
    }

    pub fn record(&mut self, chunk: &std::result::Result<Bytes, reqwest::Error>) {
        match chunk {
            Ok(bytes) => {
                self.chunks += 1;
                self.bytes += bytes.len();
            }
            Err(e) => {
                warn!("[STREAM] Upstream body error after {} bytes: {}", self.bytes, e);
                self.error = Some(e.to_string());
            }
        }
    }

    pub fn chunks(&self) -> usize {
        self.chunks
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for StreamMetric {
    fn drop(&mut self) {
        match &self.error {
            None => info!(
                "[STREAM END] RequestID: {} | Chunks: {} | Bytes: {}",
                self.request_id, self.chunks, self.bytes
            ),
            Some(e) => warn!(
                "[STREAM ABORTED] RequestID: {} | Chunks: {} | Bytes: {} | Error: {}",
                self.request_id, self.chunks, self.bytes, e
            ),
        }
    }
}

/// Id stamped on the request by [`request_id_middleware`].
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn stream_metric_counts_chunks_and_bytes() {
        let mut metric = StreamMetric::new("req-1".to_string());
        metric.record(&Ok(Bytes::from_static(b"data: a\n")));
        metric.record(&Ok(Bytes::from_static(b"data: [DONE]\n")));
        assert_eq!(metric.chunks(), 2);
        assert_eq!(metric.bytes(), 21);
    }

    #[test]
    fn request_id_reads_the_stamped_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_id(&headers), "unknown");
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("abc-123"));
        assert_eq!(request_id(&headers), "abc-123");
    }
}
