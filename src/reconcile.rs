use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, StatusCode};
use once_cell::sync::Lazy;
use serde_json::Value;
use thiserror::Error;

use crate::aggregate::StreamAggregator;
use crate::conversion::{self, SystemClock};
use crate::upstream::{RequestContext, UpstreamBody, UpstreamError, UpstreamInvoker, UpstreamResponse};

/// Transport a response actually uses on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Streaming,
    Buffered,
}

/// Providers that emit an event-stream even when the request did not ask for
/// one, typically without declaring a content-type. Extendable via the
/// STREAM_FORCING_PROVIDERS env var (comma-separated, case-insensitive).
static STREAM_FORCING_PROVIDERS: Lazy<Vec<String>> = Lazy::new(|| {
    let mut providers: Vec<String> = ["qwen", "iflow"].iter().map(|s| s.to_string()).collect();
    if let Ok(extra) = std::env::var("STREAM_FORCING_PROVIDERS") {
        for part in extra.split(',') {
            let p = part.trim().to_ascii_lowercase();
            if !p.is_empty() && !providers.contains(&p) {
                providers.push(p);
            }
        }
    }
    providers
});

pub fn provider_forces_streaming(provider: &str) -> bool {
    STREAM_FORCING_PROVIDERS
        .iter()
        .any(|p| p.eq_ignore_ascii_case(provider))
}

/// Classify a response's transport from its content-type and the provider it
/// came from.
///
/// Streaming iff the content-type declares an event-stream, or the
/// content-type is empty and the provider is on the stream-forcing list.
/// Purely a function of its two inputs; no header-set or body inspection.
pub fn classify_transport(content_type: &str, provider: &str) -> Transport {
    let ct = content_type.trim();
    if ct.to_ascii_lowercase().contains("text/event-stream") {
        Transport::Streaming
    } else if ct.is_empty() && provider_forces_streaming(provider) {
        Transport::Streaming
    } else {
        Transport::Buffered
    }
}

/// True only for a literal boolean `true` in the request's `stream` field.
/// Any other value, including a missing field, means buffered.
pub fn wants_stream(request: &Value) -> bool {
    request.get("stream") == Some(&Value::Bool(true))
}

/// Force an explicit `stream` flag on the outbound payload: absent becomes
/// `false`; any present value is forwarded literally.
pub fn normalize_stream_flag(request: &mut Value) {
    if let Some(obj) = request.as_object_mut() {
        obj.entry("stream").or_insert(Value::Bool(false));
    }
}

/// Final reconciled response: a status, headers and a body to hand back to
/// the client, whatever branch produced it.
#[derive(Debug)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: UpstreamBody,
}

impl ProxyResponse {
    /// Wrap a complete JSON document: status 200, JSON content-type,
    /// no-cache, permissive CORS.
    pub fn json_document(document: &Value) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
        Self {
            status: StatusCode::OK,
            headers,
            body: UpstreamBody::Buffered(Bytes::from(document.to_string())),
        }
    }

    /// Pass the upstream response through untouched.
    pub fn passthrough(upstream: UpstreamResponse) -> Self {
        Self {
            status: upstream.status,
            headers: upstream.headers,
            body: upstream.body,
        }
    }
}

/// Failure the reconciler can report.
///
/// `Upstream` tunnels the invoker's failure verbatim; `Aggregation` is the
/// single failure local to this component.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("{message}")]
    Upstream { status: StatusCode, message: String },
    #[error("failed to aggregate upstream event stream into a response document")]
    Aggregation,
}

impl ReconcileError {
    pub fn status(&self) -> StatusCode {
        match self {
            ReconcileError::Upstream { status, .. } => *status,
            ReconcileError::Aggregation => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<UpstreamError> for ReconcileError {
    fn from(e: UpstreamError) -> Self {
        ReconcileError::Upstream {
            status: e.status,
            message: e.message,
        }
    }
}

/// Reconciles the transport the client asked for against the transport the
/// upstream actually used, converting payload shape where needed.
pub struct Reconciler<I, A> {
    invoker: I,
    aggregator: A,
}

impl<I, A> Reconciler<I, A>
where
    I: UpstreamInvoker,
    A: StreamAggregator,
{
    pub fn new(invoker: I, aggregator: A) -> Self {
        Self { invoker, aggregator }
    }

    /// Handle one request end-to-end.
    ///
    /// Branches, in priority order:
    /// (a) client buffered, upstream streamed  -> aggregate into one JSON document
    /// (b) client streaming, upstream streamed -> passthrough
    /// (c) client buffered, upstream buffered  -> convert body when applicable
    /// (d) everything else                     -> passthrough
    pub async fn handle(
        &self,
        mut request: Value,
        ctx: &RequestContext,
    ) -> Result<ProxyResponse, ReconcileError> {
        let client_wants_stream = wants_stream(&request);
        normalize_stream_flag(&mut request);

        let upstream = self.invoker.invoke(&request, ctx).await?;
        let transport = classify_transport(upstream.content_type(), &ctx.provider);

        match (client_wants_stream, transport) {
            // (a) The upstream forced a stream the client never asked for:
            // buffer it fully and hand back one JSON document.
            (false, Transport::Streaming) => {
                match self.aggregator.aggregate(upstream.body).await {
                    Ok(document) => Ok(ProxyResponse::json_document(&document)),
                    Err(cause) => {
                        tracing::error!(error = %cause, provider = %ctx.provider,
                            "stream aggregation failed");
                        Err(ReconcileError::Aggregation)
                    }
                }
            }

            // (b) Both sides stream: frames pass through untouched. Frame
            // dialect is the invoker layer's concern.
            (true, Transport::Streaming) => Ok(ProxyResponse::passthrough(upstream)),

            // (c) Both sides buffered: best-effort shape conversion,
            // falling through to passthrough when the body is not a
            // convertible Chat Completions document.
            (false, Transport::Buffered) => Ok(Self::reconcile_buffered(upstream)),

            // (d) Client asked to stream but the upstream answered buffered:
            // forward exactly what came back.
            (true, Transport::Buffered) => Ok(ProxyResponse::passthrough(upstream)),
        }
    }

    fn reconcile_buffered(upstream: UpstreamResponse) -> ProxyResponse {
        let UpstreamResponse {
            status,
            headers,
            body,
        } = upstream;

        let bytes = match body {
            UpstreamBody::Buffered(bytes) => bytes,
            // A stream body under a buffered classification: nothing to
            // parse without consuming it, so pass it through.
            other => {
                return ProxyResponse {
                    status,
                    headers,
                    body: other,
                }
            }
        };

        // Bytes duplication is cheap; the original stays intact for the
        // fall-through path.
        let converted = match serde_json::from_slice::<Value>(&bytes) {
            Ok(document) => conversion::try_convert(&document, &SystemClock),
            Err(_) => None,
        };

        match converted {
            Some(document) => {
                let mut headers = headers;
                headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
                ProxyResponse {
                    status,
                    headers,
                    body: UpstreamBody::Buffered(Bytes::from(document.to_string())),
                }
            }
            None => ProxyResponse {
                status,
                headers,
                body: UpstreamBody::Buffered(bytes),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_stream_content_type_is_streaming() {
        assert_eq!(
            classify_transport("text/event-stream", "openai"),
            Transport::Streaming
        );
        assert_eq!(
            classify_transport("text/event-stream; charset=utf-8", "openai"),
            Transport::Streaming
        );
        assert_eq!(
            classify_transport("TEXT/EVENT-STREAM", "openai"),
            Transport::Streaming
        );
    }

    #[test]
    fn json_content_type_is_buffered_even_for_forcing_providers() {
        assert_eq!(
            classify_transport("application/json", "qwen"),
            Transport::Buffered
        );
    }

    #[test]
    fn empty_content_type_streams_only_for_forcing_providers() {
        assert_eq!(classify_transport("", "qwen"), Transport::Streaming);
        assert_eq!(classify_transport("", "QWEN"), Transport::Streaming);
        assert_eq!(classify_transport("", "openai"), Transport::Buffered);
        assert_eq!(classify_transport("  ", "iflow"), Transport::Streaming);
    }

    #[test]
    fn wants_stream_requires_literal_true() {
        assert!(wants_stream(&json!({"stream": true})));
        assert!(!wants_stream(&json!({"stream": false})));
        assert!(!wants_stream(&json!({"stream": "true"})));
        assert!(!wants_stream(&json!({"stream": 1})));
        assert!(!wants_stream(&json!({})));
    }

    #[test]
    fn normalize_forces_false_but_keeps_literals() {
        let mut absent = json!({"model": "m"});
        normalize_stream_flag(&mut absent);
        assert_eq!(absent["stream"], json!(false));

        let mut odd = json!({"stream": "yes"});
        normalize_stream_flag(&mut odd);
        assert_eq!(odd["stream"], json!("yes"));
    }
}
