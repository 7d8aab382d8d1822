#![forbid(unsafe_code)]
#![doc = r#"
Response2Chat

Accept OpenAI Responses API requests and proxy them to an upstream speaking the Chat Completions API, reconciling both the payload shape and the transport of the result with what the client asked for.

Crate highlights
- Library: pure conversion via `convert`/`try_convert` (Chat Completions result -> Responses result) and the transport decision matrix in `reconcile`.
- HTTP server (in `server`): `/v1/responses` (reconciling proxy; upstream at `UPSTREAM_BASE_URL`) and `/status`.
- Collaborator seams: `UpstreamInvoker` and `StreamAggregator` traits with reqwest/SSE production implementations.

Modules
- `models`: Data structures for Chat Completions and Responses result documents.
- `conversion`: Mapping logic from Chat Completions -> Responses, with an injected clock.
- `reconcile`: Transport classification and the four-way reconciliation matrix.
- `upstream`: Upstream invocation seam and the request payload rewrite.
- `aggregate`: Event-stream aggregation seam (SSE chunks -> one document).
- `server`: Axum router/handlers (the binary uses this).
- `util`: Shared helpers (tracing, env, HTTP client, CORS).

Note: Keep the mapping rules aligned with OpenAI docs; the Responses API evolves over time.
"#]

pub mod aggregate;
pub mod conversion;
pub mod models;
pub mod reconcile;
pub mod server;
pub mod upstream;
pub mod util;

// Re-export the primary conversion surface for ergonomic library use.
pub use crate::conversion::{convert, try_convert, Clock, SystemClock};

pub use crate::reconcile::{classify_transport, ReconcileError, Reconciler, Transport};

// Re-export model namespaces for convenience (downstream users can do `use response2chat::chat`).
pub use crate::models::{chat, responses};
