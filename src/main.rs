use response2chat::server::build_router;
use response2chat::util::{env_bind_addr, init_tracing, upstream_base_url, upstream_provider};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    // Resolve upstream configuration up front so a missing base URL fails at
    // startup, not on the first request.
    let base_url = upstream_base_url();
    let provider = upstream_provider();
    tracing::info!("Upstream: {} (provider: {})", base_url, provider);

    let app = build_router();

    let addr = env_bind_addr();
    tracing::info!("Response2Chat listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
