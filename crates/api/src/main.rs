use anyhow::Context;

use claimsync_api::app::{ApiSettings, build_app, services};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    claimsync_observability::init();

    let settings = ApiSettings::from_env()?;
    let app = build_app(services::build_services(&settings).await?);

    let listener = tokio::net::TcpListener::bind(settings.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
