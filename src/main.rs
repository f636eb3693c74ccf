use dishmatch::{create_router, init, AppState, Config, Result, ResultExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the application
    init()?;

    let config = Config::from_env()?;
    log::info!("Loading model {}", config.embedding.model_path.display());
    let bind_addr = config.bind_addr;

    // Loading the model and opening the stores block
    let state = tokio::task::spawn_blocking(move || AppState::new(config)).await??;

    let recognizer = state.recognizer.clone();
    let findings = tokio::task::spawn_blocking(move || recognizer.audit()).await??;
    for finding in &findings {
        log::warn!("Template store inconsistency: {:?}", finding);
    }

    let listing = state.recognizer.list_templates()?;
    log::info!(
        "Serving {} dishes ({} templates) from {}",
        listing.len(),
        listing.values().map(Vec::len).sum::<usize>(),
        state.config.template_dir.display()
    );

    // Build our application with routes
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("binding {}", bind_addr))?;
    log::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
    }
}
