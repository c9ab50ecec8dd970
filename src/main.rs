use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use fichario::api::{api_router, ApiContext};
use fichario::config::{default_log_filter, Config, APP_NAME, APP_VERSION};
use fichario::db::sqlite::open_database;
use fichario::pipeline::extraction::DeepSeekClient;
use fichario::pipeline::ocr::GoogleVisionOcr;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_log_filter())),
        )
        .init();

    tracing::info!(version = APP_VERSION, "starting {APP_NAME}");

    if let Err(e) = run(Config::from_env()).await {
        tracing::error!(error = %e, "fatal error");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(dir) = config.db_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    // Run migrations once up front; requests open their own connections
    open_database(&config.db_path)?;
    tracing::info!(db = %config.db_path.display(), "database ready");

    let Some(vision_key) = config.vision_api_key.clone() else {
        return Err("GOOGLE_VISION_API_KEY is not set".into());
    };
    let Some(llm_key) = config.llm_api_key.clone() else {
        return Err("neither DEEPSEEK_API_KEY nor OPENAI_API_KEY is set".into());
    };

    // The blocking HTTP clients bring their own runtime thread, so they
    // are built off the async runtime
    let base_url = config.llm_base_url.clone();
    let model = config.llm_model.clone();
    let (ocr, llm) = tokio::task::spawn_blocking(move || {
        let ocr = GoogleVisionOcr::new(vision_key)?;
        let llm = DeepSeekClient::new(base_url, llm_key, model)
            .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> { Box::new(e) })?;
        Ok::<_, Box<dyn std::error::Error + Send + Sync>>((Arc::new(ocr), Arc::new(llm)))
    })
    .await?
    .map_err(|e| -> Box<dyn std::error::Error> { e })?;
    tracing::info!(model = %config.llm_model, "extraction backend configured");

    let ctx = ApiContext::new(config.db_path.clone(), ocr, llm);
    let app = api_router(ctx);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("shutdown signal received");
    }
}
