use std::error::Error;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::infrastructure::bootstrap;
use crate::infrastructure::config::AppConfig;
use crate::interfaces::http::start_server;

pub fn run() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    if let Err(err) = actix_web::rt::System::new().block_on(serve()) {
        tracing::error!(error = %err, "casegen stopped");
        std::process::exit(1);
    }
}

async fn serve() -> Result<(), Box<dyn Error>> {
    let config = AppConfig::load()?;
    let state = bootstrap::setup(&config).await?;

    tracing::info!(
        host = %config.http.host,
        port = config.http.port,
        data_dir = %config.data_dir.display(),
        "Starting HTTP server"
    );
    start_server(Arc::new(state), &config.http)?.await?;
    Ok(())
}
