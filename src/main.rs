use tracing_subscriber::{EnvFilter, fmt};
use tracing::info;

use authgate::config::GateConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let args: Vec<String> = std::env::args().collect();
    let cfg = GateConfig::load()?.apply_args(&args);

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "authgate",
        "authgate starting: RUST_LOG='{}', http_port={}, token_ttl_secs={}, token_byte_length={}, sweep_interval_secs={}",
        rust_log, cfg.http_port, cfg.token_ttl_secs, cfg.token_byte_length, cfg.sweep_interval_secs
    );

    authgate::server::run(cfg).await
}
