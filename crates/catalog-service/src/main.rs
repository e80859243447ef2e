// crates/catalog-service/src/main.rs
// ============================================================================
// Binary: catalog-service
// Description: Process entry point; loads config and hands off to the
// library's `run` (spec §4.11, §6).
// Dependencies: catalog-service (this crate's lib), catalog-config, tokio,
// tracing-subscriber
// ============================================================================

use catalog_config::AppConfig;

/// Path to the TOML config file, overridable with `CATALOG_CONFIG`.
fn config_path() -> std::path::PathBuf {
    std::env::var("CATALOG_CONFIG").map(std::path::PathBuf::from).unwrap_or_else(|_| std::path::PathBuf::from("catalog.toml"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let config = AppConfig::load(&config_path()).unwrap_or_else(|error| {
        tracing::warn!(%error, "falling back to default config");
        let mut config = AppConfig::default();
        config.apply_env_overlay();
        config
    });

    catalog_service::run(&config).await
}
