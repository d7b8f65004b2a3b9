use scpi_sim::app_config::AppConfig;
use scpi_sim::fixture_loader::load_fixtures_from;
use scpi_sim::resource_manager::ResourceManager;
use scpi_sim::server::serve;
use scpi_sim::store_listener::store_listener;
use tokio::task;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    info!("🪵 Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load()?;
    info!("✅  Loaded configuration");

    let fixtures = load_fixtures_from(
        config.core().fixture_directory(),
        config.core().fixture_extension(),
        config.simulation().out_of_range(),
    )
    .await?;
    info!("✅  Loaded {} fixture(s)", fixtures.len());

    let manager = ResourceManager::spawn(&fixtures, config.simulation().store_options(), config.core().request_buffer_size());
    info!("✅  Initialized store");

    let notifier_rx = manager.notifier();
    task::spawn(async move {
        store_listener(notifier_rx).await;
    });
    info!("✅  Initialized store listener");

    for resource in manager.list_resources().await? {
        info!("📟 {}", resource);
    }

    if config.server().enabled() {
        serve(&manager, &config.server().options()).await?;
    }

    info!("🔥 {} is up and running", env!("CARGO_PKG_NAME"));
    tokio::signal::ctrl_c().await?;
    info!("👋 Shutting down");

    Ok(())
}
