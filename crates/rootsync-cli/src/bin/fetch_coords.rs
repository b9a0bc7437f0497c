use clap::Parser;
use rootsync_cli::{
    config::{CoordsArgs, CoordsConfig},
    run,
    telemetry::init_telemetry,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();
    let args = CoordsArgs::parse();
    let config = CoordsConfig::try_from(args)?;

    let providers = init_telemetry()?;

    #[cfg(feature = "tracing")]
    if cfg!(debug_assertions) {
        tracing::debug!("Starting fetch-coords with config: {:#?}", config);
    }

    let result = run::fetch_coords(config).await;
    providers.shutdown();
    result.map(|_| ())
}
