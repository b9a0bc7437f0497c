use clap::Parser;
use rootsync_cli::{
    config::{ValidateArgs, ValidateConfig},
    run,
    telemetry::init_telemetry,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();
    let args = ValidateArgs::parse();
    let config = ValidateConfig::try_from(args)?;

    let providers = init_telemetry()?;

    #[cfg(feature = "tracing")]
    if cfg!(debug_assertions) {
        tracing::debug!("Starting validate-ids with config: {:#?}", config);
    }

    let result = run::validate(config).await;
    providers.shutdown();
    result.map(|_| ())
}
