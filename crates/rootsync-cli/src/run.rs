//! Drivers for the two tools: read the input, run the pipeline, write the
//! outputs and log a summary.

use crate::{
    config::{CoordsConfig, RunConfig, ValidateConfig},
    output::{self, ReportMeta},
    telemetry,
};
use anyhow::{Context, bail};
use rootsync::{AnnotationService, ParseReport, Pipeline, RecordParser, Run, StatusCounts};
use rootsync_cave::CaveClient;
use std::{
    fs::{self, File},
    io::BufReader,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

/// What `validate-ids` produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidateSummary {
    pub counts: StatusCounts,
    pub skipped_lines: usize,
    pub report: PathBuf,
    pub clean: PathBuf,
}

/// What `fetch-coords` produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordsSummary {
    pub counts: StatusCounts,
    pub skipped_lines: usize,
    pub output: PathBuf,
}

/// Runs `validate-ids` against the configured CAVE datastack.
pub async fn validate(config: ValidateConfig) -> anyhow::Result<ValidateSummary> {
    let start = Instant::now();
    let input = read_input(&config.run.input, RecordParser::identity())?;
    let client = connect(&config.run).await?;
    validate_with(Arc::new(client), &config, input, start).await
}

/// Runs `fetch-coords` against the configured CAVE datastack.
pub async fn fetch_coords(config: CoordsConfig) -> anyhow::Result<CoordsSummary> {
    let start = Instant::now();
    let input = read_input(&config.run.input, RecordParser::coordinates())?;
    let client = connect(&config.run).await?;
    fetch_coords_with(Arc::new(client), &config, input, start).await
}

/// The identity run on an arbitrary service. Writes the report and the clean
/// list.
pub async fn validate_with<S>(
    service: Arc<S>,
    config: &ValidateConfig,
    input: ParseReport,
    start: Instant,
) -> anyhow::Result<ValidateSummary>
where
    S: AnnotationService + ?Sized + 'static,
{
    let pipeline = Pipeline::new(service, config.run.workers, config.run.batch_size)?;

    #[cfg(feature = "tracing")]
    tracing::info!(
        "Validating {} IDs ({} workers, batches of {})",
        input.records.len(),
        pipeline.workers(),
        pipeline.max_batch_size()
    );

    let run = pipeline.validate(input).await;
    pipeline.shutdown().await?;

    let meta = ReportMeta {
        datastack: &config.run.datastack,
        workers: config.run.workers,
        elapsed_secs: start.elapsed().as_secs_f64(),
    };
    write_output(&config.report, &output::render_report(&run, &meta))?;
    write_output(&config.clean, &output::render_clean_list(&run))?;

    record_run(&run, "validate-ids");

    #[cfg(feature = "tracing")]
    {
        let counts = &run.counts;
        let total = counts.total().max(1) as f64;
        tracing::info!(
            "Validation complete in {:.1}s: {} IDs, {} updated ({:.1}%), {} current ({:.1}%), {} errors",
            start.elapsed().as_secs_f64(),
            counts.total(),
            counts.updated,
            counts.updated as f64 / total * 100.0,
            counts.current,
            counts.current as f64 / total * 100.0,
            counts.errors()
        );
        tracing::info!("Report: {}", config.report.display());
        tracing::info!("Clean IDs: {}", config.clean.display());
    }

    Ok(ValidateSummary {
        counts: run.counts,
        skipped_lines: run.warnings.len(),
        report: config.report.clone(),
        clean: config.clean.clone(),
    })
}

/// The coordinate run on an arbitrary service. Writes the coordinate table.
pub async fn fetch_coords_with<S>(
    service: Arc<S>,
    config: &CoordsConfig,
    input: ParseReport,
    _start: Instant,
) -> anyhow::Result<CoordsSummary>
where
    S: AnnotationService + ?Sized + 'static,
{
    let pipeline = Pipeline::new(service, config.run.workers, config.run.batch_size)?;

    #[cfg(feature = "tracing")]
    tracing::info!(
        "Fetching coordinates for {} IDs ({} workers, batches of {})",
        input.records.len(),
        pipeline.workers(),
        pipeline.max_batch_size()
    );

    let result = pipeline.coordinates(input).await;
    pipeline.shutdown().await?;
    let run = result?;

    write_output(&config.output, &output::render_coordinates(&run))?;

    record_run(&run, "fetch-coords");

    #[cfg(feature = "tracing")]
    {
        tracing::info!(
            "Coordinates complete in {:.1}s: {} IDs, {} with coordinates, {} failed",
            _start.elapsed().as_secs_f64(),
            run.counts.total(),
            run.counts.resolved(),
            run.counts.errors()
        );
        tracing::info!("Output: {}", config.output.display());
    }
    Ok(CoordsSummary {
        counts: run.counts,
        skipped_lines: run.warnings.len(),
        output: config.output.clone(),
    })
}

/// Parses the input file.
///
/// # Errors
///
/// Fails if the file cannot be read or contains no valid ID.
pub fn read_input(path: &Path, parser: RecordParser) -> anyhow::Result<ParseReport> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let report = parser
        .parse_reader(BufReader::new(file))
        .with_context(|| format!("failed to read {}", path.display()))?;

    #[cfg(feature = "tracing")]
    {
        tracing::info!(
            "Found {} IDs in {}",
            report.records.len(),
            path.display()
        );
        for warning in &report.warnings {
            tracing::warn!("Skipping {}", output::describe_warning(warning));
        }
    }

    if report.is_empty() {
        bail!("No IDs found in {}", path.display());
    }
    Ok(report)
}

async fn connect(config: &RunConfig) -> anyhow::Result<CaveClient> {
    let cave = config.cave_config()?;
    CaveClient::connect(cave)
        .await
        .with_context(|| format!("failed to connect to datastack {:?}", config.datastack))
}

fn write_output(path: &Path, contents: &str) -> anyhow::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

fn record_run<V>(run: &Run<V>, tool: &'static str) {
    telemetry::record_lookups(&run.counts, tool);
    telemetry::record_batches(&run.groups, tool);
}
