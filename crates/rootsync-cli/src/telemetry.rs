//! # Telemetry Features
//!
//! Console logging is always on. OpenTelemetry export is opt-in.
//!
//! ## Feature matrix
//!
//! - `tracing` (default): progress and failure logging from every crate.
//! - `otel`: exports spans (one per stage, one per connection) via
//!   OpenTelemetry.
//! - `metrics`: exports run counters and the batch duration histogram.
//! - `otlp`: OTLP/HTTP exporter. The endpoint comes from the standard
//!   `OTEL_EXPORTER_OTLP_ENDPOINT` variables.
//! - `stdout`: stdout exporter, for local debugging.
//!
//! ## Feature constraints
//!
//! - Exporters require at least one of `otel` or `metrics`.
//! - `otlp` and `stdout` can be enabled at the same time.
//!
//! ## Example usage
//!
//! ```bash
//! cargo run --bin validate-ids --features otel,metrics,otlp -- -i ids.txt
//! ```
//!
//! Log verbosity follows `RUST_LOG` and defaults to `info`.

#[cfg(all(
    any(feature = "otlp", feature = "stdout"),
    not(any(feature = "otel", feature = "metrics"))
))]
compile_error!("exporter features (`otlp`, `stdout`) need `otel` or `metrics` as well");

use rootsync::{GroupReport, StatusCounts};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(any(feature = "metrics", feature = "otel"))]
use {
    opentelemetry::{InstrumentationScope, KeyValue},
    opentelemetry_sdk::{Resource, error::OTelSdkResult},
    opentelemetry_semantic_conventions as semconv,
};

#[cfg(feature = "metrics")]
use {
    opentelemetry::metrics::{Counter, Histogram, Meter},
    opentelemetry_sdk::metrics::SdkMeterProvider,
    std::sync::OnceLock,
};

#[cfg(feature = "otel")]
use {
    opentelemetry::trace::TracerProvider as _,
    opentelemetry_sdk::trace::{BatchConfigBuilder, BatchSpanProcessor, SdkTracerProvider},
};

const SERVICE_NAME: &str = "rootsync";

/// Exporter handles that must be flushed before the process exits.
pub struct TelemetryProviders {
    #[cfg(feature = "otel")]
    tracer_provider: SdkTracerProvider,
    #[cfg(feature = "metrics")]
    meter_provider: SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes and stops the exporters. Call once, right before exiting.
    pub fn shutdown(self) {
        #[cfg(feature = "otel")]
        {
            report("flush traces", self.tracer_provider.force_flush());
            report("shut down tracer", self.tracer_provider.shutdown());
        }
        #[cfg(feature = "metrics")]
        {
            report("flush metrics", self.meter_provider.force_flush());
            report("shut down meter", self.meter_provider.shutdown());
        }
    }
}

// The subscriber may already be gone at this point, so failures go to stderr.
#[cfg(any(feature = "metrics", feature = "otel"))]
fn report(action: &str, result: OTelSdkResult) {
    if let Err(err) = result {
        eprintln!("telemetry: failed to {action}: {err}");
    }
}

/// Installs the global subscriber: console logs on stderr plus whichever
/// OpenTelemetry pipelines are compiled in.
///
/// # Errors
///
/// Fails if an exporter cannot be built or a global subscriber is already set.
pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "otel")]
    let tracer_provider = init_tracer()?;

    #[cfg(feature = "metrics")]
    let meter_provider = init_metrics()?;

    #[cfg(any(feature = "metrics", feature = "otel"))]
    let scope = InstrumentationScope::builder(SERVICE_NAME)
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semconv::SCHEMA_URL)
        .build();

    // stderr keeps stdout free for piping.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_writer(std::io::stderr),
        );

    #[cfg(feature = "otel")]
    let registry = {
        opentelemetry::global::set_tracer_provider(tracer_provider.clone());
        registry.with(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer_with_scope(scope.clone()))
                .with_error_records_to_exceptions(true),
        )
    };

    #[cfg(feature = "metrics")]
    let registry = {
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        let meter = opentelemetry::global::meter_with_scope(scope);
        init_metric_handles(meter);

        registry.with(tracing_opentelemetry::MetricsLayer::new(meter_provider.clone()))
    };

    registry.try_init()?;

    Ok(TelemetryProviders {
        #[cfg(feature = "otel")]
        tracer_provider,
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

#[cfg(any(feature = "metrics", feature = "otel"))]
fn resource() -> Resource {
    let version = KeyValue::new(semconv::resource::SERVICE_VERSION, env!("CARGO_PKG_VERSION"));
    Resource::builder()
        .with_service_name(SERVICE_NAME)
        .with_schema_url([version], semconv::SCHEMA_URL)
        .build()
}

#[cfg(feature = "otlp")]
const EXPORT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

#[cfg(feature = "metrics")]
fn init_metrics() -> anyhow::Result<SdkMeterProvider> {
    let builder = SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = builder.with_reader(
        opentelemetry_sdk::metrics::PeriodicReader::builder(opentelemetry_stdout::MetricExporter::default())
            .with_interval(std::time::Duration::from_secs(5))
            .build(),
    );

    #[cfg(feature = "otlp")]
    let builder = {
        use anyhow::Context;
        use opentelemetry_otlp::WithExportConfig;

        builder.with_periodic_exporter(
            opentelemetry_otlp::MetricExporter::builder()
                .with_http()
                .with_timeout(EXPORT_TIMEOUT)
                .build()
                .context("building OTLP metric exporter")?,
        )
    };

    Ok(builder.build())
}

#[cfg(feature = "otel")]
fn init_tracer() -> anyhow::Result<SdkTracerProvider> {
    let builder = SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = builder.with_simple_exporter(opentelemetry_stdout::SpanExporter::default());

    #[cfg(feature = "otlp")]
    let builder = {
        use anyhow::Context;
        use opentelemetry_otlp::WithExportConfig;

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_timeout(EXPORT_TIMEOUT)
            .build()
            .context("building OTLP span exporter")?;
        let config = BatchConfigBuilder::default()
            .with_scheduled_delay(std::time::Duration::from_secs(5))
            .with_max_queue_size(512)
            .build();

        builder.with_span_processor(
            BatchSpanProcessor::builder(exporter)
                .with_batch_config(config)
                .build(),
        )
    };

    Ok(builder.build())
}

#[cfg(feature = "metrics")]
static LOOKUPS_COMPLETED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static LOOKUP_ERRORS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static BATCHES_COMPLETED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static BATCHES_FAILED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static BATCH_DURATION_MS: OnceLock<Histogram<f64>> = OnceLock::new();

#[cfg(feature = "metrics")]
fn init_metric_handles(meter: Meter) {
    let _ = LOOKUPS_COMPLETED.set(
        meter
            .u64_counter("lookups_completed")
            .with_description("Single-ID lookups that finished, successfully or not")
            .build(),
    );

    let _ = LOOKUP_ERRORS.set(
        meter
            .u64_counter("lookup_errors")
            .with_description("Single-ID lookups that failed")
            .build(),
    );

    let _ = BATCHES_COMPLETED.set(
        meter
            .u64_counter("batches_completed")
            .with_description("Bulk calls that resolved their whole group")
            .build(),
    );

    let _ = BATCHES_FAILED.set(
        meter
            .u64_counter("batches_failed")
            .with_description("Bulk calls that failed or came back incomplete")
            .build(),
    );

    let _ = BATCH_DURATION_MS.set(
        meter
            .f64_histogram("batch_duration")
            .with_unit("ms")
            .with_description("Duration of one bulk call")
            .build(),
    );
}

/// Records the lookup stage of a finished run.
#[cfg(feature = "metrics")]
pub fn record_lookups(counts: &StatusCounts, tool: &'static str) {
    let attrs = [KeyValue::new("tool", tool)];
    if let Some(counter) = LOOKUPS_COMPLETED.get() {
        counter.add(counts.total() as u64, &attrs);
    }
    if let Some(counter) = LOOKUP_ERRORS.get() {
        counter.add(counts.lookup_failed as u64, &attrs);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_lookups(_counts: &StatusCounts, _tool: &'static str) {}

/// Records every bulk call of a finished run.
#[cfg(feature = "metrics")]
pub fn record_batches(groups: &[GroupReport], tool: &'static str) {
    let attrs = [KeyValue::new("tool", tool)];
    for group in groups {
        let counter = if group.failure.is_some() {
            BATCHES_FAILED.get()
        } else {
            BATCHES_COMPLETED.get()
        };
        if let Some(counter) = counter {
            counter.add(1, &attrs);
        }
        if let Some(histogram) = BATCH_DURATION_MS.get() {
            histogram.record(group.elapsed.as_secs_f64() * 1000.0, &attrs);
        }
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_batches(_groups: &[GroupReport], _tool: &'static str) {}
