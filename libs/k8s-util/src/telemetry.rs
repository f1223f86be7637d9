use crate::error::{Error, Result};

use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

const SERVICE_NAME: &str = "podgate-webhook";

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn tracer_provider(url: &str, sample_ratio: f64) -> Result<SdkTracerProvider> {
    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(url)
        .build()
        .map_err(|e| Error::TelemetryError(format!("failed to build span exporter: {e}")))?;

    Ok(SdkTracerProvider::builder()
        .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
            sample_ratio,
        ))))
        .with_resource(Resource::builder().with_service_name(SERVICE_NAME).build())
        .with_batch_exporter(exporter)
        .build())
}

/// Initialize the global tracing subscriber.
///
/// Spans are exported through OTLP only when `tracing_url` is set.
pub async fn init(
    log_filter: &str,
    log_format: LogFormat,
    tracing_url: Option<&str>,
    sample_ratio: f64,
) -> Result<()> {
    let env_filter = EnvFilter::try_new(log_filter)
        .map_err(|e| Error::TelemetryError(format!("invalid log filter '{log_filter}': {e}")))?;

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match log_format {
        LogFormat::Text => tracing_subscriber::fmt::layer().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
    };

    let otel_layer = match tracing_url {
        Some(url) => {
            let provider = tracer_provider(url, sample_ratio)?;
            let tracer = provider.tracer(SERVICE_NAME);
            opentelemetry::global::set_tracer_provider(provider);
            opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(otel_layer)
        .with(env_filter)
        .try_init()
        .map_err(|e| Error::TelemetryError(format!("failed to set global subscriber: {e}")))?;

    Ok(())
}
