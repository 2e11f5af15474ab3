use std::env;

use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

const ENV_LOG: &str = "RUST_LOG";
const ENV_SERVICE_NAME: &str = "OTEL_SERVICE_NAME";

const DEFAULT_LEVEL: &str = "INFO";

/// Installs the global subscriber: an env filter and a fmt layer, plus OTLP
/// export when built with the `trace` or `metrics` feature.
///
/// Every event loop calls this on start; only the first call takes effect.
pub fn init_once(service_name: &str) {
    set_default_var(ENV_LOG, DEFAULT_LEVEL);
    set_default_var(ENV_SERVICE_NAME, service_name);

    let subscriber = Registry::default()
        .with(EnvFilter::from_default_env())
        .with(::tracing_subscriber::fmt::layer());

    #[cfg(feature = "metrics")]
    let subscriber = subscriber.with(self::otlp::metrics_layer());
    #[cfg(feature = "trace")]
    let subscriber = subscriber.with(self::otlp::trace_layer());

    if subscriber.try_init().is_ok() {
        debug!("initialized tracing: {service_name}");
    }
}

fn set_default_var(key: &str, value: &str) {
    if env::var_os(key).is_none() {
        env::set_var(key, value);
    }
}

#[cfg(feature = "otlp")]
mod otlp {
    use opentelemetry_otlp::{new_exporter, new_pipeline, TonicExporterBuilder};
    use opentelemetry_sdk::runtime::Tokio;
    use tracing::Subscriber;
    use tracing_subscriber::{registry::LookupSpan, Layer};

    /// Endpoint and headers come from the standard `OTEL_EXPORTER_OTLP_*`
    /// variables.
    fn exporter() -> TonicExporterBuilder {
        new_exporter().tonic()
    }

    #[cfg(feature = "metrics")]
    pub(super) fn metrics_layer<S>() -> impl Layer<S>
    where
        S: Subscriber + for<'span> LookupSpan<'span>,
    {
        new_pipeline()
            .metrics(Tokio)
            .with_exporter(exporter())
            .build()
            .map(::tracing_opentelemetry::MetricsLayer::new)
            .expect("failed to init an OTLP metrics pipeline")
    }

    #[cfg(feature = "trace")]
    pub(super) fn trace_layer<S>() -> impl Layer<S>
    where
        S: Subscriber + for<'span> LookupSpan<'span>,
    {
        new_pipeline()
            .tracing()
            .with_exporter(exporter())
            .install_batch(Tokio)
            .map(::tracing_opentelemetry::OpenTelemetryLayer::new)
            .expect("failed to init an OTLP trace pipeline")
    }
}
