use std::time::Duration;

use tower::layer::util::{Identity, Stack};
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::HttpMakeClassifier;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;

pub fn init(format: LogFormat) {
    let registry = tracing_subscriber::registry().with(EnvFilter::from_default_env());
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).init(),
    }
}

type Layers = Stack<
    TimeoutLayer,
    Stack<RequestBodyLimitLayer, Stack<CorsLayer, Stack<TraceLayer<HttpMakeClassifier>, Identity>>>,
>;

pub fn stack() -> ServiceBuilder<Layers> {
    let trace = TraceLayer::new_for_http();
    let cors = CorsLayer::permissive();
    let limit = RequestBodyLimitLayer::new(2 * 1024 * 1024);
    // settle-delayed roster reads stay well inside this
    let timeout = TimeoutLayer::new(Duration::from_secs(30));

    ServiceBuilder::new()
        .layer(trace)
        .layer(cors)
        .layer(limit)
        .layer(timeout)
}
