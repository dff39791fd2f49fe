//! AWS Lambda entry point for the listing tracker
//!
//! Deploy with `cargo lambda build --release --features lambda`.
//! Requires `S3_BUCKET`; `S3_PREFIX` and `MAX_CONCURRENT` are optional.

use lambda_runtime::{Error as LambdaError, service_fn};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tracker::lambda::handler;

/// Main entry point for the AWS Lambda function.
#[tokio::main]
async fn main() -> Result<(), LambdaError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Tracker Lambda starting...");
    lambda_runtime::run(service_fn(handler)).await
}
