use handoff_service::config::{DEFAULT_LOG_FILTER, LogFormat, LoggingConfig};
use handoff_service::{ServiceConfig, create_app};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing(logging: &LoggingConfig) {
    let (env_filter, bad_filter) = match EnvFilter::try_new(&logging.filter) {
        Ok(filter) => (filter, None),
        Err(e) => (EnvFilter::new(DEFAULT_LOG_FILTER), Some(e)),
    };
    let registry = tracing_subscriber::registry().with(env_filter);

    match logging.format {
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_level(true)
                    .with_current_span(true),
            )
            .init(),
    }

    if let Some(e) = bad_filter {
        warn!(filter = %logging.filter, error = %e, "invalid RUST_LOG, using default filter");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env is fine, the process environment still applies
    let _ = dotenvy::dotenv();

    let logging = match LoggingConfig::from_env() {
        Ok(logging) => logging,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    init_tracing(&logging);

    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let app = create_app(&config)?;
    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    let addr = listener.local_addr()?;

    info!(
        %addr,
        chat_strategy = config.chat_strategy.as_str(),
        model = %config.chat_model,
        transcription = config.transcription.is_some(),
        "handoff service starting"
    );
    info!("Health check endpoint: http://{}/health", addr);
    info!("Chat endpoint: POST http://{}/chat", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
