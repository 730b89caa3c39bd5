use skin_rash_service::{Config, LogFormat, create_app};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing; JSON lines unless LOG_FORMAT=pretty
fn init_tracing(log_format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "skin_rash_service=debug,rash_dialogue=debug,tower_http=debug".into()
    });

    match log_format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true),
                )
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(LogFormat::Pretty);
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    init_tracing(config.log_format);

    let app = create_app(&config).await;
    let listener = TcpListener::bind(config.bind_address()).await?;
    let addr = listener.local_addr()?;

    info!(
        reasoning_model = %config.reasoning_model,
        blip_model = %config.blip_model,
        "Skin rash dialogue service starting on {}",
        addr
    );
    info!("Health check endpoint: http://{}/health", addr);
    info!("Analysis endpoint: POST http://{}/analyze", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
