use outmsg::autosend::AutosendManager;
use outmsg::config::Config;
use outmsg::metrics::METRICS;
use outmsg::pool::{init_message_pool, message_pool};
use outmsg::server::Listener;

use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration
    let config = Config::parse_args();

    // Initialize tracing
    let log_level = match config.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("outmsg v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration: free_list_capacity={}, autosend_delay={}ms, max_connections={}",
        config.free_list_capacity, config.autosend_delay_ms, config.max_connections
    );

    // Size the message free list before the first message is created
    if !init_message_pool(config.free_list_capacity) {
        warn!(
            "Message pool already initialized with capacity {}",
            message_pool().capacity()
        );
    }

    // Start the autosend dispatcher
    let (manager, autosend) = AutosendManager::new(config.autosend_delay());
    tokio::spawn(manager.run());

    // Create and run the listener
    let listener = Listener::bind(&config, autosend).await?;

    info!("Ready to accept connections");
    tokio::select! {
        result = listener.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    info!("Final metrics:\n{}", METRICS.snapshot().to_info_string());
    Ok(())
}
