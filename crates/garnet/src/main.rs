use garnet_log::GarnetLogger;
use log::{error, info, Level};
use tokio::time::Instant;

pub mod config;
pub mod endpoint;

#[tokio::main]
async fn main() {
    GarnetLogger::init(Level::Info).expect("logger already installed");

    let start_time = Instant::now();

    let config = match config::handle() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "garnet endpoint starting (bind {}, remote {})",
        config.network.bind,
        config.network.remote.as_deref().unwrap_or("none")
    );

    let result = endpoint::run(config).await;
    let elapsed = start_time.elapsed();

    match result {
        Ok(()) => info!("endpoint finished after {:.2}s", elapsed.as_secs_f64()),
        Err(e) => {
            error!("endpoint terminated: {}", e);
            std::process::exit(1);
        }
    }
}
