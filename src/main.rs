use env_logger::Env;
use log::{error, info};
use plate_lookup::config::Config;
use plate_lookup::server;
use std::process;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    info!("Starting plate-lookup");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };
    let services = match plate_lookup::build_services(&config) {
        Ok(services) => services,
        Err(e) => {
            error!("Unable to start: {}", e);
            process::exit(1);
        }
    };

    let server_task = tokio::spawn(server::run(services, config.bind_addr));
    tokio::select! {
        result = server_task => {
            if let Err(e) = result {
                error!("Server task failed: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
        }
    }
    info!("Exiting main");
}
