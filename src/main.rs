use std::process::ExitCode;
use std::sync::Arc;
use clap::Parser;
use tracing::{error, info};

extern crate scgi_gateway;
use scgi_gateway::config::Args;
use scgi_gateway::listener;
use scgi_gateway::logging;

#[tokio::main]
async fn main() -> ExitCode
{
    let config = Arc::new(Args::parse().into_config());
    logging::init(config.debug);

    let bound = match listener::bind(&config.endpoint) {
        Ok(bound) => bound,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(2);
        }
    };
    let socket_path = bound.socket_path().map(|p| p.to_path_buf());

    let res = tokio::select! {
        res = bound.serve(config.clone()) => res,
        _ = tokio::signal::ctrl_c() => {
            info!("Stopped");
            Ok(())
        }
    };

    if let Some(path) = socket_path {
        if let Err(e) = std::fs::remove_file(&path) {
            error!(path = %path.display(), "Failed to remove socket: {}", e);
        }
    }
    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::from(3)
    }
}
