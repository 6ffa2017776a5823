use std::{process::ExitCode, sync::Arc};
use tracing::{error, info};

use pgharbor::{
    Config, Gateway, Server, ShutdownRequest, backend::TcpConnector, config::CliConfig,
    init_tracing, tls,
};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const APP_NAME: &str = "pgharbor";

// -----------------------------------------------------------------------------
// ----- Main ------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliConfig::from_args();

    let config = match Config::load(&cli).await {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("{APP_NAME}: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(config.log_level);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{APP_NAME} stopped: {e}");
            ExitCode::FAILURE
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Run -------------------------------------------------------------------

async fn run(config: Arc<Config>) -> Result<(), Box<dyn std::error::Error>> {
    let tls = tls::acceptor_from_env()?;
    let gateway = Gateway::new(config, Arc::new(TcpConnector), tls);

    let server = Server::bind(gateway.clone())?;
    info!("{} listening on {}", APP_NAME, server.local_addr()?);

    tokio::spawn(watch_signals(gateway));
    server.run().await?;

    info!("{} shut down", APP_NAME);
    Ok(())
}

/// SIGINT and SIGTERM both begin a graceful shutdown. Repeats are ignored.
async fn watch_signals(gateway: Arc<Gateway>) {
    #[cfg(unix)]
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(s) => Some(s),
        Err(e) => {
            error!("cannot install SIGTERM handler: {e}");
            None
        }
    };

    loop {
        #[cfg(unix)]
        let terminate = async {
            match sigterm.as_mut() {
                Some(s) => {
                    s.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        let signal = tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    error!("cannot listen for SIGINT: {e}");
                    return;
                }
                "SIGINT"
            }
            _ = terminate => "SIGTERM",
        };

        match gateway.shutdown.request_shutdown() {
            ShutdownRequest::Started => info!("{signal} received, draining"),
            ShutdownRequest::AlreadyDraining => info!("{signal} received, already draining"),
            ShutdownRequest::Refused => return,
        }
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
