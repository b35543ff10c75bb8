use std::process::ExitCode;

use tracing::error;

use rudis::server::RedisServer;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let server = match RedisServer::new(std::env::args()) {
        Ok(server) => server,
        Err(error) => {
            error!(%error, "invalid launch flags");
            return ExitCode::FAILURE;
        }
    };

    if let Err(error) = server.run().await {
        error!(%error, "server terminated");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
