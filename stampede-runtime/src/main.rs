use stampede_runtime::StampedeRuntime;
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_LOG_FILTER: &str = "stampede=info,stampede_runtime=info";

#[tokio::main]
async fn main() {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = StampedeRuntime::new().with_args().run().await {
        error!("{err}");
        std::process::exit(err.exit_code());
    }
}
