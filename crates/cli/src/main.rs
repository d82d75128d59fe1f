use std::process::ExitCode;

use peng_chat::app;
use peng_chat::settings::SettingsStore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so they never interleave with the streamed reply.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let store = SettingsStore::load();
    tracing::info!(path = ?store.config_path(), "settings loaded");

    match app::run(store).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "peng-chat stopped");
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}
