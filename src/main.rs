use anyhow::Result;
use tracing_subscriber::EnvFilter;

use movie_companion::companion::open_shared_history;
use movie_companion::{run_server, AppConfig};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::from_env()?;
    let history = open_shared_history(config.history_path.clone());
    if let Ok(store) = history.lock() {
        if store.recovered_from_corruption() {
            tracing::warn!(
                "watched history at {} was unreadable and has been reset",
                store.path().display()
            );
        }
    }

    run_server(config, history).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
