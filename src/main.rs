use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use webcast_live::connection::HttpSigner;
use webcast_live::sink::{ConversationClient, KvStore, MemoryStore, RedisStore, StorageClient};
use webcast_live::{Config, Registry, WebcastSessionFactory};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let live_ids: Vec<String> = std::env::args().skip(1).collect();
    if live_ids.is_empty() {
        eprintln!("usage: webcast-live <live_id>...");
        std::process::exit(2);
    }

    let config = Config::from_env()?;
    let timeout = config.request_timeout();

    let conversation = Arc::new(ConversationClient::new(
        &config.conversation_url,
        &config.conversation_api_key,
        &config.conversation_user,
        timeout,
    )?);
    let storage = Arc::new(StorageClient::new(
        &config.storage_url,
        &config.storage_api_key,
        timeout,
    )?);
    let store: Arc<dyn KvStore> = match &config.redis_url {
        Some(url) => Arc::new(RedisStore::new(url)?),
        None => {
            info!("no redis url configured, keeping conversation ids in memory");
            Arc::new(MemoryStore::new())
        }
    };
    let signer = Arc::new(HttpSigner::new(&config.signer_url));

    let registry = Registry::new(WebcastSessionFactory::new(
        config,
        signer,
        conversation,
        storage,
        store,
    ));
    for live_id in &live_ids {
        registry.start(live_id).await;
    }
    info!(rooms = live_ids.len(), "watching");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
    }
    info!("shutdown signal received");
    registry.shutdown().await;
    Ok(())
}
