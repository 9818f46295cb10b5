/**
 * daydeskr-tail
 *
 * Headless client that signs in with DAYDESKR_TOKEN, loads the
 * conversation list, subscribes to every conversation and logs store
 * activity until interrupted.
 */
use daydeskr::client::{Config, MessagingContext, StoreEvent};
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenv::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .init();

    let config = Config::from_env()?;
    if config.get_token().is_none() {
        eprintln!("DAYDESKR_TOKEN is not set");
        std::process::exit(2);
    }
    tracing::info!("[STARTUP] Backend {}", config.app().api_url);

    let context = MessagingContext::init(config);
    let mut events = context.store().read().await.subscribe();
    context.start().await?;
    let subscribed = context.subscribe_all().await?;
    tracing::info!("[STARTUP] Following {} conversations", subscribed);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(StoreEvent::MessagesChanged { conversation_id }) => {
                    let store = context.store().read().await;
                    if let Some(message) = store.messages_for(conversation_id).last() {
                        tracing::info!(
                            "#{} {}: {}",
                            conversation_id,
                            message.sender_name(),
                            message.content
                        );
                    }
                }
                Ok(StoreEvent::SessionExpired) => {
                    tracing::error!("[STARTUP] Session expired, sign in again");
                    break;
                }
                Ok(other) => tracing::debug!("{:?}", other),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    context.teardown().await;
    Ok(())
}
