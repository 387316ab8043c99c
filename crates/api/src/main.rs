//! Ops relay server binary entrypoint.
//!
//! Runs the HTTP ingress, the delivery dispatcher and the Telegram update
//! poller in one process.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use relay_bot::commands::Command;
use relay_bot::handler::CommandHandler;
use relay_bot::metrics::MetricsCache;
use relay_bot::poller::{PollerConfig, UpdatePoller};
use relay_common::config::AppConfig;
use relay_common::redis_pool::create_redis_pool;
use relay_notifier::backoff::BackoffPolicy;
use relay_notifier::dispatcher::{Dispatcher, DispatcherConfig};
use relay_notifier::queue::DeliveryQueue;
use relay_notifier::recipients::{RecipientDirectory, SubscriberStore};
use relay_notifier::telegram::TelegramClient;
use relay_notifier::transport::ChatTransport;

use relay_api::routes::create_router;
use relay_api::state::AppState;

const MAX_BODY_BYTES: usize = 64 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("relay_api=info,relay_notifier=info,relay_bot=info,tower_http=info")
        }))
        .json()
        .init();

    tracing::info!("Starting ops relay...");

    let config = AppConfig::from_env()?;

    let transport = Arc::new(TelegramClient::new(
        &config.telegram_api_url,
        &config.telegram_bot_token,
        config.request_timeout(),
    )?);

    // Bad token aborts here; a flaky network at boot does not.
    let bot_username = match transport.get_me().await {
        Ok(me) => {
            tracing::info!(bot_id = me.id, username = ?me.username, "Bot identity verified");
            me.username
        }
        Err(e) if e.is_fatal() => {
            tracing::error!(error = %e, "Telegram rejected the bot token");
            return Err(e.into());
        }
        Err(e) => {
            tracing::warn!(error = %e, "Could not verify bot identity, continuing");
            None
        }
    };

    if let Err(e) = transport.set_my_commands(&Command::menu()).await {
        tracing::warn!(error = %e, "Failed to register bot command menu");
    }

    let directory = match config.telegram_chat_id {
        Some(chat) => {
            tracing::info!(chat_id = %chat, "Delivering to fixed chat");
            RecipientDirectory::Fixed(chat)
        }
        None => {
            let redis = create_redis_pool(&config.redis_url, config.request_timeout()).await?;
            tracing::info!(key = %config.subscribers_key, "Delivering to subscribers");
            RecipientDirectory::Subscribers(SubscriberStore::redis(
                redis,
                config.subscribers_key.clone(),
            ))
        }
    };

    let queue = DeliveryQueue::new(BackoffPolicy::default(), config.delivery_max_attempts);
    let metrics = MetricsCache::new(config.metrics_cadence_minutes);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let dispatcher = Arc::new(Dispatcher::new(
        queue.clone(),
        directory.clone(),
        Arc::clone(&transport),
        DispatcherConfig {
            tick: config.dispatch_tick(),
            send_delay: config.dispatch_send_delay(),
        },
    ));
    let dispatcher_task = tokio::spawn(dispatcher.run(shutdown_rx.clone()));

    let handler = CommandHandler::new(
        Arc::clone(&transport),
        directory.clone(),
        metrics.clone(),
        config.metrics_default_source.clone(),
    )
    .with_bot_username(bot_username);
    let mut poller = UpdatePoller::new(
        Arc::clone(&transport),
        handler,
        PollerConfig {
            timeout: config.poll_timeout(),
            cooldown: config.poll_cooldown(),
        },
    );
    let poller_rx = shutdown_rx.clone();
    let poller_task = tokio::spawn(async move { poller.run(poller_rx).await });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let state = AppState::new(queue, metrics, directory, config);

    let app = create_router(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http());

    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Received shutdown signal, stopping gracefully...");
        })
        .await?;

    let _ = shutdown_tx.send(true);

    if let Err(e) = dispatcher_task.await {
        tracing::error!(error = %e, "Dispatcher task panicked");
    }
    match poller_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "Update poller exited with error"),
        Err(e) => tracing::error!(error = %e, "Update poller task panicked"),
    }

    tracing::info!("Ops relay stopped.");
    Ok(())
}
