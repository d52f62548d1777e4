use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{debug, error, info, warn};

use calofit_core::chat::{Inbound, Reply};
use calofit_core::service::CalorieService;

use crate::bot::{Bot, TECHNICAL_ERROR_TEXT};
use crate::config::Config;
use crate::dispatch::{Dispatcher, Handler};
use crate::server::{self, UpdateSink, WEBHOOK_PATH};
use crate::telegram::{Origin, TelegramClient, Update};
use crate::yandexgpt::YandexGptClient;

/// Per-user workers exit after this long without updates.
const WORKER_IDLE: Duration = Duration::from_secs(60);

const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

type BotDispatcher = Dispatcher<(Inbound, Origin), BotHandler>;

struct BotHandler {
    bot: Arc<Bot>,
    telegram: Arc<TelegramClient>,
}

impl Handler<(Inbound, Origin)> for BotHandler {
    async fn handle(&self, (inbound, origin): (Inbound, Origin)) {
        let bot = Arc::clone(&self.bot);
        let replies = tokio::task::spawn_blocking(move || {
            bot.handle(&inbound, Local::now().naive_local(), Instant::now())
        })
        .await
        .unwrap_or_else(|e| {
            error!("Handler task failed: {e}");
            vec![Reply::text(TECHNICAL_ERROR_TEXT)]
        });

        if let Err(e) = self.telegram.deliver(&origin, &replies).await {
            warn!("Failed to deliver replies to chat {}: {e:#}", origin.chat_id);
        }
    }
}

fn build_dispatcher(config: &Config, telegram: Arc<TelegramClient>) -> Result<BotDispatcher> {
    let estimator = YandexGptClient::new(&config.estimator()?, tokio::runtime::Handle::current())?;
    let service = CalorieService::new(&config.db_path, config.report_session_ttl)?;
    info!("Database at {}", config.db_path.display());
    let bot = Bot::new(service, Arc::new(estimator), config.report_session_ttl);
    Ok(Dispatcher::new(
        BotHandler {
            bot: Arc::new(bot),
            telegram,
        },
        WORKER_IDLE,
    ))
}

fn route_update(dispatcher: &BotDispatcher, update: Update) {
    let update_id = update.update_id;
    match update.into_inbound() {
        Some((inbound, origin)) => {
            let key = inbound.user().external_id;
            debug!(
                "Update {update_id} from {key} ({} active workers)",
                dispatcher.active_workers()
            );
            dispatcher.dispatch(key, (inbound, origin));
        }
        None => debug!("Ignoring update {update_id}"),
    }
}

/// Long polling until Ctrl-C.
pub(crate) async fn cmd_run(config: &Config) -> Result<()> {
    let tg = config.telegram()?;
    let telegram = Arc::new(TelegramClient::new(
        &tg.api_url,
        &tg.token,
        tg.poll_timeout_secs,
    )?);
    let dispatcher = build_dispatcher(config, Arc::clone(&telegram))?;

    telegram
        .delete_webhook()
        .await
        .context("Failed to remove the webhook before polling")?;
    info!("Polling for updates");

    let mut offset = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                return Ok(());
            }
            result = telegram.get_updates(offset, tg.poll_timeout_secs) => match result {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        route_update(&dispatcher, update);
                    }
                }
                Err(e) => {
                    warn!("Polling failed: {e:#}");
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                }
            }
        }
    }
}

/// Webhook receiver. With `public_url`, the webhook is registered first.
pub(crate) async fn cmd_serve(
    config: &Config,
    port: u16,
    bind: &str,
    public_url: Option<&str>,
) -> Result<()> {
    let tg = config.telegram()?;
    let (secret, new_secret) =
        config.load_or_create_webhook_secret(tg.webhook_secret.as_deref())?;
    if new_secret {
        info!(
            "Generated a webhook secret (see webhook_secret in {})",
            config.data_dir.display()
        );
    }

    let telegram = Arc::new(TelegramClient::new(
        &tg.api_url,
        &tg.token,
        tg.poll_timeout_secs,
    )?);
    let dispatcher = build_dispatcher(config, Arc::clone(&telegram))?;

    if let Some(base) = public_url {
        let url = format!("{}{WEBHOOK_PATH}", base.trim_end_matches('/'));
        telegram
            .set_webhook(&url, &secret)
            .await
            .context("Failed to register the webhook")?;
        info!("Webhook registered at {url}");
    }

    let sink: UpdateSink = Arc::new(move |update: Update| route_update(&dispatcher, update));
    server::start_server(sink, port, bind, secret).await
}
