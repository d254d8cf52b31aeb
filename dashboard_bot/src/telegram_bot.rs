use anyhow::Error;
use futures::StreamExt;
use log::{error, info, warn};
use std::sync::Arc;
use telegram_bot::{
    Api, CanReplySendMessage, GetUpdates, MessageKind, UpdateKind, types::Update,
};
use tokio::time::{sleep, timeout};

use dashboard_lib::context::AppContext;

use crate::{
    dispatcher::{BotDispatcher, Sender},
    failure_count::FailureCount,
};

const MAX_FAILURES: usize = 5;

/// Offset confirming every update up to the newest of `update_ids`.
fn confirm_offset(update_ids: impl IntoIterator<Item = i64>) -> Option<i64> {
    update_ids.into_iter().max().map(|id| id + 1)
}

#[derive(Clone)]
pub struct TelegramBot {
    api: Arc<Api>,
    dispatcher: BotDispatcher,
    failure_count: Arc<FailureCount>,
}

impl TelegramBot {
    pub fn new(bot_token: &str, dispatcher: BotDispatcher) -> Self {
        Self {
            api: Arc::new(Api::new(bot_token)),
            dispatcher,
            failure_count: Arc::new(FailureCount::new(MAX_FAILURES)),
        }
    }

    /// Poll for updates until too many consecutive failures occur.
    ///
    /// # Errors
    /// Returns error after `MAX_FAILURES` failed polling rounds in a row
    pub async fn run(&self) -> Result<(), Error> {
        info!("starting telegram bot");
        if let Err(e) = self.skip_pending_updates().await {
            warn!("could not skip pending updates: {e}");
        }
        loop {
            self.failure_count.check()?;
            match Box::pin(timeout(
                std::time::Duration::from_secs(3600),
                self.bot_handler(),
            ))
            .await
            {
                Ok(Ok(())) | Err(_) => self.failure_count.reset()?,
                Ok(Err(e)) => {
                    error!("telegram polling failed: {e}");
                    self.failure_count.increment()?;
                    sleep(std::time::Duration::from_secs(5)).await;
                }
            }
        }
    }

    /// Confirm updates queued while the bot was down so stale commands are
    /// not replayed.
    async fn skip_pending_updates(&self) -> Result<(), Error> {
        let mut latest = GetUpdates::new();
        latest.offset(-1).timeout(0);
        let pending = self.api.send(latest).await?;
        if let Some(offset) = confirm_offset(pending.iter().map(|u| u.id)) {
            let mut confirm = GetUpdates::new();
            confirm.offset(offset).limit(1).timeout(0);
            self.api.send(confirm).await?;
            info!("skipped updates queued before startup");
        }
        Ok(())
    }

    async fn bot_handler(&self) -> Result<(), Error> {
        let mut stream = self.api.stream();
        while let Some(update) = stream.next().await {
            self.process_update(update).await?;
            self.failure_count.reset()?;
        }
        Ok(())
    }

    async fn process_update(
        &self,
        update: Result<Update, telegram_bot::Error>,
    ) -> Result<(), Error> {
        if let UpdateKind::Message(message) = update?.kind {
            if let MessageKind::Text { ref data, .. } = message.kind {
                let sender = Sender {
                    user_id: message.from.id.into(),
                    first_name: message.from.first_name.as_str().into(),
                    username: message.from.username.as_deref().map(Into::into),
                };
                if let Some(reply) = self.dispatcher.handle_message(&sender, data).await? {
                    self.api.send(message.text_reply(reply.as_str())).await?;
                }
            }
        }
        Ok(())
    }
}

/// Start polling when a bot token is configured, otherwise return at once.
///
/// # Errors
/// Returns error if the polling loop gives up
pub async fn run_bot(ctx: AppContext) -> Result<(), Error> {
    let Some(token) = ctx.config.telegram_bot_token() else {
        warn!("Telegram bot token not configured. Bot will not start.");
        return Ok(());
    };
    let dispatcher = BotDispatcher::from_context(&ctx);
    if ctx.config.authorized_user_ids().is_empty() {
        warn!("no AUTHORIZED_USERS configured, every command will be rejected");
    }
    TelegramBot::new(token, dispatcher).run().await
}

#[cfg(test)]
mod tests {
    use anyhow::Error;
    use tempfile::TempDir;

    use dashboard_lib::{config::ConfigInner, context::AppContext};

    use crate::telegram_bot::{confirm_offset, run_bot};

    #[test]
    fn test_confirm_offset() {
        assert_eq!(confirm_offset([]), None);
        assert_eq!(confirm_offset([41, 57, 56]), Some(58));
    }

    #[tokio::test]
    async fn test_run_bot_without_token_returns() -> Result<(), Error> {
        let dir = TempDir::new()?;
        let config = ConfigInner {
            database_url: dir.path().join("bot.db").to_string_lossy().as_ref().into(),
            gcal_token_file: dir.path().join("token.json"),
            telegram_bot_token: Some("   ".into()),
            ..ConfigInner::default()
        }
        .into();
        let ctx = AppContext::new(config).await?;
        run_bot(ctx).await?;
        Ok(())
    }
}
