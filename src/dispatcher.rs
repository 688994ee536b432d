use futures::{StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;

use crate::domain::{DeliveryOutcome, MessageBlock, RecipientId, RecipientOutcome, Subscriber};
use crate::registry_client::{RegistryClient, Removal};
use crate::telegram_client::{SendError, TelegramClient};

/// What to do when Telegram rejects a request as malformed for a reason we
/// do not recognise.
#[derive(serde::Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnknownBadRequestPolicy {
    /// Report the recipient as failed and carry on with the others.
    #[default]
    Isolate,
    /// Stop the whole cycle.
    Abort,
}

/// Everything a recipient is sent in one cycle. Built once, shared by all.
#[derive(Debug, Clone)]
pub struct BroadcastContent {
    pub blocks: Vec<MessageBlock>,
    pub status_pending: String,
    pub status_complete: String,
    pub closing_text: String,
    pub error_notice: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Telegram rejected a request for recipient {recipient}; aborting the cycle.")]
    UnknownBadRequest {
        recipient: RecipientId,
        #[source]
        source: SendError,
    },
}

enum Progress {
    Completed,
    Cancelled,
}

pub struct Dispatcher<'a> {
    telegram: &'a TelegramClient,
    registry: &'a RegistryClient,
    concurrency: usize,
    on_unknown_bad_request: UnknownBadRequestPolicy,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        telegram: &'a TelegramClient,
        registry: &'a RegistryClient,
        concurrency: usize,
        on_unknown_bad_request: UnknownBadRequestPolicy,
    ) -> Self {
        Self {
            telegram,
            registry,
            concurrency: concurrency.max(1),
            on_unknown_bad_request,
        }
    }

    /// Delivers `content` to every subscriber.
    ///
    /// Failures are contained per recipient and show up as outcomes. The only
    /// error returned is an unrecognised bad request under
    /// [`UnknownBadRequestPolicy::Abort`].
    #[tracing::instrument(
        name = "Dispatching broadcast",
        skip_all,
        fields(recipients = subscribers.len(), blocks = content.blocks.len())
    )]
    pub async fn run(
        &self,
        subscribers: &[Subscriber],
        content: &BroadcastContent,
        shutdown: &CancellationToken,
    ) -> Result<Vec<RecipientOutcome>, DispatchError> {
        // Collected eagerly so the returned future stays `Send`.
        let deliveries: Vec<_> = subscribers
            .iter()
            .map(|s| self.deliver_to(s.recipient_id, content, shutdown))
            .collect();

        futures::stream::iter(deliveries)
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await
    }

    #[tracing::instrument(name = "Delivering to recipient", skip(self, content, shutdown))]
    async fn deliver_to(
        &self,
        recipient: RecipientId,
        content: &BroadcastContent,
        shutdown: &CancellationToken,
    ) -> Result<RecipientOutcome, DispatchError> {
        let outcome = match self.send_all(recipient, content, shutdown).await {
            Ok(Progress::Completed) => DeliveryOutcome::Delivered,
            Ok(Progress::Cancelled) => {
                tracing::info!("Cycle cancelled before the delivery finished");
                DeliveryOutcome::Skipped
            }
            Err(e) => self.handle_failure(recipient, e, content).await?,
        };

        tracing::info!(%outcome, "Recipient processed");
        Ok(RecipientOutcome { recipient, outcome })
    }

    /// Status message, blocks, closing text, then the status edit. Stops
    /// between two calls once `shutdown` fires.
    async fn send_all(
        &self,
        recipient: RecipientId,
        content: &BroadcastContent,
        shutdown: &CancellationToken,
    ) -> Result<Progress, SendError> {
        if shutdown.is_cancelled() {
            return Ok(Progress::Cancelled);
        }
        let status = self
            .telegram
            .send_text(recipient, &content.status_pending)
            .await?;

        for block in &content.blocks {
            if shutdown.is_cancelled() {
                return Ok(Progress::Cancelled);
            }
            self.telegram.send_block(recipient, block).await?;
        }

        if shutdown.is_cancelled() {
            return Ok(Progress::Cancelled);
        }
        self.telegram
            .send_text(recipient, &content.closing_text)
            .await?;

        if shutdown.is_cancelled() {
            return Ok(Progress::Cancelled);
        }
        self.telegram
            .edit_message_text(recipient, status, &content.status_complete)
            .await?;

        Ok(Progress::Completed)
    }

    async fn handle_failure(
        &self,
        recipient: RecipientId,
        error: SendError,
        content: &BroadcastContent,
    ) -> Result<DeliveryOutcome, DispatchError> {
        match error {
            SendError::Blocked { .. } => {
                tracing::warn!(
                    error.message = %error,
                    "The recipient blocked the bot, removing the subscription"
                );
                Ok(self.unsubscribe(recipient).await)
            }
            SendError::ChatNotFound { .. } => {
                tracing::warn!(error.message = %error, "Skipping unreachable recipient");
                Ok(DeliveryOutcome::Skipped)
            }
            SendError::BadRequest { .. }
                if self.on_unknown_bad_request == UnknownBadRequestPolicy::Abort =>
            {
                Err(DispatchError::UnknownBadRequest {
                    recipient,
                    source: error,
                })
            }
            _ => {
                tracing::error!(
                    error.cause_chain = ?error,
                    error.message = %error,
                    "Failed to deliver the broadcast"
                );
                self.notify_failure(recipient, content).await;
                Ok(DeliveryOutcome::Failed)
            }
        }
    }

    async fn unsubscribe(&self, recipient: RecipientId) -> DeliveryOutcome {
        match self.registry.remove_subscriber(recipient).await {
            Ok(Removal::Removed) => DeliveryOutcome::Unsubscribed,
            Ok(Removal::AlreadyAbsent) => {
                tracing::info!("Subscription was already gone from the registry");
                DeliveryOutcome::Unsubscribed
            }
            Err(e) => {
                tracing::error!(
                    error.cause_chain = ?e,
                    error.message = %e,
                    "Failed to remove a blocked recipient"
                );
                DeliveryOutcome::Failed
            }
        }
    }

    async fn notify_failure(&self, recipient: RecipientId, content: &BroadcastContent) {
        if let Err(e) = self
            .telegram
            .send_text(recipient, &content.error_notice)
            .await
        {
            tracing::warn!(
                error.message = %e,
                "Failed to tell the recipient about the delivery failure"
            );
        }
    }
}
