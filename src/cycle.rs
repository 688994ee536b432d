use chrono::{DateTime, FixedOffset, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::composer::compose;
use crate::configuration::{BroadcastSettings, TemplateSettings};
use crate::dispatcher::{BroadcastContent, DispatchError, Dispatcher, UnknownBadRequestPolicy};
use crate::domain::{DeliveryOutcome, MessageBlock, RecipientOutcome};
use crate::registry_client::{RegistryClient, RegistryError};
use crate::telegram_client::TelegramClient;

/// One fetch, compose and dispatch run. Concurrent invocations are refused.
pub struct BroadcastCycle {
    registry: RegistryClient,
    telegram: TelegramClient,
    templates: TemplateSettings,
    utc_offset: FixedOffset,
    concurrency: usize,
    on_unknown_bad_request: UnknownBadRequestPolicy,
    in_progress: Mutex<()>,
}

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("A broadcast cycle is already running.")]
    AlreadyRunning,
    #[error("Failed to fetch the subscriber list.")]
    Subscribers(#[source] RegistryError),
    #[error("Failed to fetch the catalog.")]
    Catalog(#[source] RegistryError),
    #[error("Failed to render the {name} template.")]
    Template {
        name: &'static str,
        #[source]
        source: tera::Error,
    },
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub outcomes: Vec<RecipientOutcome>,
}

impl CycleReport {
    pub fn count(&self, outcome: DeliveryOutcome) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.outcome == outcome)
            .count()
    }
}

impl BroadcastCycle {
    pub fn new(
        registry: RegistryClient,
        telegram: TelegramClient,
        settings: &BroadcastSettings,
    ) -> Result<Self, anyhow::Error> {
        let cycle = Self {
            registry,
            telegram,
            templates: settings.templates.clone(),
            utc_offset: settings.utc_offset()?,
            concurrency: settings.concurrency,
            on_unknown_bad_request: settings.on_unknown_bad_request,
            in_progress: Mutex::new(()),
        };
        // Template syntax errors surface at startup.
        cycle.content(Vec::new(), Utc::now())?;
        Ok(cycle)
    }

    /// Runs a full cycle for the trigger instant `now`.
    ///
    /// Fetch failures end the cycle before anything is sent.
    #[tracing::instrument(
        name = "Broadcast cycle",
        skip(self, shutdown),
        fields(run_id = %Uuid::new_v4())
    )]
    pub async fn run(
        &self,
        now: DateTime<Utc>,
        shutdown: &CancellationToken,
    ) -> Result<CycleReport, CycleError> {
        let Ok(_guard) = self.in_progress.try_lock() else {
            tracing::warn!("Previous broadcast cycle still running, skipping this trigger");
            return Err(CycleError::AlreadyRunning);
        };

        let report = self.run_exclusive(now, shutdown).await.inspect_err(|e| {
            tracing::error!(
                error.cause_chain = ?e,
                error.message = %e,
                "Broadcast cycle aborted"
            )
        })?;

        tracing::info!(
            recipients = report.outcomes.len(),
            delivered = report.count(DeliveryOutcome::Delivered),
            unsubscribed = report.count(DeliveryOutcome::Unsubscribed),
            skipped = report.count(DeliveryOutcome::Skipped),
            failed = report.count(DeliveryOutcome::Failed),
            "Broadcast cycle finished"
        );
        Ok(report)
    }

    async fn run_exclusive(
        &self,
        now: DateTime<Utc>,
        shutdown: &CancellationToken,
    ) -> Result<CycleReport, CycleError> {
        let subscribers = self
            .registry
            .list_subscribers()
            .await
            .map_err(CycleError::Subscribers)?;
        if subscribers.is_empty() {
            tracing::info!("No subscribers, nothing to broadcast");
            return Ok(CycleReport::default());
        }

        let catalog = self
            .registry
            .fetch_catalog()
            .await
            .map_err(CycleError::Catalog)?;
        let content = self.content(compose(&catalog), now)?;

        let outcomes = Dispatcher::new(
            &self.telegram,
            &self.registry,
            self.concurrency,
            self.on_unknown_bad_request,
        )
        .run(&subscribers, &content, shutdown)
        .await?;

        Ok(CycleReport { outcomes })
    }

    fn content(
        &self,
        blocks: Vec<MessageBlock>,
        now: DateTime<Utc>,
    ) -> Result<BroadcastContent, CycleError> {
        let today = now
            .with_timezone(&self.utc_offset)
            .format("%A, %d %B %Y")
            .to_string();
        let t = &self.templates;

        Ok(BroadcastContent {
            blocks,
            status_pending: render("status_pending", &t.status_pending, &today)?,
            status_complete: render("status_complete", &t.status_complete, &today)?,
            closing_text: render("closing", &t.closing, &today)?,
            error_notice: render("error_notice", &t.error_notice, &today)?,
        })
    }
}

fn render(name: &'static str, template: &str, today: &str) -> Result<String, CycleError> {
    let mut ctx = tera::Context::new();
    ctx.insert("today", today);
    tera::Tera::one_off(template, &ctx, false)
        .map_err(|source| CycleError::Template { name, source })
}
