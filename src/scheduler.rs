use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, FixedOffset, Utc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::configuration::{DailyTime, Settings};
use crate::cycle::BroadcastCycle;

/// The first configured daily time strictly after `now`, in `offset`'s
/// wall clock.
pub fn next_fire_after(
    now: DateTime<Utc>,
    times: &[DailyTime],
    offset: FixedOffset,
) -> Option<DateTime<Utc>> {
    let today = now.with_timezone(&offset).date_naive();
    let days = [today, today.succ_opt()?];

    days.iter()
        .flat_map(move |day| {
            times
                .iter()
                .filter_map(move |t| day.and_time(t.time()).and_local_timezone(offset).single())
        })
        .map(|fire| fire.with_timezone(&Utc))
        .filter(|fire| *fire > now)
        .min()
}

pub async fn run_scheduler_until_stopped(
    config: Settings,
    shutdown: CancellationToken,
) -> Result<(), anyhow::Error> {
    let registry = config
        .registry
        .client()
        .context("Failed to build the registry client")?;
    let telegram = config
        .telegram
        .client()
        .context("Failed to build the Telegram client")?;
    let offset = config.broadcast.utc_offset()?;
    let cycle = Arc::new(BroadcastCycle::new(registry, telegram, &config.broadcast)?);

    scheduler_loop(cycle, &config.broadcast.schedule, offset, Utc::now, shutdown).await
}

async fn scheduler_loop(
    cycle: Arc<BroadcastCycle>,
    schedule: &[DailyTime],
    offset: FixedOffset,
    clock: impl Fn() -> DateTime<Utc>,
    shutdown: CancellationToken,
) -> Result<(), anyhow::Error> {
    if schedule.is_empty() {
        anyhow::bail!("The broadcast schedule has no times configured");
    }
    let mut running = JoinSet::new();
    let mut last_fired: Option<DateTime<Utc>> = None;

    loop {
        // A wall clock stepped backwards must not bring a fired slot back.
        let now = match last_fired {
            Some(fired) => clock().max(fired),
            None => clock(),
        };
        let next = next_fire_after(now, schedule, offset)
            .context("Failed to compute the next broadcast time")?;
        let wait = (next - clock()).to_std().unwrap_or(Duration::ZERO);
        tracing::info!(next_run = %next, "Waiting for the next broadcast");

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        // Reap finished cycles so the set does not grow without bound.
        while running.try_join_next().is_some() {}

        last_fired = Some(next);
        let cycle = Arc::clone(&cycle);
        let token = shutdown.clone();
        running.spawn(async move {
            // Outcomes and failures are logged by the cycle itself.
            let _ = cycle.run(next, &token).await;
        });
    }

    tracing::info!("Scheduler stopping, waiting for the running cycle to wind down");
    while running.join_next().await.is_some() {}
    Ok(())
}
