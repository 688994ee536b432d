use std::fmt::{Debug, Display};

use anyhow::Context;
use listing_broadcast::{
    configuration::get_configuration,
    scheduler::run_scheduler_until_stopped,
    startup::Application,
    telemetry::{get_subscriber, init_subscriber},
};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = get_subscriber("listing_broadcast".into(), "info".into(), std::io::stdout);
    init_subscriber(subscriber);

    let config = get_configuration().context("Failed to read configuration")?;
    let shutdown = CancellationToken::new();

    let app = tokio::spawn(
        Application::build(config.clone())
            .await?
            .run_until_stopped(),
    );
    let mut scheduler = tokio::spawn(run_scheduler_until_stopped(config, shutdown.clone()));

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    tokio::select! {
        outcome = app => {
            report_exit("API", outcome);
            shutdown.cancel();
            report_exit("Scheduler", scheduler.await);
        }
        outcome = &mut scheduler => report_exit("Scheduler", outcome),
    }

    Ok(())
}

fn report_exit(task_name: &str, outcome: Result<Result<(), impl Debug + Display>, JoinError>) {
    match outcome {
        Ok(Ok(())) => {
            tracing::info!("{} has exited", task_name)
        }
        Ok(Err(e)) => {
            tracing::error!(
                error.cause_chain = ?e,
                error.message = %e,
                "{} failed",
                task_name
            )
        }
        Err(e) => {
            tracing::error!(
                error.cause_chain = ?e,
                error.message = %e,
                "{} task failed to complete",
                task_name
            )
        }
    }
}
