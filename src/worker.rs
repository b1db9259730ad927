use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::notify::Notifier;
use crate::sandbox::{RunOutcome, Sandbox};
use crate::store::{self, FailureKind, ResultStore};

/// One pool slot: owns a sandbox and drives one submission at a time through
/// compile -> execute -> collect. Parks in `next_submission` while idle.
pub async fn worker(
    id: usize,
    config: Arc<Config>,
    dispatcher: Arc<Dispatcher>,
    store: ResultStore,
    notifier: Arc<Notifier>,
    token: CancellationToken,
) -> anyhow::Result<()> {
    let sandbox = Sandbox::build(id, &config)?;
    log::info!("Worker {id} initialized");

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                log::info!("Worker {id} received shutdown signal, stopping");
                break;
            }

            submission_id = dispatcher.next_submission() => {
                dispatcher.assign(id, &submission_id);
                log::info!("Worker {id} took submission {submission_id}");

                if let Err(e) = judge_submission(&submission_id, &config, &sandbox, &store).await {
                    log::error!("Worker {id}: submission {submission_id} abandoned: {e:#}");
                }

                dispatcher.release(id);
                log::info!("Worker {id} finished submission {submission_id}");

                // the completion event must never hold up the next assignment
                let notifier = Arc::clone(&notifier);
                tokio::spawn(async move { notifier.notify_complete(&submission_id).await });
            }
        }
    }

    if let Err(e) = sandbox.teardown() {
        log::warn!("Worker {id}: sandbox teardown failed: {e:#}");
    }
    log::info!("Worker {id} has shut down gracefully");
    Ok(())
}

/// The per-submission pipeline. A compile or run failure is recorded in the
/// store and is not an error of the worker itself; an `Err` here means the
/// submission could not be processed at all (e.g. staging vanished).
async fn judge_submission(
    id: &str,
    config: &Config,
    sandbox: &Sandbox,
    store: &ResultStore,
) -> anyhow::Result<()> {
    let sources = store::resolve_staged(&config.dirs, id)?;

    if let Err(e) = sandbox.populate(&sources).await {
        log::warn!("submission {id} failed to build: {e}");
        store.save_failure(id, FailureKind::CompileFailed, &e.to_string())?;
        return Ok(());
    }

    let limit = Duration::from_secs(config.pool.run_timeout_secs);
    let outcome = sandbox.run(limit).await?;
    let artifact = sandbox.collect();
    store.save(id, &artifact)?;

    if artifact.result.is_none() {
        let detail = match outcome {
            RunOutcome::TimedOut => format!(
                "orchestrator killed after {}s",
                config.pool.run_timeout_secs
            ),
            RunOutcome::Exited(status) => {
                format!("orchestrator exited with {status} and produced no result")
            }
        };
        log::warn!("submission {id}: {detail}");
        store.save_failure(id, FailureKind::RunFailed, &detail)?;
    } else if let RunOutcome::Exited(status) = &outcome {
        if !status.success() {
            log::warn!("submission {id}: orchestrator exited with {status}, partial results collected");
        }
    }
    Ok(())
}
