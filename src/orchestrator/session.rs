//! Timed run session.
//!
//! Selects a runnable, launches it and keeps its stored total up to date while it
//! runs. Two activities cooperate through a single completion token:
//!
//! - the launch task waits for the child and cancels the token once it has exited;
//! - the timer runs on a blocking worker, owns the store connection and its
//!   transaction, and on every tick persists the prior total plus the whole seconds
//!   elapsed since the session started, until it observes the token.
//!
//! The timer never writes after it has seen the token, so time between the last
//! tick and the child's exit is not counted.

use crate::error::RandRunError;
use crate::launcher;
use crate::model::{CommitPolicy, RunConfig, Runnable, SessionEvent, SessionSummary};
use crate::registry;
use crate::storage::ElapsedStore;
use anyhow::{anyhow, Context, Result};
use rand::Rng;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pick one of `runnables` with `rng` and run a tracked session for it.
pub(crate) async fn random_run<R: Rng + ?Sized>(
    cfg: &RunConfig,
    runnables: &[Runnable],
    rng: &mut R,
    event_tx: UnboundedSender<SessionEvent>,
) -> Result<SessionSummary> {
    let runnable = registry::select(runnables, rng)
        .with_context(|| format!("nothing to run from {}", cfg.list_path.display()))?
        .clone();
    info!(name = %runnable.name, command = %runnable.command_line(), "selected runnable");
    run_session(cfg, runnable, event_tx).await
}

/// Track one run of `runnable` against the store at `cfg.store_path`.
pub(crate) async fn run_session(
    cfg: &RunConfig,
    runnable: Runnable,
    event_tx: UnboundedSender<SessionEvent>,
) -> Result<SessionSummary> {
    let _ = event_tx.send(SessionEvent::Selected {
        runnable: runnable.clone(),
    });

    let done = CancellationToken::new();
    let (ready_tx, ready_rx) = oneshot::channel::<u64>();

    let timer = {
        let ticker = Ticker {
            tick: cfg.tick,
            policy: cfg.commit_policy,
            done: done.clone(),
            event_tx: event_tx.clone(),
        };
        let store_path = cfg.store_path.clone();
        let key = runnable.name.clone();
        tokio::task::spawn_blocking(move || ticker.run(&store_path, &key, ready_tx))
    };

    // The child is only started once the store is open and the prior total is known.
    let prior_seconds = match ready_rx.await {
        Ok(prior) => prior,
        Err(_) => {
            let err = match timer.await {
                Ok(Err(e)) => anyhow::Error::new(e),
                Ok(Ok(_)) => anyhow!("timer stopped before the store was ready"),
                Err(e) => anyhow::Error::new(e),
            };
            return Err(err.context("failed to start tracking"));
        }
    };
    let _ = event_tx.send(SessionEvent::Resumed {
        key: runnable.name.clone(),
        prior_seconds,
    });

    let interrupts = tokio::spawn(hold_interrupts());

    let launch = {
        let runnable = runnable.clone();
        let done = done.clone();
        let event_tx = event_tx.clone();
        tokio::spawn(async move {
            let res = launcher::launch(&runnable).await;
            match &res {
                Ok(status) => {
                    let _ = event_tx.send(SessionEvent::ProcessExited {
                        success: status.success(),
                        code: status.code(),
                    });
                }
                Err(e) => {
                    warn!(name = %runnable.name, error = %e, "launch failed");
                    let _ = event_tx.send(SessionEvent::LaunchFailed {
                        message: format!("{e:#}"),
                    });
                }
            }
            done.cancel();
            res
        })
    };

    let timer_res = timer.await;
    interrupts.abort();
    let final_seconds = timer_res
        .context("timer task failed")?
        .context("failed to persist elapsed time")?;

    let launch = launch.await.context("launch task failed")?;
    let _ = event_tx.send(SessionEvent::Finalized {
        key: runnable.name.clone(),
        seconds: final_seconds,
    });
    info!(name = %runnable.name, prior_seconds, final_seconds, "session finalized");

    Ok(SessionSummary {
        runnable,
        prior_seconds,
        final_seconds,
        launch,
    })
}

/// Keep SIGINT from killing the tool while the child runs; the child gets it too
/// and the session finalizes once the child exits.
async fn hold_interrupts() {
    while tokio::signal::ctrl_c().await.is_ok() {
        info!("interrupt received, waiting for the runnable to exit");
    }
}

struct Ticker {
    tick: Duration,
    policy: CommitPolicy,
    done: CancellationToken,
    event_tx: UnboundedSender<SessionEvent>,
}

impl Ticker {
    /// Open the store, report the prior total through `ready_tx`, tick until the
    /// child exits, then commit and close. Returns the last persisted total.
    fn run(
        self,
        store_path: &Path,
        key: &str,
        ready_tx: oneshot::Sender<u64>,
    ) -> Result<u64, RandRunError> {
        let mut store = ElapsedStore::open(store_path)?;

        let last = match self.policy {
            CommitPolicy::Session => {
                let tx = store.begin_write()?;
                let prior = tx.get_seconds(key)?;
                let _ = ready_tx.send(prior);
                let last = self.drive(prior, |seconds| tx.put_seconds(key, seconds))?;
                tx.commit()?;
                last
            }
            CommitPolicy::Tick => {
                // Fail before launching if another run holds the writer lock.
                store.begin_write()?.commit()?;
                let prior = store.get_seconds(key)?;
                let _ = ready_tx.send(prior);
                self.drive(prior, |seconds| {
                    let tx = store.begin_write()?;
                    tx.put_seconds(key, seconds)?;
                    tx.commit()
                })?
            }
        };

        store.close()?;
        debug!(key, last, "timer finished");
        Ok(last)
    }

    fn drive<F>(&self, prior: u64, mut persist: F) -> Result<u64, RandRunError>
    where
        F: FnMut(u64) -> Result<(), RandRunError>,
    {
        let started = Instant::now();
        let mut persisted = prior;
        let mut ticks: u32 = 0;

        while !self.done.is_cancelled() {
            // Whole seconds of wall time, whatever the tick period.
            let seconds = prior + started.elapsed().as_secs();
            let _ = self.event_tx.send(SessionEvent::Tick { seconds });
            persist(seconds)?;
            persisted = seconds;

            // Deadlines are measured from the start of the loop, not from the previous tick.
            ticks = ticks.saturating_add(1);
            let deadline = started + self.tick * ticks;
            std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
        }
        Ok(persisted)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn config(dir: &Path, tick: Duration, commit_policy: CommitPolicy) -> RunConfig {
        RunConfig {
            list_path: dir.join("list.csv"),
            store_path: dir.join("runs.db"),
            tick,
            commit_policy,
            seed: Some(1),
        }
    }

    fn sh(name: &str, script: &str) -> Runnable {
        Runnable {
            name: name.into(),
            command: "sh".into(),
            args: vec!["-c".into(), script.into()],
        }
    }

    fn seed_store(path: &Path, key: &str, seconds: u64) {
        let mut store = ElapsedStore::open(path).unwrap();
        let tx = store.begin_write().unwrap();
        tx.put_seconds(key, seconds).unwrap();
        tx.commit().unwrap();
        store.close().unwrap();
    }

    fn stored(path: &Path, key: &str) -> u64 {
        ElapsedStore::open(path).unwrap().get_seconds(key).unwrap()
    }

    #[tokio::test]
    async fn persisted_total_counts_whole_seconds_of_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), Duration::from_secs(1), CommitPolicy::Session);
        seed_store(&cfg.store_path, "nap", 100);

        let (tx, _rx) = mpsc::unbounded_channel();
        let summary = run_session(&cfg, sh("nap", "sleep 2"), tx).await.unwrap();

        let total = stored(&cfg.store_path, "nap");
        assert!((101..=102).contains(&total), "stored {total}");
        assert_eq!(summary.prior_seconds, 100);
        assert_eq!(summary.final_seconds, total);
        assert!(summary.launch.unwrap().success());
    }

    #[tokio::test]
    async fn sequential_runs_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), Duration::from_millis(50), CommitPolicy::Session);

        let (tx, _rx) = mpsc::unbounded_channel();
        let first = run_session(&cfg, sh("loop", "sleep 0.3"), tx.clone())
            .await
            .unwrap();
        let after_first = stored(&cfg.store_path, "loop");
        assert_eq!(first.final_seconds, after_first);

        let second = run_session(&cfg, sh("loop", "sleep 0.3"), tx).await.unwrap();
        assert_eq!(second.prior_seconds, after_first);
        assert!(stored(&cfg.store_path, "loop") >= after_first);
        assert!(second.final_seconds >= first.final_seconds);
    }

    #[tokio::test]
    async fn per_tick_commits_persist_the_same_way() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), Duration::from_millis(50), CommitPolicy::Tick);
        seed_store(&cfg.store_path, "tick", 7);

        let (tx, _rx) = mpsc::unbounded_channel();
        let summary = run_session(&cfg, sh("tick", "sleep 0.3"), tx).await.unwrap();
        assert!(summary.final_seconds >= 7);
        assert_eq!(stored(&cfg.store_path, "tick"), summary.final_seconds);
    }

    #[tokio::test]
    async fn launch_failure_still_finalizes_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), Duration::from_millis(50), CommitPolicy::Session);
        seed_store(&cfg.store_path, "ghost", 30);

        let runnable = Runnable {
            name: "ghost".into(),
            command: "/definitely/not/a/real/binary".into(),
            args: vec![],
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let summary = run_session(&cfg, runnable, tx).await.unwrap();

        assert!(matches!(summary.launch, Err(RandRunError::Launch { .. })));
        assert!(summary.final_seconds >= 30);
        assert_eq!(stored(&cfg.store_path, "ghost"), summary.final_seconds);

        let mut saw_failure = false;
        let mut saw_finalized = false;
        while let Ok(ev) = rx.try_recv() {
            match ev {
                SessionEvent::LaunchFailed { .. } => saw_failure = true,
                SessionEvent::Finalized { .. } => saw_finalized = true,
                _ => {}
            }
        }
        assert!(saw_failure && saw_finalized);
    }

    #[tokio::test]
    async fn non_zero_exit_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), Duration::from_millis(50), CommitPolicy::Session);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let summary = run_session(&cfg, sh("fails", "exit 4"), tx).await.unwrap();
        assert_eq!(summary.launch.unwrap().code(), Some(4));

        let exited = std::iter::from_fn(|| rx.try_recv().ok()).find_map(|ev| match ev {
            SessionEvent::ProcessExited { success, code } => Some((success, code)),
            _ => None,
        });
        assert_eq!(exited, Some((false, Some(4))));
    }

    #[tokio::test]
    async fn ticks_are_monotonic_and_start_at_the_prior_total() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), Duration::from_millis(100), CommitPolicy::Session);
        seed_store(&cfg.store_path, "mono", 12);

        let (tx, mut rx) = mpsc::unbounded_channel();
        run_session(&cfg, sh("mono", "sleep 1.2"), tx).await.unwrap();

        let ticks: Vec<u64> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|ev| match ev {
                SessionEvent::Tick { seconds } => Some(seconds),
                _ => None,
            })
            .collect();
        assert_eq!(ticks.first(), Some(&12));
        assert!(ticks.windows(2).all(|w| w[1] == w[0] || w[1] == w[0] + 1));
        assert!(matches!(ticks.last().copied(), Some(12..=13)), "{ticks:?}");
    }

    #[tokio::test]
    async fn sub_second_ticks_still_count_whole_seconds() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), Duration::from_millis(100), CommitPolicy::Session);

        let (tx, _rx) = mpsc::unbounded_channel();
        let summary = run_session(&cfg, sh("fast", "sleep 1"), tx).await.unwrap();

        let total = stored(&cfg.store_path, "fast");
        assert!(total <= 1, "stored {total} seconds for a one-second run");
        assert_eq!(summary.final_seconds, total);
    }

    #[tokio::test]
    async fn sub_second_ticks_with_per_tick_commits_count_whole_seconds() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), Duration::from_millis(100), CommitPolicy::Tick);
        seed_store(&cfg.store_path, "fast", 40);

        let (tx, _rx) = mpsc::unbounded_channel();
        run_session(&cfg, sh("fast", "sleep 1"), tx).await.unwrap();

        let total = stored(&cfg.store_path, "fast");
        assert!((40..=41).contains(&total), "stored {total}");
    }

    #[tokio::test]
    async fn interrupt_during_run_still_finalizes() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), Duration::from_millis(100), CommitPolicy::Session);
        seed_store(&cfg.store_path, "hold", 5);

        // The child interrupts this process (its parent) and keeps running.
        let script = "sleep 0.5; kill -INT $PPID; sleep 1";
        let (tx, mut rx) = mpsc::unbounded_channel();
        let summary = run_session(&cfg, sh("hold", script), tx).await.unwrap();

        assert!(summary.launch.unwrap().success());
        let finalized = std::iter::from_fn(|| rx.try_recv().ok()).find_map(|ev| match ev {
            SessionEvent::Finalized { seconds, .. } => Some(seconds),
            _ => None,
        });
        assert_eq!(finalized, Some(summary.final_seconds));
        assert!(summary.final_seconds >= 6, "{}", summary.final_seconds);
        assert_eq!(stored(&cfg.store_path, "hold"), summary.final_seconds);
    }

    #[tokio::test]
    async fn locked_store_fails_before_launching() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), Duration::from_millis(50), CommitPolicy::Session);
        let marker = dir.path().join("launched");

        let mut holder = ElapsedStore::open(&cfg.store_path).unwrap();
        let held = holder.begin_write().unwrap();

        let script = format!("touch {}", marker.display());
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = run_session(&cfg, sh("locked", &script), tx).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<RandRunError>(),
            Some(RandRunError::StoreBusy { .. })
        ));
        assert!(!marker.exists());
        drop(held);
    }

    #[tokio::test]
    async fn random_run_rejects_an_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), Duration::from_millis(50), CommitPolicy::Session);
        let mut rng = registry::seeded_rng(Some(3));

        let (tx, _rx) = mpsc::unbounded_channel();
        let err = random_run(&cfg, &[], &mut rng, tx).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RandRunError>(),
            Some(RandRunError::EmptyRegistry)
        ));
        assert!(!cfg.store_path.exists());
    }

    #[tokio::test]
    async fn random_run_tracks_the_selected_runnable() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), Duration::from_millis(50), CommitPolicy::Session);
        let runnables = vec![sh("only", "exit 0")];
        let mut rng = registry::seeded_rng(Some(3));

        let (tx, _rx) = mpsc::unbounded_channel();
        let summary = random_run(&cfg, &runnables, &mut rng, tx).await.unwrap();
        assert_eq!(summary.runnable.name, "only");
        assert_eq!(stored(&cfg.store_path, "only"), summary.final_seconds);
    }
}
