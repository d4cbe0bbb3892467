//! Concurrent strategy execution
//!
//! Runs every enabled probe in its own tokio task with:
//! - per-probe bounded extraction concurrency
//! - an overall deadline with cooperative cancellation
//! - isolation: a probe that fails or panics contributes an empty entry plus
//!   a recorded failure, never a failed run
//!
//! Probe tasks report through a channel; the collector loop is the only owner
//! of the per-strategy results.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ProbeError;
use crate::probe::{DiscoveredUrl, PageCandidate, Probe, ProbeTarget, StrategyKind};
use crate::progress::{NoOpProgress, ProgressReporter};
use crate::utils::DEFAULT_MAX_CONCURRENT_EXTRACTIONS;

/// Time cancelled probes get to report before their tasks are aborted.
const CANCEL_GRACE: Duration = Duration::from_secs(2);

/// Everything one strategy produced during a run.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyOutcome {
    pub strategy: StrategyKind,
    /// Extracted pages, sorted by canonical key.
    pub candidates: Vec<PageCandidate>,
    pub failures: Vec<ProbeError>,
    /// URLs returned by discovery, before filtering.
    pub discovered: usize,
    /// URLs dropped by the site, section and exclude filters or the page cap.
    pub filtered: usize,
    /// True when the deadline or the caller stopped the strategy early.
    pub cancelled: bool,
}

impl StrategyOutcome {
    #[must_use]
    pub fn empty(strategy: StrategyKind) -> Self {
        Self {
            strategy,
            candidates: Vec::new(),
            failures: Vec::new(),
            discovered: 0,
            filtered: 0,
            cancelled: false,
        }
    }

    /// Outcome holding `candidates`, as if every one was discovered and extracted.
    #[must_use]
    pub fn with_candidates(strategy: StrategyKind, candidates: Vec<PageCandidate>) -> Self {
        let mut outcome = Self::empty(strategy);
        outcome.discovered = candidates.len();
        outcome.candidates = candidates;
        outcome
    }

    #[must_use]
    pub fn with_failure(mut self, failure: ProbeError) -> Self {
        self.failures.push(failure);
        self
    }
}

/// One entry per enabled strategy.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StrategyResults {
    outcomes: BTreeMap<StrategyKind, StrategyOutcome>,
    deadline_exceeded: bool,
}

impl StrategyResults {
    pub fn new(outcomes: impl IntoIterator<Item = StrategyOutcome>) -> Self {
        Self {
            outcomes: outcomes.into_iter().map(|o| (o.strategy, o)).collect(),
            deadline_exceeded: false,
        }
    }

    #[must_use]
    pub fn get(&self, strategy: StrategyKind) -> Option<&StrategyOutcome> {
        self.outcomes.get(&strategy)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StrategyOutcome> {
        self.outcomes.values()
    }

    pub fn strategies(&self) -> Vec<StrategyKind> {
        self.outcomes.keys().copied().collect()
    }

    #[must_use]
    pub fn total_candidates(&self) -> usize {
        self.outcomes.values().map(|o| o.candidates.len()).sum()
    }

    #[must_use]
    pub fn deadline_exceeded(&self) -> bool {
        self.deadline_exceeded
    }

    /// Every failure, tagged with the strategy that recorded it.
    pub fn failures(&self) -> impl Iterator<Item = (StrategyKind, &ProbeError)> {
        self.outcomes
            .values()
            .flat_map(|o| o.failures.iter().map(move |f| (o.strategy, f)))
    }

    /// All candidates, in strategy order then key order.
    #[must_use]
    pub fn into_candidates(self) -> Vec<PageCandidate> {
        self.outcomes
            .into_values()
            .flat_map(|o| o.candidates)
            .collect()
    }
}

/// Messages from probe tasks to the collector loop.
#[derive(Debug)]
enum ProbeEvent {
    Started(StrategyKind),
    Discovered {
        strategy: StrategyKind,
        discovered: usize,
        admitted: usize,
    },
    Candidate {
        strategy: StrategyKind,
        candidate: PageCandidate,
    },
    Failure {
        strategy: StrategyKind,
        error: ProbeError,
    },
    Finished {
        strategy: StrategyKind,
        cancelled: bool,
    },
}

#[derive(Debug, Clone, Copy)]
struct ExtractionLimits {
    max_concurrent: usize,
    max_pages: Option<usize>,
}

/// Runs probes concurrently against one target.
pub struct Orchestrator {
    probes: Vec<Arc<dyn Probe>>,
    limits: ExtractionLimits,
    progress: Arc<dyn ProgressReporter>,
}

impl Orchestrator {
    /// Orchestrator over `probes`; at most one probe per strategy is used.
    pub fn new(probes: Vec<Arc<dyn Probe>>) -> Self {
        Self {
            probes,
            limits: ExtractionLimits {
                max_concurrent: DEFAULT_MAX_CONCURRENT_EXTRACTIONS,
                max_pages: None,
            },
            progress: Arc::new(NoOpProgress),
        }
    }

    #[must_use]
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.limits.max_concurrent = max.max(1);
        self
    }

    #[must_use]
    pub fn with_max_pages(mut self, max: Option<usize>) -> Self {
        self.limits.max_pages = max;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    fn probe_for(&self, strategy: StrategyKind) -> Option<Arc<dyn Probe>> {
        self.probes.iter().find(|p| p.kind() == strategy).cloned()
    }

    /// Run `enabled` strategies until they finish or `deadline` elapses.
    pub async fn run(
        &self,
        target: &ProbeTarget,
        enabled: &[StrategyKind],
        deadline: Duration,
    ) -> StrategyResults {
        self.run_with_cancel(target, enabled, deadline, CancellationToken::new())
            .await
    }

    /// As [`Orchestrator::run`], additionally stopping when `cancel` fires.
    ///
    /// Completed candidates are kept either way; an extraction in flight at
    /// cancellation contributes nothing.
    pub async fn run_with_cancel(
        &self,
        target: &ProbeTarget,
        enabled: &[StrategyKind],
        deadline: Duration,
        cancel: CancellationToken,
    ) -> StrategyResults {
        let token = cancel.child_token();
        let target = Arc::new(target.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut outcomes: BTreeMap<StrategyKind, StrategyOutcome> = BTreeMap::new();
        let mut finished: BTreeMap<StrategyKind, bool> = BTreeMap::new();
        let mut handles = Vec::new();

        for &strategy in enabled {
            if outcomes.contains_key(&strategy) {
                continue;
            }
            let mut outcome = StrategyOutcome::empty(strategy);
            match self.probe_for(strategy) {
                Some(probe) => {
                    let task = run_probe(
                        probe,
                        Arc::clone(&target),
                        self.limits,
                        token.clone(),
                        tx.clone(),
                    );
                    handles.push((strategy, tokio::spawn(task)));
                }
                None => {
                    warn!("No probe registered for enabled strategy {strategy}");
                    outcome.failures.push(ProbeError::unavailable(
                        strategy,
                        "no probe registered for this strategy",
                    ));
                    finished.insert(strategy, true);
                }
            }
            outcomes.insert(strategy, outcome);
        }
        drop(tx);

        let mut deadline_exceeded = false;
        let mut stopping = false;
        let sleep = tokio::time::sleep_until(Instant::now() + deadline);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => self.apply(event, &mut outcomes, &mut finished),
                    None => break,
                },
                () = &mut sleep => {
                    if stopping {
                        warn!("Probes did not stop within {CANCEL_GRACE:?} of cancellation; aborting");
                        break;
                    }
                    warn!("Run deadline of {deadline:?} exceeded; cancelling running strategies");
                    deadline_exceeded = true;
                    stopping = true;
                    token.cancel();
                    sleep.as_mut().reset(Instant::now() + CANCEL_GRACE);
                },
                () = cancel.cancelled(), if !stopping => {
                    info!("Run cancelled by caller");
                    stopping = true;
                    sleep.as_mut().reset(Instant::now() + CANCEL_GRACE);
                },
            }
        }

        // Anything still queued was sent before the tasks stopped.
        while let Ok(event) = rx.try_recv() {
            self.apply(event, &mut outcomes, &mut finished);
        }

        for (strategy, handle) in handles {
            if !handle.is_finished() {
                handle.abort();
            }
            if let Err(e) = handle.await {
                let Some(outcome) = outcomes.get_mut(&strategy) else {
                    continue;
                };
                if e.is_panic() {
                    let reason = panic_message(e);
                    warn!("{strategy} probe panicked: {reason}");
                    outcome.failures.push(ProbeError::TaskFailed { strategy, reason });
                } else {
                    outcome.cancelled = true;
                }
            }
            if !finished.get(&strategy).copied().unwrap_or(false)
                && let Some(outcome) = outcomes.get_mut(&strategy)
                && !outcome.cancelled
                && !outcome
                    .failures
                    .iter()
                    .any(|f| matches!(f, ProbeError::TaskFailed { .. }))
            {
                outcome.failures.push(ProbeError::TaskFailed {
                    strategy,
                    reason: "probe task ended without reporting completion".to_string(),
                });
            }
        }

        for outcome in outcomes.values_mut() {
            outcome
                .candidates
                .sort_by(|a, b| {
                    a.canonical_key()
                        .cmp(b.canonical_key())
                        .then_with(|| a.raw_url().cmp(b.raw_url()))
                });
            self.progress.report_strategy_finished(
                outcome.strategy,
                outcome.candidates.len(),
                outcome.cancelled,
            );
            info!(
                "{} finished: {} candidates, {} failures{}",
                outcome.strategy,
                outcome.candidates.len(),
                outcome.failures.len(),
                if outcome.cancelled { " (cancelled)" } else { "" }
            );
        }

        StrategyResults {
            outcomes,
            deadline_exceeded,
        }
    }

    fn apply(
        &self,
        event: ProbeEvent,
        outcomes: &mut BTreeMap<StrategyKind, StrategyOutcome>,
        finished: &mut BTreeMap<StrategyKind, bool>,
    ) {
        match event {
            ProbeEvent::Started(strategy) => {
                debug!("{strategy} probe started");
                self.progress.report_strategy_started(strategy);
            }
            ProbeEvent::Discovered {
                strategy,
                discovered,
                admitted,
            } => {
                if let Some(outcome) = outcomes.get_mut(&strategy) {
                    outcome.discovered = discovered;
                    outcome.filtered = discovered.saturating_sub(admitted);
                }
                self.progress.report_discovered(strategy, admitted);
            }
            ProbeEvent::Candidate {
                strategy,
                candidate,
            } => {
                self.progress
                    .report_page_extracted(strategy, candidate.raw_url());
                if let Some(outcome) = outcomes.get_mut(&strategy) {
                    outcome.candidates.push(candidate);
                }
            }
            ProbeEvent::Failure { strategy, error } => {
                self.progress
                    .report_extraction_failed(strategy, &error.to_string());
                if let Some(outcome) = outcomes.get_mut(&strategy) {
                    outcome.failures.push(error);
                }
            }
            ProbeEvent::Finished {
                strategy,
                cancelled,
            } => {
                finished.insert(strategy, true);
                if let Some(outcome) = outcomes.get_mut(&strategy) {
                    outcome.cancelled |= cancelled;
                }
            }
        }
    }
}

/// Body of one probe task: discover, filter, then extract with bounded concurrency.
async fn run_probe(
    probe: Arc<dyn Probe>,
    target: Arc<ProbeTarget>,
    limits: ExtractionLimits,
    token: CancellationToken,
    tx: mpsc::UnboundedSender<ProbeEvent>,
) {
    let strategy = probe.kind();
    // Send errors only mean the collector is gone; nothing left to report to.
    let send = |event: ProbeEvent| {
        let _ = tx.send(event);
    };
    send(ProbeEvent::Started(strategy));

    let discovery = tokio::select! {
        biased;
        () = token.cancelled() => {
            send(ProbeEvent::Finished { strategy, cancelled: true });
            return;
        }
        result = probe.discover(&target) => result,
    };

    let discovery = match discovery {
        Ok(discovery) => discovery,
        Err(error) => {
            info!("{strategy} discovery unavailable: {error}");
            send(ProbeEvent::Failure { strategy, error });
            send(ProbeEvent::Finished {
                strategy,
                cancelled: false,
            });
            return;
        }
    };

    let found: Vec<DiscoveredUrl> = discovery.collect();
    let discovered = found.len();
    let mut admitted: Vec<DiscoveredUrl> = found
        .into_iter()
        .filter(|url| target.admits(&url.key))
        .collect();
    if let Some(max) = limits.max_pages
        && admitted.len() > max
    {
        debug!("{strategy}: capping {} URLs at {max}", admitted.len());
        admitted.truncate(max);
    }
    debug!("{strategy}: {discovered} discovered, {} admitted", admitted.len());
    send(ProbeEvent::Discovered {
        strategy,
        discovered,
        admitted: admitted.len(),
    });

    let probe_ref = &*probe;
    let target_ref = &*target;
    let mut extractions = futures::stream::iter(admitted)
        .map(move |url| async move {
            let result = probe_ref.extract(target_ref, &url).await;
            (url, result)
        })
        .buffer_unordered(limits.max_concurrent);

    let mut cancelled = false;
    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => {
                cancelled = true;
                break;
            }
            next = extractions.next() => match next {
                Some((_, Ok(candidate))) => send(ProbeEvent::Candidate { strategy, candidate }),
                Some((url, Err(error))) => {
                    debug!("{strategy}: extraction failed for {}: {error}", url.raw_url);
                    send(ProbeEvent::Failure { strategy, error });
                }
                None => break,
            },
        }
    }

    send(ProbeEvent::Finished {
        strategy,
        cancelled,
    });
}

fn panic_message(err: JoinError) -> String {
    let payload = err.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "probe panicked".to_string()
    }
}
