use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::candidates::CandidateStrategy;
use crate::error::{BocmError, Result};
use crate::transport::Transport;

const BATCH_SIZE: usize = 100;
const MAX_WORKERS: usize = 50;
const PROBE_TIMEOUT_MS: u64 = 2000;
const BATCH_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, Clone)]
pub struct ResolverOptions {
    pub batch_size: usize,
    pub max_workers: usize,
    pub probe_timeout: Duration,
    pub batch_timeout: Duration,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            batch_size: BATCH_SIZE,
            max_workers: MAX_WORKERS,
            probe_timeout: Duration::from_millis(PROBE_TIMEOUT_MS),
            batch_timeout: Duration::from_secs(BATCH_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found { url: String, probed: usize },
    NotFound { probed: usize },
}

/// Probe candidates batch by batch, in order, and return the first URL that
/// answers 200.
///
/// A batch is only dispatched once every earlier batch came back empty, so a
/// hit in batch N means nothing from batch N+1 was ever requested. Within a
/// batch the winner is whichever probe lands first. Probe errors count as a
/// miss for that URL.
pub async fn resolve(
    transport: Arc<dyn Transport>,
    candidates: &[String],
    options: &ResolverOptions,
) -> Resolution {
    let found = Arc::new(AtomicBool::new(false));
    let semaphore = Arc::new(Semaphore::new(options.max_workers.max(1)));
    let mut probed = 0usize;

    for (batch_no, batch) in candidates.chunks(options.batch_size.max(1)).enumerate() {
        if found.load(Ordering::Acquire) {
            break;
        }

        let mut set = JoinSet::new();
        for url in batch {
            let transport = Arc::clone(&transport);
            let semaphore = Arc::clone(&semaphore);
            let found = Arc::clone(&found);
            let url = url.clone();
            let timeout = options.probe_timeout;

            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                if found.load(Ordering::Acquire) {
                    return None;
                }
                match transport.probe(&url, timeout).await {
                    Ok(200) => {
                        // Only the first success claims the flag.
                        found
                            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                            .ok()
                            .map(|_| url)
                    }
                    Ok(_) => None,
                    Err(e) => {
                        debug!(url = %url, error = %e, "probe failed");
                        None
                    }
                }
            });
        }
        probed += batch.len();

        let hit = tokio::time::timeout(options.batch_timeout, async {
            while let Some(joined) = set.join_next().await {
                if let Ok(Some(url)) = joined {
                    return Some(url);
                }
            }
            None
        })
        .await;

        match hit {
            Ok(Some(url)) => {
                set.abort_all();
                return Resolution::Found { url, probed };
            }
            Ok(None) => {}
            Err(_) => {
                warn!(batch = batch_no, "batch timed out, abandoning stragglers");
                if let Some(url) = abandon(set).await {
                    return Resolution::Found { url, probed };
                }
            }
        }
    }

    Resolution::NotFound { probed }
}

/// Abort what is still running, keeping any hit that already finished but
/// was not collected before the deadline.
async fn abandon(mut set: JoinSet<Option<String>>) -> Option<String> {
    set.abort_all();
    let mut hit = None;
    while let Some(joined) = set.join_next().await {
        if let Ok(Some(url)) = joined {
            hit.get_or_insert(url);
        }
    }
    hit
}

/// Ties a candidate strategy to a transport and reports the outcome for one date.
pub struct SummaryLocator {
    strategy: Box<dyn CandidateStrategy>,
    transport: Arc<dyn Transport>,
    options: ResolverOptions,
}

impl SummaryLocator {
    pub fn new(
        strategy: Box<dyn CandidateStrategy>,
        transport: Arc<dyn Transport>,
        options: ResolverOptions,
    ) -> Self {
        Self {
            strategy,
            transport,
            options,
        }
    }

    /// Resolve the summary URL, or `BocmError::NotFound` once the bounded set
    /// is exhausted.
    pub async fn locate(&self, date: NaiveDate) -> Result<String> {
        let candidates = self.strategy.candidates(date);
        debug!(
            date = %date,
            first = ?candidates.iter().take(5).collect::<Vec<_>>(),
            "candidate summary URLs"
        );

        let start = Instant::now();
        match resolve(Arc::clone(&self.transport), &candidates, &self.options).await {
            Resolution::Found { url, probed } => {
                info!(
                    date = %date,
                    url = %url,
                    probed,
                    "summary found in {:.1}s",
                    start.elapsed().as_secs_f64()
                );
                Ok(url)
            }
            Resolution::NotFound { probed } => {
                info!(
                    date = %date,
                    probed,
                    "no summary after {:.1}s",
                    start.elapsed().as_secs_f64()
                );
                Err(BocmError::NotFound { date })
            }
        }
    }
}
