//! 🎬 *[a timer fires. a multi-search leaves the building. it may or may not come back.]*
//!
//! 🔎 The DedupQueryWorker runs [`DedupQueryManager::run_query_round`] once per query
//! interval until its cancellation token fires. A round that errors is logged and
//! forgotten; the next one starts on schedule. The loop only checks for cancellation
//! between rounds, so a search already on the wire is allowed to finish.
//!
//! 🦆 (the duck has no comment at this time)

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::Worker;
use crate::common::Releasable;
use crate::dedup::DedupQueryManager;
use crate::errors::Result;

/// 🔁 Drives dedup query rounds on a fixed interval.
#[derive(Debug)]
pub(crate) struct DedupQueryWorker<W: Releasable> {
    manager: Arc<DedupQueryManager<W>>,
    cancel: CancellationToken,
}

impl<W: Releasable> DedupQueryWorker<W> {
    pub(crate) fn new(manager: Arc<DedupQueryManager<W>>, cancel: CancellationToken) -> Self {
        Self { manager, cancel }
    }
}

impl<W: Releasable> Worker for DedupQueryWorker<W> {
    fn start(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            let interval = self.manager.query_interval();
            debug!(?interval, field = self.manager.query_field(), "🔎 DedupQueryWorker started");
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                if let Err(e) = self.manager.run_query_round().await {
                    error!(error = %e, "💀 dedup query round failed, trying again next interval");
                }
            }
            debug!("🏁 DedupQueryWorker: cancelled. Shutting down.");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::in_mem::{InMemoryCluster, api_error};
    use crate::common::{CountingAcknowledgement, Hit};
    use crate::dedup::DedupConfig;
    use crate::metrics::InMemoryMetrics;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn the_one_where_the_worker_shrugs_off_a_bad_round_and_finds_the_duplicate_later() {
        let cluster = Arc::new(InMemoryCluster::new());
        cluster.index_document("idx", json!({"id": "abc"}));
        cluster.fail_next("multi_search", api_error(503, "unavailable", "not now"));
        let manager = Arc::new(
            DedupQueryManager::<Hit>::new(
                cluster.clone(),
                Arc::new(InMemoryMetrics::default()),
                &DedupConfig::for_field("id"),
                CancellationToken::new(),
            )
            .expect("valid config"),
        );
        let ack = Arc::new(CountingAcknowledgement::default());
        manager
            .add_entry(Hit::new(json!({"id": "abc"})).with_acknowledgement(ack.clone()), "idx", "abc")
            .await;

        let cancel = CancellationToken::new();
        let handle = DedupQueryWorker::new(manager.clone(), cancel.clone()).start();

        tokio::time::sleep(Duration::from_secs(21)).await;
        assert_eq!(ack.duplicates(), 0, "first round failed, nothing should be decided");

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(ack.duplicates(), 1);

        cancel.cancel();
        handle
            .await
            .expect("worker task panicked")
            .expect("worker should exit cleanly");
        assert_eq!(cluster.count_calls("multi_search"), 2);
    }
}
