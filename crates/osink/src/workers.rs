//! 🧵 Workers: background loops that keep going while the write path does its thing.
//!
//! There is exactly one of them so far, the dedup query worker, and it would like you to
//! know it has never once crashed the process over a failed search. It logs, it naps, it
//! tries again.
//!
//! ⚠️ "If you're reading this, the code review went poorly."

use tokio::task::JoinHandle;

use crate::errors::Result;

mod dedup_query_worker;
pub(crate) use dedup_query_worker::DedupQueryWorker;

/// 🏗️ A background worker, that does work. duh.
///
/// Consumes itself on start and hands back the task, so whoever started it can await the
/// clean exit after cancelling.
pub trait Worker {
    fn start(self) -> JoinHandle<Result<()>>;
}
