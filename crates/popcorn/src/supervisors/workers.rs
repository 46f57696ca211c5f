//! 🧵 Workers: the ones who actually do the work while the Supervisor takes all
//! the credit in the sprint retro.
//!
//! 🍿 There is exactly one kind right now, the enrichment worker, and exactly
//! one of it per process. Prefetch is 1, the worker is 1, and the number of
//! series being written at any moment is at most 1. Nobody races anybody.
//!
//! ⚠️ "If you're reading this, the code review went poorly."

use anyhow::Result;
use tokio::task::JoinHandle;

mod enrichment_worker;
pub(crate) use enrichment_worker::EnrichmentWorker;

use crate::report::WorkerReport;

/// 🏗️ A background worker, that does work. duh.
///
/// `start` spawns it and hands back the handle. The report comes out the other
/// end once the worker decides it is done (source closed, or told to stop).
pub(crate) trait Worker {
    fn start(self) -> JoinHandle<Result<WorkerReport>>;
}
