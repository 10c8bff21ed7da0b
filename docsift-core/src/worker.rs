//! Extraction workers draining a scan queue.

use crate::error::QueueError;
use crate::extractor::Extractor;
use crate::queue::DocumentQueue;
use crate::types::Document;
use serde::Serialize;
use std::ops::AddAssign;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    pub extracted: usize,
    pub failed: usize,
}

impl AddAssign for WorkerReport {
    fn add_assign(&mut self, other: Self) {
        self.extracted += other.extracted;
        self.failed += other.failed;
    }
}

/// Pops entries until the queue reports end of stream. A file that fails
/// to extract is counted and skipped; it never stops the worker.
pub struct ExtractionWorker<'a> {
    id: usize,
    extractor: &'a Extractor,
    queue: &'a dyn DocumentQueue,
}

impl<'a> ExtractionWorker<'a> {
    pub fn new(id: usize, extractor: &'a Extractor, queue: &'a dyn DocumentQueue) -> Self {
        Self {
            id,
            extractor,
            queue,
        }
    }

    /// Drain the queue, handing each Document to `sink`.
    pub fn run<F>(&self, mut sink: F) -> Result<WorkerReport, QueueError>
    where
        F: FnMut(Document),
    {
        let mut report = WorkerReport::default();
        while let Some(entry) = self.queue.pop()? {
            debug!("Worker {} extracting {}", self.id, entry.path.display());
            match self.extractor.parse(&entry.path) {
                Some(document) => {
                    report.extracted += 1;
                    sink(document);
                }
                None => report.failed += 1,
            }
        }
        debug!(
            "Worker {} done: {} extracted, {} failed",
            self.id, report.extracted, report.failed
        );
        Ok(report)
    }
}

/// Run `workers` threads over `queue` until it is closed and drained.
///
/// `sink` is shared by all workers, so it must be thread-safe.
pub fn run_pool<F>(
    extractor: &Extractor,
    queue: &dyn DocumentQueue,
    workers: usize,
    sink: F,
) -> Result<WorkerReport, QueueError>
where
    F: Fn(Document) + Sync,
{
    let workers = workers.max(1);
    let sink = &sink;

    let results: Vec<Result<WorkerReport, QueueError>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|id| {
                scope.spawn(move || ExtractionWorker::new(id, extractor, queue).run(sink))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    });

    let mut total = WorkerReport::default();
    for result in results {
        total += result?;
    }
    info!(
        "Extraction pool finished on {}: {} extracted, {} failed",
        queue.name(),
        total.extracted,
        total.failed
    );
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use crate::language::NoopDetector;
    use crate::queue::MemoryQueue;
    use crate::types::{ScanQueueEntry, User};
    use parking_lot::Mutex;

    #[test]
    fn test_pool_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let user = User::new("alice");
        let queue = MemoryQueue::new("q", 0);
        for n in 0..5 {
            let path = dir.path().join(format!("{n}.txt"));
            std::fs::write(&path, format!("document {n}")).unwrap();
            queue.push(ScanQueueEntry::new(path, &user)).unwrap();
        }
        queue
            .push(ScanQueueEntry::new(dir.path().join("missing.txt"), &user))
            .unwrap();
        queue.close().unwrap();

        let extractor = Extractor::builder(ExtractionConfig::default())
            .detector(NoopDetector)
            .build()
            .unwrap();
        let documents = Mutex::new(Vec::new());
        let report = run_pool(&extractor, &queue, 3, |document| {
            documents.lock().push(document)
        })
        .unwrap();

        assert_eq!(report, WorkerReport { extracted: 5, failed: 1 });
        assert_eq!(documents.lock().len(), 5);
    }
}
