//! Background execution of long operations
//!
//! A job runs on its own thread and talks to the foreground only through a
//! channel: progress events while it runs, then exactly one `Finished`
//! carrying the result. The foreground cancels through the shared
//! [`CancelFlag`].

use crate::core::error::{IndexError, Result};
use crate::core::observer::{CancelFlag, ScanObserver};
use crate::duplicate::{DuplicateFinder, DuplicateMatch, ScanStats};
use crate::index::{build_destination_index, ComposeOptions};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::debug;
use serde::Serialize;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Message from a worker to the foreground
#[derive(Debug)]
pub enum WorkerEvent<T> {
    Progress { stage: String, detail: String },
    Finished(Result<T>),
}

/// Observer handed to the job; forwards progress into the channel
struct ChannelObserver<T> {
    events: Sender<WorkerEvent<T>>,
    cancel: CancelFlag,
}

impl<T> ScanObserver for ChannelObserver<T> {
    fn report_progress(&self, stage: &str, detail: &str) {
        // The foreground may have stopped listening; progress is best-effort
        let _ = self.events.send(WorkerEvent::Progress {
            stage: stage.to_string(),
            detail: detail.to_string(),
        });
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_set()
    }
}

/// Handle to a job running on a background thread
pub struct WorkerHandle<T> {
    events: Receiver<WorkerEvent<T>>,
    cancel: CancelFlag,
    thread: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> WorkerHandle<T> {
    /// Run `job` on a new thread
    pub fn spawn<F>(cancel: CancelFlag, job: F) -> Self
    where
        F: FnOnce(&dyn ScanObserver) -> Result<T> + Send + 'static,
    {
        let (tx, rx) = unbounded();
        let observer = ChannelObserver {
            events: tx.clone(),
            cancel: cancel.clone(),
        };

        let thread = thread::spawn(move || {
            let result = job(&observer);
            let _ = tx.send(WorkerEvent::Finished(result));
        });

        Self {
            events: rx,
            cancel,
            thread: Some(thread),
        }
    }

    /// Ask the job to stop at its next checkpoint
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Next event, waiting at most `timeout`
    ///
    /// Returns `None` on timeout. A worker that died without reporting
    /// yields a `Finished` error.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<WorkerEvent<T>> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(WorkerEvent::Finished(Err(
                IndexError::WorkerFailed("worker exited without a result".into()),
            ))),
        }
    }

    /// Block until the job finishes, passing progress to `on_progress`
    pub fn wait_with<P>(mut self, mut on_progress: P) -> Result<T>
    where
        P: FnMut(&str, &str),
    {
        let outcome = loop {
            match self.events.recv() {
                Ok(WorkerEvent::Progress { stage, detail }) => on_progress(&stage, &detail),
                Ok(WorkerEvent::Finished(result)) => break result,
                Err(_) => {
                    break Err(IndexError::WorkerFailed(
                        "worker exited without a result".into(),
                    ))
                }
            }
        };

        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                debug!("Worker thread panicked after sending its result");
            }
        }
        outcome
    }

    /// Block until the job finishes, ignoring progress
    pub fn wait(self) -> Result<T> {
        self.wait_with(|_, _| {})
    }
}

/// Everything a duplicate scan produces
#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    pub matches: Vec<DuplicateMatch>,
    pub stats: ScanStats,
    /// Files in the combined destination index
    pub destination_files: usize,
}

/// Compose the destination index and scan `source` against it in the background
pub fn spawn_duplicate_scan(
    source: PathBuf,
    destinations: Vec<PathBuf>,
    options: ComposeOptions,
    cancel: CancelFlag,
) -> WorkerHandle<ScanOutcome> {
    WorkerHandle::spawn(cancel, move |observer| {
        let index = build_destination_index(&destinations, &options, observer)?;
        let mut finder = DuplicateFinder::new(&index);
        let matches = finder.find(&source, observer)?;
        Ok(ScanOutcome {
            matches,
            stats: finder.stats().clone(),
            destination_files: index.len(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{caf_path_for, HashAlgorithm, HashMode};
    use std::fs;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_result_and_progress_arrive() {
        let handle = WorkerHandle::spawn(CancelFlag::new(), |observer| {
            observer.report_progress("Phase", "one");
            observer.report_progress("Phase", "two");
            Ok(42)
        });

        let mut seen = Vec::new();
        let value = handle.wait_with(|_, detail| seen.push(detail.to_string())).unwrap();
        assert_eq!(value, 42);
        assert_eq!(seen, vec!["one", "two"]);
    }

    #[test]
    fn test_cancel_reaches_job() {
        let started = Arc::new(AtomicBool::new(false));
        let started_in_job = Arc::clone(&started);
        let handle = WorkerHandle::spawn(CancelFlag::new(), move |observer| {
            started_in_job.store(true, Ordering::SeqCst);
            while !observer.is_cancelled() {
                thread::sleep(Duration::from_millis(1));
            }
            Err::<(), _>(IndexError::Cancelled)
        });

        while !started.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(1));
        }
        handle.cancel();
        assert!(matches!(handle.wait(), Err(IndexError::Cancelled)));
    }

    #[test]
    fn test_panicking_job_is_reported() {
        let handle: WorkerHandle<()> = WorkerHandle::spawn(CancelFlag::new(), |_| {
            panic!("boom");
        });
        assert!(matches!(handle.wait(), Err(IndexError::WorkerFailed(_))));
    }

    #[test]
    fn test_duplicate_scan_end_to_end() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("incoming");
        let dest_a = dir.path().join("archive_a");
        let dest_b = dir.path().join("archive_b");
        for (folder, name, content) in [
            (&source, "photo.jpg", &b"jpeg data"[..]),
            (&source, "new.txt", &b"brand new"[..]),
            (&dest_a, "old/photo_copy.jpg", &b"jpeg data"[..]),
            (&dest_b, "photo.jpg", &b"jpeg data"[..]),
        ] {
            let path = folder.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        let mode = HashMode::On(HashAlgorithm::Sha1);
        let handle = spawn_duplicate_scan(
            source.clone(),
            vec![dest_a.clone(), dest_b.clone()],
            ComposeOptions::new(mode),
            CancelFlag::new(),
        );
        let outcome = handle.wait().unwrap();

        assert_eq!(outcome.destination_files, 2);
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].source, source.join("photo.jpg"));
        assert_eq!(outcome.matches[0].destinations.len(), 2);
        assert_eq!(outcome.stats.files_considered, 2);
        assert!(caf_path_for(&dest_a, mode).is_file());
    }
}
