// Disk Scheduler
//
// A single background worker drains a FIFO queue of page I/O requests and
// executes them against the disk manager. Requests for the same page keep
// their submission order because there is exactly one worker.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, warn};
use parking_lot::Mutex;

use crate::common::types::{PageId, PagePtr, PAGE_SIZE};
use crate::storage::disk::DiskManager;

/// A single I/O request. The `done` channel is fulfilled exactly once with
/// the outcome of the operation.
pub enum DiskRequest {
    Read {
        page_id: PageId,
        page: PagePtr,
        done: Sender<bool>,
    },
    Write {
        page_id: PageId,
        data: Box<[u8; PAGE_SIZE]>,
        done: Sender<bool>,
    },
}

/// Disk scheduler: non-blocking submission, one dedicated worker thread.
pub struct DiskScheduler {
    sender: Mutex<Sender<Option<DiskRequest>>>,
    worker: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = channel::<Option<DiskRequest>>();
        let worker = thread::spawn(move || Self::worker_loop(disk_manager, receiver));
        Self {
            sender: Mutex::new(sender),
            worker: Some(worker),
        }
    }

    /// Submit a request. Never blocks; completion is awaited on the
    /// request's `done` receiver.
    pub fn schedule(&self, request: DiskRequest) {
        // A send failure means the worker is gone, which only happens on
        // shutdown; the completion handle is dropped and waiters observe a
        // disconnect instead of a result.
        let _ = self.sender.lock().send(Some(request));
    }

    /// Create a completion handle pair for a request.
    pub fn create_promise() -> (Sender<bool>, Receiver<bool>) {
        channel()
    }

    fn worker_loop(disk_manager: Arc<DiskManager>, receiver: Receiver<Option<DiskRequest>>) {
        debug!("disk scheduler worker started");
        while let Ok(Some(request)) = receiver.recv() {
            match request {
                DiskRequest::Read {
                    page_id,
                    page,
                    done,
                } => {
                    let mut buffer = [0u8; PAGE_SIZE];
                    let ok = match disk_manager.read_page(page_id, &mut buffer) {
                        Ok(()) => {
                            let mut guard = page.write();
                            guard.data = buffer;
                            guard.page_id = page_id;
                            true
                        }
                        Err(e) => {
                            warn!("disk read of page {} failed: {}", page_id, e);
                            false
                        }
                    };
                    let _ = done.send(ok);
                }
                DiskRequest::Write {
                    page_id,
                    data,
                    done,
                } => {
                    let ok = match disk_manager.write_page(page_id, &data) {
                        Ok(()) => true,
                        Err(e) => {
                            warn!("disk write of page {} failed: {}", page_id, e);
                            false
                        }
                    };
                    let _ = done.send(ok);
                }
            }
        }
        debug!("disk scheduler worker stopped");
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        // Poison sentinel, then wait for the worker to drain the queue.
        let _ = self.sender.lock().send(None);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
