//! Completion worker pool.

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

use parking_lot::Mutex;

type Job = Box<dyn FnOnce() + Send>;

/// Fixed-size pool of threads that run future completions.
///
/// Socket and timer threads hand continuations here instead of resolving
/// futures themselves, so a caller blocked on a future never runs on (or
/// blocks) a transport thread.
pub struct CompletionPool {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    handles: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl CompletionPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let mut handles = Vec::with_capacity(size);
        for worker in 0..size {
            let receiver = receiver.clone();
            handles.push(thread::spawn(move || {
                loop {
                    let job = {
                        let receiver = receiver.lock();
                        receiver.recv()
                    };
                    match job {
                        Ok(job) => job(),
                        Err(_) => break,
                    }
                }
                tracing::trace!(worker, "completion worker exited");
            }));
        }

        Self {
            sender: Mutex::new(Some(sender)),
            handles: Mutex::new(handles),
        }
    }

    /// Queue a continuation. After shutdown the job runs inline; by then
    /// only teardown completions remain.
    pub fn execute(&self, job: Job) {
        let job = {
            let sender = self.sender.lock();
            match sender.as_ref() {
                Some(s) => match s.send(job) {
                    Ok(()) => return,
                    Err(mpsc::SendError(job)) => job,
                },
                None => job,
            }
        };
        job();
    }

    /// Drop the feed and join the workers; queued jobs drain first.
    pub fn shutdown(&self) {
        self.sender.lock().take();
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            let _ = handle.join();
        }
    }
}
