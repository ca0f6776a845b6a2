//! The single-threaded serialization point every DRM-touching call hops
//! through (§5).
//!
//! `MainThread` is the Rust stand-in for Rialto's process-wide main thread:
//! a dedicated OS thread draining an unbounded queue of boxed closures in
//! enqueue order. Two submission modes mirror the original `IMainThread`
//! contract:
//!
//! - [`MainThread::enqueue_task`] — fire-and-forget, used to deliver DRM
//!   callbacks (they may originate on native threads and must never block
//!   the caller or deadlock against an in-flight `enqueue_task_and_wait`).
//! - [`MainThread::enqueue_task_and_wait`] — blocks the caller until the
//!   task has run on the Main Thread, used for every outbound DRM call.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A shared handle to a running [`MainThread`].
///
/// Cloneable/`Arc`-wrapped so every `MediaKeys`/`KeySession` can hold a
/// reference without owning the worker thread.
pub type MainThreadHandle = Arc<MainThread>;

/// The process-wide serialized task queue.
///
/// Dropping every `MainThreadHandle` closes the channel, which lets the
/// worker thread drain remaining jobs and exit.
pub struct MainThread {
    sender: mpsc::UnboundedSender<Job>,
    next_client_id: AtomicU32,
    worker: Option<JoinHandle<()>>,
}

impl MainThread {
    /// Spawns the worker thread and returns a shared handle to it.
    pub fn new() -> MainThreadHandle {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();

        let worker = std::thread::Builder::new()
            .name("rialto-cdm-main".to_string())
            .spawn(move || {
                while let Some(job) = receiver.blocking_recv() {
                    job();
                }
            })
            .expect("failed to spawn the CDM main thread");

        Arc::new(Self {
            sender,
            next_client_id: AtomicU32::new(0),
            worker: Some(worker),
        })
    }

    /// Registers a new client of the Main Thread (a `MediaKeys` or
    /// `KeySession` instance) and returns its id. The id has no meaning
    /// beyond bookkeeping parity with the original `registerClient` API;
    /// nothing on the Rust side keys off it.
    pub fn register_client(&self) -> u32 {
        self.next_client_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Unregisters a client previously returned by [`register_client`](Self::register_client).
    pub fn unregister_client(&self, _client_id: u32) {}

    /// Enqueues `task` without waiting for it to run. Used to deliver
    /// callbacks that originate on native DRM threads.
    pub fn enqueue_task<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.sender.send(Box::new(task)).is_err() {
            tracing::error!("Main Thread is gone, dropping enqueued task");
        }
    }

    /// Enqueues `task` and blocks the calling thread until it has run on
    /// the Main Thread, returning its result.
    ///
    /// # Panics
    ///
    /// Panics if the Main Thread has shut down before the task could be
    /// run — this mirrors the original's assumption that the Main Thread
    /// outlives every caller.
    pub fn enqueue_task_and_wait<F, R>(&self, task: F) -> R
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job = move || {
            let result = task();
            let _ = reply_tx.send(result);
        };
        self.sender
            .send(Box::new(job))
            .expect("Main Thread is gone");
        reply_rx
            .blocking_recv()
            .expect("Main Thread dropped the reply channel")
    }
}

impl Drop for MainThread {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl std::fmt::Debug for MainThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainThread").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn enqueue_task_and_wait_returns_the_result() {
        let main_thread = MainThread::new();
        let result = main_thread.enqueue_task_and_wait(|| 2 + 2);
        assert_eq!(result, 4);
    }

    #[test]
    fn tasks_run_in_enqueue_order() {
        let main_thread = MainThread::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        for i in 0..10 {
            let order = Arc::clone(&order);
            let _: i32 = main_thread.enqueue_task_and_wait(move || {
                order.lock().unwrap().push(i);
                i
            });
        }

        assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn enqueue_task_is_fire_and_forget_but_still_ordered() {
        let main_thread = MainThread::new();
        let counter = Arc::new(AtomicI32::new(0));

        for _ in 0..50 {
            let counter = Arc::clone(&counter);
            main_thread.enqueue_task(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        // Drain with a synchronous barrier task.
        main_thread.enqueue_task_and_wait(|| {});
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn client_registration_hands_out_unique_ids() {
        let main_thread = MainThread::new();
        let a = main_thread.register_client();
        let b = main_thread.register_client();
        assert_ne!(a, b);
        main_thread.unregister_client(a);
        main_thread.unregister_client(b);
    }
}
