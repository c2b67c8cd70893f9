//! Serial execution context for media reads.
//!
//! Opening and starting decoders is funnelled through one thread so that no two
//! readers are ever set up concurrently. Callers block until their closure has run.

use std::thread;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};

type ReadJob = Box<dyn FnOnce() + Send + 'static>;

/// Cloneable handle to the read thread.
#[derive(Clone, Debug)]
pub struct ReadQueue {
    tx: Sender<ReadJob>,
}

impl ReadQueue {
    /// Spawn the read thread. It exits once every handle has been dropped.
    pub fn new() -> Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded::<ReadJob>();
        thread::Builder::new()
            .name("wavechunk-read".to_string())
            .spawn(move || read_thread_main(rx))
            .context("spawn read thread")?;
        Ok(Self { tx })
    }

    /// Run `f` on the read thread and wait for its result.
    ///
    /// Returns `None` if the read thread has gone away.
    pub fn run_sync<R, F>(&self, f: F) -> Option<R>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        let job: ReadJob = Box::new(move || {
            let _ = reply_tx.send(f());
        });
        if self.tx.send(job).is_err() {
            tracing::warn!("read thread unavailable");
            return None;
        }
        reply_rx.recv().ok()
    }
}

fn read_thread_main(rx: Receiver<ReadJob>) {
    while let Ok(job) = rx.recv() {
        job();
    }
    tracing::debug!("read thread exiting");
}
