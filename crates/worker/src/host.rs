use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError, channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::WorkerConfig;
use crate::protocol::{JobResponse, Message, PathWorker};
use crate::stats::WorkerStats;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("worker thread has stopped")]
    Disconnected,
    #[error("timed out waiting for a response")]
    Timeout,
    #[error("worker thread panicked")]
    Panicked,
}

/// A path worker running on its own thread.
///
/// Messages go in through [`WorkerHandle::post`]; responses come back in the order their
/// jobs were posted. The thread owns all search state; only messages cross the boundary.
#[derive(Debug)]
pub struct WorkerHandle {
    inbound: Option<Sender<Message>>,
    outbound: Receiver<JobResponse>,
    thread: Option<JoinHandle<WorkerStats>>,
}

impl WorkerHandle {
    pub fn spawn(config: WorkerConfig) -> Result<Self, HostError> {
        let (inbound_tx, inbound_rx) = channel::<Message>();
        let (outbound_tx, outbound_rx) = channel::<JobResponse>();

        let thread = thread::Builder::new()
            .name("voxpath-worker".into())
            .spawn(move || {
                let mut worker = PathWorker::new(&config);
                while let Ok(message) = inbound_rx.recv() {
                    if let Some(response) = worker.handle(message) {
                        if outbound_tx.send(response).is_err() {
                            tracing::debug!("response receiver dropped, worker stopping");
                            break;
                        }
                    }
                }
                worker.into_stats()
            })?;

        Ok(Self {
            inbound: Some(inbound_tx),
            outbound: outbound_rx,
            thread: Some(thread),
        })
    }

    /// Queue a message for the worker.
    pub fn post(&self, message: Message) -> Result<(), HostError> {
        self.inbound
            .as_ref()
            .ok_or(HostError::Disconnected)?
            .send(message)
            .map_err(|_| HostError::Disconnected)
    }

    /// Block until the next response arrives.
    pub fn recv(&self) -> Result<JobResponse, HostError> {
        self.outbound.recv().map_err(|_| HostError::Disconnected)
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<JobResponse, HostError> {
        self.outbound.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => HostError::Timeout,
            RecvTimeoutError::Disconnected => HostError::Disconnected,
        })
    }

    /// The next response if one is ready.
    pub fn try_recv(&self) -> Result<Option<JobResponse>, HostError> {
        match self.outbound.try_recv() {
            Ok(response) => Ok(Some(response)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(HostError::Disconnected),
        }
    }

    /// Close the inbound channel, let queued jobs finish, and collect the worker's stats.
    /// Responses still unread are discarded.
    pub fn shutdown(mut self) -> Result<WorkerStats, HostError> {
        self.inbound.take();
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| HostError::Panicked),
            None => Err(HostError::Disconnected),
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.inbound.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
