use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use uuid::Uuid;

use crate::notes::{Job, JobOutput};
use crate::remote::{RemoteError, RemoteStore};

pub type Ticket = Uuid;

#[derive(Debug)]
pub struct Completion {
    pub ticket: Ticket,
    pub job: Job,
    pub result: Result<JobOutput, RemoteError>,
    pub elapsed: Duration,
}

struct Submission {
    ticket: Ticket,
    job: Job,
}

/// Runs jobs against the remote store on a small pool of worker threads.
///
/// Completions come back in whatever order the remote answers; nothing is
/// cancelled or coalesced.
pub struct Dispatcher {
    jobs: Option<Sender<Submission>>,
    completions: Receiver<Completion>,
    workers: Vec<JoinHandle<()>>,
    in_flight: usize,
}

impl Dispatcher {
    pub fn spawn(remote: Arc<dyn RemoteStore>, workers: usize) -> Result<Self> {
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<Submission>();
        let (done_tx, done_rx) = crossbeam_channel::unbounded::<Completion>();
        let mut handles = Vec::with_capacity(workers.max(1));
        for index in 0..workers.max(1) {
            let remote = Arc::clone(&remote);
            let jobs = job_rx.clone();
            let done = done_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("notedeck-worker-{index}"))
                .spawn(move || worker_loop(remote.as_ref(), jobs, done))
                .with_context(|| format!("spawning dispatcher worker {index}"))?;
            handles.push(handle);
        }
        tracing::debug!(workers = handles.len(), "dispatcher started");
        Ok(Self {
            jobs: Some(job_tx),
            completions: done_rx,
            workers: handles,
            in_flight: 0,
        })
    }

    pub fn submit(&mut self, job: Job) -> Result<Ticket> {
        let ticket = Uuid::new_v4();
        let sender = self.jobs.as_ref().context("dispatcher already shut down")?;
        tracing::debug!(%ticket, job = job.label(), "job submitted");
        sender
            .send(Submission { ticket, job })
            .context("dispatcher workers are gone")?;
        self.in_flight += 1;
        Ok(ticket)
    }

    pub fn try_next(&mut self) -> Option<Completion> {
        match self.completions.try_recv() {
            Ok(completion) => Some(self.settle(completion)),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn next_timeout(&mut self, timeout: Duration) -> Option<Completion> {
        match self.completions.recv_timeout(timeout) {
            Ok(completion) => Some(self.settle(completion)),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight == 0
    }

    fn settle(&mut self, completion: Completion) -> Completion {
        self.in_flight = self.in_flight.saturating_sub(1);
        completion
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.jobs.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("dispatcher worker panicked");
            }
        }
    }
}

fn worker_loop(remote: &dyn RemoteStore, jobs: Receiver<Submission>, done: Sender<Completion>) {
    for Submission { ticket, job } in jobs.iter() {
        let started = Instant::now();
        let result = job.run(remote);
        let elapsed = started.elapsed();
        tracing::debug!(
            %ticket,
            job = job.label(),
            ok = result.is_ok(),
            elapsed_ms = elapsed.as_millis() as u64,
            "job finished"
        );
        let completion = Completion {
            ticket,
            job,
            result,
            elapsed,
        };
        if done.send(completion).is_err() {
            break;
        }
    }
}
