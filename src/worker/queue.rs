//! Scan job queues
//!
//! Grid mode uses one [`JobQueue`] shared by all workers; spawn-scan mode
//! gives every worker a private one. Either way a worker only sees a
//! [`JobSource`], so the retry/backoff logic is identical in both modes.
//!
//! Queues are unbounded: an overseer enqueues one full coverage pass (or one
//! spawn at a time) and never waits on workers.

use crate::geo::Location;
use crossbeam_channel::{unbounded, Receiver, Sender};

/// One unit of scan work
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanJob {
    /// 1-based step index within the current pass
    pub step: usize,

    /// Where to scan
    pub location: Location,

    /// Scheduled seconds past the hour (spawn-scan mode only)
    pub spawn_time: Option<f64>,
}

impl ScanJob {
    /// Grid step
    pub fn step(step: usize, location: Location) -> Self {
        Self {
            step,
            location,
            spawn_time: None,
        }
    }

    /// Scheduled spawn point
    pub fn spawn(step: usize, location: Location, time: f64) -> Self {
        Self {
            step,
            location,
            spawn_time: Some(time),
        }
    }
}

/// Thread-safe FIFO of scan jobs
#[derive(Debug)]
pub struct JobQueue {
    sender: Sender<ScanJob>,
    receiver: Receiver<ScanJob>,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Get a sender for this queue
    pub fn sender(&self) -> JobQueueSender {
        JobQueueSender {
            sender: self.sender.clone(),
        }
    }

    /// Get a receiver for this queue (clone for each worker)
    pub fn receiver(&self) -> JobQueueReceiver {
        JobQueueReceiver {
            receiver: self.receiver.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Discard every pending job, returning how many were dropped
    pub fn drain(&self) -> usize {
        self.receiver.try_iter().count()
    }
}

/// Handle for adding jobs to a queue
#[derive(Debug, Clone)]
pub struct JobQueueSender {
    sender: Sender<ScanJob>,
}

impl JobQueueSender {
    /// Enqueue a job; fails only once every receiver is gone
    pub fn send(&self, job: ScanJob) -> Result<(), ()> {
        self.sender.send(job).map_err(|_| ())
    }

    /// Enqueue jobs in order, returning how many were sent
    pub fn send_all<I>(&self, jobs: I) -> Result<usize, ()>
    where
        I: IntoIterator<Item = ScanJob>,
    {
        let mut count = 0;
        for job in jobs {
            self.sender.send(job).map_err(|_| ())?;
            count += 1;
        }
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.sender.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sender.is_empty()
    }
}

/// Handle for taking jobs from a queue
#[derive(Debug, Clone)]
pub struct JobQueueReceiver {
    receiver: Receiver<ScanJob>,
}

impl JobQueueReceiver {
    /// Block until a job arrives; `None` once every sender is gone
    pub fn recv(&self) -> Option<ScanJob> {
        self.receiver.recv().ok()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

/// Where a worker takes its next job from
pub trait JobSource: Send {
    /// Block until the next job; `None` means the source is closed for good
    fn next_job(&self) -> Option<ScanJob>;

    /// Jobs currently waiting
    fn pending(&self) -> usize;
}

impl JobSource for JobQueueReceiver {
    fn next_job(&self) -> Option<ScanJob> {
        self.recv()
    }

    fn pending(&self) -> usize {
        self.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn job(step: usize) -> ScanJob {
        ScanJob::step(step, Location::new(0.0, 0.0, 0.0))
    }

    #[test]
    fn test_queue_fifo() {
        let queue = JobQueue::new();
        let sender = queue.sender();
        let receiver = queue.receiver();

        assert_eq!(sender.send_all((1..=3).map(job)).unwrap(), 3);
        assert_eq!(queue.len(), 3);

        let steps: Vec<_> = (0..3).map(|_| receiver.next_job().unwrap().step).collect();
        assert_eq!(steps, vec![1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_queue_drain() {
        let queue = JobQueue::new();
        let sender = queue.sender();
        sender.send_all((1..=7).map(job)).unwrap();

        assert_eq!(queue.drain(), 7);
        assert!(queue.is_empty());
        assert_eq!(queue.drain(), 0);
    }

    #[test]
    fn test_sender_sees_pending_jobs() {
        let queue = JobQueue::new();
        let sender = queue.sender();
        let receiver = queue.receiver();

        sender.send(job(1)).unwrap();
        sender.send(job(2)).unwrap();
        receiver.recv().unwrap();

        assert_eq!(sender.len(), 1);
        assert_eq!(receiver.pending(), 1);
    }

    #[test]
    fn test_receiver_closes_when_senders_drop() {
        let queue = JobQueue::new();
        let receiver = queue.receiver();
        let sender = queue.sender();

        let handle = thread::spawn(move || receiver.next_job());
        sender.send(job(9)).unwrap();
        assert_eq!(handle.join().unwrap().map(|j| j.step), Some(9));

        let receiver = queue.receiver();
        drop(sender);
        drop(queue);
        assert!(receiver.next_job().is_none());
    }
}
