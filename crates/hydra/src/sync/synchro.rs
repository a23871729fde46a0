//! Synchronization channel
//!
//! A multi-producer, single-consumer rendezvous that lets any thread hand a
//! unit of work to one designated owner thread. The owner passes its private
//! state to every work item it engages, so work touches thread-affine
//! resources (native windows, graphics contexts) without any locking.
//!
//! ```text
//!   caller threads                      owner thread
//!   ──────────────                      ────────────
//!   Synchro::send(work) ──┐
//!   Synchro::send(work) ──┼──► queue ──► Engager::engage(&mut state)
//!   Synchro::post(work) ──┘                 runs work(&mut state)
//!        ▲                                      │
//!        └────────── completion ◄───────────────┘
//! ```
//!
//! The submit side ([`Synchro`]) is cloneable and `Send + Sync`. The consume
//! side starts as a move-only [`SynchroToken`]; the owner thread calls
//! [`SynchroToken::bind`] to turn it into an [`Engager`], which cannot leave
//! that thread.

use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};
use std::time::Duration;

use crossbeam::channel::{bounded, unbounded, Receiver, RecvTimeoutError, Select, Sender, TryRecvError};
use thiserror::Error;

/// Synchronization channel errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynchroError {
    /// The owner has exited; the work was never queued
    #[error("owner thread has exited")]
    Disconnected,

    /// The work was queued but the owner exited (or the work panicked) before it completed
    #[error("work was abandoned before completion")]
    Abandoned,

    /// A blocking send was issued from the owner thread, which would deadlock
    #[error("blocking send from the owner thread")]
    OwnerThread,
}

type Job<T> = Box<dyn FnOnce(&mut T) + Send + 'static>;

/// Submit side of a synchronization channel
pub struct Synchro<T> {
    sender: Sender<Job<T>>,
    owner: Arc<OnceLock<ThreadId>>,
}

impl<T> Clone for Synchro<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            owner: Arc::clone(&self.owner),
        }
    }
}

impl<T> std::fmt::Debug for Synchro<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchro")
            .field("pending", &self.sender.len())
            .field("owner", &self.owner.get())
            .finish()
    }
}

/// Unbound consume side; move it to the owner thread and [`bind`](Self::bind) it there
pub struct SynchroToken<T> {
    receiver: Receiver<Job<T>>,
    owner: Arc<OnceLock<ThreadId>>,
}

/// Consume side bound to its owner thread
///
/// Neither `Send` nor `Sync`: once bound, only the owner thread can run work.
pub struct Engager<T> {
    receiver: Receiver<Job<T>>,
    _pinned: PhantomData<*const ()>,
}

/// Create a new synchronization channel
pub fn channel<T: 'static>() -> (Synchro<T>, SynchroToken<T>) {
    let (sender, receiver) = unbounded();
    let owner = Arc::new(OnceLock::new());
    (
        Synchro {
            sender,
            owner: Arc::clone(&owner),
        },
        SynchroToken { receiver, owner },
    )
}

impl<T: 'static> Synchro<T> {
    /// Run `work` on the owner thread and block until it has returned
    ///
    /// Concurrent senders are served in arrival order. Returns whatever the
    /// work returned.
    pub fn send<R, F>(&self, work: F) -> Result<R, SynchroError>
    where
        F: FnOnce(&mut T) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_owner_thread() {
            return Err(SynchroError::OwnerThread);
        }

        let (done, completion) = bounded(1);
        let job: Job<T> = Box::new(move |target: &mut T| {
            // The sender may have given up waiting; nothing to report then.
            let _ = done.send(work(target));
        });
        self.sender.send(job).map_err(|_| SynchroError::Disconnected)?;

        completion.recv().map_err(|_| SynchroError::Abandoned)
    }

    /// Queue `work` for the owner thread without waiting for it
    pub fn post<F>(&self, work: F) -> Result<(), SynchroError>
    where
        F: FnOnce(&mut T) + Send + 'static,
    {
        self.sender
            .send(Box::new(work))
            .map_err(|_| SynchroError::Disconnected)
    }

    /// Number of queued work items not yet engaged
    pub fn pending(&self) -> usize {
        self.sender.len()
    }

    /// Whether the calling thread is this channel's bound owner
    pub fn is_owner_thread(&self) -> bool {
        self.owner.get() == Some(&thread::current().id())
    }
}

impl<T: 'static> SynchroToken<T> {
    /// Bind the channel to the calling thread
    pub fn bind(self) -> Engager<T> {
        // A token is consumed by binding, so the cell is always empty here.
        let _ = self.owner.set(thread::current().id());
        Engager {
            receiver: self.receiver,
            _pinned: PhantomData,
        }
    }
}

impl<T: 'static> Engager<T> {
    /// Block until one work item arrives, then run it
    ///
    /// Fails with [`SynchroError::Disconnected`] once every submit handle is gone.
    pub fn engage(&mut self, target: &mut T) -> Result<(), SynchroError> {
        let job = self.receiver.recv().map_err(|_| SynchroError::Disconnected)?;
        job(target);
        Ok(())
    }

    /// Run at most one pending work item without waiting
    ///
    /// Returns whether a work item ran.
    pub fn engage_once(&mut self, target: &mut T) -> bool {
        match self.receiver.try_recv() {
            Ok(job) => {
                job(target);
                true
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => false,
        }
    }

    /// Wait up to `timeout` for one work item and run it
    ///
    /// Returns whether a work item ran.
    pub fn engage_timeout(&mut self, target: &mut T, timeout: Duration) -> Result<bool, SynchroError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(job) => {
                job(target);
                Ok(true)
            }
            Err(RecvTimeoutError::Timeout) => Ok(false),
            Err(RecvTimeoutError::Disconnected) => Err(SynchroError::Disconnected),
        }
    }

    /// Wait up to `timeout` until work is queued, without running it
    ///
    /// Also returns true once every submit handle is gone.
    pub fn ready_timeout(&self, timeout: Duration) -> bool {
        let mut select = Select::new();
        select.recv(&self.receiver);
        select.ready_timeout(timeout).is_ok()
    }

    /// Number of queued work items
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Spawn an owner thread that engages until `stop` is raised.
    fn spawn_owner<T: Send + 'static>(
        token: SynchroToken<T>,
        mut state: T,
        stop: Arc<AtomicBool>,
    ) -> thread::JoinHandle<T> {
        thread::spawn(move || {
            let mut engager = token.bind();
            while !stop.load(Ordering::Acquire) {
                let _ = engager.engage_timeout(&mut state, Duration::from_millis(1));
            }
            state
        })
    }

    #[test]
    fn test_send_runs_on_owner_thread_and_returns_value() {
        let (synchro, token) = channel::<u32>();
        let stop = Arc::new(AtomicBool::new(false));
        let owner = spawn_owner(token, 41, Arc::clone(&stop));
        let owner_id = owner.thread().id();

        let (value, ran_on) = synchro
            .send(|state: &mut u32| {
                *state += 1;
                (*state, thread::current().id())
            })
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(ran_on, owner_id);
        assert_ne!(ran_on, thread::current().id());

        stop.store(true, Ordering::Release);
        assert_eq!(owner.join().unwrap(), 42);
    }

    #[test]
    fn test_concurrent_senders_each_run_exactly_once() {
        let (synchro, token) = channel::<Vec<(usize, usize)>>();
        let stop = Arc::new(AtomicBool::new(false));
        let owner = spawn_owner(token, Vec::new(), Arc::clone(&stop));
        let owner_id = owner.thread().id();

        let senders: Vec<_> = (0..8)
            .map(|sender| {
                let synchro = synchro.clone();
                thread::spawn(move || {
                    for item in 0..50 {
                        let ran_on = synchro
                            .send(move |log: &mut Vec<(usize, usize)>| {
                                log.push((sender, item));
                                thread::current().id()
                            })
                            .unwrap();
                        assert_eq!(ran_on, owner_id);
                    }
                })
            })
            .collect();
        for sender in senders {
            sender.join().unwrap();
        }

        stop.store(true, Ordering::Release);
        let mut log = owner.join().unwrap();
        assert_eq!(log.len(), 400);

        // Each sender's own submissions keep their order.
        for sender in 0..8 {
            let items: Vec<_> = log.iter().filter(|(s, _)| *s == sender).map(|(_, i)| *i).collect();
            assert_eq!(items, (0..50).collect::<Vec<_>>());
        }
        log.sort_unstable();
        log.dedup();
        assert_eq!(log.len(), 400);
    }

    #[test]
    fn test_work_never_overlaps() {
        let (synchro, token) = channel::<()>();
        let stop = Arc::new(AtomicBool::new(false));
        let owner = spawn_owner(token, (), Arc::clone(&stop));

        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let senders: Vec<_> = (0..6)
            .map(|_| {
                let synchro = synchro.clone();
                let inside = Arc::clone(&inside);
                let peak = Arc::clone(&peak);
                thread::spawn(move || {
                    for _ in 0..40 {
                        let inside = Arc::clone(&inside);
                        let peak = Arc::clone(&peak);
                        synchro
                            .send(move |_: &mut ()| {
                                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                                peak.fetch_max(now, Ordering::SeqCst);
                                thread::yield_now();
                                inside.fetch_sub(1, Ordering::SeqCst);
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for sender in senders {
            sender.join().unwrap();
        }

        stop.store(true, Ordering::Release);
        owner.join().unwrap();
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_send_blocks_until_work_completes() {
        let (synchro, token) = channel::<()>();
        let stop = Arc::new(AtomicBool::new(false));
        let owner = spawn_owner(token, (), Arc::clone(&stop));

        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        synchro
            .send(move |_: &mut ()| {
                thread::sleep(Duration::from_millis(20));
                flag.store(true, Ordering::Release);
            })
            .unwrap();
        assert!(finished.load(Ordering::Acquire));

        stop.store(true, Ordering::Release);
        owner.join().unwrap();
    }

    #[test]
    fn test_engage_once_does_not_wait() {
        let (synchro, token) = channel::<u32>();
        let mut engager = token.bind();
        let mut state = 0;

        assert!(!engager.engage_once(&mut state));

        synchro.post(|state: &mut u32| *state += 1).unwrap();
        synchro.post(|state: &mut u32| *state += 10).unwrap();
        assert_eq!(engager.pending(), 2);

        assert!(engager.engage_once(&mut state));
        assert_eq!(state, 1);
        assert!(engager.engage_once(&mut state));
        assert_eq!(state, 11);
        assert!(!engager.engage_once(&mut state));
    }

    #[test]
    fn test_engage_timeout_reports_idle() {
        let (_synchro, token) = channel::<()>();
        let mut engager = token.bind();
        assert_eq!(engager.engage_timeout(&mut (), Duration::from_millis(2)), Ok(false));
    }

    #[test]
    fn test_ready_timeout_leaves_work_queued() {
        let (synchro, token) = channel::<u32>();
        let mut engager = token.bind();
        assert!(!engager.ready_timeout(Duration::from_millis(2)));

        synchro.post(|state: &mut u32| *state = 7).unwrap();
        assert!(engager.ready_timeout(Duration::from_millis(2)));
        assert_eq!(engager.pending(), 1);

        let mut state = 0;
        assert!(engager.engage_once(&mut state));
        assert_eq!(state, 7);
    }

    #[test]
    fn test_engage_fails_once_all_senders_are_gone() {
        let (synchro, token) = channel::<()>();
        let mut engager = token.bind();
        drop(synchro);
        assert_eq!(engager.engage(&mut ()), Err(SynchroError::Disconnected));
    }

    #[test]
    fn test_send_from_owner_thread_is_refused() {
        let (synchro, token) = channel::<()>();
        let _engager = token.bind();
        assert!(synchro.is_owner_thread());
        assert_eq!(synchro.send(|_: &mut ()| ()), Err(SynchroError::OwnerThread));
    }

    #[test]
    fn test_send_after_owner_exit_is_disconnected() {
        let (synchro, token) = channel::<()>();
        thread::spawn(move || drop(token.bind())).join().unwrap();
        assert_eq!(synchro.send(|_: &mut ()| ()), Err(SynchroError::Disconnected));
        assert_eq!(synchro.post(|_: &mut ()| ()), Err(SynchroError::Disconnected));
    }

    #[test]
    fn test_pending_send_is_abandoned_when_owner_exits() {
        let (synchro, token) = channel::<()>();
        let release = Arc::new(Mutex::new(()));
        let gate = release.lock().unwrap();

        let held = Arc::clone(&release);
        let owner = thread::spawn(move || {
            let engager = token.bind();
            // Exit without engaging once the test lets go.
            drop(held.lock().unwrap());
            drop(engager);
        });

        let sender = {
            let synchro = synchro.clone();
            thread::spawn(move || synchro.send(|_: &mut ()| ()))
        };
        // Give the sender time to queue before the owner exits.
        while synchro.pending() == 0 {
            thread::yield_now();
        }
        drop(gate);
        owner.join().unwrap();

        assert_eq!(sender.join().unwrap(), Err(SynchroError::Abandoned));
    }
}
