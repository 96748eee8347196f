/*

THIS SOFTWARE IS OPEN SOURCE UNDER THE MIT LICENSE

Copyright 2025 Vincent Maciejewski, & M2 Tech
Contact:
v@m2te.ch
mayeski@gmail.com
https://www.linkedin.com/in/vmayeski/
http://m2te.ch/

*/

//! The reaction scheduler.
//!
//! Reactions are units of actor work: an actor's initial behavior, a
//! detached continuation resumed with its message, or a bare liveness check.
//! Workers pull reactions off a shared queue; the pool grows whenever a
//! reaction is submitted and no worker is idle, so actors blocked inside
//! `receive` can never starve the detached ones.
//!
//! The scheduler also keeps the pending-reaction count that decides process
//! quiescence: when it reaches zero, no detached actor is waiting and no
//! reaction is queued or running.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};

use crate::actor::ActorRef;
use crate::case::Case;
use crate::control::{self, Caught};
use crate::local;
use crate::message::Message;

/// A scheduled unit of actor work.
pub(crate) enum Reaction {
    /// Run a started actor's behavior from the top.
    Spawn {
        actor: ActorRef,
        body: Box<dyn FnOnce() + Send>,
    },
    /// Resume a detached actor with the message that matched.
    Resume {
        actor: ActorRef,
        case: Case<()>,
        msg: Box<dyn Message>,
    },
    /// Make the actor observe a latched exit request.
    Check { actor: ActorRef },
}

impl Reaction {
    fn actor(&self) -> &ActorRef {
        match self {
            Reaction::Spawn { actor, .. } => actor,
            Reaction::Resume { actor, .. } => actor,
            Reaction::Check { actor } => actor,
        }
    }
}

/// Worker pool and reaction accounting.
pub struct Scheduler {
    tx: Sender<Reaction>,
    rx: Receiver<Reaction>,
    /// Reactions submitted or registered as detached continuations, not yet
    /// finished. Zero means quiescent.
    pending: AtomicUsize,
    idle: AtomicUsize,
    workers: AtomicUsize,
    ticks: AtomicU64,
    quiet: Mutex<()>,
    quiet_cond: Condvar,
}

static SCHEDULER: OnceLock<Scheduler> = OnceLock::new();

impl Scheduler {
    /// The process-wide scheduler.
    pub fn global() -> &'static Scheduler {
        SCHEDULER.get_or_init(|| {
            control::ensure_quiet_hook();
            let (tx, rx) = crossbeam_channel::unbounded();
            Scheduler {
                tx,
                rx,
                pending: AtomicUsize::new(0),
                idle: AtomicUsize::new(0),
                workers: AtomicUsize::new(0),
                ticks: AtomicU64::new(0),
                quiet: Mutex::new(()),
                quiet_cond: Condvar::new(),
            }
        })
    }

    /// Submit a reaction for execution on some worker.
    ///
    /// Ordering between distinct reactions is unspecified.
    pub(crate) fn execute(&'static self, reaction: Reaction) {
        self.tx.send(reaction).expect("scheduler queue closed");
        if self.idle.load(Ordering::SeqCst) == 0 {
            self.spawn_worker();
        }
    }

    /// Bootstrap an actor: account for its initial reaction and submit it.
    pub(crate) fn start(&'static self, reaction: Reaction) {
        self.pend_reaction();
        self.execute(reaction);
    }

    /// Register one more outstanding reaction.
    ///
    /// Called by `react` before it either submits an inline match or
    /// registers a continuation; the balancing decrement happens when the
    /// corresponding reaction finishes.
    pub(crate) fn pend_reaction(&self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
    }

    fn done_reaction(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _guard = self.quiet.lock();
            self.quiet_cond.notify_all();
        }
    }

    /// Fairness hook, invoked on every send and receive.
    pub(crate) fn tick(&self, _actor: &ActorRef) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Outstanding reactions: queued, running, or detached-and-waiting.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Block until no reactions are outstanding, or `timeout` elapses.
    ///
    /// Returns `true` on quiescence. This is the process-shutdown
    /// condition: no detached actor waits and nothing is queued or running.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.quiet.lock();
        while self.pending.load(Ordering::SeqCst) != 0 {
            if Instant::now() >= deadline {
                return false;
            }
            let _ = self.quiet_cond.wait_until(&mut guard, deadline);
        }
        true
    }

    fn spawn_worker(&'static self) {
        let index = self.workers.fetch_add(1, Ordering::SeqCst) + 1;
        let rx = self.rx.clone();
        thread::Builder::new()
            .name(format!("troupe-worker-{index}"))
            .spawn(move || {
                tracing::debug!(worker = index, "worker starting");
                loop {
                    self.idle.fetch_add(1, Ordering::SeqCst);
                    let next = rx.recv();
                    self.idle.fetch_sub(1, Ordering::SeqCst);
                    match next {
                        Ok(reaction) => {
                            // Taking the last idle slot with work still
                            // queued would strand it behind a blocking
                            // receive; top the pool up first.
                            if self.idle.load(Ordering::SeqCst) == 0 && !rx.is_empty() {
                                self.spawn_worker();
                            }
                            self.dispatch(reaction);
                        }
                        Err(_) => break,
                    }
                }
            })
            .expect("failed to spawn worker thread");
    }

    /// Run one reaction: bind `self`, execute, route the outcome.
    fn dispatch(&'static self, reaction: Reaction) {
        let actor = reaction.actor().clone();
        let _binding = local::bind(actor.clone());

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match reaction {
            Reaction::Spawn { body, .. } => body(),
            Reaction::Resume { actor, case, msg } => actor.run_handler(case, msg),
            Reaction::Check { actor } => actor.observe_exit(),
        }));

        match outcome {
            // The behavior step ran to completion without suspending:
            // the actor is done, modulo registered continuation hooks.
            Ok(()) => actor.finish_step(),
            Err(payload) => match control::classify(payload) {
                Caught::Suspended => {}
                Caught::Exited => actor.terminate(),
                Caught::Failed(reason) => {
                    tracing::debug!(
                        actor = actor.id(),
                        reason = %reason,
                        "behavior panicked; exiting abnormally"
                    );
                    actor.set_exit_reason(&reason);
                    actor.terminate();
                }
            },
        }

        self.done_reaction();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn serial() -> parking_lot::MutexGuard<'static, ()> {
        crate::test_guard::lock()
    }

    #[test]
    fn test_pending_accounting_reaches_zero() {
        let _s = serial();
        let scheduler = Scheduler::global();
        let (tx, rx) = mpsc::channel();
        let actor = ActorRef::proxy();
        scheduler.start(Reaction::Spawn {
            actor,
            body: Box::new(move || {
                tx.send(42).unwrap();
            }),
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 42);
        assert!(scheduler.wait_idle(Duration::from_secs(2)));
    }

    #[test]
    fn test_pool_grows_past_blocked_workers() {
        let _s = serial();
        let scheduler = Scheduler::global();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel();

        // Occupy a worker until released.
        let blocker = ActorRef::proxy();
        scheduler.start(Reaction::Spawn {
            actor: blocker,
            body: Box::new(move || {
                release_rx.recv().unwrap();
            }),
        });

        // A second reaction must still run while the first blocks.
        let runner = ActorRef::proxy();
        scheduler.start(Reaction::Spawn {
            actor: runner,
            body: Box::new(move || {
                done_tx.send(()).unwrap();
            }),
        });

        assert!(done_rx.recv_timeout(Duration::from_secs(2)).is_ok());
        release_tx.send(()).unwrap();
    }

    #[test]
    fn test_tick_counts() {
        let scheduler = Scheduler::global();
        let before = scheduler.ticks.load(Ordering::Relaxed);
        let actor = ActorRef::proxy();
        scheduler.tick(&actor);
        assert!(scheduler.ticks.load(Ordering::Relaxed) > before);
    }
}
