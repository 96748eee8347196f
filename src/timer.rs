/*

THIS SOFTWARE IS OPEN SOURCE UNDER THE MIT LICENSE

Copyright 2025 Vincent Maciejewski, & M2 Tech
Contact:
v@m2te.ch
mayeski@gmail.com
https://www.linkedin.com/in/vmayeski/
http://m2te.ch/

*/

//! Timer service for timed receives.
//!
//! `receive_within` and `react_within` arm a request here before suspending.
//! A single service thread sleeps until the earliest deadline and then
//! delivers the `Timeout` sentinel through `ActorRef::fire_timeout`. A
//! request is identified by its owning actor plus a generation number, so a
//! request cancelled by a real-message handoff is never delivered late into
//! a newer wait.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::actor::ActorRef;

struct Request {
    deadline: Instant,
    actor: ActorRef,
    gen: u64,
}

// Min-heap by deadline.
impl Ord for Request {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other.deadline.cmp(&self.deadline)
    }
}

impl PartialOrd for Request {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Request {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline
    }
}

impl Eq for Request {}

/// Deadline service shared by all actors.
pub(crate) struct TimerService {
    queue: Mutex<BinaryHeap<Request>>,
    cond: Condvar,
}

static TIMER: OnceLock<TimerService> = OnceLock::new();

impl TimerService {
    /// The process-wide service; the service thread starts on first use.
    pub fn global() -> &'static TimerService {
        TIMER.get_or_init(|| {
            let service = TimerService {
                queue: Mutex::new(BinaryHeap::new()),
                cond: Condvar::new(),
            };
            thread::Builder::new()
                .name("troupe-timer".to_string())
                .spawn(|| {
                    tracing::debug!("timer service starting");
                    TimerService::global().run();
                })
                .expect("failed to spawn timer thread");
            service
        })
    }

    /// Arrange for `actor` to observe `Timeout` after `delay`, unless a
    /// matching message wins the race first.
    ///
    /// `gen` is the actor's current timer generation; delivery is ignored
    /// if the actor has moved on. Safe to call while holding the actor's
    /// lock: the service only touches its own queue here.
    pub fn request_timeout(&self, actor: ActorRef, delay: Duration, gen: u64) {
        let mut queue = self.queue.lock();
        queue.push(Request {
            deadline: Instant::now() + delay,
            actor,
            gen,
        });
        self.cond.notify_all();
    }

    /// Cancel any outstanding request for `actor`. Idempotent.
    pub fn trash_request(&self, actor: &ActorRef) {
        let mut queue = self.queue.lock();
        let before = queue.len();
        if before > 0 {
            let retained: BinaryHeap<Request> = queue
                .drain()
                .filter(|request| request.actor != *actor)
                .collect();
            *queue = retained;
        }
    }

    fn run(&self) {
        loop {
            let due = self.collect_due();
            // Delivery happens outside the service lock; the actor lock is
            // only ever taken from here with no service lock held.
            for request in due {
                tracing::trace!(actor = request.actor.id(), "timeout elapsed");
                request.actor.fire_timeout(request.gen);
            }
        }
    }

    /// Block until at least one request is due, then pop everything due.
    ///
    /// Wakeups recompute the remaining time from the wall clock, so
    /// spurious or early wakeups just re-enter the wait.
    fn collect_due(&self) -> Vec<Request> {
        let mut queue = self.queue.lock();
        loop {
            let now = Instant::now();
            let earliest = queue.peek().map(|request| request.deadline);
            match earliest {
                None => {
                    self.cond.wait(&mut queue);
                }
                Some(deadline) if deadline > now => {
                    let _ = self.cond.wait_until(&mut queue, deadline);
                }
                Some(_) => {
                    let mut due = Vec::new();
                    while queue
                        .peek()
                        .map_or(false, |request| request.deadline <= now)
                    {
                        due.push(queue.pop().unwrap());
                    }
                    return due;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_orders_by_earliest_deadline() {
        let now = Instant::now();
        let a = ActorRef::proxy();
        let mut heap = BinaryHeap::new();
        heap.push(Request {
            deadline: now + Duration::from_millis(50),
            actor: a.clone(),
            gen: 1,
        });
        heap.push(Request {
            deadline: now + Duration::from_millis(10),
            actor: a.clone(),
            gen: 2,
        });
        heap.push(Request {
            deadline: now + Duration::from_millis(30),
            actor: a,
            gen: 3,
        });
        assert_eq!(heap.pop().unwrap().gen, 2);
        assert_eq!(heap.pop().unwrap().gen, 3);
        assert_eq!(heap.pop().unwrap().gen, 1);
    }

    #[test]
    fn test_trash_request_is_idempotent() {
        let service = TimerService {
            queue: Mutex::new(BinaryHeap::new()),
            cond: Condvar::new(),
        };
        let a = ActorRef::proxy();
        let b = ActorRef::proxy();
        service.request_timeout(a.clone(), Duration::from_secs(60), 1);
        service.request_timeout(b.clone(), Duration::from_secs(60), 1);
        service.trash_request(&a);
        service.trash_request(&a);
        let queue = service.queue.lock();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.peek().unwrap().actor, b);
    }
}
