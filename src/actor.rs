/*

THIS SOFTWARE IS OPEN SOURCE UNDER THE MIT LICENSE

Copyright 2025 Vincent Maciejewski, & M2 Tech
Contact:
v@m2te.ch
mayeski@gmail.com
https://www.linkedin.com/in/vmayeski/
http://m2te.ch/

*/

//! The actor state machine.
//!
//! An actor owns a mailbox and is driven through it in one of two modes:
//! `receive` parks the calling thread until a matching message arrives,
//! `react` registers the pattern as a continuation and releases the worker.
//! Senders make the handoff decision under the receiver's lock, so a
//! message that matches an outstanding pattern is never enqueued.
//!
//! `ActorRef` is the cloneable address; all state lives behind it. Equality
//! is actor identity.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::case::{Case, Guard};
use crate::channel::ReplyChannel;
use crate::control;
use crate::local;
use crate::mailbox::MessageQueue;
use crate::message::Message;
use crate::messages::{Exit, Timeout, NORMAL};
use crate::scheduler::{Reaction, Scheduler};
use crate::timer::TimerService;

/// Actor id generator
static NEXT_ACTOR_ID: AtomicU64 = AtomicU64::new(1);

/// Where a reply to the message currently being handled should go.
#[derive(Clone)]
pub(crate) enum ReplyTo {
    /// Plain send: replies land in the sender's mailbox as ordinary
    /// messages.
    Sender(ActorRef),
    /// Synchronous request: replies are tagged for the requester's fresh
    /// reply channel.
    Channel(ReplyChannel),
    /// System-synthesized delivery; replies are dropped.
    Nobody,
}

/// Execution mode of an actor.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Mode {
    Running,
    BlockedOnReceive,
    Detached,
    ExitingNormal,
    ExitingAbnormal,
}

struct ActorState {
    mailbox: MessageQueue,
    /// Pattern currently awaited; set only in BlockedOnReceive or Detached.
    waiting_for: Option<Guard>,
    /// Handoff slot for a blocked receiver.
    received: Option<Box<dyn Message>>,
    /// Reply destinations, one per in-progress handler invocation.
    sessions: Vec<ReplyTo>,
    /// Detached pattern handler awaiting its message.
    continuation: Option<Case<()>>,
    mode: Mode,
    links: Vec<ActorRef>,
    /// Latched termination request from a linked peer.
    should_exit: bool,
    exit_reason: String,
    /// Set once the termination protocol has started.
    exiting: bool,
    /// Cleanup hook run on normal exit; sequencing sugar chains through it.
    on_exit: Option<Box<dyn FnOnce() + Send>>,
    timeout_pending: bool,
    timer_gen: u64,
    /// Behavior awaiting `start`.
    body: Option<Box<dyn FnOnce() + Send>>,
    started: bool,
}

struct ActorCore {
    id: u64,
    trap_exit: AtomicBool,
    state: Mutex<ActorState>,
    cond: Condvar,
}

/// Cloneable handle to an actor.
pub struct ActorRef {
    core: Arc<ActorCore>,
}

impl Clone for ActorRef {
    fn clone(&self) -> Self {
        ActorRef {
            core: Arc::clone(&self.core),
        }
    }
}

impl PartialEq for ActorRef {
    fn eq(&self, other: &Self) -> bool {
        self.core.id == other.core.id
    }
}

impl Eq for ActorRef {}

impl fmt::Debug for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRef").field("id", &self.core.id).finish()
    }
}

enum SendOutcome {
    Enqueued,
    Wake,
    Schedule(Case<()>, Box<dyn Message>),
}

impl ActorRef {
    fn new(body: Option<Box<dyn FnOnce() + Send>>, started: bool) -> ActorRef {
        ActorRef {
            core: Arc::new(ActorCore {
                id: NEXT_ACTOR_ID.fetch_add(1, Ordering::SeqCst),
                trap_exit: AtomicBool::new(false),
                state: Mutex::new(ActorState {
                    mailbox: MessageQueue::new(),
                    waiting_for: None,
                    received: None,
                    sessions: Vec::new(),
                    continuation: None,
                    mode: Mode::Running,
                    links: Vec::new(),
                    should_exit: false,
                    exit_reason: NORMAL.to_string(),
                    exiting: false,
                    on_exit: None,
                    timeout_pending: false,
                    timer_gen: 0,
                    body,
                    started,
                }),
                cond: Condvar::new(),
            }),
        }
    }

    /// An actor that will run `body` once started.
    pub(crate) fn with_body(body: Box<dyn FnOnce() + Send>) -> ActorRef {
        ActorRef::new(Some(body), false)
    }

    /// A proxy actor wrapping a plain thread; never scheduled.
    pub(crate) fn proxy() -> ActorRef {
        ActorRef::new(None, true)
    }

    /// The actor's identity.
    pub fn id(&self) -> u64 {
        self.core.id
    }

    /// Number of messages queued and not yet consumed.
    pub fn mailbox_size(&self) -> usize {
        self.core.state.lock().mailbox.len()
    }

    /// Submit the initial reaction. Started exactly once; repeats are
    /// ignored.
    pub fn start(&self) {
        let body = {
            let mut st = self.core.state.lock();
            if st.started {
                None
            } else {
                st.started = true;
                st.body.take()
            }
        };
        match body {
            Some(body) => Scheduler::global().start(Reaction::Spawn {
                actor: self.clone(),
                body,
            }),
            None => tracing::debug!(actor = self.id(), "start ignored: already started"),
        }
    }

    // ------------------------------------------------------------------
    // Messaging
    // ------------------------------------------------------------------

    /// Asynchronous send. Replies made by the receiver's handler come back
    /// to the calling actor's mailbox as ordinary messages.
    pub fn send(&self, msg: Box<dyn Message>) {
        self.send_with(msg, ReplyTo::Sender(local::current()));
    }

    /// Send preserving the reply destination of the message currently being
    /// handled, so replies reach the original requester.
    pub fn forward(&self, msg: Box<dyn Message>) {
        let reply = local::current().top_session();
        self.send_with(msg, reply);
    }

    /// Synchronous request: send `msg` and block until the receiver
    /// replies. A fresh reply channel per call keeps concurrent requests
    /// from crossing.
    pub fn request(&self, msg: Box<dyn Message>) -> Box<dyn Message> {
        let channel = ReplyChannel::fresh(local::current());
        self.send_with(msg, ReplyTo::Channel(channel.clone()));
        channel.receive()
    }

    /// As `request`, but gives up after `timeout`.
    pub fn request_within(
        &self,
        timeout: Duration,
        msg: Box<dyn Message>,
    ) -> Option<Box<dyn Message>> {
        let channel = ReplyChannel::fresh(local::current());
        self.send_with(msg, ReplyTo::Channel(channel.clone()));
        channel.receive_within(timeout)
    }

    /// The single delivery entry point: hand off to a waiting pattern or
    /// enqueue.
    pub(crate) fn send_with(&self, msg: Box<dyn Message>, reply: ReplyTo) {
        Scheduler::global().tick(self);
        let (outcome, had_timer) = {
            let mut st = self.core.state.lock();
            let awaiting = matches!(st.mode, Mode::BlockedOnReceive | Mode::Detached);
            let matched = awaiting
                && st
                    .waiting_for
                    .as_ref()
                    .map_or(false, |guard| (**guard)(msg.as_ref()));
            if matched {
                st.waiting_for = None;
                st.sessions.push(reply);
                let had_timer = st.timeout_pending;
                st.timeout_pending = false;
                match st.mode {
                    Mode::BlockedOnReceive => {
                        st.received = Some(msg);
                        st.mode = Mode::Running;
                        (SendOutcome::Wake, had_timer)
                    }
                    Mode::Detached => {
                        let case = st
                            .continuation
                            .take()
                            .expect("detached actor has no continuation");
                        st.mode = Mode::Running;
                        (SendOutcome::Schedule(case, msg), had_timer)
                    }
                    _ => unreachable!(),
                }
            } else {
                st.mailbox.append(msg, reply);
                (SendOutcome::Enqueued, false)
            }
        };
        // The lock is dropped: the timer and scheduler are called outside
        // the actor's critical section.
        if had_timer {
            TimerService::global().trash_request(self);
        }
        match outcome {
            SendOutcome::Enqueued => {}
            SendOutcome::Wake => {
                self.core.cond.notify_all();
            }
            SendOutcome::Schedule(case, msg) => {
                Scheduler::global().execute(Reaction::Resume {
                    actor: self.clone(),
                    case,
                    msg,
                });
            }
        }
    }

    // ------------------------------------------------------------------
    // Blocking receive
    // ------------------------------------------------------------------

    /// Consume the oldest mailbox message matching `case`, blocking the
    /// calling thread until one arrives.
    ///
    /// The caller must be the owning actor.
    pub fn receive<R>(&self, case: Case<R>) -> R {
        self.assert_owner("receive");
        self.receive_inner(case, None)
    }

    /// As `receive`, but delivers the `Timeout` sentinel if nothing matched
    /// within `timeout`. A case not defined on `Timeout` terminates the
    /// actor with reason `"unhandled timeout"`.
    pub fn receive_within<R>(&self, timeout: Duration, case: Case<R>) -> R {
        self.assert_owner("receive_within");
        self.receive_inner(case, Some(timeout))
    }

    /// Consume the oldest message, whatever it is.
    pub fn receive_any(&self) -> Box<dyn Message> {
        self.assert_owner("receive_any");
        self.receive_inner(Case::any(|msg| msg), None)
    }

    fn receive_inner<R>(&self, case: Case<R>, within: Option<Duration>) -> R {
        Scheduler::global().tick(self);
        let guard = case.guard();
        let msg = {
            let mut st = self.core.state.lock();
            if st.should_exit {
                drop(st);
                control::exit_signal();
            }
            if let Some(entry) = st.mailbox.extract_first(|m| (*guard)(m)) {
                st.sessions.push(entry.reply);
                entry.msg
            } else {
                st.waiting_for = Some(guard);
                st.mode = Mode::BlockedOnReceive;
                if let Some(delay) = within {
                    st.timeout_pending = true;
                    st.timer_gen += 1;
                    let gen = st.timer_gen;
                    TimerService::global().request_timeout(self.clone(), delay, gen);
                }
                // Spurious wakeups re-enter the wait.
                while st.received.is_none() && !st.should_exit {
                    self.core.cond.wait(&mut st);
                }
                if st.should_exit {
                    drop(st);
                    control::exit_signal();
                }
                st.received.take().expect("woken without a message")
            }
        };
        if !case.is_defined(msg.as_ref()) {
            // Only the synthesized Timeout can reach here: real messages
            // pass the installed guard before handoff.
            self.set_exit_reason("unhandled timeout");
            control::exit_signal();
        }
        let _session = SessionGuard { actor: self };
        case.apply(msg)
    }

    // ------------------------------------------------------------------
    // Detached react
    // ------------------------------------------------------------------

    /// Register `case` as this actor's continuation and release the worker
    /// thread. Never returns: call in tail position of the behavior.
    ///
    /// The caller must be the owning actor.
    pub fn react(&self, case: Case<()>) -> ! {
        self.assert_owner("react");
        self.react_inner(case, None)
    }

    /// As `react`, but delivers the `Timeout` sentinel if nothing matched
    /// within `timeout`.
    pub fn react_within(&self, timeout: Duration, case: Case<()>) -> ! {
        self.assert_owner("react_within");
        self.react_inner(case, Some(timeout))
    }

    fn react_inner(&self, case: Case<()>, within: Option<Duration>) -> ! {
        Scheduler::global().tick(self);
        {
            let st = self.core.state.lock();
            if st.should_exit {
                drop(st);
                control::exit_signal();
            }
        }
        Scheduler::global().pend_reaction();
        let guard = case.guard();
        let mut slot = Some(case);
        let found = {
            let mut st = self.core.state.lock();
            if let Some(entry) = st.mailbox.extract_first(|m| (*guard)(m)) {
                st.sessions.push(entry.reply);
                Some(entry.msg)
            } else {
                st.waiting_for = Some(guard);
                st.continuation = slot.take();
                st.mode = Mode::Detached;
                if let Some(delay) = within {
                    st.timeout_pending = true;
                    st.timer_gen += 1;
                    let gen = st.timer_gen;
                    TimerService::global().request_timeout(self.clone(), delay, gen);
                }
                None
            }
        };
        if let Some(msg) = found {
            Scheduler::global().execute(Reaction::Resume {
                actor: self.clone(),
                case: slot.take().expect("case consumed twice"),
                msg,
            });
        }
        control::suspend_signal()
    }

    /// Dispatcher entry: run a resumed continuation against its message.
    pub(crate) fn run_handler(&self, case: Case<()>, msg: Box<dyn Message>) {
        {
            let st = self.core.state.lock();
            if st.should_exit {
                drop(st);
                control::exit_signal();
            }
        }
        if !case.is_defined(msg.as_ref()) {
            self.set_exit_reason("unhandled timeout");
            control::exit_signal();
        }
        let _session = SessionGuard { actor: self };
        case.apply(msg);
    }

    /// Dispatcher entry for a null reaction: observe a latched exit.
    pub(crate) fn observe_exit(&self) {
        if self.core.state.lock().should_exit {
            control::exit_signal();
        }
    }

    // ------------------------------------------------------------------
    // Sessions and replies
    // ------------------------------------------------------------------

    /// Reply to the message currently being handled.
    pub fn reply(&self, msg: Box<dyn Message>) {
        self.assert_owner("reply");
        match self.top_session() {
            ReplyTo::Sender(actor) => actor.send_with(msg, ReplyTo::Sender(self.clone())),
            ReplyTo::Channel(channel) => channel.send(msg),
            ReplyTo::Nobody => {
                tracing::trace!(actor = self.id(), "reply with no destination dropped");
            }
        }
    }

    /// The actor that sent the message currently being handled.
    pub fn sender(&self) -> Option<ActorRef> {
        self.assert_owner("sender");
        match self.top_session() {
            ReplyTo::Sender(actor) => Some(actor),
            ReplyTo::Channel(channel) => Some(channel.owner().clone()),
            ReplyTo::Nobody => None,
        }
    }

    pub(crate) fn top_session(&self) -> ReplyTo {
        self.core
            .state
            .lock()
            .sessions
            .last()
            .cloned()
            .unwrap_or(ReplyTo::Nobody)
    }

    // ------------------------------------------------------------------
    // Links and exit
    // ------------------------------------------------------------------

    /// Link two actors; termination of one is observed by the other.
    /// Linking to an actor that already terminated delivers its verdict
    /// immediately.
    pub fn link(&self, peer: &ActorRef) {
        if self == peer {
            return;
        }
        enum Late {
            Recorded,
            SelfDead(String),
            PeerDead(String),
        }
        let late = {
            let (first, second) = order_pair(self, peer);
            let mut st_first = first.core.state.lock();
            let mut st_second = second.core.state.lock();
            let (st_self, st_peer) = if first == self {
                (&mut *st_first, &mut *st_second)
            } else {
                (&mut *st_second, &mut *st_first)
            };
            if st_peer.exiting {
                Late::PeerDead(st_peer.exit_reason.clone())
            } else if st_self.exiting {
                Late::SelfDead(st_self.exit_reason.clone())
            } else {
                if !st_self.links.contains(peer) {
                    st_self.links.push(peer.clone());
                }
                if !st_peer.links.contains(self) {
                    st_peer.links.push(self.clone());
                }
                Late::Recorded
            }
        };
        match late {
            Late::Recorded => {}
            Late::PeerDead(reason) => self.exit_linked(peer, &reason),
            Late::SelfDead(reason) => peer.exit_linked(self, &reason),
        }
    }

    /// Remove the link between two actors, both sides.
    pub fn unlink(&self, peer: &ActorRef) {
        if self == peer {
            return;
        }
        let (first, second) = order_pair(self, peer);
        let mut st_first = first.core.state.lock();
        let mut st_second = second.core.state.lock();
        st_first.links.retain(|link| link != second);
        st_second.links.retain(|link| link != first);
    }

    /// When set, peer terminations arrive as `Exit` messages instead of
    /// propagating termination.
    pub fn set_trap_exit(&self, trap: bool) {
        self.core.trap_exit.store(trap, Ordering::SeqCst);
    }

    pub fn trap_exit(&self) -> bool {
        self.core.trap_exit.load(Ordering::SeqCst)
    }

    /// Record the exit reason for the upcoming termination.
    pub(crate) fn set_exit_reason(&self, reason: &str) {
        let mut st = self.core.state.lock();
        if !st.exiting {
            st.exit_reason = reason.to_string();
        }
    }

    pub(crate) fn is_exiting(&self) -> bool {
        self.core.state.lock().exiting
    }

    pub(crate) fn set_on_exit(&self, hook: Box<dyn FnOnce() + Send>) {
        self.core.state.lock().on_exit = Some(hook);
    }

    pub(crate) fn take_on_exit(&self) -> Option<Box<dyn FnOnce() + Send>> {
        self.core.state.lock().on_exit.take()
    }

    /// A behavior step returned without suspending: drain continuation
    /// hooks, then terminate normally.
    pub(crate) fn finish_step(&self) {
        loop {
            let hook = {
                let mut st = self.core.state.lock();
                if st.exiting {
                    return;
                }
                st.on_exit.take()
            };
            let Some(hook) = hook else {
                self.terminate();
                return;
            };
            match std::panic::catch_unwind(std::panic::AssertUnwindSafe(hook)) {
                Ok(()) => continue,
                Err(payload) => match control::classify(payload) {
                    control::Caught::Suspended => return,
                    control::Caught::Exited => {
                        self.terminate();
                        return;
                    }
                    control::Caught::Failed(reason) => {
                        self.set_exit_reason(&reason);
                        self.terminate();
                        return;
                    }
                },
            }
        }
    }

    /// Run the termination protocol: unlink from all peers and notify them.
    pub(crate) fn terminate(&self) {
        let (reason, links) = {
            let mut st = self.core.state.lock();
            if st.exiting {
                return;
            }
            st.exiting = true;
            st.waiting_for = None;
            st.continuation = None;
            st.on_exit = None;
            st.timeout_pending = false;
            let reason = st.exit_reason.clone();
            st.mode = if reason == NORMAL {
                Mode::ExitingNormal
            } else {
                Mode::ExitingAbnormal
            };
            (reason, std::mem::take(&mut st.links))
        };
        if reason != NORMAL && links.is_empty() {
            tracing::debug!(
                actor = self.id(),
                reason = %reason,
                "abnormal termination, no linked peers"
            );
        }
        for peer in links {
            peer.drop_link(self);
            if !peer.is_exiting() {
                peer.exit_linked(self, &reason);
            }
        }
    }

    fn drop_link(&self, peer: &ActorRef) {
        self.core.state.lock().links.retain(|link| link != peer);
    }

    /// A linked peer terminated with `reason`.
    pub(crate) fn exit_linked(&self, from: &ActorRef, reason: &str) {
        if self.trap_exit() {
            self.send_with(
                Box::new(Exit::new(from.clone(), reason)),
                ReplyTo::Nobody,
            );
            return;
        }
        if reason == NORMAL {
            return;
        }
        enum Observe {
            Later,
            Wake,
            NullReaction,
        }
        let observe = {
            let mut st = self.core.state.lock();
            if st.exiting || st.should_exit {
                Observe::Later
            } else {
                st.should_exit = true;
                st.exit_reason = reason.to_string();
                match st.mode {
                    Mode::BlockedOnReceive => Observe::Wake,
                    Mode::Detached => {
                        // Exactly one reaction: the continuation is taken
                        // here, so a racing handoff can no longer schedule.
                        st.continuation = None;
                        st.waiting_for = None;
                        st.timeout_pending = false;
                        st.mode = Mode::Running;
                        Observe::NullReaction
                    }
                    _ => Observe::Later,
                }
            }
        };
        match observe {
            Observe::Later => {}
            Observe::Wake => {
                self.core.cond.notify_all();
            }
            Observe::NullReaction => {
                Scheduler::global().execute(Reaction::Check {
                    actor: self.clone(),
                });
            }
        }
    }

    /// Deliver the `Timeout` sentinel if the request is still current.
    pub(crate) fn fire_timeout(&self, gen: u64) {
        enum Deliver {
            Stale,
            Wake,
            Schedule(Case<()>),
        }
        let deliver = {
            let mut st = self.core.state.lock();
            if !st.timeout_pending || st.timer_gen != gen || st.should_exit || st.exiting {
                Deliver::Stale
            } else {
                st.timeout_pending = false;
                st.waiting_for = None;
                st.sessions.push(ReplyTo::Nobody);
                match st.mode {
                    Mode::BlockedOnReceive => {
                        st.received = Some(Box::new(Timeout));
                        st.mode = Mode::Running;
                        Deliver::Wake
                    }
                    Mode::Detached => {
                        let case = st
                            .continuation
                            .take()
                            .expect("detached actor has no continuation");
                        st.mode = Mode::Running;
                        Deliver::Schedule(case)
                    }
                    _ => {
                        st.sessions.pop();
                        Deliver::Stale
                    }
                }
            }
        };
        match deliver {
            Deliver::Stale => {}
            Deliver::Wake => {
                self.core.cond.notify_all();
            }
            Deliver::Schedule(case) => {
                Scheduler::global().execute(Reaction::Resume {
                    actor: self.clone(),
                    case,
                    msg: Box::new(Timeout),
                });
            }
        }
    }

    fn assert_owner(&self, op: &str) {
        assert!(
            local::is_current(self),
            "{op} called from a thread that does not own actor {}",
            self.id()
        );
    }
}

fn order_pair<'a>(a: &'a ActorRef, b: &'a ActorRef) -> (&'a ActorRef, &'a ActorRef) {
    if a.id() < b.id() {
        (a, b)
    } else {
        (b, a)
    }
}

/// Pops the session stack when a handler invocation ends, also on unwind.
struct SessionGuard<'a> {
    actor: &'a ActorRef,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.actor.core.state.lock().sessions.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local;
    use std::sync::mpsc;
    use std::time::Instant;

    fn serial() -> parking_lot::MutexGuard<'static, ()> {
        crate::test_guard::lock()
    }

    #[test]
    fn test_send_enqueues_when_nobody_waits() {
        let _s = serial();
        let actor = ActorRef::proxy();
        actor.send_with(Box::new(1i32), ReplyTo::Nobody);
        actor.send_with(Box::new(2i32), ReplyTo::Nobody);
        assert_eq!(actor.mailbox_size(), 2);
    }

    #[test]
    fn test_selective_receive_takes_oldest_match_and_keeps_order() {
        let _s = serial();
        // Scenario: 1, "two", 3 queued; a String pattern takes "two" and
        // leaves 1 then 3.
        let (tx, rx) = mpsc::channel();
        let actor = local::actor_of(move || {
            let picked = local::receive(Case::when(|s: Box<String>| *s));
            let first = local::receive(Case::any(|m| *m.downcast::<i32>().ok().unwrap()));
            let second = local::receive(Case::any(|m| *m.downcast::<i32>().ok().unwrap()));
            tx.send((picked, first, second)).unwrap();
        });
        actor.send(Box::new(1i32));
        actor.send(Box::new("two".to_string()));
        actor.send(Box::new(3i32));
        actor.start();
        let (picked, first, second) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(picked, "two");
        assert_eq!(first, 1);
        assert_eq!(second, 3);
    }

    #[test]
    fn test_handoff_skips_mailbox() {
        let _s = serial();
        let (ready_tx, ready_rx) = mpsc::channel();
        let (tx, rx) = mpsc::channel();
        let actor = local::spawn(move || {
            ready_tx.send(()).unwrap();
            let n = local::receive(Case::when(|n: Box<i32>| *n));
            tx.send(n).unwrap();
        });
        ready_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        // Give the actor a moment to install its pattern, then send.
        std::thread::sleep(Duration::from_millis(50));
        actor.send(Box::new(7i32));
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 7);
        assert_eq!(actor.mailbox_size(), 0);
    }

    #[test]
    fn test_receive_within_times_out() {
        let _s = serial();
        // Scenario S3: no message, pattern defined on Timeout.
        let (tx, rx) = mpsc::channel();
        let started = Instant::now();
        local::spawn(move || {
            let outcome = local::receive_within(
                Duration::from_millis(50),
                Case::when(|_: Box<Timeout>| "t").or_any(|_| "m"),
            );
            tx.send(outcome).unwrap();
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), "t");
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_receive_within_prefers_real_message() {
        let _s = serial();
        let (tx, rx) = mpsc::channel();
        let actor = local::actor_of(move || {
            let outcome = local::receive_within(
                Duration::from_secs(30),
                Case::when(|_: Box<Timeout>| "t".to_string())
                    .or_when(|s: Box<String>| *s),
            );
            tx.send(outcome).unwrap();
        });
        actor.send(Box::new("real".to_string()));
        actor.start();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), "real");
    }

    #[test]
    fn test_react_ping_pong_and_quiescence() {
        let _s = serial();
        // Scenario S1: a reacts on "ping" and replies "pong"; b records.
        let (tx, rx) = mpsc::channel();
        let ponger = local::spawn(|| {
            local::react(Case::when_where(
                |s: &String| s == "ping",
                |_| {
                    local::reply(Box::new("pong".to_string()));
                },
            ));
        });
        local::spawn(move || {
            ponger.send(Box::new("ping".to_string()));
            local::react(Case::when_where(
                |s: &String| s == "pong",
                move |_| {
                    tx.send("ok").unwrap();
                },
            ));
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), "ok");
        assert!(Scheduler::global().wait_idle(Duration::from_secs(5)));
    }

    #[test]
    fn test_request_reply_rendezvous() {
        let _s = serial();
        // Scenario S6: replies go to the requester that asked.
        fn serve() {
            local::react(
                Case::when_where(|s: &String| s == "stop", |_| {})
                    .or_when(|q: Box<String>| {
                        local::reply(Box::new(format!("r:{q}")));
                        serve();
                    }),
            );
        }
        let server = local::spawn(serve);

        let (tx, rx) = mpsc::channel();
        for i in 0..4 {
            let server = server.clone();
            let tx = tx.clone();
            local::spawn(move || {
                let answer = server.request(Box::new(format!("q{i}")));
                let answer = answer.downcast::<String>().ok().unwrap();
                tx.send((i, *answer)).unwrap();
            });
        }
        drop(tx);
        for _ in 0..4 {
            let (i, answer) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
            assert_eq!(answer, format!("r:q{i}"));
        }
        server.send(Box::new("stop".to_string()));
        assert!(Scheduler::global().wait_idle(Duration::from_secs(5)));
    }

    #[test]
    fn test_request_within_times_out_to_none() {
        let _s = serial();
        let silent = local::spawn(|| {
            local::react(Case::when(|_: Box<i32>| ()));
        });
        let (tx, rx) = mpsc::channel();
        let target = silent.clone();
        local::spawn(move || {
            let answer = target.request_within(
                Duration::from_millis(50),
                Box::new("ignored".to_string()),
            );
            tx.send(answer.is_none()).unwrap();
        });
        assert!(rx.recv_timeout(Duration::from_secs(2)).unwrap());
        // Unpark the silent actor so the scheduler can drain.
        silent.send(Box::new(0i32));
        assert!(Scheduler::global().wait_idle(Duration::from_secs(5)));
    }

    #[test]
    fn test_forward_preserves_reply_destination() {
        let _s = serial();
        // front relays to back; back's reply reaches the original
        // requester.
        let back = local::spawn(|| {
            local::react(Case::when(|_: Box<String>| {
                local::reply(Box::new("from-back".to_string()));
            }));
        });
        let relay_to = back.clone();
        let front = local::spawn(move || {
            local::react(Case::when(move |q: Box<String>| {
                relay_to.forward(q);
            }));
        });
        let (tx, rx) = mpsc::channel();
        local::spawn(move || {
            let answer = front.request(Box::new("q".to_string()));
            tx.send(*answer.downcast::<String>().ok().unwrap()).unwrap();
        });
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            "from-back"
        );
        assert!(Scheduler::global().wait_idle(Duration::from_secs(5)));
    }

    #[test]
    fn test_sender_identifies_the_caller() {
        let _s = serial();
        let (tx, rx) = mpsc::channel();
        let echo = local::spawn(move || {
            local::react(Case::when(move |_: Box<String>| {
                tx.send(local::sender().map(|a| a.id())).unwrap();
            }));
        });
        let me = local::self_ref();
        echo.send(Box::new("hi".to_string()));
        let observed = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(observed, Some(me.id()));
        assert!(Scheduler::global().wait_idle(Duration::from_secs(5)));
    }

    #[test]
    fn test_reply_unit_answers_request() {
        let _s = serial();
        let acker = local::spawn(|| {
            local::react(Case::when(|_: Box<String>| {
                local::reply_unit();
            }));
        });
        let (tx, rx) = mpsc::channel();
        local::spawn(move || {
            let answer = acker.request(Box::new("ack?".to_string()));
            tx.send(answer.is::<()>()).unwrap();
        });
        assert!(rx.recv_timeout(Duration::from_secs(2)).unwrap());
        assert!(Scheduler::global().wait_idle(Duration::from_secs(5)));
    }

    #[test]
    fn test_link_is_symmetric_and_unlink_clears() {
        let _s = serial();
        let a = ActorRef::proxy();
        let b = ActorRef::proxy();
        a.link(&b);
        assert!(a.core.state.lock().links.contains(&b));
        assert!(b.core.state.lock().links.contains(&a));
        a.link(&b);
        assert_eq!(a.core.state.lock().links.len(), 1);
        b.unlink(&a);
        assert!(a.core.state.lock().links.is_empty());
        assert!(b.core.state.lock().links.is_empty());
    }

    #[test]
    fn test_normal_exit_does_not_cascade() {
        let _s = serial();
        let (tx, rx) = mpsc::channel();
        let quiet = local::actor_of(move || {
            let n = local::receive(Case::when(|n: Box<i32>| *n));
            tx.send(n).unwrap();
        });
        let finisher = local::actor_of(|| {});
        finisher.link(&quiet);
        finisher.start();
        // Let the normal exit run its course, then prove the peer is alive.
        assert!(Scheduler::global().wait_idle(Duration::from_secs(5)));
        quiet.start();
        quiet.send(Box::new(5i32));
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 5);
    }

    #[test]
    fn test_abnormal_exit_cascades_to_non_trapper() {
        let _s = serial();
        // Scenario S5: C linked to A without trapping dies with A's reason.
        let (tx, rx) = mpsc::channel();
        let victim = local::spawn(move || {
            let outcome = local::receive(Case::when(|n: Box<i32>| *n));
            // Never reached: the linked exit unwinds the receive.
            tx.send(outcome).unwrap();
        });
        std::thread::sleep(Duration::from_millis(50));
        let bomber = local::actor_of(|| {
            local::exit_with("boom");
        });
        bomber.link(&victim);
        bomber.start();
        assert!(Scheduler::global().wait_idle(Duration::from_secs(5)));
        assert!(victim.is_exiting());
        assert_eq!(victim.core.state.lock().exit_reason, "boom");
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn test_trapper_receives_exit_message() {
        let _s = serial();
        // Scenario S4: B traps and receives Exit(A, "boom") as a message.
        let (tx, rx) = mpsc::channel();
        let watcher = local::actor_of(move || {
            let (from_id, reason) = local::receive(Case::when(|exit: Box<Exit>| {
                (exit.from.id(), exit.reason.clone())
            }));
            tx.send((from_id, reason)).unwrap();
        });
        watcher.set_trap_exit(true);
        let bomber = local::actor_of(|| {
            local::exit_with("boom");
        });
        bomber.link(&watcher);
        watcher.start();
        bomber.start();
        let (from_id, reason) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(from_id, bomber.id());
        assert_eq!(reason, "boom");
        assert!(!watcher.is_exiting());
    }

    #[test]
    fn test_unhandled_timeout_terminates_with_reason() {
        let _s = serial();
        let victim = local::spawn(|| {
            local::receive_within(Duration::from_millis(30), Case::when(|n: Box<i32>| *n));
        });
        assert!(Scheduler::global().wait_idle(Duration::from_secs(5)));
        assert!(victim.is_exiting());
        assert_eq!(victim.core.state.lock().exit_reason, "unhandled timeout");
    }

    #[test]
    fn test_foreign_thread_receive_is_rejected() {
        let _s = serial();
        let actor = local::spawn(|| {
            local::react(Case::when(|_: Box<i32>| ()));
        });
        std::thread::sleep(Duration::from_millis(30));
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            actor.receive(Case::any(|m| m));
        }));
        assert!(result.is_err());
        // Unblock the parked reaction so the scheduler can drain.
        actor.send(Box::new(1i32));
        assert!(Scheduler::global().wait_idle(Duration::from_secs(5)));
    }
}
