/*

THIS SOFTWARE IS OPEN SOURCE UNDER THE MIT LICENSE

Copyright 2025 Vincent Maciejewski, & M2 Tech
Contact:
v@m2te.ch
mayeski@gmail.com
https://www.linkedin.com/in/vmayeski/
http://m2te.ch/

*/

//! The `self` binding and the entry facade.
//!
//! Every thread has a current-actor slot. The scheduler binds it around
//! each reaction; on a plain thread the slot is filled lazily with a proxy
//! actor wrapping that thread, so sending, receiving and replying work from
//! arbitrary callers. The free functions here operate on the current actor
//! and are the way behaviors talk to the runtime.

use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::actor::ActorRef;
use crate::case::Case;
use crate::control;
use crate::message::Message;
use crate::messages::NORMAL;

thread_local! {
    static CURRENT: RefCell<Option<ActorRef>> = const { RefCell::new(None) };
}

/// Scoped rebinding of the current actor, installed by the dispatcher.
pub(crate) struct Binding {
    previous: Option<ActorRef>,
}

pub(crate) fn bind(actor: ActorRef) -> Binding {
    let previous = CURRENT.with(|slot| slot.borrow_mut().replace(actor));
    Binding { previous }
}

impl Drop for Binding {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|slot| *slot.borrow_mut() = previous);
    }
}

/// The actor bound to this thread, creating a proxy for a plain thread.
pub(crate) fn current() -> ActorRef {
    CURRENT.with(|slot| {
        let mut slot = slot.borrow_mut();
        match &*slot {
            Some(actor) => actor.clone(),
            None => {
                let proxy = ActorRef::proxy();
                tracing::trace!(actor = proxy.id(), "proxy actor for plain thread");
                *slot = Some(proxy.clone());
                proxy
            }
        }
    })
}

/// Whether `actor` is bound to this thread. Never creates a proxy.
pub(crate) fn is_current(actor: &ActorRef) -> bool {
    CURRENT.with(|slot| slot.borrow().as_ref() == Some(actor))
}

// ----------------------------------------------------------------------
// Constructors
// ----------------------------------------------------------------------

/// Create an actor from a behavior without starting it.
pub fn actor_of<F>(body: F) -> ActorRef
where
    F: FnOnce() + Send + 'static,
{
    ActorRef::with_body(Box::new(body))
}

/// Create and start an actor from a behavior.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use troupe::{self_ref, spawn, receive, Case, Scheduler};
///
/// let me = self_ref();
/// spawn(move || me.send(Box::new(41i32)));
/// let n = receive(Case::when(|n: Box<i32>| *n + 1));
/// assert_eq!(n, 42);
/// # assert!(Scheduler::global().wait_idle(Duration::from_secs(5)));
/// ```
pub fn spawn<F>(body: F) -> ActorRef
where
    F: FnOnce() + Send + 'static,
{
    let actor = actor_of(body);
    actor.start();
    actor
}

/// Create an actor, link it to the current actor, then start it.
pub fn spawn_linked<F>(body: F) -> ActorRef
where
    F: FnOnce() + Send + 'static,
{
    let actor = actor_of(body);
    current().link(&actor);
    actor.start();
    actor
}

// ----------------------------------------------------------------------
// Mailbox access for the current actor
// ----------------------------------------------------------------------

/// The current actor (a lazily created proxy on plain threads).
pub fn self_ref() -> ActorRef {
    current()
}

/// Blocking selective receive on the current actor.
pub fn receive<R>(case: Case<R>) -> R {
    current().receive(case)
}

/// Blocking selective receive with a timeout.
pub fn receive_within<R>(timeout: Duration, case: Case<R>) -> R {
    current().receive_within(timeout, case)
}

/// Consume the oldest message, whatever it is.
pub fn receive_any() -> Box<dyn Message> {
    current().receive_any()
}

/// Detach the current actor on `case`. Never returns; call in tail
/// position.
pub fn react(case: Case<()>) -> ! {
    current().react(case)
}

/// Detach with a timeout.
pub fn react_within(timeout: Duration, case: Case<()>) -> ! {
    current().react_within(timeout, case)
}

/// Reply to the message currently being handled.
pub fn reply(msg: Box<dyn Message>) {
    current().reply(msg)
}

/// Reply with the unit value.
pub fn reply_unit() {
    current().reply(Box::new(()))
}

/// The sender of the message currently being handled.
pub fn sender() -> Option<ActorRef> {
    current().sender()
}

/// Toggle exit trapping for the current actor.
pub fn set_trap_exit(trap: bool) {
    current().set_trap_exit(trap)
}

// ----------------------------------------------------------------------
// Termination
// ----------------------------------------------------------------------

/// Terminate the current actor normally.
///
/// Registered continuation hooks run first; a hook that suspends keeps the
/// actor alive, a hook that returns lets termination proceed.
pub fn exit() -> ! {
    let me = current();
    loop {
        match me.take_on_exit() {
            Some(hook) => hook(),
            None => break,
        }
    }
    control::exit_signal()
}

/// Terminate the current actor with `reason`.
///
/// A non-normal reason propagates over links; trapping peers receive it as
/// an `Exit` message.
pub fn exit_with(reason: &str) -> ! {
    if reason == NORMAL {
        exit()
    }
    let me = current();
    me.set_exit_reason(reason);
    control::exit_signal()
}

// ----------------------------------------------------------------------
// Looping and sequencing sugar
// ----------------------------------------------------------------------

/// Run `body` in a loop, forever. Call in tail position of the behavior.
///
/// Each pass re-arms the continuation hook, so the loop survives both
/// blocking receives and detached reacts inside `body`. The loop ends only
/// when the actor terminates, for example via `exit_with`; see `loop_while`
/// for a bounded loop.
pub fn forever<F>(body: F)
where
    F: FnMut() + Send + 'static,
{
    forever_step(Arc::new(Mutex::new(body)));
}

fn forever_step<F>(body: Arc<Mutex<F>>)
where
    F: FnMut() + Send + 'static,
{
    let me = current();
    let again = Arc::clone(&body);
    let previous = me.take_on_exit();
    me.set_on_exit(Box::new(move || {
        if let Some(hook) = previous {
            current().set_on_exit(hook);
        }
        forever_step(again);
    }));
    let mut pass = body.lock();
    (&mut *pass)();
}

/// Run `body` while `cond` holds, then fall through to the surrounding
/// behavior.
pub fn loop_while<C, F>(cond: C, body: F)
where
    C: FnMut() -> bool + Send + 'static,
    F: FnMut() + Send + 'static,
{
    loop_while_step(Arc::new(Mutex::new((cond, body))));
}

fn loop_while_step<C, F>(state: Arc<Mutex<(C, F)>>)
where
    C: FnMut() -> bool + Send + 'static,
    F: FnMut() + Send + 'static,
{
    let me = current();
    let mut guard = state.lock();
    if !(guard.0)() {
        // Fall through: the enclosing chain's hook, if any, takes over.
        return;
    }
    let again = Arc::clone(&state);
    let previous = me.take_on_exit();
    me.set_on_exit(Box::new(move || {
        if let Some(hook) = previous {
            current().set_on_exit(hook);
        }
        loop_while_step(again);
    }));
    (guard.1)();
}

/// Run `first`, then `rest` once `first`'s chain completes normally.
///
/// An enclosing hook (an outer `seq` or loop) is preserved and takes over
/// after `rest`.
pub fn seq<A, B>(first: A, rest: B)
where
    A: FnOnce() + Send + 'static,
    B: FnOnce() + Send + 'static,
{
    let me = current();
    let previous = me.take_on_exit();
    me.set_on_exit(Box::new(move || {
        if let Some(hook) = previous {
            current().set_on_exit(hook);
        }
        rest();
    }));
    first();
}

/// React to every message in a loop.
///
/// The handler runs once per message; the loop re-enters `react` in tail
/// position. Never returns.
pub fn eventloop<F>(handler: F) -> !
where
    F: FnMut(Box<dyn Message>) + Send + 'static,
{
    eventloop_step(Arc::new(Mutex::new(handler)))
}

fn eventloop_step<F>(handler: Arc<Mutex<F>>) -> !
where
    F: FnMut(Box<dyn Message>) + Send + 'static,
{
    let again = Arc::clone(&handler);
    react(Case::any(move |msg| {
        {
            let mut step = handler.lock();
            (&mut *step)(msg);
        }
        eventloop_step(again);
    }))
}
