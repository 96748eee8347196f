/*

THIS SOFTWARE IS OPEN SOURCE UNDER THE MIT LICENSE

Copyright 2025 Vincent Maciejewski, & M2 Tech
Contact:
v@m2te.ch
mayeski@gmail.com
https://www.linkedin.com/in/vmayeski/
http://m2te.ch/

*/

//! # Troupe - Event-Based Actor Runtime for Rust
//!
//! A concurrency library for programs built from independent actors that
//! communicate only by asynchronous message passing.
//!
//! ## Features
//!
//! - **Dual execution model**: `receive` blocks a thread (heavyweight but
//!   natural); `react` detaches the continuation and the actor is
//!   re-scheduled when a matching message arrives (lightweight, scales far
//!   beyond the thread count)
//! - **Selective receive**: pattern arms pick the oldest matching message;
//!   non-matching messages stay queued in order
//! - **Reply channels**: per-request reply destinations and synchronous
//!   `request` calls that never cross
//! - **Supervision**: symmetric links, exit cascading, and `trap_exit` to
//!   observe peer terminations as ordinary `Exit` messages
//! - **Works from any thread**: plain threads get a proxy actor, so
//!   sending and receiving need no setup
//!
//! ## Quick Start
//!
//! ```ignore
//! use troupe::{spawn, react, reply, Case};
//!
//! // A service that answers "ping" with "pong".
//! let service = spawn(|| {
//!     react(Case::when_where(
//!         |s: &String| s == "ping",
//!         |_| reply(Box::new("pong".to_string())),
//!     ));
//! });
//!
//! // Ask it synchronously from the current thread.
//! let answer = service.request(Box::new("ping".to_string()));
//! assert_eq!(answer.downcast_ref::<String>().unwrap(), "pong");
//! ```
//!
//! ## Messaging
//!
//! ### Async Send (Fire-and-Forget)
//! ```ignore
//! other_actor.send(Box::new(MyMessage { data: 42 }));
//! ```
//!
//! ### Sync Request
//! ```ignore
//! let response = other_actor.request(Box::new(Query { id: 1 }));
//! let response = other_actor.request_within(timeout, Box::new(Query { id: 2 }));
//! ```
//!
//! ### Reply
//! ```ignore
//! react(Case::when(|q: Box<Query>| {
//!     reply(Box::new(Response { result: 42 }));
//! }));
//! ```
//!
//! ## Termination
//!
//! Behaviors end by returning, by `exit()` (normal), or by
//! `exit_with(reason)` (abnormal). Abnormal termination cascades to linked
//! actors unless they trap exits; see [`ActorRef::link`] and
//! [`ActorRef::set_trap_exit`].
//!
//! The runtime relies on unwinding for suspension and exit; build with the
//! default `panic = "unwind"`.

pub mod actor;
pub mod case;
pub mod channel;
mod control;
pub mod local;
mod mailbox;
pub mod message;
pub mod messages;
pub mod scheduler;
mod timer;

// Re-export the library surface
pub use actor::ActorRef;
pub use case::{Case, Guard};
pub use channel::ReplyChannel;
pub use local::{
    actor_of, eventloop, exit, exit_with, forever, loop_while, react, react_within, receive,
    receive_any, receive_within, reply, reply_unit, self_ref, sender, seq, set_trap_exit, spawn,
    spawn_linked,
};
pub use message::Message;
pub use messages::{Exit, Timeout, NORMAL};
pub use scheduler::Scheduler;
