/*

THIS SOFTWARE IS OPEN SOURCE UNDER THE MIT LICENSE

Copyright 2025 Vincent Maciejewski, & M2 Tech
Contact:
v@m2te.ch
mayeski@gmail.com
https://www.linkedin.com/in/vmayeski/
http://m2te.ch/

*/

//! Built-in message types of the runtime.
//!
//! - `Exit` is delivered to linked actors that trap exits.
//! - `Timeout` is the sentinel synthesized when a timed wait elapses.

use crate::actor::ActorRef;

/// Termination notice from a linked actor.
///
/// Delivered as an ordinary mailbox message to peers with `trap_exit` set,
/// for any exit reason. Peers that do not trap never see this type; abnormal
/// termination reaches them through the exit protocol instead.
pub struct Exit {
    /// The actor that terminated
    pub from: ActorRef,
    /// Its exit reason; `"normal"` for voluntary completion
    pub reason: String,
}

impl Exit {
    pub fn new(from: ActorRef, reason: impl Into<String>) -> Self {
        Exit {
            from,
            reason: reason.into(),
        }
    }
}

/// Sentinel delivered when a timed receive elapses.
///
/// `receive_within` and `react_within` hand this to the pattern when no
/// matching message arrived in time. A pattern not defined on `Timeout`
/// terminates the actor with reason `"unhandled timeout"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout;

/// Exit reason of an actor that completed voluntarily.
pub const NORMAL: &str = "normal";
