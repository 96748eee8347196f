/*

THIS SOFTWARE IS OPEN SOURCE UNDER THE MIT LICENSE

Copyright 2025 Vincent Maciejewski, & M2 Tech
Contact:
v@m2te.ch
mayeski@gmail.com
https://www.linkedin.com/in/vmayeski/
http://m2te.ch/

*/

//! Reply channels.
//!
//! A `ReplyChannel` is the destination a synchronous request hands to the
//! callee. It is bound to the requesting actor: sending on the channel wraps
//! the payload in a channel-tagged envelope delivered to the owner's
//! mailbox, and receiving on it is the owner's selective receive restricted
//! to envelopes carrying this channel's id. A fresh channel per request
//! keeps concurrent replies from crossing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::actor::{ActorRef, ReplyTo};
use crate::case::Case;
use crate::message::Message;
use crate::messages::Timeout;

/// Channel id generator
static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Envelope for messages sent through a reply channel.
pub(crate) struct ChannelPayload {
    pub chan: u64,
    pub msg: Box<dyn Message>,
}

/// One-shot-per-request reply destination bound to an owning actor.
#[derive(Clone)]
pub struct ReplyChannel {
    owner: ActorRef,
    id: u64,
}

impl ReplyChannel {
    pub(crate) fn fresh(owner: ActorRef) -> Self {
        ReplyChannel {
            owner,
            id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::SeqCst),
        }
    }

    /// The actor replies sent here are routed to.
    pub fn owner(&self) -> &ActorRef {
        &self.owner
    }

    /// Deliver `msg` to the owner, tagged with this channel's id.
    pub fn send(&self, msg: Box<dyn Message>) {
        let wrapped = Box::new(ChannelPayload {
            chan: self.id,
            msg,
        });
        self.owner.send_with(wrapped, ReplyTo::Nobody);
    }

    /// Receive the next message that arrived via this channel.
    ///
    /// Delegates to the owner's selective receive; the caller must be the
    /// owning actor.
    pub fn receive(&self) -> Box<dyn Message> {
        let id = self.id;
        self.owner.receive(Case::when_where(
            move |payload: &ChannelPayload| payload.chan == id,
            |payload| payload.msg,
        ))
    }

    /// As `receive`, but gives up after `timeout`.
    pub fn receive_within(&self, timeout: Duration) -> Option<Box<dyn Message>> {
        let id = self.id;
        let case = Case::when_where(
            move |payload: &ChannelPayload| payload.chan == id,
            |payload| Some(payload.msg),
        )
        .or_when(|_: Box<Timeout>| None);
        self.owner.receive_within(timeout, case)
    }
}
