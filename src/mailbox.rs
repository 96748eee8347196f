/*

THIS SOFTWARE IS OPEN SOURCE UNDER THE MIT LICENSE

Copyright 2025 Vincent Maciejewski, & M2 Tech
Contact:
v@m2te.ch
mayeski@gmail.com
https://www.linkedin.com/in/vmayeski/
http://m2te.ch/

*/

//! The per-actor message queue.
//!
//! Ordered `(message, reply destination)` entries with predicate-based
//! first-match extraction. Mailboxes stay short in practice: a message whose
//! pattern is already being waited for is handed off directly and never
//! enqueued here.

use std::collections::VecDeque;

use crate::actor::ReplyTo;
use crate::message::Message;

/// One queued delivery.
pub(crate) struct Entry {
    pub msg: Box<dyn Message>,
    pub reply: ReplyTo,
}

/// Ordered queue with stable selective extraction.
pub(crate) struct MessageQueue {
    entries: VecDeque<Entry>,
}

impl MessageQueue {
    pub fn new() -> Self {
        MessageQueue {
            entries: VecDeque::new(),
        }
    }

    /// Append at the tail.
    pub fn append(&mut self, msg: Box<dyn Message>, reply: ReplyTo) {
        self.entries.push_back(Entry { msg, reply });
    }

    /// Remove and return the first entry whose message satisfies `pred`.
    ///
    /// The relative order of the remaining entries is preserved.
    pub fn extract_first(&mut self, pred: impl Fn(&dyn Message) -> bool) -> Option<Entry> {
        let idx = self
            .entries
            .iter()
            .position(|entry| pred(entry.msg.as_ref()))?;
        self.entries.remove(idx)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
