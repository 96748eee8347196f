/*

THIS SOFTWARE IS OPEN SOURCE UNDER THE MIT LICENSE

Copyright 2025 Vincent Maciejewski, & M2 Tech
Contact:
v@m2te.ch
mayeski@gmail.com
https://www.linkedin.com/in/vmayeski/
http://m2te.ch/

*/

//! Pattern handlers for selective receive.
//!
//! A `Case` is an ordered list of arms, each a predicate over messages plus
//! the code to run on a match. The combined predicate doubles as the
//! actor's `waiting_for` filter: senders test it under the receiver's lock,
//! and the first arm whose guard accepts the message runs the body.

use std::sync::Arc;

use crate::message::Message;

/// Shared predicate over messages.
///
/// Cloned into the waiting actor's state so sender threads can test it
/// without touching the handler bodies.
pub type Guard = Arc<dyn Fn(&dyn Message) -> bool + Send + Sync>;

struct Arm<R> {
    guard: Guard,
    body: Box<dyn FnOnce(Box<dyn Message>) -> R + Send>,
}

/// An ordered set of pattern arms, applied to the first matching message.
///
/// Arms are tried in the order they were added; among mailbox entries the
/// oldest message matching *any* arm wins, then the first arm defined on it
/// runs.
///
/// # Example
/// ```
/// use troupe::Case;
///
/// let case = Case::when(|s: Box<String>| *s)
///     .or_when(|n: Box<i32>| n.to_string());
/// assert!(case.is_defined(&5i32));
/// assert!(!case.is_defined(&1.5f64));
/// ```
pub struct Case<R> {
    arms: Vec<Arm<R>>,
}

impl<R> Case<R> {
    /// Single arm matching any message of type `T`.
    pub fn when<T, F>(body: F) -> Self
    where
        T: Message,
        F: FnOnce(Box<T>) -> R + Send + 'static,
    {
        Case { arms: vec![] }.or_when(body)
    }

    /// Single arm matching messages of type `T` that also satisfy `pred`.
    pub fn when_where<T, P, F>(pred: P, body: F) -> Self
    where
        T: Message,
        P: Fn(&T) -> bool + Send + Sync + 'static,
        F: FnOnce(Box<T>) -> R + Send + 'static,
    {
        Case { arms: vec![] }.or_when_where(pred, body)
    }

    /// Single arm accepting any message.
    pub fn any<F>(body: F) -> Self
    where
        F: FnOnce(Box<dyn Message>) -> R + Send + 'static,
    {
        Case { arms: vec![] }.or_any(body)
    }

    /// Append an arm matching any message of type `T`.
    pub fn or_when<T, F>(mut self, body: F) -> Self
    where
        T: Message,
        F: FnOnce(Box<T>) -> R + Send + 'static,
    {
        self.arms.push(Arm {
            guard: Arc::new(|m: &dyn Message| m.is::<T>()),
            body: Box::new(move |m| match m.downcast::<T>() {
                Ok(t) => body(t),
                Err(_) => unreachable!("guard accepted a message of another type"),
            }),
        });
        self
    }

    /// Append an arm matching messages of type `T` that satisfy `pred`.
    pub fn or_when_where<T, P, F>(mut self, pred: P, body: F) -> Self
    where
        T: Message,
        P: Fn(&T) -> bool + Send + Sync + 'static,
        F: FnOnce(Box<T>) -> R + Send + 'static,
    {
        self.arms.push(Arm {
            guard: Arc::new(move |m: &dyn Message| {
                m.downcast_ref::<T>().map_or(false, &pred)
            }),
            body: Box::new(move |m| match m.downcast::<T>() {
                Ok(t) => body(t),
                Err(_) => unreachable!("guard accepted a message of another type"),
            }),
        });
        self
    }

    /// Append a catch-all arm.
    pub fn or_any<F>(mut self, body: F) -> Self
    where
        F: FnOnce(Box<dyn Message>) -> R + Send + 'static,
    {
        self.arms.push(Arm {
            guard: Arc::new(|_| true),
            body: Box::new(body),
        });
        self
    }

    /// Whether any arm is defined on `msg`.
    pub fn is_defined(&self, msg: &dyn Message) -> bool {
        self.arms.iter().any(|arm| (*arm.guard)(msg))
    }

    /// The combined predicate, for installation as `waiting_for`.
    pub(crate) fn guard(&self) -> Guard {
        let guards: Vec<Guard> = self.arms.iter().map(|arm| arm.guard.clone()).collect();
        Arc::new(move |m| guards.iter().any(|g| (**g)(m)))
    }

    /// Run the first arm defined on `msg`.
    ///
    /// Callers check `is_defined` (or extract through the combined guard)
    /// first; applying an unmatched message is a bug in the runtime.
    pub(crate) fn apply(self, msg: Box<dyn Message>) -> R {
        for arm in self.arms {
            if (*arm.guard)(msg.as_ref()) {
                return (arm.body)(msg);
            }
        }
        panic!("no pattern arm defined on the delivered message");
    }
}
