/*

THIS SOFTWARE IS OPEN SOURCE UNDER THE MIT LICENSE

Copyright 2025 Vincent Maciejewski, & M2 Tech
Contact:
v@m2te.ch
mayeski@gmail.com
https://www.linkedin.com/in/vmayeski/
http://m2te.ch/

*/

//! Message trait for the actor runtime.
//!
//! Mailboxes are heterogeneous: any `Send + 'static` value can be sent to an
//! actor, and selective receive picks entries out by downcasting. The
//! `Message` trait is implemented for every such type automatically.

use std::any::Any;

/// Trait for all messages in the actor system.
///
/// Implemented for every `Send + 'static` type; there is nothing to derive
/// or register. Messages travel as `Box<dyn Message>` and are examined with
/// `is`, `downcast_ref` and `downcast`.
///
/// # Example
/// ```
/// use troupe::Message;
///
/// struct Ping { count: i32 }
///
/// let msg: Box<dyn Message> = Box::new(Ping { count: 3 });
/// assert!(msg.is::<Ping>());
/// assert_eq!(msg.downcast_ref::<Ping>().unwrap().count, 3);
/// ```
pub trait Message: Any + Send {
    /// For inspecting the concrete type
    fn as_any(&self) -> &dyn Any;

    /// For consuming downcasts
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any + Send> Message for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl dyn Message {
    /// Check whether the message is a `T`.
    pub fn is<T: Message>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Borrow the message as a `T`, if it is one.
    pub fn downcast_ref<T: Message>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Take the message as a `T`, handing it back on a type mismatch.
    pub fn downcast<T: Message>(self: Box<Self>) -> Result<Box<T>, Box<dyn Message>> {
        if self.is::<T>() {
            // checked above
            Ok(self.into_any().downcast::<T>().unwrap())
        } else {
            Err(self)
        }
    }
}
