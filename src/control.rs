/*

THIS SOFTWARE IS OPEN SOURCE UNDER THE MIT LICENSE

Copyright 2025 Vincent Maciejewski, & M2 Tech
Contact:
v@m2te.ch
mayeski@gmail.com
https://www.linkedin.com/in/vmayeski/
http://m2te.ch/

*/

//! Non-local control transfer for suspension and exit.
//!
//! `react` must unwind out of the user's behavior so the worker thread is
//! freed, and `exit` must unwind out of whatever frame the actor is in. Both
//! are signalled with a dedicated panic payload that the reaction dispatcher
//! catches; unwinding runs `Drop` impls on the way out, so user-scoped
//! resources are released. Requires the default `panic = "unwind"` strategy.

use std::any::Any;
use std::panic;
use std::sync::Once;

/// Control payloads understood by the reaction dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Control {
    /// The actor detached; its continuation is registered.
    Suspend,
    /// The actor is terminating; its exit reason is already recorded.
    Exit,
}

/// Outcome of a unit of actor work, as seen by the dispatcher.
pub(crate) enum Caught {
    Suspended,
    Exited,
    /// User code panicked; the payload message becomes the exit reason.
    Failed(String),
}

/// Unwind with a suspension signal. Only called on a bound actor thread.
pub(crate) fn suspend_signal() -> ! {
    ensure_quiet_hook();
    panic::panic_any(Control::Suspend)
}

/// Unwind with an exit signal. Only called on a bound actor thread.
pub(crate) fn exit_signal() -> ! {
    ensure_quiet_hook();
    panic::panic_any(Control::Exit)
}

/// Classify a payload caught by `catch_unwind`.
pub(crate) fn classify(payload: Box<dyn Any + Send>) -> Caught {
    match payload.downcast::<Control>() {
        Ok(ctl) => match *ctl {
            Control::Suspend => Caught::Suspended,
            Control::Exit => Caught::Exited,
        },
        Err(payload) => Caught::Failed(panic_message(&payload)),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

static QUIET_HOOK: Once = Once::new();

/// Keep control payloads out of the default panic report.
///
/// Suspension happens on every `react`, so the stock hook would flood
/// stderr. The previous hook still runs for real panics.
pub(crate) fn ensure_quiet_hook() {
    QUIET_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if info.payload().downcast_ref::<Control>().is_none() {
                previous(info);
            }
        }));
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn test_suspend_signal_is_classified() {
        let payload = catch_unwind(AssertUnwindSafe(|| suspend_signal())).unwrap_err();
        assert!(matches!(classify(payload), Caught::Suspended));
    }

    #[test]
    fn test_exit_signal_is_classified() {
        let payload = catch_unwind(AssertUnwindSafe(|| exit_signal())).unwrap_err();
        assert!(matches!(classify(payload), Caught::Exited));
    }

    #[test]
    fn test_user_panic_keeps_message() {
        ensure_quiet_hook();
        let prev = std::panic::take_hook();
        std::panic::set_hook(Box::new(|_| {}));
        let payload = catch_unwind(AssertUnwindSafe(|| panic!("boom"))).unwrap_err();
        std::panic::set_hook(prev);
        match classify(payload) {
            Caught::Failed(reason) => assert_eq!(reason, "boom"),
            _ => panic!("expected a failure"),
        }
    }

    #[test]
    fn test_unwinding_runs_drops() {
        struct Flag<'a>(&'a mut bool);
        impl Drop for Flag<'_> {
            fn drop(&mut self) {
                *self.0 = true;
            }
        }

        let mut dropped = false;
        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _flag = Flag(&mut dropped);
            suspend_signal()
        }));
        assert!(dropped);
    }
}
