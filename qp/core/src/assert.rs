//! Fail-fast assertion path.
//!
//! Every broken invariant in the framework (queue overflow, pool exhaustion,
//! illegal transition, stale event handle) ends up in [`on_assert`]. The
//! handler never returns. A target installs one that logs and resets; the
//! default logs through `log::error!` and panics so host tests can catch it
//! with `#[should_panic]`.

use core::cell::Cell;
use critical_section::Mutex;

/// Signature of a fatal assertion handler.
pub type AssertHandler = fn(module: &'static str, location: i32) -> !;

static HANDLER: Mutex<Cell<Option<AssertHandler>>> = Mutex::new(Cell::new(None));

/// Installs the handler that [`on_assert`] hands control to.
pub fn set_assert_handler(handler: AssertHandler) {
    critical_section::with(|cs| HANDLER.borrow(cs).set(Some(handler)));
}

/// Reports a violated invariant. Control never comes back.
#[cold]
pub fn on_assert(module: &'static str, location: i32) -> ! {
    let handler = critical_section::with(|cs| HANDLER.borrow(cs).get());
    match handler {
        Some(handler) => handler(module, location),
        None => default_handler(module, location),
    }
}

fn default_handler(module: &'static str, location: i32) -> ! {
    log::error!("assertion failed in {module}:{location}");
    panic!("assertion failed in {module}:{location}")
}

/// Asserts an internal invariant, reporting `module_path!()` and `$id`.
#[macro_export]
macro_rules! q_assert {
    ($id:expr, $cond:expr) => {
        if !($cond) {
            $crate::assert::on_assert(module_path!(), $id)
        }
    };
}

/// Checks a precondition of a public operation.
#[macro_export]
macro_rules! q_require {
    ($id:expr, $cond:expr) => {
        $crate::q_assert!($id, $cond)
    };
}

/// Checks a postcondition.
#[macro_export]
macro_rules! q_ensure {
    ($id:expr, $cond:expr) => {
        $crate::q_assert!($id, $cond)
    };
}

/// Unconditional failure for paths that must never execute.
#[macro_export]
macro_rules! q_error {
    ($id:expr) => {
        $crate::assert::on_assert(module_path!(), $id)
    };
}
