//! Marks work that was triggered by a peer.
//!
//! While a forwarded mutation is being applied, the local listeners that
//! would normally forward the same mutation must stay quiet; otherwise two
//! nodes would bounce the command back and forth forever. The flag is scoped
//! to one unit of execution, never to the whole process:
//!
//! - synchronous code (host calls inside `spawn_blocking`) uses the
//!   thread-local flag through [`set_forwarded`] and its RAII guard;
//! - async code uses [`forwarded`], which sets a tokio task-local for the
//!   duration of one future.
//!
//! A continuation that moves to another thread or task does not inherit the
//! flag; it must be set again inside the continuation.

use std::cell::Cell;
use std::future::Future;
use std::marker::PhantomData;

thread_local! {
    static FORWARDED: Cell<bool> = const { Cell::new(false) };
}

tokio::task_local! {
    static TASK_FORWARDED: bool;
}

/// Restores the previous thread-local flag on drop, including on unwind.
///
/// Not `Send`: the guard belongs to the thread whose flag it changed.
#[must_use = "the flag is cleared as soon as the guard is dropped"]
pub struct ForwardedGuard {
    previous: bool,
    _thread_bound: PhantomData<*const ()>,
}

impl Drop for ForwardedGuard {
    fn drop(&mut self) {
        FORWARDED.with(|flag| flag.set(self.previous));
    }
}

/// Sets the flag on the current thread until the guard is dropped.
pub fn set_forwarded() -> ForwardedGuard {
    let previous = FORWARDED.with(|flag| flag.replace(true));
    ForwardedGuard {
        previous,
        _thread_bound: PhantomData,
    }
}

/// Clears the thread-local flag.
pub fn unset_forwarded() {
    FORWARDED.with(|flag| flag.set(false));
}

/// True while the current thread or task applies a forwarded mutation.
pub fn is_forwarded() -> bool {
    FORWARDED.with(Cell::get) || TASK_FORWARDED.try_with(|flag| *flag).unwrap_or(false)
}

/// Runs `fut` with the flag set for the current task.
pub async fn forwarded<F: Future>(fut: F) -> F::Output {
    TASK_FORWARDED.scope(true, fut).await
}

/// Runs a synchronous closure with the thread-local flag set.
///
/// Intended for the body of `spawn_blocking` continuations.
pub fn run_forwarded<R>(f: impl FnOnce() -> R) -> R {
    let _guard = set_forwarded();
    f()
}
