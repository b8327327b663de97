//! Keeps one misbehaving item from taking a stage thread down

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Runs a per-item collaborator call, turning a panic into its message
///
/// Stage threads own their queue receivers, so an unwinding thread would
/// leave queued messages counted forever and the run would never go idle.
pub(crate) fn isolate_panic<T>(call: impl FnOnce() -> T) -> Result<T, String> {
    catch_unwind(AssertUnwindSafe(call)).map_err(panic_message)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
