//! Cooperative tasks and channels (spec.md §5).
//!
//! `Value` is built from `Rc`/`RefCell`, so it is not `Send`: a `Task` cannot
//! be handed to a real OS thread without unsafe code. `thread-spawn` instead
//! runs its block to completion on the calling thread before the expression
//! evaluates, and wraps the outcome in a `Task` whose `join` immediately
//! resolves to that outcome. `select`'s polling loop and `recv`'s direct
//! blocking call both still observe genuine FIFO handoff because the
//! underlying `std::sync::mpsc` channel is real, even though no other thread
//! is ever running concurrently to fill it.

use std::rc::Rc;

use crate::diagnostics::EvalResult;
use crate::value::{Channel, Task, Value};

/// A fresh, unbounded rendezvous channel. `send` never blocks; `recv` blocks
/// only in the sense that it waits on an empty `mpsc::Receiver`, which
/// returns an error immediately once every `Sender` has been dropped.
pub fn new_channel() -> Rc<Channel> {
    let (sender, receiver) = std::sync::mpsc::channel();
    Rc::new(Channel {
        sender,
        receiver: std::cell::RefCell::new(receiver),
    })
}

/// Wraps an already-computed task outcome. `handle` stays `None`: there is
/// no real `JoinHandle` to store under the synchronous task model.
pub fn finished_task(result: EvalResult<Value>) -> Rc<Task> {
    Rc::new(Task {
        handle: std::cell::RefCell::new(None),
        result: Rc::new(std::cell::RefCell::new(Some(result))),
    })
}
