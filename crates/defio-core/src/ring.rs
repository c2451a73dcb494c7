//! Ring driver abstraction.
//!
//! A `RingDriver` owns one kernel submission/completion ring. The reactor
//! drives it through this trait only, so the cycle logic is testable against
//! a scripted driver and the io_uring plumbing lives in one place.

use crate::error::Result;
use crate::op::Submission;
use crate::token::{Completion, Token};

/// Kernel ring submission and completion.
///
/// **Contract:** `push`, `flush` and `ready` never block. `wait_ready` and
/// `wait_one` are the only blocking calls; `wait_one` on a ring with a
/// completion already available returns without sleeping.
pub trait RingDriver {
    /// Queue one submission, stamped with `token`. Not yet visible to the
    /// kernel. `Err(RingFull)` if the submission queue has no room.
    fn push(&mut self, op: &Submission, token: Token) -> Result<()>;

    /// Make all queued submissions visible to the kernel. Returns how many
    /// were submitted.
    fn flush(&mut self) -> Result<usize>;

    /// How many completions can be retrieved right now, without blocking.
    fn ready(&mut self) -> usize;

    /// Block until at least one completion is present. Does not consume it;
    /// a following `ready` reports it and `wait_one` retrieves it.
    fn wait_ready(&mut self) -> Result<()>;

    /// Block until a completion is available, consume it and return it.
    fn wait_one(&mut self) -> Result<Completion>;

    /// Submission-queue capacity.
    fn capacity(&self) -> usize;
}
