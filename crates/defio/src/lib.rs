//! # defio: deferred execution on io_uring
//!
//! A strictly single-threaded asynchronous core: single-assignment futures
//! with monadic composition, multiplexed with io_uring completions by one
//! fair reactor cycle.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Application code                                        │
//! │    Deferred::new / ops::read / ops::sleep                │
//! │    .bind(..) .map(..) .upon(..) .fill(..)                │
//! └───────────────┬──────────────────────────────────────────┘
//!                 │ continuations buffered in cells,
//!                 │ submissions tagged with slot tokens
//! ┌───────────────▼──────────────────────────────────────────┐
//! │  Reactor (one thread, no locks)                          │
//! │    job queue ── run N queued continuations               │
//! │    slot table ─ token → cell                             │
//! │    ring ─────── drain M completions → fill cells         │
//! │    idle ─────── block on the ring until one arrives      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use defio::{ops, Deferred, Reactor};
//!
//! fn main() -> defio::Result<()> {
//!     let reactor = Reactor::new()?;
//!
//!     let d = Deferred::<u32>::new(&reactor);
//!     let r = reactor.clone();
//!     d.bind(move |x| Deferred::resolved(&r, x * 2))
//!         .upon(|x| println!("x is {}", x));
//!     d.fill(7)?;
//!
//!     let r = reactor.clone();
//!     ops::sleep(&reactor, 1)?.upon(move |_| r.request_shutdown());
//!
//!     reactor.run();
//!     Ok(())
//! }
//! ```
//!
//! ## Design decisions
//!
//! - **Tokens, not pointers**: completions are routed through a slot table
//!   indexed by the SQE's `user_data`, never by pointer reinterpretation.
//! - **Queue-only dispatch**: `upon` never runs its continuation inline,
//!   even on an already-resolved deferred. Execution is breadth-first per
//!   cycle and stack depth stays flat across composition chains.
//! - **Explicit reactor handles**: no global singleton; tests run as many
//!   independent reactors as they like.
//! - **Result codes, not errors**: a completion's negative errno is logged
//!   and delivered as the ordinary resolved value. Interpretation belongs to
//!   the continuation.

#[cfg(not(target_os = "linux"))]
compile_error!("defio requires io_uring and therefore Linux");

pub mod deferred;
pub mod ops;
pub mod reactor;
mod slot;
pub mod uring;

// Re-export the main types
pub use defio_core::{DefioError, Result};
pub use deferred::Deferred;
pub use reactor::{Reactor, ReactorConfig};
pub use uring::UringDriver;
