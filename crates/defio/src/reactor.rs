//! The reactor: one fair execution cycle over jobs and ring completions.
//!
//! A `Reactor` owns four things: the FIFO job queue, the pending set of
//! live-but-unfulfilled cells, the completion slot table, and the kernel
//! ring behind a [`RingDriver`]. Everything is exclusively owned and only
//! ever touched from the one thread; handles are `Rc` clones.
//!
//! The cycle (see [`Reactor::run_cycle`]):
//!
//! ```text
//!   N = queued jobs          M = ready completions
//!   ┌───────────────────────────────────────────────┐
//!   │ N == 0 && M == 0 → block until one completion │
//!   │ otherwise:                                    │
//!   │   run exactly N jobs, FIFO                    │
//!   │   retrieve exactly M completions,             │
//!   │     fill each token's cell with its result    │
//!   └───────────────────────────────────────────────┘
//! ```
//!
//! Jobs enqueued while a cycle runs (by fills, by continuations) wait for
//! the next cycle. That snapshot is what makes progress per cycle bounded
//! and keeps self-resubmitting chains from starving completions.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use defio_core::error::Result;
use defio_core::job::Job;
use defio_core::op::Submission;
use defio_core::ring::RingDriver;
use defio_core::token::{Completion, Token};
use defio_core::{ddebug, derror, dtrace, dwarn};

use crate::deferred::Ivar;
use crate::slot::SlotTable;
use crate::uring::UringDriver;

/// Ring sizing for a reactor.
pub struct ReactorConfig {
    /// Submission-queue entries. Rounded up to a power of two by the kernel.
    pub sq_entries: u32,
    /// Completion-queue entries; kernel picks (2 * sq) when `None`.
    pub cq_entries: Option<u32>,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            sq_entries: 1024,
            cq_entries: None,
        }
    }
}

/// State shared by every handle of one reactor.
pub(crate) struct Shared {
    jobs: RefCell<VecDeque<Job>>,
    /// Unfulfilled root cells, keyed by cell address. The strong reference
    /// keeps a cell alive while an in-flight operation still owes it a
    /// result, independent of user handles.
    pending: RefCell<HashMap<usize, Rc<dyn Any>>>,
    slots: RefCell<SlotTable>,
    driver: RefCell<Box<dyn RingDriver>>,
    shutdown: Cell<bool>,
}

impl Shared {
    pub(crate) fn enqueue(&self, job: Job) {
        self.jobs.borrow_mut().push_back(job);
    }

    pub(crate) fn track(&self, key: usize, cell: Rc<dyn Any>) {
        self.pending.borrow_mut().insert(key, cell);
    }

    pub(crate) fn untrack(&self, key: usize) {
        self.pending.borrow_mut().remove(&key);
    }
}

/// Handle to one reactor. Clones are cheap and share the same state.
#[derive(Clone)]
pub struct Reactor {
    shared: Rc<Shared>,
}

impl Reactor {
    /// Reactor over a fresh io_uring with default sizing.
    pub fn new() -> Result<Self> {
        Self::with_config(&ReactorConfig::default())
    }

    pub fn with_config(config: &ReactorConfig) -> Result<Self> {
        Ok(Self::with_driver(Box::new(UringDriver::new(config)?)))
    }

    /// Reactor over an explicit ring driver. This is how tests run the cycle
    /// against a scripted ring.
    pub fn with_driver(driver: Box<dyn RingDriver>) -> Self {
        Self {
            shared: Rc::new(Shared {
                jobs: RefCell::new(VecDeque::new()),
                pending: RefCell::new(HashMap::new()),
                slots: RefCell::new(SlotTable::new()),
                driver: RefCell::new(driver),
                shutdown: Cell::new(false),
            }),
        }
    }

    pub(crate) fn shared(&self) -> &Rc<Shared> {
        &self.shared
    }

    /// Jobs waiting for a later cycle.
    pub fn queued_jobs(&self) -> usize {
        self.shared.jobs.borrow().len()
    }

    /// Live unfulfilled root cells.
    pub fn pending_cells(&self) -> usize {
        self.shared.pending.borrow().len()
    }

    /// Submissions whose completion has not been retrieved yet.
    pub fn inflight(&self) -> usize {
        self.shared.slots.borrow().occupied()
    }

    /// Ask the run loop to stop. Checked between cycles, never pre-emptive.
    pub fn request_shutdown(&self) {
        self.shared.shutdown.set(true);
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shared.shutdown.get()
    }

    /// Run cycles until shutdown is requested.
    pub fn run(&self) {
        while !self.shared.shutdown.get() {
            self.run_cycle();
        }
    }

    /// One execution cycle.
    ///
    /// Snapshots the job count `N` and the ready-completion count `M` up
    /// front. With neither, blocks until a completion arrives; the arrival
    /// is observed, not consumed, and the next cycle drains it. Otherwise
    /// runs exactly `N` jobs, then retrieves exactly `M` completions and
    /// fills each one's cell with the signed result.
    pub fn run_cycle(&self) {
        let n = self.shared.jobs.borrow().len();
        let m = self.shared.driver.borrow_mut().ready();

        if n == 0 && m == 0 {
            // The only blocking point in the system.
            if let Err(e) = self.shared.driver.borrow_mut().wait_ready() {
                derror!("cycle: waiting for a completion: {}", e);
            }
            return;
        }

        dtrace!("cycle: {} job(s), {} completion(s)", n, m);

        // Exactly n: anything these jobs enqueue waits for the next cycle.
        for _ in 0..n {
            let job = self.shared.jobs.borrow_mut().pop_front();
            if let Some(job) = job {
                job.run();
            }
        }

        // Exactly m retrievals. Each one is a blocking wait even though the
        // completion is known ready; a no-op wait, see DESIGN.md.
        for _ in 0..m {
            let retrieved = self.shared.driver.borrow_mut().wait_one();
            match retrieved {
                Ok(c) => self.resolve(c),
                Err(e) => {
                    // Best effort: the tagged cell stays unfulfilled and its
                    // slot stays occupied.
                    derror!("cycle: retrieving a completion: {}", e);
                }
            }
        }
    }

    /// Route one completion to its cell.
    fn resolve(&self, c: Completion) {
        let cell = self.shared.slots.borrow_mut().release(c.token);
        match cell {
            Some(cell) => {
                if c.result < 0 {
                    dwarn!(
                        "completion {}: {}",
                        c.token,
                        std::io::Error::from_raw_os_error(-c.result)
                    );
                }
                if let Err(e) = cell.fill(c.result) {
                    derror!("completion {}: {}", c.token, e);
                }
            }
            None => dwarn!("completion {} has no bound cell, dropped", c.token),
        }
    }

    /// Bind `cell` to a fresh completion token.
    pub(crate) fn bind_completion(&self, cell: Rc<Ivar<i32>>) -> Token {
        self.shared.slots.borrow_mut().insert(cell)
    }

    /// Unbind a token whose submission never reached the kernel.
    pub(crate) fn release_completion(&self, token: Token) {
        self.shared.slots.borrow_mut().release(token);
    }

    /// Queue one submission and make it visible to the kernel promptly.
    pub(crate) fn submit_op(&self, op: &Submission, token: Token) -> Result<()> {
        let mut driver = self.shared.driver.borrow_mut();
        driver.push(op, token)?;
        driver.flush()?;
        ddebug!("submitted {} as {}", op.name(), token);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use defio_core::error::{DefioError, Result};
    use defio_core::op::Submission;
    use defio_core::ring::RingDriver;
    use defio_core::token::{Completion, Token};

    /// Scripted ring state, shared with the test body.
    #[derive(Default)]
    pub(crate) struct StubState {
        pub ready: VecDeque<Completion>,
        pub pushed: Vec<(&'static str, Token)>,
        pub unflushed: usize,
        pub fail_push: bool,
    }

    /// A ring driver fed by the test instead of the kernel. Waiting on an
    /// empty stub fails (rather than hanging), which doubles as coverage
    /// for the reactor's ring-wait error path.
    pub(crate) struct StubDriver {
        state: Rc<RefCell<StubState>>,
    }

    impl StubDriver {
        pub(crate) fn new() -> (Self, Rc<RefCell<StubState>>) {
            let state = Rc::new(RefCell::new(StubState::default()));
            (
                Self {
                    state: state.clone(),
                },
                state,
            )
        }
    }

    impl RingDriver for StubDriver {
        fn push(&mut self, op: &Submission, token: Token) -> Result<()> {
            let mut s = self.state.borrow_mut();
            if s.fail_push {
                return Err(DefioError::RingFull);
            }
            s.pushed.push((op.name(), token));
            s.unflushed += 1;
            Ok(())
        }

        fn flush(&mut self) -> Result<usize> {
            let mut s = self.state.borrow_mut();
            let n = s.unflushed;
            s.unflushed = 0;
            Ok(n)
        }

        fn ready(&mut self) -> usize {
            self.state.borrow().ready.len()
        }

        fn wait_ready(&mut self) -> Result<()> {
            if self.state.borrow().ready.is_empty() {
                Err(DefioError::RingWait(libc::EAGAIN))
            } else {
                Ok(())
            }
        }

        fn wait_one(&mut self) -> Result<Completion> {
            self.state
                .borrow_mut()
                .ready
                .pop_front()
                .ok_or(DefioError::RingWait(libc::EAGAIN))
        }

        fn capacity(&self) -> usize {
            1024
        }
    }
}
