//! Single-assignment futures.
//!
//! An [`Ivar`] is a cell that is written at most once and buffers the
//! continuations registered before the write. A [`Deferred`] is the shared
//! handle over one cell and carries the composition surface: `fill`, `upon`,
//! `bind`, `map`, `ignore`.
//!
//! Continuations never run inline. Filling a cell (or registering on an
//! already-full one) only enqueues jobs on the owning reactor; they execute
//! on a later cycle. That keeps call stacks flat across long composition
//! chains and makes execution order a property of the queue, not of who
//! happened to call `fill`.
//!
//! Lifetime: a freshly created root cell is tracked in the reactor's pending
//! set until filled, so an in-flight operation's cell survives even when
//! every user handle is dropped. Cells hold only a `Weak` edge back to the
//! reactor, so the tracking is not an ownership cycle.

use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use defio_core::error::{DefioError, Result};
use defio_core::job::Job;
use defio_core::{derror, dwarn};

use crate::reactor::{Reactor, Shared};

/// The single-assignment cell. One per root [`Deferred`]; aliased by every
/// handle cloned or composed from it.
pub(crate) struct Ivar<T> {
    reactor: Weak<Shared>,
    val: RefCell<Option<T>>,
    waiters: RefCell<VecDeque<Box<dyn FnOnce(T)>>>,
}

impl<T: Clone + 'static> Ivar<T> {
    pub(crate) fn new(reactor: Weak<Shared>) -> Self {
        Self {
            reactor,
            val: RefCell::new(None),
            waiters: RefCell::new(VecDeque::new()),
        }
    }

    fn filled(reactor: Weak<Shared>, v: T) -> Self {
        Self {
            reactor,
            val: RefCell::new(Some(v)),
            waiters: RefCell::new(VecDeque::new()),
        }
    }

    pub(crate) fn is_full(&self) -> bool {
        self.val.borrow().is_some()
    }

    /// Identity key for the pending set.
    fn key(&self) -> usize {
        self as *const Self as *const () as usize
    }

    /// Write the value. Fails with `AlreadyFilled` on a second write, leaving
    /// the cell untouched. On success every buffered continuation moves into
    /// the reactor's job queue, in registration order, and the cell's
    /// pending-set entry is dropped.
    pub(crate) fn fill(&self, v: T) -> Result<()> {
        {
            let mut val = self.val.borrow_mut();
            if val.is_some() {
                return Err(DefioError::AlreadyFilled);
            }
            *val = Some(v.clone());
        }
        let waiters: Vec<_> = self.waiters.borrow_mut().drain(..).collect();
        match self.reactor.upgrade() {
            Some(shared) => {
                for f in waiters {
                    shared.enqueue(Job::new(f, v.clone()));
                }
                shared.untrack(self.key());
            }
            None => {
                if !waiters.is_empty() {
                    dwarn!(
                        "deferred filled after its reactor was dropped; {} continuation(s) lost",
                        waiters.len()
                    );
                }
            }
        }
        Ok(())
    }

    /// Register a continuation. Queued immediately (with a clone of the
    /// value) if the cell is already full; buffered otherwise. Never invoked
    /// inline.
    pub(crate) fn register(&self, f: Box<dyn FnOnce(T)>) {
        let ready = self.val.borrow().clone();
        match ready {
            Some(v) => match self.reactor.upgrade() {
                Some(shared) => shared.enqueue(Job::new(f, v)),
                None => dwarn!("continuation registered after its reactor was dropped; lost"),
            },
            None => self.waiters.borrow_mut().push_back(f),
        }
    }
}

/// Shared handle to one single-assignment cell.
///
/// Handles are cheap to clone; clones alias the same cell. `T` must be
/// `Clone` because every registered continuation receives its own copy of
/// the value.
pub struct Deferred<T> {
    cell: Rc<Ivar<T>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred").finish_non_exhaustive()
    }
}

impl<T: Clone + 'static> Deferred<T> {
    /// A fresh unfilled deferred, tracked by `reactor` until filled.
    pub fn new(reactor: &Reactor) -> Self {
        Self::new_in(reactor.shared())
    }

    /// A deferred already holding `v`. Not tracked: there is nothing left to
    /// wait for.
    pub fn resolved(reactor: &Reactor, v: T) -> Self {
        Self::resolved_in(reactor.shared(), v)
    }

    pub(crate) fn new_in(shared: &Rc<Shared>) -> Self {
        let cell = Rc::new(Ivar::new(Rc::downgrade(shared)));
        let keep: Rc<dyn Any> = cell.clone();
        shared.track(Rc::as_ptr(&cell) as *const () as usize, keep);
        Self { cell }
    }

    pub(crate) fn resolved_in(shared: &Rc<Shared>, v: T) -> Self {
        Self {
            cell: Rc::new(Ivar::filled(Rc::downgrade(shared), v)),
        }
    }

    /// Wrap an existing cell, tracking it only if still unfilled. Used by
    /// the operation launcher for completion-linked cells.
    pub(crate) fn from_cell(reactor: &Reactor, cell: Rc<Ivar<T>>) -> Self {
        if !cell.is_full() {
            let keep: Rc<dyn Any> = cell.clone();
            reactor
                .shared()
                .track(Rc::as_ptr(&cell) as *const () as usize, keep);
        }
        Self { cell }
    }

    /// A deferred with no reactor behind it. Returned from combinators whose
    /// source outlived its reactor; it can never resolve.
    fn orphan<R: Clone + 'static>() -> Deferred<R> {
        Deferred {
            cell: Rc::new(Ivar::new(Weak::new())),
        }
    }

    pub fn is_full(&self) -> bool {
        self.cell.is_full()
    }

    /// Resolve with `v`. Errors with `AlreadyFilled` if this deferred (or an
    /// alias of it) was already resolved.
    pub fn fill(&self, v: T) -> Result<()> {
        self.cell.fill(v)
    }

    /// Run `f` with the value once resolved. Always dispatched through the
    /// reactor's job queue, even when the value is already present.
    pub fn upon<F>(&self, f: F)
    where
        F: FnOnce(T) + 'static,
    {
        self.cell.register(Box::new(f));
    }

    /// Monadic bind: returns a deferred that resolves, after both this one
    /// and the one `f` produces have resolved in that order, with the inner
    /// value.
    pub fn bind<R, F>(&self, f: F) -> Deferred<R>
    where
        R: Clone + 'static,
        F: FnOnce(T) -> Deferred<R> + 'static,
    {
        let ret = match self.cell.reactor.upgrade() {
            Some(shared) => Deferred::new_in(&shared),
            None => {
                dwarn!("bind on a deferred whose reactor was dropped");
                Self::orphan()
            }
        };
        let out = ret.clone();
        self.upon(move |t| {
            let inner = f(t);
            inner.upon(move |r| {
                // The result cell is ours alone; a double fill here is a bug.
                if let Err(e) = out.fill(r) {
                    derror!("bind: result cell: {}", e);
                }
            });
        });
        ret
    }

    /// Pure value transform; no suspension beyond this deferred's own.
    pub fn map<R, F>(&self, f: F) -> Deferred<R>
    where
        R: Clone + 'static,
        F: FnOnce(T) -> R + 'static,
    {
        let weak = self.cell.reactor.clone();
        self.bind(move |t| {
            let v = f(t);
            match weak.upgrade() {
                Some(shared) => Deferred::resolved_in(&shared, v),
                None => Deferred {
                    cell: Rc::new(Ivar::filled(Weak::new(), v)),
                },
            }
        })
    }

    /// Discard the value, keeping only the completion signal.
    pub fn ignore(&self) -> Deferred<()> {
        self.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactor::test_util::StubDriver;
    use crate::reactor::Reactor;
    use std::cell::Cell;

    fn reactor() -> Reactor {
        let (driver, _state) = StubDriver::new();
        Reactor::with_driver(Box::new(driver))
    }

    #[test]
    fn test_upon_then_fill_one_cycle() {
        let r = reactor();
        let d = Deferred::<i32>::new(&r);
        let seen = Rc::new(Cell::new(0));
        let s = seen.clone();
        d.upon(move |x| s.set(x * 2));

        d.fill(7).expect("first fill");
        assert!(d.is_full());
        assert_eq!(seen.get(), 0, "continuations never run at fill time");

        r.run_cycle();
        assert_eq!(seen.get(), 14);
    }

    #[test]
    fn test_fill_then_upon_still_queued() {
        let r = reactor();
        let d = Deferred::<i32>::new(&r);
        d.fill(5).expect("fill");

        let seen = Rc::new(Cell::new(0));
        let s = seen.clone();
        d.upon(move |x| s.set(x));
        assert_eq!(seen.get(), 0, "upon on a full cell must not run inline");

        r.run_cycle();
        assert_eq!(seen.get(), 5);
    }

    #[test]
    fn test_continuations_fire_in_registration_order() {
        let r = reactor();
        let d = Deferred::<i32>::new(&r);
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..4 {
            let log = log.clone();
            d.upon(move |x| log.borrow_mut().push((i, x)));
        }
        d.fill(9).expect("fill");
        r.run_cycle();
        assert_eq!(*log.borrow(), vec![(0, 9), (1, 9), (2, 9), (3, 9)]);
    }

    #[test]
    fn test_double_fill_fails_and_preserves_value() {
        let r = reactor();
        let d = Deferred::<i32>::new(&r);
        d.fill(1).expect("first fill");
        assert_eq!(d.fill(2), Err(DefioError::AlreadyFilled));

        // Late registration still observes the original value, once.
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        d.upon(move |x| s.borrow_mut().push(x));
        r.run_cycle();
        r.run_cycle();
        assert_eq!(*seen.borrow(), vec![1]);
    }

    #[test]
    fn test_two_fills_same_cycle_run_next_cycle() {
        let r = reactor();
        let d1 = Deferred::<i32>::new(&r);
        let d2 = Deferred::<i32>::new(&r);
        let log = Rc::new(RefCell::new(Vec::new()));
        let (l1, l2) = (log.clone(), log.clone());
        d1.upon(move |x| l1.borrow_mut().push(x));
        d2.upon(move |x| l2.borrow_mut().push(x));

        // A job that fills both: the fills happen inside a cycle, their
        // continuations must wait for the next one.
        let (e1, e2) = (d1.clone(), d2.clone());
        let log2 = log.clone();
        let probe = Deferred::<()>::new(&r);
        probe.upon(move |_| {
            e1.fill(10).expect("fill d1");
            e2.fill(20).expect("fill d2");
            assert!(log2.borrow().is_empty(), "fills must not run continuations");
        });
        probe.fill(()).expect("fill probe");

        r.run_cycle(); // runs probe's continuation, which fills d1/d2
        assert!(log.borrow().is_empty());
        r.run_cycle(); // runs both queued continuations
        assert_eq!(*log.borrow(), vec![10, 20]);
    }

    #[test]
    fn test_map_composition() {
        let r = reactor();

        let a = Deferred::<i32>::new(&r);
        let chained = a.map(|x| x + 1).map(|x| x * 3);
        let b = Deferred::<i32>::new(&r);
        let fused = b.map(|x| (x + 1) * 3);

        let (ca, cb) = (Rc::new(Cell::new(0)), Rc::new(Cell::new(0)));
        let (sa, sb) = (ca.clone(), cb.clone());
        chained.upon(move |x| sa.set(x));
        fused.upon(move |x| sb.set(x));

        a.fill(4).expect("fill a");
        b.fill(4).expect("fill b");
        for _ in 0..6 {
            r.run_cycle();
        }
        assert_eq!(ca.get(), 15);
        assert_eq!(cb.get(), 15);
    }

    #[test]
    fn test_bind_flattens_prefilled_inner() {
        let r = reactor();
        let d = Deferred::<i32>::new(&r);
        let r2 = r.clone();
        let e = d.bind(move |x| Deferred::resolved(&r2, x + 100));

        d.fill(1).expect("fill");
        // Cycle 1 runs the bind continuation; cycle 2 runs the inner
        // cell's queued hand-off. A pre-filled inner adds no further wait.
        r.run_cycle();
        r.run_cycle();
        assert!(e.is_full());

        let seen = Rc::new(Cell::new(0));
        let s = seen.clone();
        e.upon(move |x| s.set(x));
        r.run_cycle();
        assert_eq!(seen.get(), 101);
    }

    #[test]
    fn test_bind_orders_outer_before_inner() {
        let r = reactor();
        let log = Rc::new(RefCell::new(Vec::new()));

        let outer = Deferred::<i32>::new(&r);
        let inner = Deferred::<i32>::new(&r);

        let inner2 = inner.clone();
        let l1 = log.clone();
        let e = outer.bind(move |x| {
            l1.borrow_mut().push(("outer", x));
            inner2
        });
        let l2 = log.clone();
        e.upon(move |x| l2.borrow_mut().push(("result", x)));

        outer.fill(1).expect("fill outer");
        r.run_cycle();
        assert_eq!(*log.borrow(), vec![("outer", 1)]);
        assert!(!e.is_full(), "result waits for the inner deferred");

        inner.fill(2).expect("fill inner");
        for _ in 0..3 {
            r.run_cycle();
        }
        assert_eq!(*log.borrow(), vec![("outer", 1), ("result", 2)]);
    }

    #[test]
    fn test_ignore_signals_completion() {
        let r = reactor();
        let d = Deferred::<i32>::new(&r);
        let done = Rc::new(Cell::new(false));
        let s = done.clone();
        d.ignore().upon(move |()| s.set(true));
        d.fill(42).expect("fill");
        for _ in 0..4 {
            r.run_cycle();
        }
        assert!(done.get());
    }

    #[test]
    fn test_pending_set_keeps_cell_alive() {
        let r = reactor();
        let cell = Rc::new(Ivar::<i32>::new(Rc::downgrade(r.shared())));
        let seen = Rc::new(Cell::new(0));

        {
            let d = Deferred::from_cell(&r, cell.clone());
            let s = seen.clone();
            d.upon(move |x| s.set(x));
        } // every handle dropped; only the pending set and `cell` remain

        assert_eq!(r.pending_cells(), 1);

        // The completion path fills the cell directly.
        cell.fill(33).expect("fill");
        assert_eq!(r.pending_cells(), 0);
        r.run_cycle();
        assert_eq!(seen.get(), 33);
    }

    #[test]
    fn test_from_cell_skips_tracking_when_full() {
        let r = reactor();
        let cell = Rc::new(Ivar::<i32>::new(Rc::downgrade(r.shared())));
        cell.fill(1).expect("fill");
        let _d = Deferred::from_cell(&r, cell);
        assert_eq!(r.pending_cells(), 0);
    }

    #[test]
    fn test_resolved_not_tracked() {
        let r = reactor();
        let d = Deferred::resolved(&r, 8);
        assert!(d.is_full());
        assert_eq!(r.pending_cells(), 0);
    }
}
