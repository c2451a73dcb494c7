//! Asynchronous operation launchers.
//!
//! Each function builds one typed submission, binds a fresh result cell to
//! its completion token, and flushes it to the kernel before returning. The
//! returned [`Deferred<i32>`] resolves with the operation's signed result:
//! the syscall return value, or a negative errno. Nothing here interprets
//! the result; that is the continuation's business.
//!
//! Functions that lend buffers or socket structures to the kernel are
//! `unsafe`: the kernel reads or writes through the pointer after the call
//! returns, so the caller must keep that memory alive and untouched until
//! the deferred resolves. The usual shape is to move the buffer into the
//! `upon` continuation.

use std::os::unix::io::RawFd;
use std::rc::Rc;

use defio_core::error::Result;
use defio_core::op::Submission;

use crate::deferred::{Deferred, Ivar};
use crate::reactor::Reactor;

/// Submit `op` with a fresh completion-linked cell.
fn start(reactor: &Reactor, op: Submission) -> Result<Deferred<i32>> {
    let cell = Rc::new(Ivar::new(Rc::downgrade(reactor.shared())));
    let token = reactor.bind_completion(cell.clone());
    if let Err(e) = reactor.submit_op(&op, token) {
        reactor.release_completion(token);
        return Err(e);
    }
    Ok(Deferred::from_cell(reactor, cell))
}

// ── File I/O ──

/// Read up to `len` bytes into `buf` at the current file position.
///
/// # Safety
/// `buf..buf+len` must stay valid and unaliased until the deferred resolves.
pub unsafe fn read(reactor: &Reactor, fd: RawFd, buf: *mut u8, len: u32) -> Result<Deferred<i32>> {
    start(reactor, Submission::Read { fd, buf, len })
}

/// Vectored read at `offset`.
///
/// # Safety
/// The iovec array and every buffer it points at must stay valid until the
/// deferred resolves.
pub unsafe fn readv(
    reactor: &Reactor,
    fd: RawFd,
    iovecs: *const libc::iovec,
    nr_vecs: u32,
    offset: u64,
) -> Result<Deferred<i32>> {
    start(reactor, Submission::Readv { fd, iovecs, nr_vecs, offset })
}

/// Write `len` bytes from `buf` at the current file position.
///
/// # Safety
/// `buf..buf+len` must stay valid until the deferred resolves.
pub unsafe fn write(
    reactor: &Reactor,
    fd: RawFd,
    buf: *const u8,
    len: u32,
) -> Result<Deferred<i32>> {
    start(reactor, Submission::Write { fd, buf, len })
}

/// Vectored write at `offset`.
///
/// # Safety
/// The iovec array and every buffer it points at must stay valid until the
/// deferred resolves.
pub unsafe fn writev(
    reactor: &Reactor,
    fd: RawFd,
    iovecs: *const libc::iovec,
    nr_vecs: u32,
    offset: u64,
) -> Result<Deferred<i32>> {
    start(reactor, Submission::Writev { fd, iovecs, nr_vecs, offset })
}

/// Close a descriptor.
pub fn close(reactor: &Reactor, fd: RawFd) -> Result<Deferred<i32>> {
    start(reactor, Submission::Close { fd })
}

/// Flush a descriptor's data and metadata to storage.
pub fn fsync(reactor: &Reactor, fd: RawFd) -> Result<Deferred<i32>> {
    start(reactor, Submission::Fsync { fd })
}

// ── Socket I/O ──

/// Create a socket; resolves with the new descriptor.
pub fn socket(reactor: &Reactor, domain: i32, ty: i32, protocol: i32) -> Result<Deferred<i32>> {
    start(reactor, Submission::Socket { domain, ty, protocol })
}

/// Accept one connection; resolves with the new descriptor.
///
/// # Safety
/// `addr`/`addrlen` (when non-null) must stay valid until the deferred
/// resolves.
pub unsafe fn accept(
    reactor: &Reactor,
    fd: RawFd,
    addr: *mut libc::sockaddr,
    addrlen: *mut libc::socklen_t,
) -> Result<Deferred<i32>> {
    start(reactor, Submission::Accept { fd, addr, addrlen })
}

/// Connect a socket.
///
/// # Safety
/// `addr` must stay valid until the deferred resolves.
pub unsafe fn connect(
    reactor: &Reactor,
    fd: RawFd,
    addr: *const libc::sockaddr,
    addrlen: libc::socklen_t,
) -> Result<Deferred<i32>> {
    start(reactor, Submission::Connect { fd, addr, addrlen })
}

/// Receive up to `len` bytes.
///
/// # Safety
/// `buf..buf+len` must stay valid and unaliased until the deferred resolves.
pub unsafe fn recv(reactor: &Reactor, fd: RawFd, buf: *mut u8, len: u32) -> Result<Deferred<i32>> {
    start(reactor, Submission::Recv { fd, buf, len })
}

/// Receive a message.
///
/// # Safety
/// `msg` and every buffer it references must stay valid until the deferred
/// resolves.
pub unsafe fn recvmsg(reactor: &Reactor, fd: RawFd, msg: *mut libc::msghdr) -> Result<Deferred<i32>> {
    start(reactor, Submission::RecvMsg { fd, msg })
}

/// Send `len` bytes.
///
/// # Safety
/// `buf..buf+len` must stay valid until the deferred resolves.
pub unsafe fn send(reactor: &Reactor, fd: RawFd, buf: *const u8, len: u32) -> Result<Deferred<i32>> {
    start(reactor, Submission::Send { fd, buf, len })
}

/// Send a message.
///
/// # Safety
/// `msg` and every buffer it references must stay valid until the deferred
/// resolves.
pub unsafe fn sendmsg(
    reactor: &Reactor,
    fd: RawFd,
    msg: *const libc::msghdr,
) -> Result<Deferred<i32>> {
    start(reactor, Submission::SendMsg { fd, msg })
}

// ── Timers ──

/// Resolve after `secs` seconds. The timer's raw completion value (-ETIME on
/// expiry) is discarded; a zero duration simply expires on the next cycle
/// that drains its completion.
pub fn sleep(reactor: &Reactor, secs: u64) -> Result<Deferred<()>> {
    Ok(start(reactor, Submission::Timeout { secs, nsecs: 0 })?.ignore())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::os::unix::io::IntoRawFd;

    fn run_until(reactor: &Reactor, done: &Rc<Cell<bool>>) {
        while !done.get() {
            reactor.run_cycle();
        }
    }

    #[test]
    fn test_read_nine_bytes_from_pipe() {
        let reactor = Reactor::new().expect("io_uring setup");

        let mut fds = [0i32; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let payload = b"ninebytes";
        let wrote = unsafe { libc::write(fds[1], payload.as_ptr() as *const _, payload.len()) };
        assert_eq!(wrote, 9);

        let mut buf = vec![0u8; 16];
        let ptr = buf.as_mut_ptr();
        let d = unsafe { read(&reactor, fds[0], ptr, 9) }.expect("submit read");

        let done = Rc::new(Cell::new(false));
        let seen = Rc::new(Cell::new(0));
        {
            let (done, seen) = (done.clone(), seen.clone());
            d.upon(move |n| {
                seen.set(n);
                assert_eq!(&buf[..9], b"ninebytes");
                done.set(true);
            });
        }
        run_until(&reactor, &done);
        assert_eq!(seen.get(), 9);

        unsafe {
            libc::close(fds[0]);
            libc::close(fds[1]);
        }
    }

    #[test]
    fn test_write_then_readback() {
        let reactor = Reactor::new().expect("io_uring setup");

        let mut fds = [0i32; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let payload = b"hello ring".to_vec();
        let ptr = payload.as_ptr();
        let d = unsafe { write(&reactor, fds[1], ptr, payload.len() as u32) }.expect("submit");

        let done = Rc::new(Cell::new(false));
        {
            let (done, payload_len) = (done.clone(), payload.len());
            d.upon(move |n| {
                let _keep = &payload;
                assert_eq!(n as usize, payload_len);
                done.set(true);
            });
        }
        run_until(&reactor, &done);

        let mut back = [0u8; 16];
        let n = unsafe { libc::read(fds[0], back.as_mut_ptr() as *mut _, back.len()) };
        assert_eq!(n, 10);
        assert_eq!(&back[..10], b"hello ring");

        unsafe {
            libc::close(fds[0]);
            libc::close(fds[1]);
        }
    }

    #[test]
    fn test_close_resolves_with_zero() {
        let reactor = Reactor::new().expect("io_uring setup");
        let fd = std::fs::File::open("/dev/null").expect("open").into_raw_fd();

        let d = close(&reactor, fd).expect("submit close");
        let done = Rc::new(Cell::new(false));
        {
            let done = done.clone();
            d.upon(move |res| {
                assert_eq!(res, 0);
                done.set(true);
            });
        }
        run_until(&reactor, &done);
    }

    #[test]
    fn test_sleep_chain_fires_in_sequence() {
        let reactor = Reactor::new().expect("io_uring setup");
        let order = Rc::new(RefCell::new(Vec::new()));
        let done = Rc::new(Cell::new(false));

        let first = sleep(&reactor, 0).expect("submit sleep");
        let (o1, r1) = (order.clone(), reactor.clone());
        let (o2, r2) = (order.clone(), reactor.clone());
        let (o3, d3) = (order.clone(), done.clone());
        first
            .bind(move |_| {
                o1.borrow_mut().push(1);
                sleep(&r1, 0).expect("submit sleep")
            })
            .bind(move |_| {
                o2.borrow_mut().push(2);
                sleep(&r2, 0).expect("submit sleep")
            })
            .upon(move |_| {
                o3.borrow_mut().push(3);
                d3.set(true);
            });

        run_until(&reactor, &done);
        assert_eq!(*order.borrow(), vec![1, 2, 3]);
        assert_eq!(reactor.inflight(), 0);
    }

    #[test]
    fn test_sleep_discards_raw_timer_result() {
        let reactor = Reactor::new().expect("io_uring setup");
        let done = Rc::new(Cell::new(false));
        {
            let done = done.clone();
            // () is all a sleep ever yields, expiry and errno alike.
            sleep(&reactor, 0).expect("submit sleep").upon(move |()| done.set(true));
        }
        run_until(&reactor, &done);
    }
}
