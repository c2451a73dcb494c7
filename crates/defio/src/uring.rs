//! `UringDriver`, the io_uring implementation of [`RingDriver`].
//!
//! Plain submission via `io_uring_enter`, CQ polling for completions. No
//! SQPOLL, no fixed files or buffers; works on any kernel with io_uring.
//!
//! Each [`Submission`] variant maps to exactly one opcode builder; the
//! completion token rides in the SQE's `user_data`. Timeout submissions
//! need a timespec the kernel can read until the timer fires, so the driver
//! owns those allocations and frees each one when its completion is
//! retrieved.

use std::collections::HashMap;

use io_uring::{opcode, squeue, types, IoUring};

use defio_core::error::{DefioError, Result};
use defio_core::op::Submission;
use defio_core::ring::RingDriver;
use defio_core::token::{Completion, Token};

use crate::reactor::ReactorConfig;

pub struct UringDriver {
    ring: IoUring,
    /// Timespec storage for in-flight timeout submissions, keyed by token.
    timers: HashMap<u64, Box<types::Timespec>>,
}

impl UringDriver {
    pub fn new(config: &ReactorConfig) -> Result<Self> {
        let mut builder = IoUring::builder();
        if let Some(cq) = config.cq_entries {
            builder.setup_cqsize(cq);
        }
        let ring = builder
            .build(config.sq_entries)
            .map_err(|e| DefioError::RingSetup(e.raw_os_error().unwrap_or(-1)))?;

        Ok(Self {
            ring,
            timers: HashMap::new(),
        })
    }

    /// Build the SQE for `op`, stamped with `token`.
    fn translate(&mut self, op: &Submission, token: Token) -> squeue::Entry {
        let sqe = match *op {
            Submission::Read { fd, buf, len } => opcode::Read::new(types::Fd(fd), buf, len)
                .offset(u64::MAX) // -1: current file position
                .build(),
            Submission::Readv {
                fd,
                iovecs,
                nr_vecs,
                offset,
            } => opcode::Readv::new(types::Fd(fd), iovecs, nr_vecs)
                .offset(offset)
                .build(),
            Submission::Write { fd, buf, len } => opcode::Write::new(types::Fd(fd), buf, len)
                .offset(u64::MAX)
                .build(),
            Submission::Writev {
                fd,
                iovecs,
                nr_vecs,
                offset,
            } => opcode::Writev::new(types::Fd(fd), iovecs, nr_vecs)
                .offset(offset)
                .build(),
            Submission::Close { fd } => opcode::Close::new(types::Fd(fd)).build(),
            Submission::Fsync { fd } => opcode::Fsync::new(types::Fd(fd)).build(),
            Submission::Socket {
                domain,
                ty,
                protocol,
            } => opcode::Socket::new(domain, ty, protocol).build(),
            Submission::Accept { fd, addr, addrlen } => {
                opcode::Accept::new(types::Fd(fd), addr, addrlen).build()
            }
            Submission::Connect { fd, addr, addrlen } => {
                opcode::Connect::new(types::Fd(fd), addr, addrlen).build()
            }
            Submission::Recv { fd, buf, len } => opcode::Recv::new(types::Fd(fd), buf, len).build(),
            Submission::RecvMsg { fd, msg } => opcode::RecvMsg::new(types::Fd(fd), msg).build(),
            Submission::Send { fd, buf, len } => opcode::Send::new(types::Fd(fd), buf, len).build(),
            Submission::SendMsg { fd, msg } => opcode::SendMsg::new(types::Fd(fd), msg).build(),
            Submission::Timeout { secs, nsecs } => {
                let ts = Box::new(types::Timespec::new().sec(secs).nsec(nsecs));
                let sqe = opcode::Timeout::new(&*ts as *const types::Timespec).build();
                self.timers.insert(token.0, ts);
                sqe
            }
        };
        sqe.user_data(token.0)
    }
}

impl RingDriver for UringDriver {
    fn push(&mut self, op: &Submission, token: Token) -> Result<()> {
        let sqe = self.translate(op, token);
        // Safety: pointer arguments inside the SQE follow the Submission
        // contract (the launcher's caller keeps them alive until the
        // completion is retrieved); timespecs are owned by `self.timers`.
        let pushed = unsafe { self.ring.submission().push(&sqe) };
        if pushed.is_err() {
            self.timers.remove(&token.0);
            return Err(DefioError::RingFull);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<usize> {
        self.ring
            .submit()
            .map_err(|e| DefioError::RingSubmit(e.raw_os_error().unwrap_or(-1)))
    }

    fn ready(&mut self) -> usize {
        let mut cq = self.ring.completion();
        cq.sync();
        cq.len()
    }

    fn wait_ready(&mut self) -> Result<()> {
        // io_uring_enter(min_complete = 1): returns as soon as the CQ holds
        // at least one entry, without consuming it.
        self.ring
            .submit_and_wait(1)
            .map(|_| ())
            .map_err(|e| DefioError::RingWait(e.raw_os_error().unwrap_or(-1)))
    }

    fn wait_one(&mut self) -> Result<Completion> {
        loop {
            {
                let mut cq = self.ring.completion();
                cq.sync();
                if let Some(cqe) = cq.next() {
                    let token = Token(cqe.user_data());
                    self.timers.remove(&token.0);
                    return Ok(Completion {
                        token,
                        result: cqe.result(),
                    });
                }
            }
            self.ring
                .submit_and_wait(1)
                .map_err(|e| DefioError::RingWait(e.raw_os_error().unwrap_or(-1)))?;
        }
    }

    fn capacity(&self) -> usize {
        self.ring.params().sq_entries() as usize
    }
}
