//! Typed submission descriptors.
//!
//! One `Submission` variant per supported asynchronous operation. The ring
//! driver translates a variant into its native submission format (for
//! io_uring, the matching opcode builder); nothing downstream of the
//! launcher ever sees untyped argument arrays.
//!
//! Pointer fields follow the kernel's ownership rules, not Rust's: the
//! kernel reads or writes through them after the launch call returns.
//! Whoever constructs a `Submission` guarantees the pointed-to memory stays
//! valid and unaliased until the operation's completion is retrieved.

use std::os::unix::io::RawFd;

/// Description of one asynchronous operation to submit.
#[derive(Debug, Clone, Copy)]
pub enum Submission {
    /// read(fd, buf, len) at the current file position.
    Read {
        fd: RawFd,
        buf: *mut u8,
        len: u32,
    },
    /// readv(fd, iov, nr_vecs) at an explicit offset.
    Readv {
        fd: RawFd,
        iovecs: *const libc::iovec,
        nr_vecs: u32,
        offset: u64,
    },
    /// write(fd, buf, len) at the current file position.
    Write {
        fd: RawFd,
        buf: *const u8,
        len: u32,
    },
    /// writev(fd, iov, nr_vecs) at an explicit offset.
    Writev {
        fd: RawFd,
        iovecs: *const libc::iovec,
        nr_vecs: u32,
        offset: u64,
    },
    /// close(fd).
    Close { fd: RawFd },
    /// fsync(fd).
    Fsync { fd: RawFd },
    /// socket(domain, type, protocol).
    Socket {
        domain: i32,
        ty: i32,
        protocol: i32,
    },
    /// accept(fd, addr, addrlen). `addr`/`addrlen` may be null.
    Accept {
        fd: RawFd,
        addr: *mut libc::sockaddr,
        addrlen: *mut libc::socklen_t,
    },
    /// connect(fd, addr, addrlen).
    Connect {
        fd: RawFd,
        addr: *const libc::sockaddr,
        addrlen: libc::socklen_t,
    },
    /// recv(fd, buf, len, flags=0).
    Recv {
        fd: RawFd,
        buf: *mut u8,
        len: u32,
    },
    /// recvmsg(fd, msg, flags=0).
    RecvMsg {
        fd: RawFd,
        msg: *mut libc::msghdr,
    },
    /// send(fd, buf, len, flags=0).
    Send {
        fd: RawFd,
        buf: *const u8,
        len: u32,
    },
    /// sendmsg(fd, msg, flags=0).
    SendMsg {
        fd: RawFd,
        msg: *const libc::msghdr,
    },
    /// Relative timeout. Completes with -ETIME on expiry.
    Timeout { secs: u64, nsecs: u32 },
}

impl Submission {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Read { .. } => "read",
            Self::Readv { .. } => "readv",
            Self::Write { .. } => "write",
            Self::Writev { .. } => "writev",
            Self::Close { .. } => "close",
            Self::Fsync { .. } => "fsync",
            Self::Socket { .. } => "socket",
            Self::Accept { .. } => "accept",
            Self::Connect { .. } => "connect",
            Self::Recv { .. } => "recv",
            Self::RecvMsg { .. } => "recvmsg",
            Self::Send { .. } => "send",
            Self::SendMsg { .. } => "sendmsg",
            Self::Timeout { .. } => "timeout",
        }
    }
}
