//! defio demonstration.
//!
//! Three independent strands of work on one reactor:
//!   1. Pure composition: bind a doubling step onto a deferred, fill it.
//!   2. Async file read: 9 bytes through the ring, printed on completion.
//!   3. Sleep chain: three one-second sleeps sequenced with bind.
//!
//! The reactor shuts down once all three strands have completed.

use std::cell::Cell;
use std::os::unix::io::AsRawFd;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use defio::{ops, Deferred, Reactor};

/// Counts strands down to zero, then stops the reactor.
#[derive(Clone)]
struct Done {
    left: Rc<Cell<u32>>,
    reactor: Reactor,
}

impl Done {
    fn new(reactor: &Reactor, strands: u32) -> Self {
        Self {
            left: Rc::new(Cell::new(strands)),
            reactor: reactor.clone(),
        }
    }

    fn finish(&self) {
        let left = self.left.get() - 1;
        self.left.set(left);
        if left == 0 {
            self.reactor.request_shutdown();
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn simple_math(reactor: &Reactor, done: &Done) {
    let d = Deferred::<u32>::new(reactor);
    let r = reactor.clone();
    let e = d.bind(move |x| Deferred::resolved(&r, x * 2));
    let done = done.clone();
    e.upon(move |x| {
        println!("x is {}", x);
        done.finish();
    });
    d.fill(7).expect("fill");
}

fn read_from_file(reactor: &Reactor, done: &Done) {
    let path = std::env::temp_dir().join("defio_demo.txt");
    std::fs::write(&path, b"ninebytes and then some\n").expect("create demo file");
    let file = std::fs::File::open(&path).expect("open demo file");

    let mut buf = vec![0u8; 16];
    let ptr = buf.as_mut_ptr();
    let d = unsafe { ops::read(reactor, file.as_raw_fd(), ptr, 9) }.expect("submit read");

    let done = done.clone();
    d.upon(move |n| {
        let _keep = &file; // descriptor stays open until the completion
        if n >= 0 {
            let text = String::from_utf8_lossy(&buf[..n as usize]);
            println!("read {} bytes into buf: {}", n, text);
        } else {
            println!("read failed: {}", std::io::Error::from_raw_os_error(-n));
        }
        let _ = std::fs::remove_file(&path);
        done.finish();
    });
}

fn print_time_and_sleep(reactor: &Reactor, secs: u64) -> Deferred<()> {
    println!("{}", unix_now());
    ops::sleep(reactor, secs).expect("submit timeout")
}

fn print_some_times(reactor: &Reactor, done: &Done) {
    let r1 = reactor.clone();
    let r2 = reactor.clone();
    let done = done.clone();
    print_time_and_sleep(reactor, 1)
        .bind(move |_| print_time_and_sleep(&r1, 1))
        .bind(move |_| print_time_and_sleep(&r2, 1))
        .upon(move |_| {
            println!("{}", unix_now());
            done.finish();
        });
}

fn main() {
    let reactor = Reactor::new().expect("io_uring setup");
    let done = Done::new(&reactor, 3);

    simple_math(&reactor, &done);
    read_from_file(&reactor, &done);
    print_some_times(&reactor, &done);

    reactor.run();
}
