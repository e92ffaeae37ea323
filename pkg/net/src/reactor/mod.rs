//! A readiness-driven event reactor: register a file descriptor and a
//! callback, and a dedicated dispatch thread invokes the callback whenever
//! the kernel reports the descriptor ready.
//!
//! The two backends below differ in almost everything about how they talk
//! to the kernel (epoll vs. kqueue, descriptor-keyed vs.
//! descriptor-and-filter-keyed, level- vs. edge-flavored readiness, EOF
//! signaled by a filter flag vs. a zero-length read), so rather than force a
//! single kernel-facing trait over both, each gets its own concrete type
//! with its own registration key. `Reactor` below is a `cfg`-selected alias
//! to whichever one matches the target OS; code that calls `register` does
//! so once per platform (see `server.rs`).

use std::os::unix::io::RawFd;

#[cfg(not(target_os = "linux"))]
mod bsd;
#[cfg(target_os = "linux")]
mod linux;

#[cfg(not(target_os = "linux"))]
pub use bsd::{BsdReactor as Reactor, Filter};
#[cfg(target_os = "linux")]
pub use linux::LinuxReactor as Reactor;

/// The readiness event delivered to a handler.
#[derive(Debug, Clone, Copy)]
pub struct Event {
    pub fd: RawFd,
    pub readable: bool,
    pub writable: bool,
    /// On the BSD backend, the kernel's estimate of how many bytes are
    /// available to read without blocking (always 0 on the Linux backend,
    /// where EOF is instead signaled by a zero-length `read`).
    pub available: usize,
    /// Set when the kernel reported the peer closed its end of the
    /// connection (BSD: `EV_EOF`). Linux callers detect EOF themselves via a
    /// zero-length `read` and ignore this field.
    pub eof: bool,
}

/// Which direction(s) of readiness a Linux registration cares about (the
/// BSD backend gets the same information from its `Filter` key instead).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest {
    pub read: bool,
    pub write: bool,
}

impl Interest {
    pub const READ: Self = Self {
        read: true,
        write: false,
    };
    pub const WRITE: Self = Self {
        read: false,
        write: true,
    };
    pub const BOTH: Self = Self {
        read: true,
        write: true,
    };
}

/// A handle passed to handler callbacks that permits registering or
/// unregistering descriptors from within the callback itself. The dispatch
/// loop never holds the handler-map lock while a callback is running (the
/// callback is looked up, cloned out of the lock, and invoked only after the
/// lock is released), so re-entrant registration from inside a callback
/// cannot deadlock against the reactor's own dispatch thread.
///
/// Derefs to the backend's concrete reactor type, so callers use whichever
/// `register`/`unregister` signature that backend exposes.
pub struct ReactorHandle<'a> {
    pub(crate) reactor: &'a Reactor,
}

impl<'a> std::ops::Deref for ReactorHandle<'a> {
    type Target = Reactor;

    fn deref(&self) -> &Reactor {
        self.reactor
    }
}

/// `(event, user_data, handle) -> ()`. Must not block: it runs on the
/// reactor's single dispatch thread and blocking it stalls every other
/// registered descriptor.
pub type HandlerFn = Box<dyn Fn(Event, usize, &ReactorHandle) + Send + Sync>;

/// Readiness events are drained in batches of at most this many per kernel
/// wait call.
pub(crate) const MAX_EVENTS_PER_POLL: usize = 1024;

/// How long the dispatch thread blocks in the kernel wait call between
/// checks of the shutdown flag.
pub(crate) const POLL_TIMEOUT_MS: u16 = 5;
