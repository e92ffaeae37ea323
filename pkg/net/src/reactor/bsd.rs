use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use nix::sys::event::{kevent_ts, kqueue, EventFilter, EventFlag, FilterFlag, KEvent};

use common::errors::*;

use super::{Event, HandlerFn, ReactorHandle, MAX_EVENTS_PER_POLL, POLL_TIMEOUT_MS};

/// Which half of a descriptor's readiness a BSD registration tracks. Unlike
/// the Linux backend, kqueue wants one `kevent` registration per direction,
/// so a descriptor interested in both read and write readiness is
/// registered twice, once under each filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Read,
    Write,
}

impl Filter {
    fn as_event_filter(self) -> EventFilter {
        match self {
            Filter::Read => EventFilter::EVFILT_READ,
            Filter::Write => EventFilter::EVFILT_WRITE,
        }
    }
}

struct Entry {
    user_data: usize,
    callback: Arc<HandlerFn>,
}

struct Shared {
    kq: RawFd,
    handlers: RwLock<HashMap<(RawFd, Filter), Entry>>,
    shutdown: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.kq);
        }
    }
}

/// BSD/macOS readiness backend, built on kqueue. Registrations are keyed by
/// `(descriptor, filter)`, since the kernel tracks read and write readiness
/// as independent event sources for the same descriptor.
pub struct BsdReactor {
    shared: Arc<Shared>,
}

impl BsdReactor {
    pub fn new() -> Result<Self> {
        let kq = kqueue().map_err(|err| format_err!("kqueue() failed: {}", err))?;

        Ok(Self {
            shared: Arc::new(Shared {
                kq,
                handlers: RwLock::new(HashMap::new()),
                shutdown: AtomicBool::new(false),
                worker: Mutex::new(None),
            }),
        })
    }

    /// Registers interest in `filter` readiness for `fd`, replacing any
    /// prior callback bound to that exact `(fd, filter)` pair.
    pub fn register(
        &self,
        fd: RawFd,
        filter: Filter,
        user_data: usize,
        callback: HandlerFn,
    ) -> Result<()> {
        let change = KEvent::new(
            fd as usize,
            filter.as_event_filter(),
            EventFlag::EV_ADD | EventFlag::EV_CLEAR,
            FilterFlag::empty(),
            0,
            0,
        );

        kevent_ts(self.shared.kq, &[change], &mut [], None)
            .map_err(|err| format_err!("kevent registration failed: {}", err))?;

        self.shared.handlers.write().unwrap().insert(
            (fd, filter),
            Entry {
                user_data,
                callback: Arc::new(callback),
            },
        );

        Ok(())
    }

    /// Idempotent: unregistering a pair that isn't registered is a no-op.
    pub fn unregister(&self, fd: RawFd, filter: Filter) {
        let mut handlers = self.shared.handlers.write().unwrap();
        if handlers.remove(&(fd, filter)).is_none() {
            return;
        }

        let change = KEvent::new(
            fd as usize,
            filter.as_event_filter(),
            EventFlag::EV_DELETE,
            FilterFlag::empty(),
            0,
            0,
        );
        let _ = kevent_ts(self.shared.kq, &[change], &mut [], None);
    }

    /// Removes every registered filter for `fd` in one call, mirroring the
    /// Linux backend's single-key `unregister`.
    pub fn unregister_all(&self, fd: RawFd) {
        self.unregister(fd, Filter::Read);
        self.unregister(fd, Filter::Write);
    }

    pub fn spawn(&self) -> Result<()> {
        let mut worker = self.shared.worker.lock().unwrap();
        if worker.is_some() {
            return Err(err_msg("reactor already spawned"));
        }

        self.shared.shutdown.store(false, Ordering::SeqCst);

        let shared = self.shared.clone();
        *worker = Some(std::thread::spawn(move || dispatch_loop(shared)));

        Ok(())
    }

    pub fn join(&self) {
        let handle = self.shared.worker.lock().unwrap().take();

        let Some(handle) = handle else {
            return;
        };

        self.shared.shutdown.store(true, Ordering::SeqCst);
        let _ = handle.join();
        self.shared.shutdown.store(false, Ordering::SeqCst);
    }
}

fn dispatch_loop(shared: Arc<Shared>) {
    let mut raw_events = vec![
        KEvent::new(0, EventFilter::EVFILT_READ, EventFlag::empty(), FilterFlag::empty(), 0, 0);
        MAX_EVENTS_PER_POLL
    ];
    let timeout = Duration::from_millis(POLL_TIMEOUT_MS as u64);

    loop {
        if shared.shutdown.load(Ordering::SeqCst) {
            return;
        }

        let n = match kevent_ts(shared.kq, &[], &mut raw_events, Some(timeout)) {
            Ok(n) => n,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(err) => {
                tracing::error!(error = %err, "kevent wait failed, reactor dispatch thread exiting");
                panic!("fatal kqueue error: {err}");
            }
        };

        for raw_event in &raw_events[..n] {
            let fd = raw_event.ident() as RawFd;
            let filter = match raw_event.filter() {
                Ok(EventFilter::EVFILT_READ) => Filter::Read,
                Ok(EventFilter::EVFILT_WRITE) => Filter::Write,
                _ => continue,
            };

            let entry = {
                let handlers = shared.handlers.read().unwrap();
                handlers
                    .get(&(fd, filter))
                    .map(|e| (e.callback.clone(), e.user_data))
            };

            let Some((callback, user_data)) = entry else {
                continue;
            };

            let reactor = BsdReactor {
                shared: shared.clone(),
            };
            let handle = ReactorHandle { reactor: &reactor };

            let flags = raw_event.flags();
            let event = Event {
                fd,
                readable: filter == Filter::Read,
                writable: filter == Filter::Write,
                available: raw_event.data().max(0) as usize,
                eof: flags.contains(EventFlag::EV_EOF),
            };

            callback(event, user_data, &handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn join_without_spawn_is_a_no_op() {
        let reactor = BsdReactor::new().unwrap();
        reactor.join();
        reactor.join();
    }

    #[test]
    fn unregister_all_clears_both_filters() {
        let reactor = BsdReactor::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        for filter in [Filter::Read, Filter::Write] {
            let calls = calls.clone();
            reactor
                .register(
                    0,
                    filter,
                    0,
                    Box::new(move |_, _, _| {
                        calls.fetch_add(1, Ordering::SeqCst);
                    }),
                )
                .unwrap();
        }

        assert_eq!(reactor.shared.handlers.read().unwrap().len(), 2);
        reactor.unregister_all(0);
        assert!(reactor.shared.handlers.read().unwrap().is_empty());
    }
}
