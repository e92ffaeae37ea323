use std::collections::HashMap;
use std::os::unix::io::{BorrowedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};

use common::errors::*;

use super::{Event, HandlerFn, Interest, ReactorHandle, MAX_EVENTS_PER_POLL, POLL_TIMEOUT_MS};

struct Entry {
    user_data: usize,
    callback: Arc<HandlerFn>,
}

struct Shared {
    epoll: Epoll,
    handlers: RwLock<HashMap<RawFd, Entry>>,
    shutdown: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Linux readiness backend, built on epoll. Registrations are keyed purely
/// by descriptor; each call to `register` replaces whatever interest flags
/// and callback were previously bound to that descriptor.
pub struct LinuxReactor {
    shared: Arc<Shared>,
}

fn fd_ref(fd: RawFd) -> BorrowedFd<'static> {
    // SAFETY: the fd is owned by the caller for as long as it stays
    // registered; epoll never outlives a single `add`/`modify`/`delete`
    // call on it, and this library never closes descriptors it didn't
    // open itself without first unregistering them.
    unsafe { BorrowedFd::borrow_raw(fd) }
}

fn epoll_flags(interest: Interest) -> EpollFlags {
    let mut flags = EpollFlags::empty();
    if interest.read {
        flags |= EpollFlags::EPOLLIN;
    }
    if interest.write {
        flags |= EpollFlags::EPOLLOUT;
    }
    flags
}

impl LinuxReactor {
    pub fn new() -> Result<Self> {
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)?;

        Ok(Self {
            shared: Arc::new(Shared {
                epoll,
                handlers: RwLock::new(HashMap::new()),
                shutdown: AtomicBool::new(false),
                worker: Mutex::new(None),
            }),
        })
    }

    /// Adds `fd` to the kernel interest set (replacing any prior
    /// registration for it) and records `callback` to be invoked with the
    /// readiness payload and user data whenever it fires.
    pub fn register(
        &self,
        fd: RawFd,
        interest: Interest,
        user_data: usize,
        callback: HandlerFn,
    ) -> Result<()> {
        let mut event = EpollEvent::new(epoll_flags(interest), fd as u64);

        let mut handlers = self.shared.handlers.write().unwrap();
        let op_result = if handlers.contains_key(&fd) {
            self.shared.epoll.modify(fd_ref(fd), &mut event)
        } else {
            self.shared.epoll.add(fd_ref(fd), event)
        };
        op_result?;

        handlers.insert(
            fd,
            Entry {
                user_data,
                callback: Arc::new(callback),
            },
        );

        Ok(())
    }

    /// Idempotent: unregistering a descriptor that isn't registered is a
    /// no-op.
    pub fn unregister(&self, fd: RawFd) {
        let mut handlers = self.shared.handlers.write().unwrap();
        if handlers.remove(&fd).is_some() {
            let _ = self.shared.epoll.delete(fd_ref(fd));
        }
    }

    /// Launches the dispatch thread. Illegal to call twice without an
    /// intervening `join`.
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

    /// Idempotent when not spawned. Signals the dispatch thread to stop and
    /// blocks until it has actually exited.
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
    let mut events = vec![EpollEvent::empty(); MAX_EVENTS_PER_POLL];
    let timeout = EpollTimeout::from(Duration::from_millis(POLL_TIMEOUT_MS as u64));

    loop {
        if shared.shutdown.load(Ordering::SeqCst) {
            return;
        }

        let n = match shared.epoll.wait(&mut events, timeout) {
            Ok(n) => n,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(err) => {
                tracing::error!(error = %err, "epoll_wait failed, reactor dispatch thread exiting");
                panic!("fatal epoll error: {err}");
            }
        };

        for raw_event in &events[..n] {
            let fd = raw_event.data() as RawFd;
            let flags = raw_event.events();

            let entry = {
                let handlers = shared.handlers.read().unwrap();
                handlers.get(&fd).map(|e| (e.callback.clone(), e.user_data))
            };

            let Some((callback, user_data)) = entry else {
                continue;
            };

            // We can't build a `LinuxReactor` out of thin air here (the
            // handle just needs a reference to this `Shared`), so construct
            // one that borrows it for the duration of the callback only.
            let reactor = LinuxReactor {
                shared: shared.clone(),
            };
            let handle = ReactorHandle { reactor: &reactor };

            let event = Event {
                fd,
                readable: flags.contains(EpollFlags::EPOLLIN),
                writable: flags.contains(EpollFlags::EPOLLOUT),
                available: 0,
                eof: flags.contains(EpollFlags::EPOLLHUP) || flags.contains(EpollFlags::EPOLLRDHUP),
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
        let reactor = LinuxReactor::new().unwrap();
        reactor.join();
        reactor.join();
    }

    #[test]
    fn spawn_then_join_nets_no_observable_side_effects() {
        let reactor = LinuxReactor::new().unwrap();
        reactor.spawn().unwrap();
        reactor.join();

        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        // A registration survives a spawn/join cycle since `join` only
        // stops the dispatch thread, it does not clear the handler map.
        reactor
            .register(
                0,
                Interest::READ,
                0,
                Box::new(move |_, _, _| {
                    calls2.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        reactor.unregister(0);
    }
}
