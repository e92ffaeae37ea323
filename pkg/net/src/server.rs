use std::collections::HashMap;
use std::net::SocketAddr;
use std::os::unix::io::RawFd;
use std::sync::{Arc, RwLock};

use nix::sys::socket::{
    accept4, bind, listen, socket, AddressFamily, Backlog, SockFlag, SockType, SockaddrIn,
    SockaddrIn6, SockaddrStorage,
};
use nix::unistd::{close, read, write};

use common::errors::*;

use crate::connection::{Connection, HandlerFactory};
use crate::error::NetResult;
use crate::reactor::{Event, Reactor, ReactorHandle};
#[cfg(target_os = "linux")]
use crate::reactor::Interest;
#[cfg(not(target_os = "linux"))]
use crate::reactor::Filter;

/// How a `TcpServer` binds. Constructor parameters, not file/env driven:
/// composing a config file out of this belongs to whatever binary embeds
/// the server, not to this crate.
#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    pub listen_address: SocketAddr,
    pub backlog: i32,
}

impl ServerConfig {
    pub fn new(listen_address: SocketAddr) -> Self {
        Self {
            listen_address,
            backlog: 128,
        }
    }
}

/// A fixed-size scratch buffer each read readiness event drains the kernel
/// socket into before appending to the connection's own `ByteBuffer`.
const READ_SCRATCH_SIZE: usize = 4096;

struct Context {
    listen_fd: RawFd,
    handler_factory: HandlerFactory,
    connections: RwLock<HashMap<RawFd, Connection>>,
    reactor: Reactor,
}

/// A readiness-driven TCP server: one listen socket, a reactor dispatch
/// thread, and a connection per accepted peer. See `ConnectionHandler` for
/// the per-connection user contract.
pub struct TcpServer {
    context: Arc<Context>,
}

fn socket_addr_to_storage(addr: SocketAddr) -> SockaddrStorage {
    match addr {
        SocketAddr::V4(v4) => SockaddrStorage::from(SockaddrIn::from(v4)),
        SocketAddr::V6(v6) => SockaddrStorage::from(SockaddrIn6::from(v6)),
    }
}

impl TcpServer {
    /// Constructs the server bound to a shared context. Does not touch the
    /// network yet; `serve` does that.
    pub fn init(config: ServerConfig, handler_factory: HandlerFactory) -> NetResult<Self> {
        let family = match config.listen_address {
            SocketAddr::V4(_) => AddressFamily::Inet,
            SocketAddr::V6(_) => AddressFamily::Inet6,
        };

        let listen_fd = socket(
            family,
            SockType::Stream,
            SockFlag::SOCK_NONBLOCK | SockFlag::SOCK_CLOEXEC,
            None,
        )?;

        let addr = socket_addr_to_storage(config.listen_address);
        bind(listen_fd, &addr)?;
        listen(listen_fd, Backlog::new(config.backlog).unwrap_or(Backlog::MAXCONN))?;

        let reactor = Reactor::new()?;

        Ok(Self {
            context: Arc::new(Context {
                listen_fd,
                handler_factory,
                connections: RwLock::new(HashMap::new()),
                reactor,
            }),
        })
    }

    /// Registers the listen descriptor for read readiness and spawns the
    /// reactor dispatch thread.
    pub fn serve(&self) -> NetResult<()> {
        let context = self.context.clone();
        let listen_fd = self.context.listen_fd;

        let callback: crate::reactor::HandlerFn = Box::new(move |event, _user_data, handle| {
            accept_handler(&context, event, handle);
        });

        register_accept(&self.context.reactor, listen_fd, callback)?;

        self.context.reactor.spawn()?;
        tracing::debug!(fd = listen_fd, "tcp server listening");

        Ok(())
    }

    pub fn join(&self) {
        self.context.reactor.join();
    }

    /// Joins the reactor, closes every open connection plus the listen
    /// socket, and drops the context.
    pub fn deinit(&self) {
        self.join();

        let mut connections = self.context.connections.write().unwrap();
        for (fd, _conn) in connections.drain() {
            let _ = close(fd);
        }

        let _ = close(self.context.listen_fd);
    }
}

#[cfg(target_os = "linux")]
fn register_accept(reactor: &Reactor, fd: RawFd, callback: crate::reactor::HandlerFn) -> Result<()> {
    reactor.register(fd, Interest::READ, fd as usize, callback)
}

#[cfg(not(target_os = "linux"))]
fn register_accept(reactor: &Reactor, fd: RawFd, callback: crate::reactor::HandlerFn) -> Result<()> {
    reactor.register(fd, Filter::Read, fd as usize, callback)
}

#[cfg(target_os = "linux")]
fn register_connection(
    reactor: &Reactor,
    fd: RawFd,
    callback: crate::reactor::HandlerFn,
) -> Result<()> {
    reactor.register(fd, Interest::BOTH, fd as usize, callback)
}

#[cfg(not(target_os = "linux"))]
fn register_connection(
    reactor: &Reactor,
    fd: RawFd,
    callback: crate::reactor::HandlerFn,
) -> Result<()> {
    reactor.register(fd, Filter::Read, fd as usize, callback)?;
    reactor.register(fd, Filter::Write, fd as usize, callback_write_noop())
}

#[cfg(not(target_os = "linux"))]
fn callback_write_noop() -> crate::reactor::HandlerFn {
    Box::new(|_event, _user_data, _handle| {})
}

#[cfg(target_os = "linux")]
fn unregister_connection(reactor: &Reactor, fd: RawFd) {
    reactor.unregister(fd);
}

#[cfg(not(target_os = "linux"))]
fn unregister_connection(reactor: &Reactor, fd: RawFd) {
    reactor.unregister_all(fd);
}

fn accept_handler(context: &Arc<Context>, _event: Event, handle: &ReactorHandle) {
    loop {
        let accepted = accept4(
            context.listen_fd,
            SockFlag::SOCK_NONBLOCK | SockFlag::SOCK_CLOEXEC,
        );

        let fd = match accepted {
            Ok(fd) => fd,
            Err(nix::errno::Errno::EAGAIN) => return,
            Err(err) => {
                tracing::warn!(error = %err, "accept4 failed");
                return;
            }
        };

        let handler = (context.handler_factory)();
        let conn = Connection::new(handler);
        context.connections.write().unwrap().insert(fd, conn);

        let inner_context = context.clone();
        let callback: crate::reactor::HandlerFn = Box::new(move |event, _user_data, handle| {
            read_handler(&inner_context, fd, event, handle);
        });

        if let Err(err) = register_connection(handle, fd, callback) {
            tracing::warn!(error = %err, fd, "failed to register accepted connection");
            context.connections.write().unwrap().remove(&fd);
            let _ = close(fd);
        } else {
            tracing::debug!(fd, "accepted connection");
        }
    }
}

/// Reads until the kernel-reported available byte count is consumed (BSD)
/// or a zero-length read signals EOF (Linux), appending every chunk to the
/// connection's read buffer, then invokes `poll` exactly once, then drains
/// the write buffer to the socket.
///
/// The Linux backend registers one callback for both directions of
/// readiness (epoll here is level-triggered, so an idle connection with
/// room in its send buffer keeps EPOLLOUT signaled for its whole
/// lifetime); a write-only event is a no-op, matching `write_handler`'s
/// placeholder contract and keeping `poll` to at most once per
/// read-readiness event.
fn read_handler(context: &Arc<Context>, fd: RawFd, event: Event, handle: &ReactorHandle) {
    #[cfg(target_os = "linux")]
    if !event.readable {
        return;
    }

    let mut scratch = [0u8; READ_SCRATCH_SIZE];
    let mut eof = false;

    {
        let mut connections = context.connections.write().unwrap();
        let Some(conn) = connections.get_mut(&fd) else {
            return;
        };

        #[cfg(target_os = "linux")]
        {
            loop {
                match read(fd, &mut scratch) {
                    Ok(0) => {
                        eof = true;
                        break;
                    }
                    Ok(n) => conn.read_buffer.append(&scratch[..n]),
                    Err(nix::errno::Errno::EAGAIN) => break,
                    Err(_) => {
                        eof = true;
                        break;
                    }
                }
            }
        }

        #[cfg(not(target_os = "linux"))]
        {
            if event.eof {
                eof = true;
            }

            let mut remaining = event.available;
            while remaining > 0 {
                let n = remaining.min(scratch.len());
                match read(fd, &mut scratch[..n]) {
                    Ok(0) => {
                        eof = true;
                        break;
                    }
                    Ok(read_n) => {
                        conn.read_buffer.append(&scratch[..read_n]);
                        remaining = remaining.saturating_sub(read_n);
                    }
                    Err(nix::errno::Errno::EAGAIN) => break,
                    Err(_) => {
                        eof = true;
                        break;
                    }
                }
            }
        }

        if !eof {
            conn.handler.poll(&mut conn.read_buffer, &mut conn.write_buffer);

            while let Some(chunk) = conn.write_buffer.get_slice(READ_SCRATCH_SIZE) {
                match write(fd, chunk) {
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        }
    }

    if eof {
        tracing::debug!(fd, "connection closed");
        context.connections.write().unwrap().remove(&fd);
        unregister_connection(handle, fd);
        let _ = close(fd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionHandler;
    use std::io::{Read, Write};
    use std::net::TcpStream;

    struct Echo;

    impl ConnectionHandler for Echo {
        fn poll(&mut self, read: &mut crate::byte_buffer::ByteBuffer, write: &mut crate::byte_buffer::ByteBuffer) {
            let mut scratch = vec![0u8; read.len()];
            let n = read.read(&mut scratch);
            write.append(&scratch[..n]);
        }
    }

    #[test]
    fn s7_echo_server_round_trips_a_message() {
        let config = ServerConfig::new("127.0.0.1:0".parse().unwrap());
        let server = TcpServer::init(config, Box::new(|| Box::new(Echo))).unwrap();
        server.serve().unwrap();

        let listen_fd = server.context.listen_fd;
        let local_addr = nix::sys::socket::getsockname::<SockaddrIn>(listen_fd).unwrap();
        let port = local_addr.port();

        let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        stream.write_all(b"hello world").unwrap();

        let mut out = [0u8; 11];
        stream.read_exact(&mut out).unwrap();
        assert_eq!(&out, b"hello world");

        server.deinit();
    }
}
