use crate::byte_buffer::ByteBuffer;

/// The user-supplied per-connection behavior. `poll` is invoked at most once
/// per read-readiness event, on the reactor's dispatch thread, so it must
/// not block and must not retain either buffer past the call.
pub trait ConnectionHandler {
    /// May consume any prefix of `read` and append any bytes to `write`.
    fn poll(&mut self, read: &mut ByteBuffer, write: &mut ByteBuffer);
}

/// Constructs one `ConnectionHandler` per accepted connection. Boxed rather
/// than generic over the server so `TcpServer` stays a concrete, non-generic
/// type the way `pkg/net/src/tcp.rs` keeps its listener types.
pub type HandlerFactory = Box<dyn Fn() -> Box<dyn ConnectionHandler + Send> + Send + Sync>;

/// One accepted socket's state: its buffers and the handler driving it.
/// Owned by the server's connection map, keyed by socket descriptor.
pub struct Connection {
    pub read_buffer: ByteBuffer,
    pub write_buffer: ByteBuffer,
    pub handler: Box<dyn ConnectionHandler + Send>,
}

impl Connection {
    pub fn new(handler: Box<dyn ConnectionHandler + Send>) -> Self {
        Self {
            read_buffer: ByteBuffer::new(),
            write_buffer: ByteBuffer::new(),
            handler,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl ConnectionHandler for Echo {
        fn poll(&mut self, read: &mut ByteBuffer, write: &mut ByteBuffer) {
            let mut scratch = vec![0u8; read.len()];
            let n = read.read(&mut scratch);
            write.append(&scratch[..n]);
        }
    }

    #[test]
    fn poll_moves_bytes_from_read_to_write() {
        let mut conn = Connection::new(Box::new(Echo));
        conn.read_buffer.append(b"hello world");

        conn.handler.poll(&mut conn.read_buffer, &mut conn.write_buffer);

        assert!(conn.read_buffer.is_empty());
        let mut out = vec![0u8; 11];
        conn.write_buffer.read(&mut out);
        assert_eq!(&out, b"hello world");
    }
}
