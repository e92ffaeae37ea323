//! Byte buffering, a readiness-driven reactor, and a small TCP server built
//! on top of it.

pub mod byte_buffer;
pub mod connection;
pub mod error;
pub mod reactor;
pub mod ring_buffer;
pub mod server;

pub use byte_buffer::ByteBuffer;
pub use connection::{Connection, ConnectionHandler, HandlerFactory};
pub use error::{NetError, NetResult};
pub use reactor::{Event, Reactor};
pub use ring_buffer::{RingBuffer, RingBufferError};
pub use server::{ServerConfig, TcpServer};
