extern crate common;
extern crate net;

use std::thread;
use std::time::Duration;

use common::errors::*;
use net::connection::ConnectionHandler;
use net::{ByteBuffer, ServerConfig, TcpServer};

struct Echo;

impl ConnectionHandler for Echo {
    fn poll(&mut self, read: &mut ByteBuffer, write: &mut ByteBuffer) {
        let mut scratch = vec![0u8; read.len()];
        let n = read.read(&mut scratch);
        write.append(&scratch[..n]);
    }
}

fn main() -> Result<()> {
    common::logging::init_default();

    let config = ServerConfig::new("0.0.0.0:8000".parse()?);
    let server = TcpServer::init(config, Box::new(|| Box::new(Echo)))?;
    server.serve()?;

    tracing::info!("echo server listening on 0.0.0.0:8000");

    loop {
        thread::sleep(Duration::from_secs(60));
    }
}
