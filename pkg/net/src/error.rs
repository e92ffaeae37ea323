use common::errors::*;

/// Errors `TcpServer::init`/`serve` can return to their caller. Per-connection
/// errors never surface here: they just close that one connection (see
/// `server::read_handler`).
#[derive(Debug, Fail)]
pub enum NetError {
    #[fail(display = "address already in use")]
    AddressInUse,

    #[fail(display = "permission denied")]
    PermissionDenied,

    #[fail(display = "socket error: {}", _0)]
    Io(std::io::Error),

    #[fail(display = "{}", _0)]
    Other(Error),
}

impl From<nix::errno::Errno> for NetError {
    fn from(err: nix::errno::Errno) -> Self {
        match err {
            nix::errno::Errno::EADDRINUSE => NetError::AddressInUse,
            nix::errno::Errno::EACCES => NetError::PermissionDenied,
            other => NetError::Io(std::io::Error::from_raw_os_error(other as i32)),
        }
    }
}

impl From<Error> for NetError {
    fn from(err: Error) -> Self {
        NetError::Other(err)
    }
}

pub type NetResult<T> = core::result::Result<T, NetError>;
