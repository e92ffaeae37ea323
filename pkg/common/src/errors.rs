pub use failure::{err_msg, format_err, Error, Fail};

pub type Result<T, E = Error> = core::result::Result<T, E>;
