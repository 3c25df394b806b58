use std::fmt;
use std::io;

#[derive(Debug)]
pub enum Error {
    InvalidValue,
    BindError(io::Error),
    SocketError(io::Error),
    SendError(io::Error),
    NotSupported,
    Interrupted,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Self::SocketError(value)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
