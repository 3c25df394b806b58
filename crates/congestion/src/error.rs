use std::fmt;

#[derive(Debug)]
pub enum Error {
    InvalidValue,
    NoActiveTransaction,
    SendError(transport::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for Error {}

impl From<transport::Error> for Error {
    fn from(value: transport::Error) -> Self {
        Self::SendError(value)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
