use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid {kind} identifier: {value}")]
    InvalidIdentifier { kind: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, Error>;
