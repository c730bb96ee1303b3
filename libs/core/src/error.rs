use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A record that must be a JSON object was given something else.
    #[error("{record} must be a JSON object, found {found}")]
    InvalidRecord {
        record: &'static str,
        found: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
