//! One error kind per failure condition. Builders validate before
//! mutating, so any error other than the documented `add_type` and
//! `update` exceptions leaves the container unchanged.

use thiserror::Error;

use crate::types::TypeId;

pub type Result<T> = std::result::Result<T, CtfError>;

#[derive(Debug, Error)]
pub enum CtfError {
    #[error("container is read-only")]
    ReadOnly,
    #[error("container has no more type ids to assign")]
    Full,
    #[error("type has reached the maximum payload length")]
    DtFull,
    #[error("no type with id {0} in this container")]
    BadId(TypeId),
    #[error("type {0} is not an enum")]
    NotEnum(TypeId),
    #[error("type {0} is not a struct or union")]
    NotSou(TypeId),
    #[error("forward kind must be struct, union or enum")]
    NotSue,
    #[error("{0:?} is already defined")]
    Duplicate(String),
    #[error("conflicting definition for {0:?}")]
    Conflict(String),
    #[error("rollback would cross a committed update")]
    OverRollback,
    #[error("corrupt container: {0}")]
    Corrupt(String),
}

impl CtfError {
    pub(crate) fn corrupt(err: impl std::fmt::Display) -> Self {
        CtfError::Corrupt(err.to_string())
    }
}
