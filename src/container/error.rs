use std::io;

use thiserror::Error;

use super::header::Shape;
use crate::num::DataType;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("container io error: {0}")]
    Io(#[from] io::Error),
    #[error("container format error: {0}")]
    Format(#[from] FormatError),
    #[error("tensor `{0}` not found in container")]
    NotFound(String),
    #[error("container used after close")]
    UseAfterClose,
}

/// Violations of the container layout detected while opening.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("header length {0} exceeds limit {1}")]
    HeaderLimit(u64, u64),
    #[error("header length {0} exceeds remaining source size {1}")]
    HeaderLength(u64, u64),
    #[error("header is not valid utf-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("header is not a valid json object: {0}")]
    Json(#[from] serde_json::Error),
    #[error("duplicate tensor name `{0}`")]
    Duplicate(String),
    #[error("tensor `{0}` has unrecognized data type `{1}`")]
    DataType(String, String),
    #[error("tensor `{0}` has inverted data offsets [{1}, {2})")]
    Offsets(String, u64, u64),
    #[error("tensor `{0}` data range [{1}, {2}) exceeds payload size {3}")]
    Bounds(String, u64, u64, u64),
    #[error("tensors `{0}` and `{1}` have overlapping data ranges")]
    Overlap(String, String),
    #[error("tensor `{0}` element count of shape {1} overflows")]
    Overflow(String, Shape),
    #[error("tensor `{name}` of shape {shape} and type {data_type} needs {expected} bytes, found {found}")]
    Size {
        name: String,
        shape: Shape,
        data_type: DataType,
        expected: u64,
        found: u64,
    },
    #[error("payload bytes [{0}, {1}) are not covered by any tensor")]
    Gap(u64, u64),
}
