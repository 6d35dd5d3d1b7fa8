//! The `container` module reads tensor containers: a little-endian `u64` header length,
//! a JSON header describing every tensor, then the raw payload.
//!
//! ```text
//! [0, 8)        header length N
//! [8, 8 + N)    {"name": {"dtype": "F32", "shape": [2, 3], "data_offsets": [0, 24]}, ...}
//! [8 + N, EOF)  payload; tensor bytes addressed by `data_offsets`
//! ```
//!
//! Opening a [`Container`] validates the whole header up front: data types, byte ranges,
//! element counts and overlaps. Payload bytes are read lazily through positional reads on a
//! [`Source`], so one container can serve many readers at once.

pub mod error;
pub mod header;
pub mod reader;
pub mod source;
pub mod tensor;

pub use error::{ContainerError, FormatError};
pub use header::{HeaderTable, METADATA_KEY, Shape, TensorDescriptor};
pub use reader::{Container, ContainerBuilder, Keys, MAX_HEADER_SIZE};
pub use source::Source;
pub use tensor::{RawTensor, TensorError};
