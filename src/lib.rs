//! Read-only inspection of safetensors-style tensor containers.
//!
//! ```no_run
//! use tenscan::container::Container;
//!
//! # fn main() -> Result<(), tenscan::container::ContainerError> {
//! let container = Container::open(std::fs::File::open("model.safetensors")?)?;
//! for name in container.keys()? {
//!     let descriptor = container.get_descriptor(name)?;
//!     println!("{name}: shape={}, dtype={}", descriptor.shape(), descriptor.data_type());
//! }
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "cli")]
pub mod cli;
pub mod container;
pub mod num;
