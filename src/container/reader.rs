use std::{collections::BTreeMap, fs::File, io, iter::FusedIterator, path::Path, slice};

use super::{
    error::{ContainerError, FormatError},
    header::{HeaderTable, TensorDescriptor},
    source::Source,
    tensor::RawTensor,
};

/// Byte width of the header length prefix.
pub const PREFIX_SIZE: u64 = 8;

/// Largest header accepted by default.
pub const MAX_HEADER_SIZE: u64 = 100_000_000;

/// Options for opening a [`Container`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerBuilder {
    pub max_header_size: u64,
    pub contiguous: bool,
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self {
            max_header_size: MAX_HEADER_SIZE,
            contiguous: false,
        }
    }
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects headers longer than `size` bytes.
    pub fn max_header_size(mut self, size: u64) -> Self {
        self.max_header_size = size;
        self
    }

    /// Requires the tensors to cover the whole payload without gaps.
    pub fn contiguous(mut self, contiguous: bool) -> Self {
        self.contiguous = contiguous;
        self
    }

    pub fn open_path(self, path: impl AsRef<Path>) -> Result<Container<File>, ContainerError> {
        let path = path.as_ref();
        log::debug!("opening container {}", path.display());
        self.open(File::open(path)?)
    }

    /// Reads and validates the header of `source`.
    /// The source is dropped if this fails.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub fn open<S: Source>(self, source: S) -> Result<Container<S>, ContainerError> {
        let size = source.size()?;

        let mut prefix = [0u8; PREFIX_SIZE as usize];
        source.read_exact_at(&mut prefix, 0)?;
        let header_size = u64::from_le_bytes(prefix);

        if header_size > self.max_header_size {
            return Err(FormatError::HeaderLimit(header_size, self.max_header_size).into());
        }
        let remaining = size.saturating_sub(PREFIX_SIZE);
        if header_size > remaining {
            return Err(FormatError::HeaderLength(header_size, remaining).into());
        }

        let len = usize::try_from(header_size)
            .map_err(|_| io::Error::from(io::ErrorKind::OutOfMemory))?;
        let mut header = vec![0u8; len];
        source.read_exact_at(&mut header, PREFIX_SIZE)?;

        let payload_base = PREFIX_SIZE + header_size;
        let payload_size = size - payload_base;
        let header = HeaderTable::parse(&header, payload_size, self.contiguous)?;
        log::debug!(
            "parsed container header: {} tensors, {} payload bytes",
            header.len(),
            payload_size
        );

        Ok(Container {
            source: Some(source),
            header,
            payload_base,
        })
    }
}

/// An open tensor container.
///
/// The header is parsed once on open; payload bytes are only read by [`Container::get_tensor`].
/// The byte source is released by [`Container::close`] or when the container is dropped.
#[derive(Debug)]
pub struct Container<S> {
    source: Option<S>,
    header: HeaderTable,
    payload_base: u64,
}

impl<S: Source> Container<S> {
    /// Opens `source` with default options.
    #[inline]
    pub fn open(source: S) -> Result<Self, ContainerError> {
        ContainerBuilder::new().open(source)
    }

    #[inline]
    fn header(&self) -> Result<&HeaderTable, ContainerError> {
        match self.source {
            Some(_) => Ok(&self.header),
            None => Err(ContainerError::UseAfterClose),
        }
    }

    /// Tensor names in header order. The iterator can be cloned to restart.
    #[inline]
    pub fn keys(&self) -> Result<Keys<'_>, ContainerError> {
        let inner = self.header()?.descriptors().iter();
        Ok(Keys { inner })
    }

    /// Tensor descriptors in header order.
    #[inline]
    pub fn descriptors(&self) -> Result<&[TensorDescriptor], ContainerError> {
        Ok(self.header()?.descriptors())
    }

    #[inline]
    pub fn get_descriptor(&self, name: &str) -> Result<&TensorDescriptor, ContainerError> {
        self.header()?
            .get(name)
            .ok_or_else(|| ContainerError::NotFound(name.to_owned()))
    }

    /// Reads the payload bytes of tensor `name`.
    #[cfg_attr(feature = "trace", tracing::instrument(skip(self)))]
    pub fn get_tensor(&self, name: &str) -> Result<RawTensor, ContainerError> {
        let descriptor = self.get_descriptor(name)?;
        let Some(source) = &self.source else {
            return Err(ContainerError::UseAfterClose);
        };

        let (start, _) = descriptor.data_offsets();
        let len = usize::try_from(descriptor.data_size())
            .map_err(|_| io::Error::from(io::ErrorKind::OutOfMemory))?;
        let mut data = vec![0u8; len];
        source.read_exact_at(&mut data, self.payload_base + start)?;
        log::trace!("read tensor {name}: {len} bytes at payload offset {start}");

        Ok(RawTensor {
            r#type: descriptor.data_type(),
            shape: descriptor.shape().clone(),
            data,
        })
    }

    /// The free-form `__metadata__` map of the header.
    #[inline]
    pub fn metadata(&self) -> Result<&BTreeMap<String, String>, ContainerError> {
        Ok(self.header()?.metadata())
    }

    /// Number of tensors.
    #[inline]
    pub fn len(&self) -> usize {
        self.header.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.header.is_empty()
    }

    /// Absolute offset where the payload region starts.
    #[inline]
    pub fn payload_base(&self) -> u64 {
        self.payload_base
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }

    /// Releases the byte source. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.source.take().is_some() {
            log::debug!("closed container of {} tensors", self.header.len());
        }
    }
}

/// Iterator over tensor names in header order.
#[derive(Debug, Clone)]
pub struct Keys<'a> {
    inner: slice::Iter<'a, TensorDescriptor>,
}

impl<'a> Iterator for Keys<'a> {
    type Item = &'a str;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(TensorDescriptor::name)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Keys<'_> {}

impl FusedIterator for Keys<'_> {}
