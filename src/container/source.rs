use std::{fs::File, io, sync::Arc};

/// A byte source a container can be read from.
///
/// Reads are positional and take `&self`, so a shared source can serve concurrent readers.
pub trait Source: Send + Sync {
    /// Total size of the source in bytes.
    fn size(&self) -> io::Result<u64>;

    /// Fills `buf` with the bytes starting at `offset`.
    /// Fails with [`io::ErrorKind::UnexpectedEof`] if the source ends first.
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()>;
}

#[cfg(any(unix, windows))]
impl Source for File {
    #[inline]
    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    #[cfg(unix)]
    #[inline]
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        std::os::unix::fs::FileExt::read_exact_at(self, buf, offset)
    }

    #[cfg(windows)]
    fn read_exact_at(&self, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
        use std::os::windows::fs::FileExt;

        while !buf.is_empty() {
            match self.seek_read(buf, offset) {
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(n) => {
                    buf = &mut std::mem::take(&mut buf)[n..];
                    offset += n as u64;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

fn read_slice(bytes: &[u8], buf: &mut [u8], offset: u64) -> io::Result<()> {
    let range = usize::try_from(offset)
        .ok()
        .and_then(|start| Some(start..start.checked_add(buf.len())?));
    match range.and_then(|range| bytes.get(range)) {
        Some(src) => {
            buf.copy_from_slice(src);
            Ok(())
        }
        None => Err(io::ErrorKind::UnexpectedEof.into()),
    }
}

macro_rules! impl_source_for_bytes {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Source for $ty {
                #[inline]
                fn size(&self) -> io::Result<u64> {
                    Ok(self.len() as u64)
                }

                #[inline]
                fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
                    read_slice(self, buf, offset)
                }
            }
        )+
    };
}

impl_source_for_bytes!(Vec<u8>, Box<[u8]>, Arc<[u8]>, &[u8]);
