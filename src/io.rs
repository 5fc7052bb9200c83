use std::{
    convert::TryInto,
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    mem::size_of,
    path::Path,
};

use crate::error::{DbError, DbResult};

/// A positioned file handle used by the heap tables and the log.
///
/// All multi-byte values are big-endian on disk.
pub struct TinyFile {
    file: File,
}

impl TinyFile {
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        Ok(Self { file })
    }

    pub fn write<T: Encodeable>(&mut self, obj: &T) -> DbResult<()> {
        self.file.write_all(&obj.encode())?;
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> DbResult<()> {
        self.file.write_all(bytes)?;
        Ok(())
    }

    pub fn read<T: Decodeable>(&mut self) -> DbResult<T> {
        T::decode(&mut self.file)
    }

    pub fn read_exact(&mut self, count: usize) -> DbResult<Vec<u8>> {
        read_exact(&mut self.file, count)
    }

    pub fn seek(&mut self, pos: SeekFrom) -> DbResult<u64> {
        Ok(self.file.seek(pos)?)
    }

    pub fn get_current_position(&mut self) -> DbResult<u64> {
        Ok(self.file.stream_position()?)
    }

    pub fn get_size(&self) -> DbResult<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn set_len(&mut self, len: u64) -> DbResult<()> {
        self.file.set_len(len)?;
        Ok(())
    }

    pub fn flush(&mut self) -> DbResult<()> {
        self.file.flush()?;
        Ok(())
    }

    /// Flush userspace buffers and fsync; the durability point of the
    /// log's `force`.
    pub fn sync_all(&mut self) -> DbResult<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}

impl Read for TinyFile {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

pub fn read_into<T: Decodeable, R: Read>(reader: &mut R) -> DbResult<T> {
    T::decode(reader)
}

pub fn read_exact<R: Read>(reader: &mut R, count: usize) -> DbResult<Vec<u8>> {
    let mut buffer = vec![0u8; count];
    reader.read_exact(&mut buffer)?;
    Ok(buffer)
}

/// Growable byte sink used to assemble page images.
pub struct TinyWriter {
    buf: Vec<u8>,
}

impl TinyWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn write<T: Encodeable>(&mut self, obj: &T) {
        self.buf.extend_from_slice(obj.encode().as_slice());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn size(&self) -> usize {
        self.buf.len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.buf.clone()
    }

    /// Return the buffer zero-padded to `size`. Panics if the content
    /// already exceeds `size` (a page image must never overflow the page).
    pub fn to_padded_bytes(&self, size: usize) -> Vec<u8> {
        if self.buf.len() > size {
            panic!(
                "buffer size is larger than the given size: {} > {}",
                self.buf.len(),
                size
            );
        }

        let mut buf = self.buf.clone();
        buf.resize(size, 0);
        buf
    }
}

impl Default for TinyWriter {
    fn default() -> Self {
        Self::new()
    }
}

pub trait Encodeable {
    fn encode(&self) -> Vec<u8>;
}

pub trait Decodeable: Sized {
    fn decode<R: Read>(reader: &mut R) -> DbResult<Self>;
}

/// # Format
///
/// - 1 byte (0 for false, 1 for true)
impl Encodeable for bool {
    fn encode(&self) -> Vec<u8> {
        vec![*self as u8]
    }
}

impl Decodeable for bool {
    fn decode<R: Read>(reader: &mut R) -> DbResult<Self> {
        Ok(u8::decode(reader)? == 1)
    }
}

/// # Format
///
/// - 2 bytes: payload length (big-endian)
/// - n bytes: UTF-8 payload
impl Encodeable for String {
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        let len = self.len() as u16;
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(self.as_bytes());

        buf
    }
}

impl Decodeable for String {
    fn decode<R: Read>(reader: &mut R) -> DbResult<Self> {
        let len = u16::decode(reader)?;
        let bytes = read_exact(reader, len as usize)?;
        String::from_utf8(bytes)
            .map_err(|e| DbError::InvalidArgument(format!("invalid utf8: {}", e)))
    }
}

macro_rules! impl_serialization {
    (for $($t:ty),+) => {
        $(
            impl Encodeable for $t {
                fn encode(&self) -> Vec<u8> {
                    self.to_be_bytes().to_vec()
                }
            }

            impl Decodeable for $t {
                fn decode<R: Read>(reader: &mut R) -> DbResult<Self> {
                    let bytes = read_exact(reader, size_of::<Self>())?;
                    Ok(Self::from_be_bytes(bytes.try_into().unwrap()))
                }
            }
        )*
    }
}

impl_serialization!(for u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);
