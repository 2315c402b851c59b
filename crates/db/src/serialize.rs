//! Little-endian framing helpers shared by the reader and the writer.

use byteorder::{LE, ReadBytesExt, WriteBytesExt};
use vfs::FileError;

pub(crate) fn corrupt(detail: &str) -> FileError {
    FileError::other("Corrupted synchronization database.", detail)
}

pub(crate) struct Reader<'a> {
    cursor: std::io::Cursor<&'a [u8]>,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self {
            cursor: std::io::Cursor::new(bytes),
        }
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, FileError> {
        self.cursor.read_u8().map_err(|_| corrupt("missing byte"))
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, FileError> {
        self.cursor
            .read_u32::<LE>()
            .map_err(|_| corrupt("missing u32"))
    }

    pub(crate) fn read_i32(&mut self) -> Result<i32, FileError> {
        self.cursor
            .read_i32::<LE>()
            .map_err(|_| corrupt("missing i32"))
    }

    pub(crate) fn read_i64(&mut self) -> Result<i64, FileError> {
        self.cursor
            .read_i64::<LE>()
            .map_err(|_| corrupt("missing i64"))
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, FileError> {
        self.cursor
            .read_u64::<LE>()
            .map_err(|_| corrupt("missing u64"))
    }

    pub(crate) fn read_blob(&mut self) -> Result<Vec<u8>, FileError> {
        let len = self.read_u32()? as usize;
        let mut buf = vec![0u8; len];
        std::io::Read::read_exact(&mut self.cursor, &mut buf)
            .map_err(|_| corrupt("truncated blob"))?;
        Ok(buf)
    }

    pub(crate) fn read_string(&mut self) -> Result<String, FileError> {
        let bytes = self.read_blob()?;
        String::from_utf8(bytes).map_err(|_| corrupt("non-utf8 string"))
    }
}

pub(crate) struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub(crate) fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub(crate) fn write_u8(&mut self, value: u8) {
        self.buf.write_u8(value).expect("vec write");
    }

    pub(crate) fn write_u32(&mut self, value: u32) {
        self.buf.write_u32::<LE>(value).expect("vec write");
    }

    pub(crate) fn write_i32(&mut self, value: i32) {
        self.buf.write_i32::<LE>(value).expect("vec write");
    }

    pub(crate) fn write_i64(&mut self, value: i64) {
        self.buf.write_i64::<LE>(value).expect("vec write");
    }

    pub(crate) fn write_u64(&mut self, value: u64) {
        self.buf.write_u64::<LE>(value).expect("vec write");
    }

    pub(crate) fn write_blob(&mut self, bytes: &[u8]) {
        self.write_u32(u32::try_from(bytes.len()).expect("blob fits u32"));
        self.buf.extend_from_slice(bytes);
    }

    pub(crate) fn write_string(&mut self, value: &str) {
        self.write_blob(value.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_primitives() {
        let mut w = Writer::new();
        w.write_u8(1);
        w.write_u32(0xDEAD_BEEF);
        w.write_i64(-42);
        w.write_u64(7);
        w.write_i32(-1);
        w.write_string("héllo");
        w.write_blob(&[1, 2, 3]);
        let bytes = w.into_bytes();

        let mut r = Reader::new(&bytes);
        assert_eq!(r.read_u8().unwrap(), 1);
        assert_eq!(r.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(r.read_i64().unwrap(), -42);
        assert_eq!(r.read_u64().unwrap(), 7);
        assert_eq!(r.read_i32().unwrap(), -1);
        assert_eq!(r.read_string().unwrap(), "héllo");
        assert_eq!(r.read_blob().unwrap(), vec![1, 2, 3]);
        assert!(r.read_u8().is_err());
    }

    #[test]
    fn integers_are_little_endian() {
        let mut w = Writer::new();
        w.write_u32(1);
        assert_eq!(w.into_bytes(), vec![1, 0, 0, 0]);
    }
}
