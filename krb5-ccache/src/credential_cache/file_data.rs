use crate::Error;
use nom::number::Endianness;
use std::{
    io::{BufRead, ErrorKind, Read, Write},
    mem::size_of,
};

const FCC_TAG_DELTATIME: u16 = 1;
const MAX_HEADER_LENGTH: i32 = 1024;
// Counts and lengths are signed 32-bit values in other implementations.
const MAX_LENGTH: u32 = i32::MAX as u32;

// There are four versions of the file format used by the FILE credential
// cache type. The first byte of the file always has the value 5, and the
// value of the second byte contains the version number (1 through 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormatVersion {
    V1 = 0x0501,
    V2 = 0x0502,
    V3 = 0x0503,
    V4 = 0x0504,
}

impl TryFrom<u16> for FileFormatVersion {
    type Error = anyhow::Error;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x0501 => Ok(Self::V1),
            0x0502 => Ok(Self::V2),
            0x0503 => Ok(Self::V3),
            0x0504 => Ok(Self::V4),
            _ => Err(Error::KRB5_CCACHE_BADVNO)?,
        }
    }
}

impl FileFormatVersion {
    pub fn tag(self) -> u16 {
        self as u16
    }

    // Versions 1 and 2 of the file format use native byte order for integer
    // representations. Versions 3 and 4 always use big-endian byte order.
    fn uses_native_byte_order(self) -> bool {
        matches!(self, Self::V1 | Self::V2)
    }
}

/// The version 4 header. The only field defined is the KDC time offset,
/// as `(seconds, microseconds)` relative to the client clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tag {
    pub time_offset: Option<(i32, i32)>,
}

pub(super) struct CCacheReader<R> {
    reader: R,
    endianness: Endianness,
    pub(super) default_realm: Option<String>,
}

macro_rules! read_int {
    ($fn:ident, $type:ident) => {
        pub(super) fn $fn(&mut self) -> anyhow::Result<$type> {
            let mut buf = [0; size_of::<$type>()];
            self.fill(&mut buf)?;
            Ok(match self.endianness {
                Endianness::Big => $type::from_be_bytes(buf),
                Endianness::Little => $type::from_le_bytes(buf),
                Endianness::Native => $type::from_ne_bytes(buf),
            })
        }
    };
}

impl<R: BufRead> CCacheReader<R> {
    pub(super) fn new(reader: R, default_realm: Option<String>) -> Self {
        Self {
            reader,
            endianness: Endianness::Big,
            default_realm,
        }
    }

    fn fill(&mut self, buf: &mut [u8]) -> anyhow::Result<()> {
        self.reader.read_exact(buf).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => anyhow::Error::from(Error::KRB5_CC_TRUNCATED),
            _ => e.into(),
        })
    }

    read_int!(read_u16, u16);
    read_int!(read_u32, u32);
    read_int!(read_i32, i32);

    pub(super) fn read_u8(&mut self) -> anyhow::Result<u8> {
        let mut buf = [0];
        self.fill(&mut buf)?;
        Ok(buf[0])
    }

    /// Reads the version tag, which is big-endian in every version, and
    /// switches to native byte order for the rest of a v1 or v2 file.
    pub(super) fn read_version(&mut self) -> anyhow::Result<FileFormatVersion> {
        let mut buf = [0; 2];
        self.fill(&mut buf)?;
        let version = FileFormatVersion::try_from(u16::from_be_bytes(buf))?;
        if version.uses_native_byte_order() {
            self.endianness = Endianness::Native;
        }
        Ok(version)
    }

    pub(super) fn read_length(&mut self) -> anyhow::Result<u32> {
        match self.read_u32()? {
            length if length > MAX_LENGTH => Err(Error::KRB5_CC_FORMAT)?,
            length => Ok(length),
        }
    }

    pub(super) fn read_exact_bytes(&mut self, size: u32) -> anyhow::Result<Vec<u8>> {
        let mut buf = vec![];
        (&mut self.reader).take(size.into()).read_to_end(&mut buf)?;
        if buf.len() != size as usize {
            Err(Error::KRB5_CC_TRUNCATED)?
        }
        Ok(buf)
    }

    // data ::=
    //     length (32 bits)
    //     value (length bytes)
    pub(super) fn read_data(&mut self) -> anyhow::Result<Option<Vec<u8>>> {
        match self.read_length()? {
            0 => Ok(None),
            size => Ok(Some(self.read_exact_bytes(size)?)),
        }
    }

    pub(super) fn read_string(&mut self) -> anyhow::Result<String> {
        let size = self.read_length()?;
        Ok(latin1_decode(&self.read_exact_bytes(size)?))
    }

    pub(super) fn is_exhausted(&mut self) -> anyhow::Result<bool> {
        Ok(self.reader.fill_buf()?.is_empty())
    }

    // The header appears only in format version 4. It begins with a 16-bit
    // integer giving the length of the entire header, followed by a sequence
    // of fields. Each field consists of a 16-bit tag, a 16-bit length, and a
    // value of the given length.
    pub(super) fn read_tag(&mut self) -> anyhow::Result<Option<Tag>> {
        let mut header_length = i32::from(self.read_u16()?);
        if header_length == 0 {
            return Ok(None);
        }
        if header_length > MAX_HEADER_LENGTH {
            Err(Error::KRB5_CC_BADTAG)?
        }
        let mut tag = Tag::default();
        while header_length > 0 {
            let field_tag = self.read_u16()?;
            let field_length = self.read_u16()?;
            // Only the delta-time payload is consumed; other fields are just
            // subtracted from the header length.
            if field_tag == FCC_TAG_DELTATIME {
                tag.time_offset = Some((self.read_i32()?, self.read_i32()?));
            }
            header_length -= 4 + i32::from(field_length);
        }
        Ok(Some(tag))
    }
}

/// Big-endian writer; only the version 3 layout is ever written.
pub(super) struct CCacheWriter<W> {
    writer: W,
}

impl<W: Write> CCacheWriter<W> {
    pub(super) fn new(writer: W) -> Self {
        Self { writer }
    }

    pub(super) fn write_u8(&mut self, value: u8) -> anyhow::Result<()> {
        Ok(self.writer.write_all(&[value])?)
    }

    pub(super) fn write_u16(&mut self, value: u16) -> anyhow::Result<()> {
        Ok(self.writer.write_all(&value.to_be_bytes())?)
    }

    pub(super) fn write_u32(&mut self, value: u32) -> anyhow::Result<()> {
        Ok(self.writer.write_all(&value.to_be_bytes())?)
    }

    pub(super) fn write_i32(&mut self, value: i32) -> anyhow::Result<()> {
        Ok(self.writer.write_all(&value.to_be_bytes())?)
    }

    pub(super) fn write_length(&mut self, length: usize) -> anyhow::Result<()> {
        match u32::try_from(length) {
            Ok(length) if length <= MAX_LENGTH => self.write_u32(length),
            _ => Err(Error::KRB5_CC_FORMAT)?,
        }
    }

    pub(super) fn write_data(&mut self, data: &[u8]) -> anyhow::Result<()> {
        self.write_length(data.len())?;
        Ok(self.writer.write_all(data)?)
    }

    pub(super) fn write_string(&mut self, value: &str) -> anyhow::Result<()> {
        self.write_data(&latin1_encode(value))
    }

    pub(super) fn flush(&mut self) -> anyhow::Result<()> {
        Ok(self.writer.flush()?)
    }
}

pub(super) fn latin1_decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Characters outside ISO-8859-1 become `?`.
pub(super) fn latin1_encode(value: &str) -> Vec<u8> {
    value
        .chars()
        .map(|c| u8::try_from(c).unwrap_or(b'?'))
        .collect()
}
