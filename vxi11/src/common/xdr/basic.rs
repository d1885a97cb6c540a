//! Basic types for XDR, see [RFC4506](https://datatracker.ietf.org/doc/html/rfc4506).
//!
//! Provides the following types:
//!
//! | XDR Type         | Rust type |
//! |------------------|-----------|
//! | integer          | i32       |
//! | unsigned integer | u32       |
//! | Boolean          | bool      |
//! | opaque<>         | Opaque    |
//! | string<>         | String    |
//!
//! `u16` and `u8` are carried as unsigned integers, as rpcgen does for
//! `u_short` and `u_char`. Enums and structures implement
//! [XdrEncode] and [XdrDecode] by hand.
//!

use std::io::{ErrorKind, Read, Result, Write};

use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};

macro_rules! read_padding {
    ($reader:expr, $len:expr) => {
        let pad = (4 - ($len & 3)) & 3;
        for _ in 0..pad {
            let _ = $reader.read_u8()?;
        }
    };
}

macro_rules! write_padding {
    ($writer:expr, $len:expr) => {
        let pad = (4 - ($len & 3)) & 3;
        for _ in 0..pad {
            $writer.write_u8(0)?;
        }
    };
}

pub trait XdrDecode {
    fn read_xdr<RD>(&mut self, reader: &mut RD) -> Result<()>
    where
        RD: Read;
}

pub trait XdrEncode {
    fn write_xdr<WR>(&self, writer: &mut WR) -> Result<()>
    where
        WR: Write;
}

impl XdrDecode for () {
    fn read_xdr<RD>(&mut self, _reader: &mut RD) -> Result<()>
    where
        RD: Read,
    {
        Ok(())
    }
}

impl XdrEncode for () {
    fn write_xdr<WR>(&self, _writer: &mut WR) -> Result<()>
    where
        WR: Write,
    {
        Ok(())
    }
}

// 4.1.  Integer
impl XdrDecode for i32 {
    fn read_xdr<RD>(&mut self, reader: &mut RD) -> Result<()>
    where
        RD: Read,
    {
        *self = reader.read_i32::<NetworkEndian>()?;
        Ok(())
    }
}

impl XdrEncode for i32 {
    fn write_xdr<WR>(&self, writer: &mut WR) -> Result<()>
    where
        WR: Write,
    {
        writer.write_i32::<NetworkEndian>(*self)
    }
}

// 4.2 Unsigned Integer
impl XdrDecode for u32 {
    fn read_xdr<RD>(&mut self, reader: &mut RD) -> Result<()>
    where
        RD: Read,
    {
        *self = reader.read_u32::<NetworkEndian>()?;
        Ok(())
    }
}

impl XdrEncode for u32 {
    fn write_xdr<WR>(&self, writer: &mut WR) -> Result<()>
    where
        WR: Write,
    {
        writer.write_u32::<NetworkEndian>(*self)
    }
}

impl XdrDecode for u16 {
    fn read_xdr<RD>(&mut self, reader: &mut RD) -> Result<()>
    where
        RD: Read,
    {
        let word = reader.read_u32::<NetworkEndian>()?;
        *self = Self::try_from(word).map_err(|_| ErrorKind::InvalidData)?;
        Ok(())
    }
}

impl XdrEncode for u16 {
    fn write_xdr<WR>(&self, writer: &mut WR) -> Result<()>
    where
        WR: Write,
    {
        writer.write_u32::<NetworkEndian>(*self as u32)
    }
}

impl XdrDecode for u8 {
    fn read_xdr<RD>(&mut self, reader: &mut RD) -> Result<()>
    where
        RD: Read,
    {
        let word = reader.read_u32::<NetworkEndian>()?;
        *self = Self::try_from(word).map_err(|_| ErrorKind::InvalidData)?;
        Ok(())
    }
}

impl XdrEncode for u8 {
    fn write_xdr<WR>(&self, writer: &mut WR) -> Result<()>
    where
        WR: Write,
    {
        writer.write_u32::<NetworkEndian>(*self as u32)
    }
}


// 4.4 Booleans
impl XdrDecode for bool {
    fn read_xdr<RD>(&mut self, reader: &mut RD) -> Result<()>
    where
        RD: Read,
    {
        *self = reader.read_i32::<NetworkEndian>()? != 0;
        Ok(())
    }
}

impl XdrEncode for bool {
    fn write_xdr<WR>(&self, writer: &mut WR) -> Result<()>
    where
        WR: Write,
    {
        writer.write_i32::<NetworkEndian>(if *self { 1 } else { 0 })
    }
}

/// Read a length-prefixed, padded byte sequence
fn read_bytes<RD>(reader: &mut RD, buf: &mut Vec<u8>) -> Result<()>
where
    RD: Read,
{
    let len = reader.read_u32::<NetworkEndian>()? as usize;
    buf.clear();
    let n = reader.by_ref().take(len as u64).read_to_end(buf)?;
    if n != len {
        return Err(ErrorKind::UnexpectedEof.into());
    }
    read_padding!(reader, len);
    Ok(())
}

fn write_bytes<WR>(writer: &mut WR, bytes: &[u8]) -> Result<()>
where
    WR: Write,
{
    writer.write_u32::<NetworkEndian>(bytes.len() as u32)?;
    writer.write_all(bytes)?;
    write_padding!(writer, bytes.len());
    Ok(())
}

// 4.10 Variable-Length Opaque Data
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Opaque(pub Vec<u8>);

impl XdrDecode for Opaque {
    fn read_xdr<RD>(&mut self, reader: &mut RD) -> Result<()>
    where
        RD: Read,
    {
        read_bytes(reader, &mut self.0)
    }
}

impl XdrEncode for Opaque {
    fn write_xdr<WR>(&self, writer: &mut WR) -> Result<()>
    where
        WR: Write,
    {
        write_bytes(writer, &self.0)
    }
}

#[cfg(test)]
mod test_xdr_variable_opaque {
    use std::io::Cursor;

    use super::{Opaque, XdrDecode, XdrEncode};

    #[test]
    fn decode_padded() {
        let mut cursor = Cursor::new(b"\x00\x00\x00\x02\x01\x02\x00\x00\xff");
        let mut i = Opaque::default();
        i.read_xdr(&mut cursor).unwrap();

        assert_eq!(i.0, vec![1u8, 2u8]);
        assert_eq!(cursor.position(), 8);
    }

    #[test]
    fn decode_truncated() {
        let mut cursor = Cursor::new(b"\x00\x00\x00\x08\x01\x02");
        let mut i = Opaque::default();
        assert!(i.read_xdr(&mut cursor).is_err());
    }

    #[test]
    fn encode() {
        let mut cursor = Cursor::new(Vec::new());
        Opaque(vec![1u8, 2u8, 3u8, 4u8, 5u8])
            .write_xdr(&mut cursor)
            .unwrap();

        assert_eq!(
            cursor.get_ref()[..],
            b"\x00\x00\x00\x05\x01\x02\x03\x04\x05\x00\x00\x00"[..]
        )
    }
}

// 4.11  String
impl XdrDecode for String {
    fn read_xdr<RD>(&mut self, reader: &mut RD) -> Result<()>
    where
        RD: Read,
    {
        let mut bytes = Vec::new();
        read_bytes(reader, &mut bytes)?;
        *self = String::from_utf8(bytes).map_err(|_| ErrorKind::InvalidData)?;
        Ok(())
    }
}

impl XdrEncode for String {
    fn write_xdr<WR>(&self, writer: &mut WR) -> Result<()>
    where
        WR: Write,
    {
        write_bytes(writer, self.as_bytes())
    }
}
