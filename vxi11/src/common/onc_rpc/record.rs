//! Record marking standard, see [RFC5531 section 11](https://datatracker.ietf.org/doc/html/rfc5531#section-11).

use std::io::{ErrorKind, Result};

use byteorder::{ByteOrder, NetworkEndian};
use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const LAST_FRAGMENT: u32 = 0x8000_0000;
const FRAGMENT_LEN_MASK: u32 = 0x7FFF_FFFF;

/// Read fragments until a complete record of at most `maxlen` bytes has been assembled
pub(crate) async fn read_record<RD>(reader: &mut RD, maxlen: usize) -> Result<Vec<u8>>
where
    RD: AsyncRead + Unpin,
{
    let mut buf = Vec::new();

    loop {
        let mut fragment_header = [0u8; 4];
        reader.read_exact(&mut fragment_header).await?;
        let fragment_header = NetworkEndian::read_u32(&fragment_header[..]);

        let len = (fragment_header & FRAGMENT_LEN_MASK) as usize;
        if buf.len() + len > maxlen || buf.try_reserve(len).is_err() {
            return Err(ErrorKind::OutOfMemory.into());
        }
        let n = (&mut *reader)
            .take(len as u64)
            .read_to_end(&mut buf)
            .await?;
        if n != len {
            return Err(ErrorKind::UnexpectedEof.into());
        }

        if fragment_header & LAST_FRAGMENT != 0 {
            break Ok(buf);
        }
    }
}

/// Write `record` as a single (last) fragment
pub(crate) async fn write_record<WR>(writer: &mut WR, record: Vec<u8>) -> Result<()>
where
    WR: AsyncWrite + Unpin,
{
    let mut fragment_header = [0u8; 4];
    NetworkEndian::write_u32(
        &mut fragment_header,
        LAST_FRAGMENT | (record.len() as u32 & FRAGMENT_LEN_MASK),
    );
    writer.write_all(&fragment_header).await?;
    writer.write_all(record.as_slice()).await?;
    writer.flush().await
}
