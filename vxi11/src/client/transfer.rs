use std::time::Duration;

use futures::{AsyncRead, AsyncWrite};

use crate::{
    client::{millis, Error, Vxi11Client, FALLBACK_MAX_RECV_SIZE, MAX_READ_REQUEST},
    common::{
        vxi11::xdr::{DeviceFlags, DeviceReadParms, DeviceWriteParms},
        xdr::basic::Opaque,
    },
};

impl<IO> Vxi11Client<IO>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    /// Write a message using the default io timeout, see [Vxi11Client::write_timeout]
    pub async fn write(&mut self, data: &[u8]) -> Result<usize, Error> {
        self.write_timeout(data, self.io_timeout).await
    }

    /// Write a message, split into chunks of at most the max receive size of the link.
    ///
    /// Only the last chunk carries the END flag. The first failing chunk aborts the write,
    /// chunks sent before it are not undone. Returns the length of `data`.
    pub async fn write_timeout(&mut self, data: &[u8], timeout: Duration) -> Result<usize, Error> {
        let max_chunk = match self.link.max_recv_size {
            0 => FALLBACK_MAX_RECV_SIZE,
            n => n as usize,
        };
        let timeout = millis(timeout);

        let mut bytes_left = data.len();
        while bytes_left > 0 {
            let offset = data.len() - bytes_left;
            let chunk = bytes_left.min(max_chunk);
            let end = chunk == bytes_left;

            let parms = DeviceWriteParms {
                lid: self.link.lid,
                io_timeout: timeout,
                lock_timeout: timeout,
                flags: DeviceFlags::new(true, end, false),
                data: Opaque(data[offset..offset + chunk].to_vec()),
            };
            log::debug!(lid = self.link.lid.0; "Write {} bytes, flags={}", chunk, parms.flags);

            let resp = self
                .core
                .device_write(parms)
                .await
                .map_err(Error::NoWriteResponse)?;
            if resp.error.is_error() {
                log::debug!(lid = self.link.lid.0; "Write failed: {}", resp.error);
                return Err(Error::Device(resp.error));
            }

            bytes_left -= (resp.size as usize).min(chunk);
        }

        Ok(data.len())
    }

    /// Read a message of at most `capacity` bytes using the default read timeout and termination
    /// character
    pub async fn read(&mut self, capacity: usize) -> Result<Vec<u8>, Error> {
        self.read_timeout(capacity, self.read_timeout).await
    }

    pub async fn read_timeout(
        &mut self,
        capacity: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, Error> {
        let mut buf = vec![0; capacity];
        let n = self.read_into(&mut buf, timeout, self.term_char).await?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Read into `buf` until the device signals END or `term_char` was seen.
    ///
    /// Each request asks for the space left in `buf`, at most [MAX_READ_REQUEST] bytes. Data from
    /// a reply which does not fit is dropped. Fails with [Error::BufferTooSmall] if `buf` fills up before the message ends.
    pub async fn read_into(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
        term_char: Option<u8>,
    ) -> Result<usize, Error> {
        let timeout = millis(timeout);
        let mut cur_pos = 0;

        loop {
            let request_size = (buf.len() - cur_pos).min(MAX_READ_REQUEST) as u32;
            let parms = DeviceReadParms {
                lid: self.link.lid,
                request_size,
                io_timeout: timeout,
                lock_timeout: timeout,
                flags: DeviceFlags::new(true, false, term_char.is_some()),
                term_char: term_char.unwrap_or(0),
            };

            let resp = self
                .core
                .device_read(parms)
                .await
                .map_err(Error::NoReadResponse)?;
            if resp.error.is_error() {
                log::debug!(lid = self.link.lid.0; "Read failed: {}", resp.error);
                return Err(Error::Device(resp.error));
            }

            let data = resp.data.0;
            if cur_pos + data.len() <= buf.len() {
                buf[cur_pos..cur_pos + data.len()].copy_from_slice(&data);
                cur_pos += data.len();
            } else {
                log::warn!(lid = self.link.lid.0; "Dropped {} bytes read, only {} bytes left in buffer", data.len(), buf.len() - cur_pos);
            }

            if resp.reason.is_end() || resp.reason.is_chr() {
                log::debug!(lid = self.link.lid.0; "Read {} bytes", cur_pos);
                break Ok(cur_pos);
            }
            if cur_pos >= buf.len() {
                break Err(Error::BufferTooSmall(cur_pos));
            }
        }
    }
}
