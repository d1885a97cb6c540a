use std::{
    net::{Ipv4Addr, SocketAddrV4},
    time::Duration,
};

use futures::{AsyncRead, AsyncWrite};

use crate::{
    client::{millis, Error, Vxi11Client},
    common::{
        vxi11::{
            xdr::{
                DeviceAddrFamily, DeviceEnableSrqParms, DeviceError, DeviceErrorCode, DeviceFlags,
                DeviceGenericParms, DeviceLockParms, DeviceRemoteFunc,
            },
            DEVICE_CLEAR, DEVICE_INTR, DEVICE_INTR_VERSION, DEVICE_LOCAL, DEVICE_REMOTE,
            DEVICE_TRIGGER,
        },
        xdr::basic::Opaque,
    },
};

fn check(error: DeviceErrorCode) -> Result<(), Error> {
    if error.is_error() {
        Err(Error::Device(error))
    } else {
        Ok(())
    }
}

impl<IO> Vxi11Client<IO>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    fn generic_parms(&self, timeout: Duration) -> DeviceGenericParms {
        DeviceGenericParms {
            lid: self.link.lid,
            flags: DeviceFlags::new(true, true, false),
            lock_timeout: millis(timeout),
            io_timeout: millis(timeout),
        }
    }

    async fn generic(&mut self, proc: u32, timeout: Duration) -> Result<(), Error> {
        let parms = self.generic_parms(timeout);
        let DeviceError { error } = self.core.device_generic(proc, parms).await?;
        check(error)
    }

    /// Read the status byte
    pub async fn read_stb(&mut self, timeout: Duration) -> Result<u8, Error> {
        let parms = self.generic_parms(timeout);
        let resp = self.core.device_readstb(parms).await?;
        check(resp.error)?;
        Ok(resp.stb)
    }

    pub async fn trigger(&mut self, timeout: Duration) -> Result<(), Error> {
        self.generic(DEVICE_TRIGGER, timeout).await
    }

    /// Device clear
    pub async fn clear(&mut self, timeout: Duration) -> Result<(), Error> {
        self.generic(DEVICE_CLEAR, timeout).await
    }

    /// Put the device in remote state
    pub async fn remote(&mut self, timeout: Duration) -> Result<(), Error> {
        self.generic(DEVICE_REMOTE, timeout).await
    }

    /// Return the device to local state
    pub async fn local(&mut self, timeout: Duration) -> Result<(), Error> {
        self.generic(DEVICE_LOCAL, timeout).await
    }

    /// Acquire an exclusive lock, waiting at most `lock_timeout` for another link to release it
    pub async fn lock(&mut self, lock_timeout: Duration) -> Result<(), Error> {
        let parms = DeviceLockParms {
            lid: self.link.lid,
            flags: DeviceFlags::new(true, true, false),
            lock_timeout: millis(lock_timeout),
        };
        let DeviceError { error } = self.core.device_lock(parms).await?;
        check(error)
    }

    pub async fn unlock(&mut self) -> Result<(), Error> {
        let DeviceError { error } = self.core.device_unlock(self.link.lid).await?;
        check(error)
    }

    /// Allow or forbid the device to send service requests for this link.
    ///
    /// The link id (big endian) is used as handle and is passed back in the SRQ.
    pub async fn enable_srq(&mut self, enable: bool) -> Result<(), Error> {
        let parms = DeviceEnableSrqParms {
            lid: self.link.lid,
            enable,
            handle: Opaque(self.link.lid.0.to_be_bytes().to_vec()),
        };
        let DeviceError { error } = self.core.device_enable_srq(parms).await?;
        check(error)
    }

    /// Tell the device to send service requests to the interrupt channel on the host it is
    /// connected from
    pub async fn create_intr_chan(&mut self) -> Result<(), Error> {
        self.create_intr_chan_at(
            SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0),
            DeviceAddrFamily::Tcp,
        )
        .await
    }

    /// Tell the device to send service requests to the interrupt channel at `addr`
    pub async fn create_intr_chan_at(
        &mut self,
        addr: SocketAddrV4,
        family: DeviceAddrFamily,
    ) -> Result<(), Error> {
        let parms = DeviceRemoteFunc {
            host_addr: u32::from(*addr.ip()),
            host_port: addr.port(),
            prog_num: DEVICE_INTR,
            prog_vers: DEVICE_INTR_VERSION,
            prog_family: family,
        };
        log::debug!(lid = self.link.lid.0; "Create interrupt channel to {} ({:?})", addr, family);
        let DeviceError { error } = self.core.create_intr_chan(parms).await?;
        check(error)
    }

    pub async fn destroy_intr_chan(&mut self) -> Result<(), Error> {
        let DeviceError { error } = self.core.destroy_intr_chan().await?;
        check(error)
    }
}
