//! The EICTA _logical channel number descriptor_ assigns the number under which a receiver
//! should list each service.  It is a private descriptor, only meaningful under the
//! [`PDS_EICTA`](../constant.PDS_EICTA.html) private data specifier.

use super::DescriptorError;
use std::fmt;

pub struct LogicalChannelNumberDescriptor<'buf> {
    buf: &'buf [u8],
}
impl<'buf> LogicalChannelNumberDescriptor<'buf> {
    pub const TAG: u8 = 0x83;
    /// Size of each entry of the list.
    pub const ENTRY_SIZE: usize = 4;
    /// The bits of an entry's second 16-bit field which hold the channel number; the remainder
    /// are flags which must be kept as found.
    pub const LCN_MASK: u16 = 0x03ff;

    pub fn new(
        _tag: u8,
        buf: &'buf [u8],
    ) -> Result<LogicalChannelNumberDescriptor<'buf>, DescriptorError> {
        Ok(LogicalChannelNumberDescriptor { buf })
    }

    /// Iterate over the entries.  Any trailing bytes too few to form a whole entry are ignored.
    pub fn channels(&self) -> impl Iterator<Item = LogicalChannel> + 'buf {
        self.buf
            .chunks_exact(Self::ENTRY_SIZE)
            .map(LogicalChannel::from_bytes)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct LogicalChannel {
    pub service_id: u16,
    pub visible_service: bool,
    pub logical_channel_number: u16,
}
impl LogicalChannel {
    fn from_bytes(buf: &[u8]) -> LogicalChannel {
        LogicalChannel {
            service_id: u16::from(buf[0]) << 8 | u16::from(buf[1]),
            visible_service: buf[2] & 0b1000_0000 != 0,
            logical_channel_number: (u16::from(buf[2]) << 8 | u16::from(buf[3]))
                & LogicalChannelNumberDescriptor::LCN_MASK,
        }
    }
}

impl<'buf> fmt::Debug for LogicalChannelNumberDescriptor<'buf> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_list().entries(self.channels()).finish()
    }
}
