//! The _service list descriptor_ enumerates the services of a transport stream, within the
//! _Network Information_ and _Bouquet Association_ tables.

use super::DescriptorError;
use std::fmt;

/// A list of `(service_id, service_type)` pairs.
pub struct ServiceListDescriptor<'buf> {
    buf: &'buf [u8],
}
impl<'buf> ServiceListDescriptor<'buf> {
    /// The descriptor tag value which identifies the descriptor as a `ServiceListDescriptor`.
    pub const TAG: u8 = 0x41;
    /// Size of each entry of the list.
    pub const ENTRY_SIZE: usize = 3;

    pub fn new(_tag: u8, buf: &'buf [u8]) -> Result<ServiceListDescriptor<'buf>, DescriptorError> {
        Ok(ServiceListDescriptor { buf })
    }

    /// Iterate over the entries.  Any trailing bytes too few to form a whole entry are ignored.
    pub fn services(&self) -> impl Iterator<Item = ServiceListEntry> + 'buf {
        self.buf
            .chunks_exact(Self::ENTRY_SIZE)
            .map(ServiceListEntry::from_bytes)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct ServiceListEntry {
    pub service_id: u16,
    pub service_type: u8,
}
impl ServiceListEntry {
    fn from_bytes(buf: &[u8]) -> ServiceListEntry {
        ServiceListEntry {
            service_id: u16::from(buf[0]) << 8 | u16::from(buf[1]),
            service_type: buf[2],
        }
    }
}

impl<'buf> fmt::Debug for ServiceListDescriptor<'buf> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_list().entries(self.services()).finish()
    }
}
