//! In-place rewriting of the service references held in descriptor lists of the _Network
//! Information_ and _Bouquet Association_ tables.

use crate::descriptor::logical_channel::LogicalChannelNumberDescriptor;
use crate::descriptor::service_list::ServiceListDescriptor;
use crate::descriptor::{DescriptorList, PDS_EICTA};

/// Replaces the service id, service type and logical channel number of the entries referring to
/// one service within _service list_ and EICTA _logical channel number_ descriptors.
///
/// Descriptors are edited in place, so the encoded size of a list never changes.  Other
/// descriptors are left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorRewriter {
    pub old_id: u16,
    pub new_id: Option<u16>,
    pub new_type: Option<u8>,
    pub new_lcn: Option<u16>,
}

impl DescriptorRewriter {
    /// Rewrites matching entries, returning the number of entries changed.
    pub fn rewrite(&self, descs: &mut DescriptorList) -> usize {
        let mut count = 0;
        let mut next = descs.search(ServiceListDescriptor::TAG, 0, 0);
        while let Some(i) = next {
            for entry in descs
                .payload_mut(i)
                .chunks_exact_mut(ServiceListDescriptor::ENTRY_SIZE)
            {
                if self.rewrite_service_list_entry(entry) {
                    count += 1;
                }
            }
            next = descs.search(ServiceListDescriptor::TAG, i + 1, 0);
        }

        let mut next = descs.search(LogicalChannelNumberDescriptor::TAG, 0, PDS_EICTA);
        while let Some(i) = next {
            for entry in descs
                .payload_mut(i)
                .chunks_exact_mut(LogicalChannelNumberDescriptor::ENTRY_SIZE)
            {
                if self.rewrite_lcn_entry(entry) {
                    count += 1;
                }
            }
            next = descs.search(LogicalChannelNumberDescriptor::TAG, i + 1, PDS_EICTA);
        }
        count
    }

    fn matches(&self, entry: &[u8]) -> bool {
        u16::from(entry[0]) << 8 | u16::from(entry[1]) == self.old_id
    }

    fn rewrite_service_list_entry(&self, entry: &mut [u8]) -> bool {
        if !self.matches(entry) {
            return false;
        }
        if let Some(id) = self.new_id {
            entry[..2].copy_from_slice(&id.to_be_bytes());
        }
        if let Some(service_type) = self.new_type {
            entry[2] = service_type;
        }
        true
    }

    fn rewrite_lcn_entry(&self, entry: &mut [u8]) -> bool {
        if !self.matches(entry) {
            return false;
        }
        if let Some(id) = self.new_id {
            entry[..2].copy_from_slice(&id.to_be_bytes());
        }
        if let Some(lcn) = self.new_lcn {
            let mask = LogicalChannelNumberDescriptor::LCN_MASK;
            let field = u16::from(entry[2]) << 8 | u16::from(entry[3]);
            let field = (field & !mask) | (lcn & mask);
            entry[2..4].copy_from_slice(&field.to_be_bytes());
        }
        true
    }
}
