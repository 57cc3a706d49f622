//! The _service descriptor_ gives the name, provider and type of a service.

use super::DescriptorError;
use crate::text;
use std::borrow::Cow;
use std::fmt;

/// Name, provider and type of a service, as attached to its entry in the _Service Description
/// Table_.
pub struct ServiceDescriptor<'buf> {
    service_type: u8,
    provider_name: &'buf [u8],
    service_name: &'buf [u8],
}
impl<'buf> ServiceDescriptor<'buf> {
    /// The descriptor tag value which identifies the descriptor as a `ServiceDescriptor`.
    pub const TAG: u8 = 0x48;
    /// Largest encoded service name that can accompany a provider name of the given length.
    pub fn max_name_len(provider_len: usize) -> usize {
        // service_type and the two name length fields
        255usize.saturating_sub(3 + provider_len)
    }

    /// Construct a `ServiceDescriptor` instance that will parse the data from the given slice.
    pub fn new(_tag: u8, buf: &'buf [u8]) -> Result<ServiceDescriptor<'buf>, DescriptorError> {
        let not_enough = |expected| DescriptorError::NotEnoughData {
            tag: Self::TAG,
            actual: buf.len(),
            expected,
        };
        if buf.len() < 2 {
            return Err(not_enough(2));
        }
        let provider_end = 2 + buf[1] as usize;
        if buf.len() < provider_end + 1 {
            return Err(not_enough(provider_end + 1));
        }
        let name_end = provider_end + 1 + buf[provider_end] as usize;
        if buf.len() < name_end {
            return Err(not_enough(name_end));
        }
        Ok(ServiceDescriptor {
            service_type: buf[0],
            provider_name: &buf[2..provider_end],
            service_name: &buf[provider_end + 1..name_end],
        })
    }

    /// Serialise the payload of a service descriptor from already-encoded name fields.
    pub fn encode(service_type: u8, provider_name: &[u8], service_name: &[u8]) -> Vec<u8> {
        let mut payload = Vec::with_capacity(3 + provider_name.len() + service_name.len());
        payload.push(service_type);
        payload.push(provider_name.len() as u8);
        payload.extend_from_slice(provider_name);
        payload.push(service_name.len() as u8);
        payload.extend_from_slice(service_name);
        payload
    }

    pub fn service_type(&self) -> u8 {
        self.service_type
    }
    /// The provider name, as encoded in the stream.
    pub fn provider_name_bytes(&self) -> &'buf [u8] {
        self.provider_name
    }
    /// The service name, as encoded in the stream.
    pub fn service_name_bytes(&self) -> &'buf [u8] {
        self.service_name
    }
    pub fn provider_name(&self) -> Cow<'buf, str> {
        text::decode(self.provider_name)
    }
    pub fn service_name(&self) -> Cow<'buf, str> {
        text::decode(self.service_name)
    }
}
impl<'buf> fmt::Debug for ServiceDescriptor<'buf> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("ServiceDescriptor")
            .field("service_type", &self.service_type)
            .field("provider_name", &self.provider_name())
            .field("service_name", &self.service_name())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::super::{Descriptor, DescriptorError, DvbDescriptors};
    use super::*;
    use assert_matches::assert_matches;
    use hex_literal::hex;

    #[test]
    fn descriptor() {
        let data = hex!("480d19000a424243204f4e45204844");
        let desc = DvbDescriptors::from_bytes(&data).unwrap();
        assert_matches!(desc, DvbDescriptors::Service(ref svc) if svc.service_type() == 0x19);
        if let DvbDescriptors::Service(svc) = desc {
            assert_eq!(svc.provider_name(), "");
            assert_eq!(svc.service_name(), "BBC ONE HD");
            assert!(!format!("{:?}", svc).is_empty());
        }
    }

    #[test]
    fn name_overruns_payload() {
        assert_matches!(
            ServiceDescriptor::new(0x48, &hex!("19 00 0a 42 42")),
            Err(DescriptorError::NotEnoughData {
                expected: 13,
                actual: 5,
                ..
            })
        );
    }

    #[test]
    fn encode_matches_layout() {
        let payload = ServiceDescriptor::encode(0x01, b"P", b"NEWSVC");
        let svc = ServiceDescriptor::new(0x48, &payload).unwrap();
        assert_eq!(svc.service_type(), 0x01);
        assert_eq!(svc.provider_name_bytes(), b"P");
        assert_eq!(svc.service_name_bytes(), b"NEWSVC");
    }
}
