//! Types related to the _Service Description Table_ (_ETSI EN 300 468, 5.2.3_)

use super::{
    pack_payloads, take, u16_at, BinaryTable, TableError, TableHeader, TID_SDT_ACT, TID_SDT_OTH,
};
use crate::descriptor::service::ServiceDescriptor;
use crate::descriptor::{DescriptorError, DescriptorList};
use crate::packet::Pid;
use crate::text;
use std::collections::BTreeMap;

/// The entry for one service within a `Sdt`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SdtService {
    pub eit_schedule: bool,
    pub eit_present_following: bool,
    /// 3-bit _running_status_ value
    pub running_status: u8,
    /// The _free_CA_mode_ flag; `true` when some component of the service is scrambled.
    pub ca_controlled: bool,
    pub descs: DescriptorList,
}

impl SdtService {
    fn service_descriptor(&self) -> Option<ServiceDescriptor<'_>> {
        let i = self.descs.search(ServiceDescriptor::TAG, 0, 0)?;
        ServiceDescriptor::new(ServiceDescriptor::TAG, self.descs.payload(i)).ok()
    }

    /// The service name from the first service descriptor, if there is one.
    pub fn name(&self) -> Option<String> {
        self.service_descriptor()
            .map(|sd| sd.service_name().into_owned())
    }

    /// The service type from the first service descriptor, if there is one.
    pub fn service_type(&self) -> Option<u8> {
        self.service_descriptor().map(|sd| sd.service_type())
    }

    fn update_service_descriptor<F>(&mut self, f: F) -> Result<(), DescriptorError>
    where
        F: FnOnce(u8, &[u8], &[u8]) -> Vec<u8>,
    {
        match self.descs.search(ServiceDescriptor::TAG, 0, 0) {
            Some(i) => {
                let payload = match ServiceDescriptor::new(ServiceDescriptor::TAG, self.descs.payload(i)) {
                    Ok(sd) => f(
                        sd.service_type(),
                        sd.provider_name_bytes(),
                        sd.service_name_bytes(),
                    ),
                    Err(_) => f(0, &[], &[]),
                };
                self.descs.replace_payload(i, &payload)
            }
            None => self.descs.add(ServiceDescriptor::TAG, &f(0, &[], &[])),
        }
    }

    /// Sets the name in the service descriptor, creating the descriptor if absent.  A name too
    /// long to fit in the descriptor beside the provider name is truncated.
    pub fn set_name(&mut self, name: &str) -> Result<(), DescriptorError> {
        self.update_service_descriptor(|service_type, provider, _| {
            let max = ServiceDescriptor::max_name_len(provider.len());
            ServiceDescriptor::encode(service_type, provider, &text::encode_truncated(name, max))
        })
    }

    /// Sets the type in the service descriptor, creating the descriptor if absent.
    pub fn set_type(&mut self, service_type: u8) -> Result<(), DescriptorError> {
        self.update_service_descriptor(|_, provider, name| {
            ServiceDescriptor::encode(service_type, provider, name)
        })
    }

    fn write_to(&self, service_id: u16, out: &mut Vec<u8>) {
        out.extend_from_slice(&service_id.to_be_bytes());
        out.push(
            0b1111_1100
                | u8::from(self.eit_schedule) << 1
                | u8::from(self.eit_present_following),
        );
        let len = self.descs.binary_size() as u16 & 0x0fff;
        let flags = u16::from(self.running_status & 0b111) << 13 | u16::from(self.ca_controlled) << 12;
        out.extend_from_slice(&(flags | len).to_be_bytes());
        self.descs.write_to(out);
    }
}

/// A _Service Description Table_, listing the services of either this transport stream
/// ('actual') or of some other one ('other').
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sdt {
    pub version: u8,
    pub is_current: bool,
    /// `true` for the table describing this transport stream
    pub actual: bool,
    pub ts_id: u16,
    pub onetw_id: u16,
    pub services: BTreeMap<u16, SdtService>,
}

impl Sdt {
    const SERVICE_HEADER_SIZE: usize = 5;

    pub fn from_table(table: &BinaryTable) -> Result<Sdt, TableError> {
        let actual = match table.table_id() {
            TID_SDT_ACT => true,
            TID_SDT_OTH => false,
            other => return Err(TableError::UnexpectedTableId(other)),
        };
        let header = table.header();
        let mut sdt = Sdt {
            version: header.version,
            is_current: header.is_current,
            actual,
            ts_id: header.table_id_extension,
            onetw_id: 0,
            services: BTreeMap::new(),
        };
        for sect in table.sections() {
            let mut buf = sect.payload();
            sdt.onetw_id = u16_at(take(&mut buf, 3, "original_network_id")?);
            while !buf.is_empty() {
                let head = take(&mut buf, Self::SERVICE_HEADER_SIZE, "service")?;
                let descs_len = usize::from(u16_at(&head[3..]) & 0x0fff);
                let descs = DescriptorList::from_bytes(take(&mut buf, descs_len, "service descriptors")?)?;
                sdt.services.insert(
                    u16_at(head),
                    SdtService {
                        eit_schedule: head[2] & 0b10 != 0,
                        eit_present_following: head[2] & 0b01 != 0,
                        running_status: head[3] >> 5,
                        ca_controlled: head[3] & 0b1_0000 != 0,
                        descs,
                    },
                );
            }
        }
        Ok(sdt)
    }

    /// Looks for a service by name, ignoring case and whitespace, returning its service id.
    pub fn find_service(&self, name: &str) -> Option<u16> {
        let wanted = text::normalise_name(name);
        self.services
            .iter()
            .find(|(_, svc)| {
                svc.name()
                    .map(|n| text::normalise_name(&n) == wanted)
                    .unwrap_or(false)
            })
            .map(|(&id, _)| id)
    }

    pub fn to_table(&self) -> Result<BinaryTable, TableError> {
        let header = TableHeader {
            table_id: if self.actual { TID_SDT_ACT } else { TID_SDT_OTH },
            table_id_extension: self.ts_id,
            version: self.version,
            is_current: self.is_current,
        };
        let mut prefix = self.onetw_id.to_be_bytes().to_vec();
        prefix.push(0xff);
        let entries: Vec<Vec<u8>> = self
            .services
            .iter()
            .map(|(&id, svc)| {
                let mut e = Vec::with_capacity(Self::SERVICE_HEADER_SIZE + svc.descs.binary_size());
                svc.write_to(id, &mut e);
                e
            })
            .collect();
        let payloads = pack_payloads(&prefix, &prefix, &entries, |_, _| ());
        BinaryTable::from_payloads(&header, Pid::SDT_BAT, &payloads)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::psi::test::SDT_SECTION;
    use crate::psi::Section;
    use assert_matches::assert_matches;

    fn sdt() -> Sdt {
        let sect = Section::from_bytes(&SDT_SECTION[..]).unwrap();
        Sdt::from_table(&BinaryTable::new(Pid::SDT_BAT, vec![sect]).unwrap()).unwrap()
    }

    #[test]
    fn parse() {
        let sdt = sdt();
        assert!(sdt.actual);
        assert_eq!(sdt.ts_id, 0x4084);
        assert_eq!(sdt.onetw_id, 0x233a);
        assert_eq!(sdt.services.len(), 7);
        let bbc_one = &sdt.services[&0x4484];
        assert_eq!(bbc_one.name().as_deref(), Some("BBC ONE HD"));
        assert_eq!(bbc_one.service_type(), Some(0x19));
        assert_eq!(bbc_one.running_status, 4);
        assert!(!bbc_one.ca_controlled);
        assert!(bbc_one.eit_schedule);
        assert!(bbc_one.eit_present_following);
        assert_eq!(sdt.services[&0x4f80].service_type(), Some(0x16));
    }

    #[test]
    fn find_by_name() {
        let sdt = sdt();
        assert_eq!(sdt.find_service("bbc one hd"), Some(0x4484));
        assert_eq!(sdt.find_service("Channel4HD"), Some(0x4500));
        assert_eq!(sdt.find_service("NEWS"), None);
    }

    #[test]
    fn reencode() {
        let sdt = sdt();
        let table = sdt.to_table().unwrap();
        assert_eq!(table.sections().len(), 1);
        assert_eq!(table.sections()[0].len(), SDT_SECTION.len());
        assert_eq!(Sdt::from_table(&table).unwrap(), sdt);
    }

    #[test]
    fn modify_service() {
        let mut sdt = sdt();
        let mut svc = sdt.services.remove(&0x4484).unwrap();
        svc.set_name("NEWSVC").unwrap();
        svc.set_type(0x01).unwrap();
        svc.running_status = 1;
        svc.ca_controlled = true;
        sdt.services.insert(0x2002, svc);
        let reparsed = Sdt::from_table(&sdt.to_table().unwrap()).unwrap();
        assert!(!reparsed.services.contains_key(&0x4484));
        let svc = &reparsed.services[&0x2002];
        assert_eq!(svc.name().as_deref(), Some("NEWSVC"));
        assert_eq!(svc.service_type(), Some(0x01));
        assert_eq!(svc.running_status, 1);
        assert!(svc.ca_controlled);
        // the unrelated default_authority and private descriptors stay in place
        assert_eq!(svc.descs.len(), 4);
    }

    #[test]
    fn set_name_creates_descriptor() {
        let mut svc = SdtService::default();
        assert_eq!(svc.name(), None);
        svc.set_name("Télé").unwrap();
        assert_eq!(svc.name().as_deref(), Some("Télé"));
        assert_eq!(svc.service_type(), Some(0));
    }

    #[test]
    fn long_name_is_truncated() {
        let mut svc = SdtService::default();
        svc.descs
            .add(
                ServiceDescriptor::TAG,
                &ServiceDescriptor::encode(0x19, b"Provider", b"Old"),
            )
            .unwrap();
        svc.set_name(&"N".repeat(300)).unwrap();
        assert_eq!(svc.name(), Some("N".repeat(255 - 3 - 8)));
        assert_eq!(svc.service_type(), Some(0x19));
        assert_eq!(svc.descs.raw(0).len(), 2 + 255);
        let i = svc.descs.search(ServiceDescriptor::TAG, 0, 0).unwrap();
        let sd = ServiceDescriptor::new(ServiceDescriptor::TAG, svc.descs.payload(i)).unwrap();
        assert_eq!(sd.provider_name(), "Provider");
    }

    #[test]
    fn truncated_service_loop() {
        let header = TableHeader {
            table_id: TID_SDT_ACT,
            table_id_extension: 1,
            version: 0,
            is_current: true,
        };
        let table =
            BinaryTable::from_payloads(&header, Pid::SDT_BAT, &[[0x23u8, 0x3a, 0xff, 0x10]]).unwrap();
        assert_matches!(
            Sdt::from_table(&table),
            Err(TableError::NotEnoughData { field: "service", .. })
        );
    }
}
