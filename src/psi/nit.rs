//! Types related to the _Network Information Table_ and _Bouquet Association Table_ (_ETSI EN 300
//! 468, 5.2.1 and 5.2.2_), which share one syntax: a list-level descriptor loop, followed by a loop
//! of transport streams each carrying its own descriptors.

use super::{
    pack_payloads, take, take_length_prefixed, u16_at, BinaryTable, Section, TableError,
    TableHeader, TID_BAT, TID_NIT_ACT, TID_NIT_OTH,
};
use crate::descriptor::DescriptorList;
use crate::packet::Pid;
use std::collections::BTreeMap;

/// Identifies a transport stream within a network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransportStreamId {
    pub transport_stream_id: u16,
    pub original_network_id: u16,
}

/// The entry for one transport stream within a `TransportListTable`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Transport {
    pub descs: DescriptorList,
}

/// Either a _Network Information Table_ (actual or other), in which case `list_id` is the
/// _network_id_, or a _Bouquet Association Table_, in which case it is the _bouquet_id_.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportListTable {
    pub table_id: u8,
    pub version: u8,
    pub is_current: bool,
    pub list_id: u16,
    pub descs: DescriptorList,
    pub transports: BTreeMap<TransportStreamId, Transport>,
}

impl TransportListTable {
    const TRANSPORT_HEADER_SIZE: usize = 4;

    pub fn from_table(table: &BinaryTable) -> Result<TransportListTable, TableError> {
        match table.table_id() {
            TID_NIT_ACT | TID_NIT_OTH | TID_BAT => (),
            other => return Err(TableError::UnexpectedTableId(other)),
        }
        let header = table.header();
        let mut list = TransportListTable {
            table_id: header.table_id,
            version: header.version,
            is_current: header.is_current,
            list_id: header.table_id_extension,
            descs: DescriptorList::default(),
            transports: BTreeMap::new(),
        };
        // list-level descriptors may be spread over several sections
        let mut list_descs = vec![];
        for sect in table.sections() {
            let mut buf = sect.payload();
            list_descs.extend_from_slice(take_length_prefixed(&mut buf, "descriptors")?);
            let mut ts_loop = take_length_prefixed(&mut buf, "transport_stream_loop")?;
            while !ts_loop.is_empty() {
                let head = take(&mut ts_loop, Self::TRANSPORT_HEADER_SIZE, "transport_stream")?;
                let descs = DescriptorList::from_bytes(take_length_prefixed(
                    &mut ts_loop,
                    "transport_descriptors",
                )?)?;
                let id = TransportStreamId {
                    transport_stream_id: u16_at(head),
                    original_network_id: u16_at(&head[2..]),
                };
                list.transports.insert(id, Transport { descs });
            }
        }
        list.descs = DescriptorList::from_bytes(&list_descs)?;
        Ok(list)
    }

    pub fn is_bat(&self) -> bool {
        self.table_id == TID_BAT
    }

    /// `true` for the NIT describing the network which carries this transport stream.
    pub fn is_actual_nit(&self) -> bool {
        self.table_id == TID_NIT_ACT
    }

    pub fn to_table(&self, pid: Pid) -> Result<BinaryTable, TableError> {
        let header = TableHeader {
            table_id: self.table_id,
            table_id_extension: self.list_id,
            version: self.version,
            is_current: self.is_current,
        };
        // Each section has a descriptor loop then a transport stream loop.  The list descriptors
        // fill as many sections as they need, with the transport streams following on from the
        // last of them.
        let mut desc_loops = self.descs.split_loops(Section::MAX_PAYLOAD_SIZE - 4);
        let last_loop = desc_loops.pop().unwrap_or_default();
        let mut payloads: Vec<Vec<u8>> = desc_loops
            .iter()
            .map(|descs| {
                let mut p = Vec::with_capacity(descs.len() + 4);
                p.extend_from_slice(&loop_length(descs.len()));
                p.extend_from_slice(descs);
                p.extend_from_slice(&loop_length(0));
                p
            })
            .collect();
        let mut first_prefix = Vec::with_capacity(last_loop.len() + 4);
        first_prefix.extend_from_slice(&loop_length(last_loop.len()));
        first_prefix.extend_from_slice(&last_loop);
        first_prefix.extend_from_slice(&loop_length(0));
        let next_prefix = [0xf0, 0x00, 0xf0, 0x00];
        let entries: Vec<Vec<u8>> = self
            .transports
            .iter()
            .map(|(id, ts)| {
                let mut e = Vec::with_capacity(6 + ts.descs.binary_size());
                e.extend_from_slice(&id.transport_stream_id.to_be_bytes());
                e.extend_from_slice(&id.original_network_id.to_be_bytes());
                ts.descs.write_with_length(&mut e);
                e
            })
            .collect();
        payloads.extend(pack_payloads(
            &first_prefix,
            &next_prefix,
            &entries,
            |p, prefix_len| {
                let len = loop_length(p.len() - prefix_len);
                p[prefix_len - 2..prefix_len].copy_from_slice(&len);
            },
        ));
        BinaryTable::from_payloads(&header, pid, &payloads)
    }
}

/// A 12-bit loop length behind 4 reserved bits.
fn loop_length(len: usize) -> [u8; 2] {
    (0xf000 | (len as u16 & 0x0fff)).to_be_bytes()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::descriptor::service_list::ServiceListDescriptor;
    use crate::descriptor::DvbDescriptors;
    use assert_matches::assert_matches;
    use bitstream_io::{BigEndian, BitWrite, BitWriter, BE};
    use hex_literal::hex;
    use std::io;

    fn make_test_data<F>(builder: F) -> Vec<u8>
    where
        F: Fn(&mut BitWriter<Vec<u8>, BE>) -> Result<(), io::Error>,
    {
        let data: Vec<u8> = Vec::new();
        let mut w = BitWriter::endian(data, BigEndian);
        builder(&mut w).unwrap();
        w.into_writer()
    }

    fn bat_payload() -> Vec<u8> {
        make_test_data(|w| {
            w.write(4, 0xf)?; // reserved_future_use
            w.write(12, 0)?; // bouquet_descriptors_length
            w.write(4, 0xf)?; // reserved_future_use
            w.write(12, 15)?; // transport_stream_loop_length
            w.write(16, 0x0001)?; // transport_stream_id
            w.write(16, 0x233a)?; // original_network_id
            w.write(4, 0xf)?; // reserved_future_use
            w.write(12, 9)?; // transport_descriptors_length
            w.write(8, 0x41)?; // descriptor_tag: service_list_descriptor
            w.write(8, 7)?; // descriptor_length, including one trailing spare byte
            w.write(16, 0x1001)?; // service_id
            w.write(8, 0x01)?; // service_type
            w.write(16, 0x1002)?; // service_id
            w.write(8, 0x16)?; // service_type
            w.write(8, 0xff) // trailing partial entry
        })
    }

    fn bat() -> BinaryTable {
        let header = TableHeader {
            table_id: TID_BAT,
            table_id_extension: 0x1234,
            version: 2,
            is_current: true,
        };
        BinaryTable::from_payloads(&header, Pid::SDT_BAT, &[bat_payload()]).unwrap()
    }

    #[test]
    fn parse_bat() {
        let bat = TransportListTable::from_table(&bat()).unwrap();
        assert!(bat.is_bat());
        assert!(!bat.is_actual_nit());
        assert_eq!(bat.list_id, 0x1234);
        assert!(bat.descs.is_empty());
        assert_eq!(bat.transports.len(), 1);
        let ts = &bat.transports[&TransportStreamId {
            transport_stream_id: 1,
            original_network_id: 0x233a,
        }];
        let i = ts.descs.search(ServiceListDescriptor::TAG, 0, 0).unwrap();
        assert_matches!(
            ts.descs.typed::<DvbDescriptors>(i),
            Ok(DvbDescriptors::ServiceList(ref sl)) if sl.services().count() == 2
        );
    }

    #[test]
    fn reencode_is_identical() {
        let table = bat();
        let bat = TransportListTable::from_table(&table).unwrap();
        let out = bat.to_table(Pid::SDT_BAT).unwrap();
        assert_eq!(out.sections(), table.sections());
    }

    #[test]
    fn large_table_split_over_sections() {
        let mut nit = TransportListTable {
            table_id: TID_NIT_ACT,
            version: 0,
            is_current: true,
            list_id: 0x3005,
            descs: DescriptorList::from_bytes(&hex!("40 04 54 65 73 74")).unwrap(),
            transports: BTreeMap::new(),
        };
        for ts in 0..20u16 {
            let mut descs = DescriptorList::default();
            descs.add(0x41, &[0u8; 240]).unwrap();
            nit.transports.insert(
                TransportStreamId {
                    transport_stream_id: ts,
                    original_network_id: 0x233a,
                },
                Transport { descs },
            );
        }
        let table = nit.to_table(Pid::NIT).unwrap();
        assert!(table.sections().len() > 1);
        assert!(table
            .sections()
            .iter()
            .all(|s| s.len() <= crate::psi::Section::MAX_SIZE));
        assert_eq!(TransportListTable::from_table(&table).unwrap(), nit);
    }

    #[test]
    fn network_descriptors_spread_over_sections() {
        let header = TableHeader {
            table_id: TID_NIT_ACT,
            table_id_extension: 0x3005,
            version: 4,
            is_current: true,
        };
        // three 202-byte network_name descriptors in each section, and no transport streams
        let payload: Vec<u8> = make_test_data(|w| {
            w.write(4, 0xf)?;
            w.write(12, 3 * 202)?; // network_descriptors_length
            for _ in 0..3 {
                w.write(8, 0x40)?;
                w.write(8, 200)?;
                for _ in 0..200 {
                    w.write(8, b'N')?;
                }
            }
            w.write(4, 0xf)?;
            w.write(12, 0) // transport_stream_loop_length
        });
        let table =
            BinaryTable::from_payloads(&header, Pid::NIT, &[payload.clone(), payload]).unwrap();
        let nit = TransportListTable::from_table(&table).unwrap();
        assert_eq!(nit.descs.len(), 6);
        assert!(nit.descs.binary_size() > Section::MAX_PAYLOAD_SIZE);

        let out = nit.to_table(Pid::NIT).unwrap();
        assert_eq!(out.sections().len(), 2);
        assert_eq!(TransportListTable::from_table(&out).unwrap(), nit);
    }

    #[test]
    fn truncated_transport() {
        let header = TableHeader {
            table_id: TID_NIT_ACT,
            table_id_extension: 1,
            version: 0,
            is_current: true,
        };
        let table =
            BinaryTable::from_payloads(&header, Pid::NIT, &[hex!("f000 f002 0001")]).unwrap();
        assert_matches!(
            TransportListTable::from_table(&table),
            Err(TableError::NotEnoughData {
                field: "transport_stream",
                ..
            })
        );
    }
}
