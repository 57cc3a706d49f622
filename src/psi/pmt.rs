//! Types related to the _Program Map Table_

use super::{BinaryTable, TableError, TableHeader, TID_PMT};
use crate::packet::Pid;

/// The _Program Map Table_ of one program.  Only the program number (service id) is ever
/// modified; the remainder of each section is carried through untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pmt {
    pub version: u8,
    pub is_current: bool,
    pub service_id: u16,
    payloads: Vec<Vec<u8>>,
}

impl Pmt {
    /// _PCR_PID_ and _program_info_length_
    const HEADER_SIZE: usize = 4;

    pub fn from_table(table: &BinaryTable) -> Result<Pmt, TableError> {
        if table.table_id() != TID_PMT {
            return Err(TableError::UnexpectedTableId(table.table_id()));
        }
        let mut payloads = Vec::with_capacity(table.sections().len());
        for sect in table.sections() {
            let payload = sect.payload();
            if payload.len() < Self::HEADER_SIZE {
                return Err(TableError::NotEnoughData {
                    field: "program_map_section",
                    expected: Self::HEADER_SIZE,
                    actual: payload.len(),
                });
            }
            payloads.push(payload.to_vec());
        }
        let header = table.header();
        Ok(Pmt {
            version: header.version,
            is_current: header.is_current,
            service_id: header.table_id_extension,
            payloads,
        })
    }

    /// The section payloads following the table syntax header, as received.
    pub fn payloads(&self) -> &[Vec<u8>] {
        &self.payloads
    }

    pub fn to_table(&self, pid: Pid) -> Result<BinaryTable, TableError> {
        let header = TableHeader {
            table_id: TID_PMT,
            table_id_extension: self.service_id,
            version: self.version,
            is_current: self.is_current,
        };
        BinaryTable::from_payloads(&header, pid, &self.payloads)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::psi::Section;
    use assert_matches::assert_matches;
    use bitstream_io::{BigEndian, BitWrite, BitWriter, BE};
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

    fn pmt_payload() -> Vec<u8> {
        make_test_data(|w| {
            w.write(3, 7)?; // reserved
            w.write(13, 123)?; // pcr_pid
            w.write(4, 15)?; // reserved
            w.write(12, 0)?; // program_info_length
                             // program_info_length=0, so no descriptors follow; straight into stream info
            w.write(8, 0x1b)?; // stream_type
            w.write(3, 7)?; // reserved
            w.write(13, 201)?; // elementary_pid
            w.write(4, 15)?; // reserved
            w.write(12, 6)?; // es_info_length
                             // and now, two made-up descriptors which need to fill up es_info_length-bytes
            w.write(8, 0)?; // descriptor_tag
            w.write(8, 1)?; // descriptor_length
            w.write(8, 0)?; // made-up descriptor data not following any spec
                            // second descriptor
            w.write(8, 0)?; // descriptor_tag
            w.write(8, 1)?; // descriptor_length
            w.write(8, 0) // made-up descriptor data not following any spec
        })
    }

    fn pmt_table(service_id: u16) -> BinaryTable {
        let header = TableHeader {
            table_id: TID_PMT,
            table_id_extension: service_id,
            version: 7,
            is_current: true,
        };
        BinaryTable::from_payloads(&header, Pid::new(0x100), &[pmt_payload()]).unwrap()
    }

    #[test]
    fn parse() {
        let pmt = Pmt::from_table(&pmt_table(0x1001)).unwrap();
        assert_eq!(pmt.service_id, 0x1001);
        assert_eq!(pmt.version, 7);
        assert!(pmt.is_current);
        assert_eq!(pmt.payloads(), &[pmt_payload()][..]);
    }

    #[test]
    fn change_program_number_only() {
        let table = pmt_table(0x1001);
        let mut pmt = Pmt::from_table(&table).unwrap();
        pmt.service_id = 0x2002;
        let out = pmt.to_table(Pid::new(0x100)).unwrap();
        let before: &Section = &table.sections()[0];
        let after: &Section = &out.sections()[0];
        assert_eq!(after.table_id_extension(), 0x2002);
        assert_eq!(after.version(), before.version());
        assert_eq!(after.payload(), before.payload());
    }

    #[test]
    fn too_short() {
        let header = TableHeader {
            table_id: TID_PMT,
            table_id_extension: 1,
            version: 0,
            is_current: true,
        };
        let table = BinaryTable::from_payloads(&header, Pid::new(0x100), &[[0xe0u8, 0x7b]]).unwrap();
        assert_matches!(
            Pmt::from_table(&table),
            Err(TableError::NotEnoughData {
                field: "program_map_section",
                ..
            })
        );
    }
}
