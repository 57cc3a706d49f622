//! Types for processing tables of *Program Specific Information* (and the DVB *Service
//! Information* tables which share its syntax) in a transport stream.
//!
//! # Concepts
//!
//! * There are multiple standard types of table, like the *Program Association Table* and
//!   *Program Map Table*, plus the DVB *Service Description*, *Network Information* and *Bouquet
//!   Association* tables.
//! * A *Table* can be split into *Sections*
//! * A Section can be split across a small number of individual transport stream *Packets*
//! * All tables handled here use the 'long' section syntax, protected by a CRC-32.
//!
//! # Core types
//!
//! * [`Section`](struct.Section.html) is one complete, CRC-checked section
//! * [`BinaryTable`](struct.BinaryTable.html) is the complete set of sections making up one
//!   version of one table
//!
//! Reassembly of sections from packets, and of tables from sections, is performed by
//! [`SectionDemux`](../demultiplex/struct.SectionDemux.html).  Encoding tables back into packets is
//! performed by [`CyclingPacketizer`](../packetizer/struct.CyclingPacketizer.html).  The specific
//! types of table are defined in the submodules.

pub mod nit;
pub mod pat;
pub mod pmt;
pub mod sdt;

use crate::descriptor::DescriptorError;
use crate::packet::Pid;
use crc::{Crc, CRC_32_MPEG_2};
use std::fmt;

/// table_id of the _Program Association Table_
pub const TID_PAT: u8 = 0x00;
/// table_id of the _Program Map Table_
pub const TID_PMT: u8 = 0x02;
/// table_id of the _Network Information Table_ describing the network carrying this stream
pub const TID_NIT_ACT: u8 = 0x40;
/// table_id of the _Network Information Table_ describing some other network
pub const TID_NIT_OTH: u8 = 0x41;
/// table_id of the _Service Description Table_ describing this transport stream
pub const TID_SDT_ACT: u8 = 0x42;
/// table_id of the _Service Description Table_ describing some other transport stream
pub const TID_SDT_OTH: u8 = 0x46;
/// table_id of the _Bouquet Association Table_
pub const TID_BAT: u8 = 0x4a;

pub(crate) const CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// Problems found in the framing of a single section.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SectionError {
    #[error("section of {actual} bytes is too short, at least {expected} required")]
    TooShort { expected: usize, actual: usize },
    #[error("section_length field gives {declared} bytes, but {actual} are present")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("section with table_id {table_id:#04x} does not use the long section syntax")]
    NotLongForm { table_id: u8 },
    #[error("CRC check failed for section with table_id {table_id:#04x}")]
    CrcMismatch { table_id: u8 },
    #[error("section payload of {len} bytes exceeds the limit of {limit}")]
    PayloadTooLarge { len: usize, limit: usize },
}

/// Problems found while assembling or interpreting a complete table.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    #[error("table has no sections")]
    Empty,
    #[error("section at index {index} does not belong to this table")]
    InconsistentSection { index: usize },
    #[error("unexpected table_id {0:#04x}")]
    UnexpectedTableId(u8),
    #[error("{field} needs {expected} bytes, but only {actual} remain")]
    NotEnoughData {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("table content does not fit in 256 sections")]
    TooManySections,
    #[error(transparent)]
    Section(#[from] SectionError),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CurrentNext {
    Current,
    Next,
}

impl CurrentNext {
    fn from(v: u8) -> CurrentNext {
        if v & 1 == 0 {
            CurrentNext::Next
        } else {
            CurrentNext::Current
        }
    }
}

/// The fields common to the first 3 bytes of every section.
#[derive(Debug)]
pub struct SectionCommonHeader {
    pub table_id: u8,
    pub section_syntax_indicator: bool,
    pub private_indicator: bool,
    pub section_length: usize,
}

impl SectionCommonHeader {
    pub const SIZE: usize = 3;

    /// Panics if the given slice is not exactly `SectionCommonHeader::SIZE` bytes long.
    pub fn new(buf: &[u8]) -> SectionCommonHeader {
        assert_eq!(buf.len(), Self::SIZE);
        SectionCommonHeader {
            table_id: buf[0],
            section_syntax_indicator: buf[1] & 0b1000_0000 != 0,
            private_indicator: buf[1] & 0b0100_0000 != 0,
            section_length: ((u16::from(buf[1] & 0b0000_1111) << 8) | u16::from(buf[2])) as usize,
        }
    }
}

#[derive(Debug)]
/// Represents the fields that appear within table sections that use the common 'section syntax'.
pub struct TableSyntaxHeader<'buf> {
    buf: &'buf [u8],
}

impl<'buf> TableSyntaxHeader<'buf> {
    pub const SIZE: usize = 5;

    /// Panics if fewer than `TableSyntaxHeader::SIZE` bytes are given.
    pub fn new(buf: &'buf [u8]) -> TableSyntaxHeader<'buf> {
        assert!(buf.len() >= Self::SIZE);
        TableSyntaxHeader { buf }
    }
    /// The initial 16-bit field within a 'section syntax' table (which immediately follows the
    /// `section_length` field).  Referred to as,
    ///  - `transport_stream_id` within a Program Association Section or Service Description
    ///    Section
    ///  - `program_number` within a Program Map Section
    ///  - `network_id` within a Network Information Section
    ///  - `bouquet_id` within a Bouquet Association Section
    pub fn id(&self) -> u16 {
        u16::from(self.buf[0]) << 8 | u16::from(self.buf[1])
    }
    /// A 5-bit value that can be used to quickly check if this table has changed since the last
    /// time it was periodically inserted within the transport stream being read.
    pub fn version(&self) -> u8 {
        (self.buf[2] >> 1) & 0b0001_1111
    }
    /// Is this table applicable now, or will it become applicable at some future time.
    pub fn current_next_indicator(&self) -> CurrentNext {
        CurrentNext::from(self.buf[2])
    }
    /// The number of this section, within a potentially multi-section table.
    pub fn section_number(&self) -> u8 {
        self.buf[3]
    }
    /// Indicates the value of `section_number()` that will appear within the last section within
    /// a table.
    pub fn last_section_number(&self) -> u8 {
        self.buf[4]
    }
}

/// The identity of one version of a table, shared by all of its sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableHeader {
    pub table_id: u8,
    pub table_id_extension: u16,
    pub version: u8,
    pub is_current: bool,
}

/// One complete section using the long section syntax, including its trailing CRC.
#[derive(Clone, PartialEq, Eq)]
pub struct Section {
    data: Vec<u8>,
}

impl Section {
    const CRC_SIZE: usize = 4;
    const OVERHEAD: usize = SectionCommonHeader::SIZE + TableSyntaxHeader::SIZE + Self::CRC_SIZE;

    /// Largest section we will produce; the limit for PSI tables, and the usual limit for SI.
    pub const MAX_SIZE: usize = 1024;
    /// Largest section accepted on input (`section_length` of 4093, as allowed for private
    /// sections).
    pub const MAX_INPUT_SIZE: usize = 4096;
    /// Largest table payload that can be placed in one produced section.
    pub const MAX_PAYLOAD_SIZE: usize = Self::MAX_SIZE - Self::OVERHEAD;

    /// Checks the framing and CRC of the given section bytes, and takes a copy.
    pub fn from_bytes(data: &[u8]) -> Result<Section, SectionError> {
        if data.len() < SectionCommonHeader::SIZE {
            return Err(SectionError::TooShort {
                expected: SectionCommonHeader::SIZE,
                actual: data.len(),
            });
        }
        let header = SectionCommonHeader::new(&data[..SectionCommonHeader::SIZE]);
        if !header.section_syntax_indicator {
            return Err(SectionError::NotLongForm {
                table_id: header.table_id,
            });
        }
        if SectionCommonHeader::SIZE + header.section_length != data.len() {
            return Err(SectionError::LengthMismatch {
                declared: header.section_length,
                actual: data.len() - SectionCommonHeader::SIZE,
            });
        }
        if data.len() < Self::OVERHEAD {
            return Err(SectionError::TooShort {
                expected: Self::OVERHEAD,
                actual: data.len(),
            });
        }
        // don't apply CRC checks when fuzzing, to give more chances of test data triggering
        // parser bugs,
        if !cfg!(fuzz) && CRC.checksum(data) != 0 {
            return Err(SectionError::CrcMismatch {
                table_id: header.table_id,
            });
        }
        Ok(Section {
            data: data.to_vec(),
        })
    }

    /// Serialises a new section carrying the given payload, computing `section_length` and the
    /// CRC.
    pub fn build(
        header: &TableHeader,
        section_number: u8,
        last_section_number: u8,
        payload: &[u8],
    ) -> Result<Section, SectionError> {
        if payload.len() > Self::MAX_PAYLOAD_SIZE {
            return Err(SectionError::PayloadTooLarge {
                len: payload.len(),
                limit: Self::MAX_PAYLOAD_SIZE,
            });
        }
        let section_length = TableSyntaxHeader::SIZE + payload.len() + Self::CRC_SIZE;
        // DVB SI tables set the bit following section_syntax_indicator ('reserved_future_use')
        let private = if header.table_id >= TID_NIT_ACT {
            0b0100_0000
        } else {
            0
        };
        let mut data = Vec::with_capacity(SectionCommonHeader::SIZE + section_length);
        data.push(header.table_id);
        data.push(0b1011_0000 | private | (section_length >> 8) as u8);
        data.push(section_length as u8);
        data.extend_from_slice(&header.table_id_extension.to_be_bytes());
        data.push(0b1100_0000 | (header.version & 0b1_1111) << 1 | u8::from(header.is_current));
        data.push(section_number);
        data.push(last_section_number);
        data.extend_from_slice(payload);
        let crc = CRC.checksum(&data);
        data.extend_from_slice(&crc.to_be_bytes());
        Ok(Section { data })
    }

    fn syntax_header(&self) -> TableSyntaxHeader<'_> {
        TableSyntaxHeader::new(&self.data[SectionCommonHeader::SIZE..])
    }

    pub fn table_id(&self) -> u8 {
        self.data[0]
    }
    pub fn table_id_extension(&self) -> u16 {
        self.syntax_header().id()
    }
    pub fn version(&self) -> u8 {
        self.syntax_header().version()
    }
    pub fn current_next_indicator(&self) -> CurrentNext {
        self.syntax_header().current_next_indicator()
    }
    pub fn section_number(&self) -> u8 {
        self.syntax_header().section_number()
    }
    pub fn last_section_number(&self) -> u8 {
        self.syntax_header().last_section_number()
    }
    pub fn header(&self) -> TableHeader {
        TableHeader {
            table_id: self.table_id(),
            table_id_extension: self.table_id_extension(),
            version: self.version(),
            is_current: self.current_next_indicator() == CurrentNext::Current,
        }
    }

    /// The table-specific data following the syntax header, excluding the CRC.
    pub fn payload(&self) -> &[u8] {
        &self.data[SectionCommonHeader::SIZE + TableSyntaxHeader::SIZE
            ..self.data.len() - Self::CRC_SIZE]
    }

    /// The complete encoded section, from `table_id` to CRC inclusive.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("Section")
            .field("table_id", &format_args!("{:#04x}", self.table_id()))
            .field("table_id_extension", &self.table_id_extension())
            .field("version", &self.version())
            .field("section_number", &self.section_number())
            .field("last_section_number", &self.last_section_number())
            .field("len", &self.len())
            .finish()
    }
}

/// All sections of one version of one table, as received on (or destined for) a particular PID.
#[derive(Clone, Debug)]
pub struct BinaryTable {
    source_pid: Pid,
    sections: Vec<Section>,
}

impl BinaryTable {
    /// Checks that the given sections form one complete table: same identity, section numbers
    /// `0..=last_section_number` in order.
    pub fn new(source_pid: Pid, sections: Vec<Section>) -> Result<BinaryTable, TableError> {
        let first = sections.first().ok_or(TableError::Empty)?;
        let header = first.header();
        let last = first.last_section_number();
        if usize::from(last) + 1 != sections.len() {
            return Err(TableError::InconsistentSection {
                index: sections.len().min(usize::from(last) + 1),
            });
        }
        for (index, sect) in sections.iter().enumerate() {
            if sect.header() != header
                || usize::from(sect.section_number()) != index
                || sect.last_section_number() != last
            {
                return Err(TableError::InconsistentSection { index });
            }
        }
        Ok(BinaryTable {
            source_pid,
            sections,
        })
    }

    /// Builds a table holding one section per given payload.
    pub fn from_payloads<P: AsRef<[u8]>>(
        header: &TableHeader,
        source_pid: Pid,
        payloads: &[P],
    ) -> Result<BinaryTable, TableError> {
        if payloads.is_empty() {
            return Err(TableError::Empty);
        }
        let last = u8::try_from(payloads.len() - 1).map_err(|_| TableError::TooManySections)?;
        let sections = payloads
            .iter()
            .enumerate()
            .map(|(i, p)| Section::build(header, i as u8, last, p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(BinaryTable {
            source_pid,
            sections,
        })
    }

    pub fn source_pid(&self) -> Pid {
        self.source_pid
    }
    pub fn header(&self) -> TableHeader {
        self.sections[0].header()
    }
    pub fn table_id(&self) -> u8 {
        self.sections[0].table_id()
    }
    pub fn table_id_extension(&self) -> u16 {
        self.sections[0].table_id_extension()
    }
    pub fn version(&self) -> u8 {
        self.sections[0].version()
    }
    pub fn sections(&self) -> &[Section] {
        &self.sections[..]
    }
    pub fn into_sections(self) -> Vec<Section> {
        self.sections
    }
}

/// Splits `len` bytes off the front of `buf`, or reports which field could not be read.
pub(crate) fn take<'a>(
    buf: &mut &'a [u8],
    len: usize,
    field: &'static str,
) -> Result<&'a [u8], TableError> {
    if buf.len() < len {
        return Err(TableError::NotEnoughData {
            field,
            expected: len,
            actual: buf.len(),
        });
    }
    let (head, tail) = buf.split_at(len);
    *buf = tail;
    Ok(head)
}

pub(crate) fn u16_at(buf: &[u8]) -> u16 {
    u16::from(buf[0]) << 8 | u16::from(buf[1])
}

/// Reads a 12-bit length field (behind 4 reserved bits) followed by that many bytes.
pub(crate) fn take_length_prefixed<'a>(
    buf: &mut &'a [u8],
    field: &'static str,
) -> Result<&'a [u8], TableError> {
    let len = usize::from(u16_at(take(buf, 2, field)?) & 0x0fff);
    take(buf, len, field)
}

/// Greedily packs items, each already encoded, into section payloads of at most
/// `Section::MAX_PAYLOAD_SIZE` bytes.  The first payload starts with `first_prefix`, every later
/// one with `next_prefix`.  A first prefix longer than `next_prefix` is sent alone rather than
/// overflowing with an item that would fit after the shorter prefix.
///
/// `finish` is called on each completed payload, along with the length of its prefix, to patch
/// any loop-length field covering the items.
pub(crate) fn pack_payloads<F>(
    first_prefix: &[u8],
    next_prefix: &[u8],
    items: &[Vec<u8>],
    finish: F,
) -> Vec<Vec<u8>>
where
    F: Fn(&mut Vec<u8>, usize),
{
    let mut payloads = vec![];
    let mut current = first_prefix.to_vec();
    let mut prefix_len = first_prefix.len();
    let mut items_in_current = 0;
    for item in items {
        let can_split = items_in_current > 0 || prefix_len > next_prefix.len();
        if can_split && current.len() + item.len() > Section::MAX_PAYLOAD_SIZE {
            finish(&mut current, prefix_len);
            payloads.push(std::mem::replace(&mut current, next_prefix.to_vec()));
            prefix_len = next_prefix.len();
            items_in_current = 0;
        }
        current.extend_from_slice(item);
        items_in_current += 1;
    }
    finish(&mut current, prefix_len);
    payloads.push(current);
    payloads
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use assert_matches::assert_matches;
    use hex_literal::hex;

    /// A _Service Description Table_ section captured from a UK DVB-T multiplex, long enough to
    /// span two TS packets.
    pub(crate) const SDT_SECTION: [u8; 307] = hex!(
        "
        42f13040 84e90000 233aff44 40ff8026
        480d1900 0a424243 2054574f 20484473
        0c66702e 6262632e 636f2e75 6b5f0400
        00233a7e 01f744c4 ff802148 09190006
        49545620 4844730b 7777772e 6974762e
        636f6d5f 04000023 3a7e01f7 4500ff80
        2c480f19 000c4368 616e6e65 6c203420
        48447310 7777772e 6368616e 6e656c34
        2e636f6d 5f040000 233a7e01 f74484ff
        8026480d 19000a42 4243204f 4e452048
        44730c66 702e6262 632e636f 2e756b5f
        04000023 3a7e01f7 46c0ff80 23480a19
        00074342 42432048 44730c66 702e6262
        632e636f 2e756b5f 04000023 3a7e01f7
        4f80ff80 1e480a16 00074669 6c6d342b
        31731077 77772e63 68616e6e 656c342e
        636f6d45 40ff8027 480f1900 0c436861
        6e6e656c 20352048 44730b77 77772e66
        6976652e 74765f04 0000233a 7e01f7f2
        8b26c4"
    );

    /// A single-program _Program Association Table_ section
    pub(crate) const PAT_SECTION: [u8; 16] = hex!("00B00D0001C100000001E1E02D507804");

    #[test]
    fn parse_sdt_section() {
        let sect = Section::from_bytes(&SDT_SECTION[..]).unwrap();
        assert_eq!(sect.table_id(), TID_SDT_ACT);
        assert_eq!(sect.table_id_extension(), 0x4084);
        assert_eq!(sect.version(), 20);
        assert_eq!(sect.current_next_indicator(), CurrentNext::Current);
        assert_eq!(sect.section_number(), 0);
        assert_eq!(sect.last_section_number(), 0);
        assert_eq!(sect.payload().len(), 307 - 12);
    }

    #[test]
    fn crc_mismatch() {
        let mut data = PAT_SECTION;
        data[9] ^= 1;
        assert_matches!(
            Section::from_bytes(&data[..]),
            Err(SectionError::CrcMismatch { table_id: 0 })
        );
    }

    #[test]
    fn length_mismatch() {
        assert_matches!(
            Section::from_bytes(&PAT_SECTION[..15]),
            Err(SectionError::LengthMismatch {
                declared: 13,
                actual: 12
            })
        );
    }

    #[test]
    fn short_form_rejected() {
        assert_matches!(
            Section::from_bytes(&hex!("70 70 05 ff ff ff ff ff")[..]),
            Err(SectionError::NotLongForm { table_id: 0x70 })
        );
    }

    #[test]
    fn build_reproduces_received_section() {
        let received = Section::from_bytes(&PAT_SECTION[..]).unwrap();
        let built = Section::build(&received.header(), 0, 0, received.payload()).unwrap();
        assert_eq!(built.as_bytes(), &PAT_SECTION[..]);
    }

    #[test]
    fn build_sets_dvb_reserved_bit() {
        let header = TableHeader {
            table_id: TID_BAT,
            table_id_extension: 0x1234,
            version: 3,
            is_current: true,
        };
        let sect = Section::build(&header, 0, 0, &[0xf0, 0x00]).unwrap();
        assert_eq!(sect.as_bytes()[1] & 0b1100_0000, 0b1100_0000);
        let reparsed = Section::from_bytes(sect.as_bytes()).unwrap();
        assert_eq!(reparsed.header(), header);
        assert_eq!(reparsed.payload(), &[0xf0, 0x00]);
    }

    #[test]
    fn payload_too_large() {
        let header = Section::from_bytes(&PAT_SECTION[..]).unwrap().header();
        let payload = vec![0u8; Section::MAX_PAYLOAD_SIZE + 1];
        assert_matches!(
            Section::build(&header, 0, 0, &payload),
            Err(SectionError::PayloadTooLarge { .. })
        );
    }

    #[test]
    fn table_requires_every_section() {
        let header = Section::from_bytes(&PAT_SECTION[..]).unwrap().header();
        let s0 = Section::build(&header, 0, 1, &[]).unwrap();
        assert_matches!(
            BinaryTable::new(Pid::PAT, vec![s0.clone()]),
            Err(TableError::InconsistentSection { index: 1 })
        );
        let s1 = Section::build(&header, 1, 1, &[]).unwrap();
        assert_matches!(
            BinaryTable::new(Pid::PAT, vec![s1.clone(), s0.clone()]),
            Err(TableError::InconsistentSection { index: 0 })
        );
        let table = BinaryTable::new(Pid::PAT, vec![s0, s1]).unwrap();
        assert_eq!(table.sections().len(), 2);
    }

    #[test]
    fn packing_splits_items() {
        let items = vec![vec![1u8; 600], vec![2u8; 600], vec![3u8; 10]];
        let payloads = pack_payloads(&[0xaa, 0xaa], &[0xcc], &items, |p, prefix_len| {
            p[prefix_len - 1] = 0xbb
        });
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0].len(), 2 + 600);
        assert_eq!(payloads[0][..3], [0xaa, 0xbb, 1]);
        assert_eq!(payloads[1].len(), 1 + 610);
        assert_eq!(payloads[1][..2], [0xbb, 2]);
    }

    #[test]
    fn packing_moves_item_past_long_first_prefix() {
        let items = vec![vec![1u8; 300]];
        let payloads = pack_payloads(&[0xaa; 900], &[0xcc], &items, |_, _| ());
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0], vec![0xaa; 900]);
        assert_eq!(payloads[1].len(), 1 + 300);
        assert_eq!(payloads[1][0], 0xcc);
    }
}
