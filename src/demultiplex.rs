//! Reassembly of complete tables from the transport stream packets of a set of PIDs.
//!
//! A [`SectionDemux`](struct.SectionDemux.html) is fed every packet of the stream, ignores those
//! on PIDs it has not been asked to watch, and reassembles the sections carried on the others.
//! Once every section of some version of a table has arrived, the table is passed to a
//! [`TableHandler`](trait.TableHandler.html).  Repeated transmissions of a table version that has
//! already been delivered are not passed on again.

use crate::packet::{ContinuityCounter, Packet, Pid};
use crate::psi::{BinaryTable, CurrentNext, Section, SectionCommonHeader, SectionError};
use fixedbitset::FixedBitSet;
use log::{debug, warn};
use std::collections::HashMap;

/// Receives each complete table reassembled by a `SectionDemux`.
pub trait TableHandler {
    /// Called once per newly complete table.  Any changes to the set of PIDs the demux is
    /// watching must be requested through `changes`, and take effect after the current packet.
    fn handle_table(&mut self, changes: &mut FilterChangeset, table: &BinaryTable);
}

// A handler can't change the set of PIDs of the demultiplexer that is calling it, so this
// changeset protocol allows a handler to specify any updates required so the demultiplexer can
// apply them when the handler is complete

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum FilterChange {
    /// start reassembling tables from this PID
    Add(Pid),
    /// stop watching this PID, discarding any state
    Remove(Pid),
    /// forget partially received and already delivered tables of this PID, so that the next
    /// complete transmission of any table on it is delivered again
    Reset(Pid),
}

#[derive(Debug, Default)]
pub struct FilterChangeset {
    updates: Vec<FilterChange>,
}
impl FilterChangeset {
    pub fn add_pid(&mut self, pid: Pid) {
        self.updates.push(FilterChange::Add(pid))
    }
    pub fn remove_pid(&mut self, pid: Pid) {
        self.updates.push(FilterChange::Remove(pid))
    }
    pub fn reset_pid(&mut self, pid: Pid) {
        self.updates.push(FilterChange::Reset(pid))
    }
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = &FilterChange> {
        self.updates.iter()
    }
}

/// Collection state for one `(table_id, table_id_extension)` on a PID.
#[derive(Debug)]
struct TableContext {
    version: u8,
    last_section_number: u8,
    sections: Vec<Option<Section>>,
    delivered: bool,
}

impl TableContext {
    fn new(sect: &Section) -> TableContext {
        TableContext {
            version: sect.version(),
            last_section_number: sect.last_section_number(),
            sections: vec![None; usize::from(sect.last_section_number()) + 1],
            delivered: false,
        }
    }

    /// Adds a section, returning all sections of the table if it is now complete.
    fn add_section(&mut self, sect: Section) -> Option<Vec<Section>> {
        if self.version != sect.version()
            || self.last_section_number != sect.last_section_number()
        {
            *self = TableContext::new(&sect);
        }
        if self.delivered {
            return None;
        }
        let index = usize::from(sect.section_number());
        self.sections[index] = Some(sect);
        if self.sections.iter().all(Option::is_some) {
            self.delivered = true;
            Some(self.sections.drain(..).flatten().collect())
        } else {
            None
        }
    }
}

#[derive(Debug, Default)]
struct PidContext {
    last_cc: Option<ContinuityCounter>,
    partial: Option<Vec<u8>>,
    tables: HashMap<(u8, u16), TableContext>,
}

impl PidContext {
    fn reset(&mut self) {
        self.last_cc = None;
        self.partial = None;
        self.tables.clear();
    }

    /// Appends up to the remainder of the current partial section from `data`, moving the section
    /// to `complete` once whole.  Returns the number of bytes consumed.
    fn append(&mut self, data: &[u8], complete: &mut Vec<Vec<u8>>) -> usize {
        let buf = match self.partial.as_mut() {
            Some(buf) => buf,
            None => return 0,
        };
        let mut consumed = 0;
        if buf.len() < SectionCommonHeader::SIZE {
            let n = (SectionCommonHeader::SIZE - buf.len()).min(data.len());
            buf.extend_from_slice(&data[..n]);
            consumed += n;
            if buf.len() < SectionCommonHeader::SIZE {
                return consumed;
            }
        }
        let header = SectionCommonHeader::new(&buf[..SectionCommonHeader::SIZE]);
        let total = SectionCommonHeader::SIZE + header.section_length;
        if total > Section::MAX_INPUT_SIZE {
            warn!(
                "section_length={} of table_id {:#04x} too large (limit {})",
                header.section_length,
                header.table_id,
                Section::MAX_INPUT_SIZE - SectionCommonHeader::SIZE
            );
            self.partial = None;
            return data.len();
        }
        let n = (total - buf.len()).min(data.len() - consumed);
        buf.extend_from_slice(&data[consumed..consumed + n]);
        consumed += n;
        if buf.len() == total {
            if let Some(buf) = self.partial.take() {
                complete.push(buf);
            }
        }
        consumed
    }

    /// Splits the payload of one packet into sections, returning those completed by it.
    fn consume(&mut self, pk: &Packet<'_>) -> Vec<Vec<u8>> {
        let mut complete = vec![];
        let payload = match pk.payload() {
            Some(p) => p,
            None => return complete,
        };
        let cc = pk.continuity_counter();
        if let Some(last) = self.last_cc {
            if cc == last {
                // duplicate packet
                return complete;
            }
            if !cc.follows(last) {
                if self.partial.is_some() {
                    warn!(
                        "continuity error on {:?} ({} -> {}), discarding partial section",
                        pk.pid(),
                        last.count(),
                        cc.count()
                    );
                }
                self.partial = None;
            }
        }
        self.last_cc = Some(cc);

        if !pk.payload_unit_start_indicator() {
            self.append(payload, &mut complete);
            return complete;
        }
        let pointer = payload[0] as usize;
        let data = &payload[1..];
        if pointer > data.len() {
            warn!("PSI pointer beyond end of packet payload on {:?}", pk.pid());
            self.partial = None;
            return complete;
        }
        if self.partial.is_some() {
            self.append(&data[..pointer], &mut complete);
            if self.partial.take().is_some() {
                warn!("section on {:?} truncated by start of next section", pk.pid());
            }
        }
        let mut rest = &data[pointer..];
        while !rest.is_empty() && rest[0] != 0xff {
            self.partial = Some(Vec::new());
            let consumed = self.append(rest, &mut complete);
            rest = &rest[consumed..];
            if self.partial.is_some() {
                // remainder arrives in later packets
                break;
            }
        }
        complete
    }

    /// Checks a complete section and adds it to its table, returning the table if now complete.
    fn add_section(&mut self, pid: Pid, data: &[u8]) -> Option<BinaryTable> {
        let sect = match Section::from_bytes(data) {
            Ok(s) => s,
            Err(SectionError::NotLongForm { .. }) => return None,
            Err(e) => {
                warn!("discarding section on {:?}: {}", pid, e);
                return None;
            }
        };
        if sect.current_next_indicator() == CurrentNext::Next {
            return None;
        }
        if sect.section_number() > sect.last_section_number() {
            warn!(
                "section_number {} beyond last_section_number {} on {:?}",
                sect.section_number(),
                sect.last_section_number(),
                pid
            );
            return None;
        }
        let key = (sect.table_id(), sect.table_id_extension());
        let sections = match self.tables.get_mut(&key) {
            Some(tc) => tc.add_section(sect),
            None => {
                let mut tc = TableContext::new(&sect);
                let sections = tc.add_section(sect);
                self.tables.insert(key, tc);
                sections
            }
        }?;
        match BinaryTable::new(pid, sections) {
            Ok(table) => Some(table),
            Err(e) => {
                warn!("discarding table on {:?}: {}", pid, e);
                None
            }
        }
    }
}

/// Reassembles tables from the packets of the PIDs it has been asked to watch.
#[derive(Debug)]
pub struct SectionDemux {
    pids: FixedBitSet,
    contexts: HashMap<Pid, PidContext>,
    changes: FilterChangeset,
}

impl Default for SectionDemux {
    fn default() -> SectionDemux {
        SectionDemux {
            pids: FixedBitSet::with_capacity(Pid::PID_COUNT),
            contexts: HashMap::new(),
            changes: FilterChangeset::default(),
        }
    }
}

impl SectionDemux {
    pub fn add_pid(&mut self, pid: Pid) {
        self.pids.insert(usize::from(pid));
        self.contexts.entry(pid).or_default();
    }

    pub fn remove_pid(&mut self, pid: Pid) {
        self.pids.set(usize::from(pid), false);
        self.contexts.remove(&pid);
    }

    /// Forgets all state for the given PID, so the next complete transmission of each of its
    /// tables is delivered again, even if that version was delivered before.
    pub fn reset_pid(&mut self, pid: Pid) {
        if let Some(ctx) = self.contexts.get_mut(&pid) {
            ctx.reset();
        }
    }

    /// Forgets the state of every PID, without changing which PIDs are watched.
    pub fn reset(&mut self) {
        for ctx in self.contexts.values_mut() {
            ctx.reset();
        }
    }

    pub fn has_pid(&self, pid: Pid) -> bool {
        self.pids.contains(usize::from(pid))
    }

    /// Processes one packet, passing any tables it completes to `handler`.
    pub fn feed_packet<H: TableHandler>(&mut self, pk: &Packet<'_>, handler: &mut H) {
        let pid = pk.pid();
        if !self.has_pid(pid) {
            return;
        }
        let ctx = match self.contexts.get_mut(&pid) {
            Some(ctx) => ctx,
            None => return,
        };
        let tables: Vec<BinaryTable> = ctx
            .consume(pk)
            .iter()
            .filter_map(|data| ctx.add_section(pid, data))
            .collect();
        for table in &tables {
            debug!(
                "table id {:#04x}, version {}, PID {}, table id extension {:#06x}",
                table.table_id(),
                table.version(),
                pid,
                table.table_id_extension()
            );
            handler.handle_table(&mut self.changes, table);
        }
        if !self.changes.is_empty() {
            let changes = std::mem::take(&mut self.changes);
            for change in changes.updates {
                match change {
                    FilterChange::Add(pid) => self.add_pid(pid),
                    FilterChange::Remove(pid) => self.remove_pid(pid),
                    FilterChange::Reset(pid) => self.reset_pid(pid),
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::psi::test::{PAT_SECTION, SDT_SECTION};
    use crate::psi::{TableHeader, TID_SDT_ACT};

    fn packet(pid: u16, pusi: bool, cc: u8, payload: &[u8]) -> [u8; Packet::SIZE] {
        let mut buf = [0xffu8; Packet::SIZE];
        buf[0] = Packet::SYNC_BYTE;
        buf[1] = (if pusi { 0x40 } else { 0 }) | (pid >> 8) as u8;
        buf[2] = pid as u8;
        buf[3] = 0x10 | cc;
        buf[4..4 + payload.len()].copy_from_slice(payload);
        buf
    }

    fn with_pointer(sections: &[&[u8]]) -> Vec<u8> {
        let mut v = vec![0];
        for s in sections {
            v.extend_from_slice(s);
        }
        v
    }

    #[derive(Default)]
    struct Recorder {
        tables: Vec<(Pid, u8, u16, u8)>,
        add_on_table: Option<Pid>,
        reset_on_table: Option<Pid>,
    }
    impl TableHandler for Recorder {
        fn handle_table(&mut self, changes: &mut FilterChangeset, table: &BinaryTable) {
            self.tables.push((
                table.source_pid(),
                table.table_id(),
                table.table_id_extension(),
                table.version(),
            ));
            if let Some(pid) = self.add_on_table {
                changes.add_pid(pid);
            }
            if let Some(pid) = self.reset_on_table {
                changes.reset_pid(pid);
            }
        }
    }

    fn sdt_packets(first_cc: u8) -> [[u8; Packet::SIZE]; 2] {
        let first = 183;
        [
            packet(0x11, true, first_cc, &with_pointer(&[&SDT_SECTION[..first]])),
            packet(0x11, false, (first_cc + 1) & 0xf, &SDT_SECTION[first..]),
        ]
    }

    #[test]
    fn unwatched_pid_ignored() {
        let mut demux = SectionDemux::default();
        let mut rec = Recorder::default();
        let pk = packet(0, true, 0, &with_pointer(&[&PAT_SECTION]));
        demux.feed_packet(&Packet::new(&pk), &mut rec);
        assert!(rec.tables.is_empty());
    }

    #[test]
    fn repeated_version_delivered_once() {
        let mut demux = SectionDemux::default();
        demux.add_pid(Pid::PAT);
        let mut rec = Recorder::default();
        for cc in 0..3 {
            let pk = packet(0, true, cc, &with_pointer(&[&PAT_SECTION]));
            demux.feed_packet(&Packet::new(&pk), &mut rec);
        }
        assert_eq!(rec.tables, vec![(Pid::PAT, 0, 1, 0)]);
    }

    #[test]
    fn section_spanning_packets() {
        let mut demux = SectionDemux::default();
        demux.add_pid(Pid::SDT_BAT);
        let mut rec = Recorder::default();
        let [a, b] = sdt_packets(7);
        demux.feed_packet(&Packet::new(&a), &mut rec);
        assert!(rec.tables.is_empty());
        demux.feed_packet(&Packet::new(&b), &mut rec);
        assert_eq!(rec.tables, vec![(Pid::SDT_BAT, TID_SDT_ACT, 0x4084, 20)]);
    }

    #[test]
    fn duplicate_packet_ignored() {
        let mut demux = SectionDemux::default();
        demux.add_pid(Pid::SDT_BAT);
        let mut rec = Recorder::default();
        let [a, b] = sdt_packets(0);
        for pk in [&a, &a, &b, &b] {
            demux.feed_packet(&Packet::new(pk), &mut rec);
        }
        assert_eq!(rec.tables.len(), 1);
    }

    #[test]
    fn discontinuity_drops_partial_section() {
        let mut demux = SectionDemux::default();
        demux.add_pid(Pid::SDT_BAT);
        let mut rec = Recorder::default();
        let [a, _] = sdt_packets(0);
        let [_, b] = sdt_packets(4);
        demux.feed_packet(&Packet::new(&a), &mut rec);
        demux.feed_packet(&Packet::new(&b), &mut rec);
        assert!(rec.tables.is_empty());
    }

    #[test]
    fn several_sections_in_one_packet() {
        let other = Section::build(
            &TableHeader {
                table_id: 0x42,
                table_id_extension: 9,
                version: 1,
                is_current: true,
            },
            0,
            0,
            &[0x23, 0x3a, 0xff],
        )
        .unwrap();
        let mut demux = SectionDemux::default();
        demux.add_pid(Pid::PAT);
        let mut rec = Recorder::default();
        let pk = packet(
            0,
            true,
            0,
            &with_pointer(&[&PAT_SECTION, other.as_bytes()]),
        );
        demux.feed_packet(&Packet::new(&pk), &mut rec);
        assert_eq!(
            rec.tables,
            vec![(Pid::PAT, 0, 1, 0), (Pid::PAT, 0x42, 9, 1)]
        );
    }

    #[test]
    fn multi_section_table_waits_for_all_sections() {
        let header = TableHeader {
            table_id: 0x4a,
            table_id_extension: 3,
            version: 5,
            is_current: true,
        };
        let s0 = Section::build(&header, 0, 1, &[0xf0, 0x00, 0xf0, 0x00]).unwrap();
        let s1 = Section::build(&header, 1, 1, &[0xf0, 0x00, 0xf0, 0x00]).unwrap();
        let mut demux = SectionDemux::default();
        demux.add_pid(Pid::SDT_BAT);
        let mut rec = Recorder::default();
        let p1 = packet(0x11, true, 0, &with_pointer(&[s1.as_bytes()]));
        let p0 = packet(0x11, true, 1, &with_pointer(&[s0.as_bytes()]));
        demux.feed_packet(&Packet::new(&p1), &mut rec);
        assert!(rec.tables.is_empty());
        demux.feed_packet(&Packet::new(&p0), &mut rec);
        assert_eq!(rec.tables, vec![(Pid::SDT_BAT, 0x4a, 3, 5)]);
    }

    #[test]
    fn reset_requests_redelivery() {
        let mut demux = SectionDemux::default();
        demux.add_pid(Pid::PAT);
        let mut rec = Recorder {
            reset_on_table: Some(Pid::PAT),
            ..Recorder::default()
        };
        for cc in 0..3 {
            let pk = packet(0, true, cc, &with_pointer(&[&PAT_SECTION]));
            demux.feed_packet(&Packet::new(&pk), &mut rec);
        }
        assert_eq!(rec.tables.len(), 3);
    }

    #[test]
    fn changes_applied_after_packet() {
        let mut demux = SectionDemux::default();
        demux.add_pid(Pid::PAT);
        let mut rec = Recorder {
            add_on_table: Some(Pid::new(0x1e0)),
            ..Recorder::default()
        };
        assert!(!demux.has_pid(Pid::new(0x1e0)));
        let pk = packet(0, true, 0, &with_pointer(&[&PAT_SECTION]));
        demux.feed_packet(&Packet::new(&pk), &mut rec);
        assert!(demux.has_pid(Pid::new(0x1e0)));
        demux.remove_pid(Pid::new(0x1e0));
        assert!(!demux.has_pid(Pid::new(0x1e0)));
    }

    #[test]
    fn reset_all() {
        let mut demux = SectionDemux::default();
        demux.add_pid(Pid::PAT);
        let mut rec = Recorder::default();
        let pk = packet(0, true, 0, &with_pointer(&[&PAT_SECTION]));
        demux.feed_packet(&Packet::new(&pk), &mut rec);
        demux.reset();
        assert!(demux.has_pid(Pid::PAT));
        demux.feed_packet(&Packet::new(&pk), &mut rec);
        assert_eq!(rec.tables.len(), 2);
    }

    #[test]
    fn corrupt_section_discarded() {
        let mut demux = SectionDemux::default();
        demux.add_pid(Pid::PAT);
        let mut rec = Recorder::default();
        let mut bad = PAT_SECTION;
        bad[10] ^= 0xff;
        let pk = packet(0, true, 0, &with_pointer(&[&bad]));
        demux.feed_packet(&Packet::new(&pk), &mut rec);
        assert!(rec.tables.is_empty());
    }
}
