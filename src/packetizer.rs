//! Continuous re-emission of a set of tables into the packets of one PID.

use crate::packet::{ContinuityCounter, Packet, Pid, NULL_PACKET};
use crate::psi::{BinaryTable, Section};
use std::rc::Rc;

#[derive(Debug)]
struct CachedTable {
    table_id: u8,
    table_id_extension: u16,
    sections: Vec<Rc<Section>>,
}

/// A section partly written into previous packets.
#[derive(Debug)]
struct InFlight {
    section: Rc<Section>,
    offset: usize,
}

/// Holds the latest encoding of each of a number of tables, and produces packets carrying their
/// sections in turn, starting again from the first table once the last has been sent.
///
/// Each section starts in a new packet.  A section that has begun to be sent is always completed
/// from the same bytes, even if its table is replaced in the meantime, so that no packet sequence
/// mixes two versions of a table.
#[derive(Debug)]
pub struct CyclingPacketizer {
    pid: Pid,
    tables: Vec<CachedTable>,
    /// Position within `tables` of the next table to send
    next_table: usize,
    /// Index of the next section to send within that table
    next_section: usize,
    current: Option<InFlight>,
    cc: ContinuityCounter,
}

impl CyclingPacketizer {
    const HEADER_SIZE: usize = 4;

    pub fn new(pid: Pid) -> CyclingPacketizer {
        CyclingPacketizer {
            pid,
            tables: vec![],
            next_table: 0,
            next_section: 0,
            current: None,
            cc: ContinuityCounter::default(),
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Changes the PID of subsequent packets, abandoning any partly sent section.
    pub fn set_pid(&mut self, pid: Pid) {
        if pid != self.pid {
            self.pid = pid;
            self.current = None;
        }
    }

    /// Discards every cached table.
    pub fn reset(&mut self) {
        self.tables.clear();
        self.next_table = 0;
        self.next_section = 0;
        self.current = None;
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Number of sections in one complete cycle.
    pub fn section_count(&self) -> usize {
        self.tables.iter().map(|t| t.sections.len()).sum()
    }

    /// Stops sending the given table, if it is cached.  The cycle carries on from the table that
    /// followed it.
    pub fn remove_table(&mut self, table_id: u8, table_id_extension: u16) {
        let pos = self
            .tables
            .iter()
            .position(|t| t.table_id == table_id && t.table_id_extension == table_id_extension);
        if let Some(i) = pos {
            self.tables.remove(i);
            if i < self.next_table {
                self.next_table -= 1;
            } else if i == self.next_table {
                self.next_section = 0;
            }
        }
    }

    /// Caches the given table, replacing any table with the same `table_id` and
    /// `table_id_extension` in the same position of the cycle.
    pub fn add_table(&mut self, table: &BinaryTable) {
        let cached = CachedTable {
            table_id: table.table_id(),
            table_id_extension: table.table_id_extension(),
            sections: table.sections().iter().cloned().map(Rc::new).collect(),
        };
        match self.tables.iter_mut().find(|t| {
            t.table_id == cached.table_id && t.table_id_extension == cached.table_id_extension
        }) {
            Some(existing) => *existing = cached,
            None => self.tables.push(cached),
        }
    }

    fn next_section(&mut self) -> Option<Rc<Section>> {
        if self.tables.is_empty() {
            return None;
        }
        if self.next_table >= self.tables.len() {
            self.next_table = 0;
            self.next_section = 0;
        }
        // a replacement may have fewer sections than the table it replaced
        if self.next_section >= self.tables[self.next_table].sections.len() {
            self.next_table = (self.next_table + 1) % self.tables.len();
            self.next_section = 0;
        }
        let sections = &self.tables[self.next_table].sections;
        let section = sections.get(self.next_section).cloned();
        self.next_section += 1;
        if self.next_section >= sections.len() {
            self.next_table = (self.next_table + 1) % self.tables.len();
            self.next_section = 0;
        }
        section
    }

    /// Produces the next packet of the cycle, or a null packet if no table is cached.
    pub fn next_packet(&mut self) -> [u8; Packet::SIZE] {
        let (section, offset) = match self.current.take() {
            Some(InFlight { section, offset }) => (section, offset),
            None => match self.next_section() {
                Some(section) => (section, 0),
                None => return NULL_PACKET,
            },
        };
        let start = offset == 0;
        let pid = u16::from(self.pid);
        let mut pk = [0xffu8; Packet::SIZE];
        pk[0] = Packet::SYNC_BYTE;
        pk[1] = (if start { 0b0100_0000 } else { 0 }) | (pid >> 8) as u8;
        pk[2] = pid as u8;
        pk[3] = 0b0001_0000 | self.cc.count();
        self.cc = self.cc.next();

        let mut pos = Self::HEADER_SIZE;
        if start {
            // pointer_field
            pk[pos] = 0;
            pos += 1;
        }
        let data = section.as_bytes();
        let n = (data.len() - offset).min(Packet::SIZE - pos);
        pk[pos..pos + n].copy_from_slice(&data[offset..offset + n]);
        if offset + n < data.len() {
            self.current = Some(InFlight {
                section,
                offset: offset + n,
            });
        }
        pk
    }
}
