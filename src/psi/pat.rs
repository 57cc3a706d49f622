//! Types related to the _Program Association Table_

use super::{BinaryTable, TableError, TableHeader, TID_PAT};
use crate::packet::Pid;
use std::collections::BTreeMap;

/// One entry of the program loop of a PAT section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgramDescriptor {
    Network { pid: Pid },
    Program { program_number: u16, pid: Pid },
}

impl ProgramDescriptor {
    pub const SIZE: usize = 4;

    /// panics if fewer than 4 bytes are provided
    pub fn from_bytes(data: &[u8]) -> ProgramDescriptor {
        let program_number = (u16::from(data[0]) << 8) | u16::from(data[1]);
        let pid = Pid::from_masked(u16::from(data[2]) << 8 | u16::from(data[3]));
        if program_number == 0 {
            ProgramDescriptor::Network { pid }
        } else {
            ProgramDescriptor::Program {
                program_number,
                pid,
            }
        }
    }

    pub fn pid(&self) -> Pid {
        match *self {
            ProgramDescriptor::Network { pid } => pid,
            ProgramDescriptor::Program { pid, .. } => pid,
        }
    }
}

/// Iterate over the list of programs in the payload of a PAT section.  Trailing bytes too few to
/// form an entry are ignored.
struct ProgramIter<'buf> {
    buf: &'buf [u8],
}
impl<'buf> Iterator for ProgramIter<'buf> {
    type Item = ProgramDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.len() < ProgramDescriptor::SIZE {
            return None;
        }
        let (head, tail) = self.buf.split_at(ProgramDescriptor::SIZE);
        self.buf = tail;
        Some(ProgramDescriptor::from_bytes(head))
    }
}

/// The _Program Association Table_ lists the programs (services) of a transport stream, giving the
/// PID on which each one's _Program Map Table_ is carried.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pat {
    pub version: u8,
    pub is_current: bool,
    pub ts_id: u16,
    /// PID of the _Network Information Table_, announced through program number `0`.
    pub nit_pid: Option<Pid>,
    /// PMT PID, by program number (service id).
    pub pmts: BTreeMap<u16, Pid>,
}

impl Pat {
    pub fn from_table(table: &BinaryTable) -> Result<Pat, TableError> {
        if table.table_id() != TID_PAT {
            return Err(TableError::UnexpectedTableId(table.table_id()));
        }
        let header = table.header();
        let mut pat = Pat {
            version: header.version,
            is_current: header.is_current,
            ts_id: header.table_id_extension,
            nit_pid: None,
            pmts: BTreeMap::new(),
        };
        for sect in table.sections() {
            for program in (ProgramIter {
                buf: sect.payload(),
            }) {
                match program {
                    ProgramDescriptor::Network { pid } => pat.nit_pid = Some(pid),
                    ProgramDescriptor::Program {
                        program_number,
                        pid,
                    } => {
                        pat.pmts.insert(program_number, pid);
                    }
                }
            }
        }
        Ok(pat)
    }

    pub fn to_table(&self) -> Result<BinaryTable, TableError> {
        let header = TableHeader {
            table_id: TID_PAT,
            table_id_extension: self.ts_id,
            version: self.version,
            is_current: self.is_current,
        };
        let entries: Vec<Vec<u8>> = self
            .nit_pid
            .map(|pid| (0, pid))
            .into_iter()
            .chain(self.pmts.iter().map(|(&id, &pid)| (id, pid)))
            .map(|(program_number, pid)| {
                let mut e = Vec::with_capacity(ProgramDescriptor::SIZE);
                e.extend_from_slice(&program_number.to_be_bytes());
                e.extend_from_slice(&(0xe000 | u16::from(pid)).to_be_bytes());
                e
            })
            .collect();
        let payloads = super::pack_payloads(&[], &[], &entries, |_, _| ());
        BinaryTable::from_payloads(&header, Pid::PAT, &payloads)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::psi::test::PAT_SECTION;
    use crate::psi::Section;
    use assert_matches::assert_matches;

    fn pat_table() -> BinaryTable {
        let sect = Section::from_bytes(&PAT_SECTION[..]).unwrap();
        BinaryTable::new(Pid::PAT, vec![sect]).unwrap()
    }

    #[test]
    fn parse() {
        let pat = Pat::from_table(&pat_table()).unwrap();
        assert_eq!(pat.ts_id, 1);
        assert_eq!(pat.version, 0);
        assert!(pat.is_current);
        assert_eq!(pat.nit_pid, None);
        assert_eq!(pat.pmts.get(&1), Some(&Pid::new(0x1e0)));
    }

    #[test]
    fn reencode_is_identical() {
        let table = pat_table();
        let pat = Pat::from_table(&table).unwrap();
        let encoded = pat.to_table().unwrap();
        assert_eq!(encoded.sections(), table.sections());
    }

    #[test]
    fn network_pid() {
        let mut pat = Pat::from_table(&pat_table()).unwrap();
        pat.nit_pid = Some(Pid::new(0x20));
        pat.pmts.insert(0x1001, Pid::new(0x100));
        let reparsed = Pat::from_table(&pat.to_table().unwrap()).unwrap();
        assert_eq!(reparsed, pat);
    }

    #[test]
    fn wrong_table() {
        let header = TableHeader {
            table_id: 0x42,
            table_id_extension: 1,
            version: 0,
            is_current: true,
        };
        let table = BinaryTable::from_payloads(&header, Pid::SDT_BAT, &[[0u8; 0]]).unwrap();
        assert_matches!(
            Pat::from_table(&table),
            Err(TableError::UnexpectedTableId(0x42))
        );
    }
}
