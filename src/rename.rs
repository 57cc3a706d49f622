//! The service renaming engine.
//!
//! A [`ServiceRenamer`](struct.ServiceRenamer.html) is given every packet of a transport stream in
//! turn.  It collects the PAT, the PMT of the service being renamed, the SDT and BAT, and the NIT,
//! rewrites them to give the service its new identity, and substitutes packets carrying the
//! rewritten tables for those carrying the originals.  All other packets pass through unchanged.

use crate::demultiplex::{FilterChangeset, SectionDemux, TableHandler};
use crate::packet::{Packet, Pid, NULL_PACKET};
use crate::packetizer::CyclingPacketizer;
use crate::psi::nit::TransportListTable;
use crate::psi::pat::Pat;
use crate::psi::pmt::Pmt;
use crate::psi::sdt::Sdt;
use crate::psi::{
    BinaryTable, TableError, TID_BAT, TID_NIT_ACT, TID_NIT_OTH, TID_PAT, TID_PMT, TID_SDT_ACT,
    TID_SDT_OTH,
};
use crate::rewrite::DescriptorRewriter;
use crate::service::{Resolution, Service, ServiceResolver};
use log::{debug, error, info, warn};

/// Conditions which stop the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenameError {
    #[error("no service specified, either an id or a name is required")]
    NoService,
    #[error("service \"{name}\" not found in SDT")]
    ServiceNameNotFound { name: String },
    #[error("service id {id:#06x} not found in PAT")]
    ServiceIdNotFound { id: u16 },
}

#[derive(Debug, Clone, Default)]
pub struct RenameOptions {
    /// The service to rename, designated by id or by name
    pub old: Service,
    /// New values for the service; absent properties are left as they are
    pub new: Service,
    /// Leave the BAT unmodified
    pub ignore_bat: bool,
    /// Leave the NIT unmodified
    pub ignore_nit: bool,
}

/// What became of a packet given to `ServiceRenamer::process_packet()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The packet is unchanged
    Pass,
    /// The packet was overwritten with one carrying a rewritten table
    Replace,
    /// The packet was overwritten with a null packet
    Null,
    /// Renaming failed; no more packets should be output
    End,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// No PAT has been processed yet, so every packet is nulled
    WaitingForPat,
    /// Rewritten tables are being emitted
    Ready,
    Aborted(RenameError),
}

/// Rewrites each table delivered by the demultiplexer, and holds the resulting tables ready for
/// output.
#[derive(Debug)]
struct TableRewriter {
    resolver: ServiceResolver,
    ignore_bat: bool,
    ignore_nit: bool,
    phase: Phase,
    ts_id: Option<u16>,
    pat_out: CyclingPacketizer,
    pmt_out: CyclingPacketizer,
    sdt_bat_out: CyclingPacketizer,
    nit_out: CyclingPacketizer,
}

impl TableRewriter {
    fn abort(&mut self, err: RenameError) {
        error!("{}", err);
        self.phase = Phase::Aborted(err);
    }

    fn process_pat(
        &mut self,
        changes: &mut FilterChangeset,
        table: &BinaryTable,
    ) -> Result<(), TableError> {
        // the PAT is only watched once the service id is known
        let old_id = match self.resolver.old_id() {
            Some(id) => id,
            None => return Ok(()),
        };
        let mut pat = Pat::from_table(table)?;
        self.ts_id = Some(pat.ts_id);
        match pat.pmts.get(&old_id).copied() {
            None if self.ignore_bat && self.ignore_nit => {
                self.abort(RenameError::ServiceIdNotFound { id: old_id });
                return Ok(());
            }
            None => info!(
                "service id {:#06x} not found in PAT, will still update NIT and/or BAT",
                old_id
            ),
            Some(pmt_pid) => {
                self.resolver.set_pmt_pid(pmt_pid);
                self.pmt_out.set_pid(pmt_pid);
                changes.add_pid(pmt_pid);
                info!("found service id {:#06x}, PMT PID is {}", old_id, pmt_pid);
                if let Some(new_id) = self.resolver.changed_id() {
                    pat.pmts.remove(&old_id);
                    pat.pmts.insert(new_id, pmt_pid);
                }
            }
        }
        let out = pat.to_table()?;
        self.pat_out.reset();
        self.pat_out.add_table(&out);
        self.phase = Phase::Ready;

        // with the ts_id known, the NIT can now be processed
        if !self.ignore_nit {
            let nit_pid = pat.nit_pid.unwrap_or(Pid::NIT);
            self.nit_out.set_pid(nit_pid);
            changes.add_pid(nit_pid);
        }
        Ok(())
    }

    fn process_pmt(&mut self, table: &BinaryTable) -> Result<(), TableError> {
        let old_id = match self.resolver.old_id() {
            Some(id) if id == table.table_id_extension() => id,
            _ => return Ok(()),
        };
        let mut pmt = Pmt::from_table(table)?;
        let new_id = self.resolver.new_service().id;
        if let Some(id) = new_id {
            pmt.service_id = id;
        }
        let out = pmt.to_table(self.pmt_out.pid())?;
        self.pmt_out.remove_table(TID_PMT, old_id);
        if let Some(id) = new_id {
            self.pmt_out.remove_table(TID_PMT, id);
        }
        self.pmt_out.add_table(&out);
        Ok(())
    }

    fn process_sdt(
        &mut self,
        changes: &mut FilterChangeset,
        table: &BinaryTable,
    ) -> Result<(), TableError> {
        let mut sdt = Sdt::from_table(table)?;
        self.ts_id = Some(sdt.ts_id);
        let resolution = self.resolver.resolution();
        let found = match self.resolver.locate(&sdt) {
            Ok(found) => found,
            Err(e) => {
                self.abort(e);
                return Ok(());
            }
        };
        match found {
            Some(id) => {
                if resolution == Resolution::NameOnly {
                    // the service id is now known, so the PAT can be processed
                    changes.add_pid(Pid::PAT);
                }
                self.update_sdt(&mut sdt, id)?;
            }
            None => {
                if let Some(id) = self.resolver.old_id() {
                    info!("service {} ({:#06x}) not found in SDT", id, id);
                }
            }
        }
        let out = sdt.to_table()?;
        self.sdt_bat_out.add_table(&out);
        Ok(())
    }

    fn update_sdt(&self, sdt: &mut Sdt, id: u16) -> Result<(), TableError> {
        let new = self.resolver.new_service();
        if let Some(svc) = sdt.services.get_mut(&id) {
            if let Some(ref name) = new.name {
                svc.set_name(name)?;
            }
            if let Some(service_type) = new.service_type {
                svc.set_type(service_type)?;
            }
            if let Some(ca_controlled) = new.ca_controlled {
                svc.ca_controlled = ca_controlled;
            }
            if let Some(running_status) = new.running_status {
                svc.running_status = running_status;
            }
        }
        if let Some(new_id) = self.resolver.changed_id() {
            if let Some(svc) = sdt.services.remove(&id) {
                sdt.services.insert(new_id, svc);
            }
        }
        Ok(())
    }

    fn process_bat(
        &mut self,
        changes: &mut FilterChangeset,
        table: &BinaryTable,
    ) -> Result<(), TableError> {
        if self.resolver.resolution() == Resolution::NameOnly {
            // The BAT shares its PID with the SDT, and has arrived before the SDT that will give
            // the service id.  Have the demux deliver this BAT again next time.
            changes.reset_pid(table.source_pid());
            return Ok(());
        }
        if self.ignore_bat {
            self.sdt_bat_out.add_table(table);
            return Ok(());
        }
        let mut bat = TransportListTable::from_table(table)?;
        self.rewrite_transports(&mut bat);
        let out = bat.to_table(Pid::SDT_BAT)?;
        self.sdt_bat_out.add_table(&out);
        Ok(())
    }

    fn process_nit(&mut self, table: &BinaryTable) -> Result<(), TableError> {
        if self.ignore_nit {
            self.nit_out.add_table(table);
            return Ok(());
        }
        let mut nit = TransportListTable::from_table(table)?;
        self.rewrite_transports(&mut nit);
        let out = nit.to_table(self.nit_out.pid())?;
        self.nit_out.add_table(&out);
        Ok(())
    }

    /// Updates the descriptors of the entry for this transport stream.
    fn rewrite_transports(&self, list: &mut TransportListTable) {
        let (ts_id, old_id) = match (self.ts_id, self.resolver.old_id()) {
            (Some(ts_id), Some(old_id)) => (ts_id, old_id),
            _ => return,
        };
        let new = self.resolver.new_service();
        let rewriter = DescriptorRewriter {
            old_id,
            new_id: new.id,
            new_type: new.service_type,
            new_lcn: new.lcn,
        };
        for (id, ts) in list.transports.iter_mut() {
            if id.transport_stream_id == ts_id {
                let count = rewriter.rewrite(&mut ts.descs);
                debug!(
                    "rewrote {} entries for ts_id {:#06x} in table id {:#04x}, id {:#06x}",
                    count, ts_id, list.table_id, list.list_id
                );
            }
        }
    }

    /// The packetizer to carry a table of the given kind which could not be rewritten.
    fn passthrough_for(&mut self, table_id: u8) -> Option<&mut CyclingPacketizer> {
        match table_id {
            TID_PAT => Some(&mut self.pat_out),
            TID_PMT => Some(&mut self.pmt_out),
            TID_SDT_ACT | TID_BAT => Some(&mut self.sdt_bat_out),
            TID_NIT_ACT => Some(&mut self.nit_out),
            _ => None,
        }
    }

    /// The packetizer whose output replaces packets of the given PID, if any.
    fn packetizer_for(&mut self, pid: Pid) -> Option<&mut CyclingPacketizer> {
        if pid == Pid::PAT {
            Some(&mut self.pat_out)
        } else if pid == Pid::SDT_BAT {
            Some(&mut self.sdt_bat_out)
        } else if Some(pid) == self.resolver.pmt_pid() {
            Some(&mut self.pmt_out)
        } else if !self.ignore_nit && pid != Pid::STUFFING && pid == self.nit_out.pid() {
            Some(&mut self.nit_out)
        } else {
            None
        }
    }
}

impl TableHandler for TableRewriter {
    fn handle_table(&mut self, changes: &mut FilterChangeset, table: &BinaryTable) {
        if let Phase::Aborted(_) = self.phase {
            return;
        }
        let pid = table.source_pid();
        let result = match table.table_id() {
            TID_PAT if pid == Pid::PAT => self.process_pat(changes, table),
            TID_PMT => self.process_pmt(table),
            TID_SDT_ACT if pid == Pid::SDT_BAT => self.process_sdt(changes, table),
            TID_SDT_OTH if pid == Pid::SDT_BAT => {
                self.sdt_bat_out.add_table(table);
                Ok(())
            }
            TID_BAT if pid == Pid::SDT_BAT => self.process_bat(changes, table),
            TID_NIT_ACT => self.process_nit(table),
            TID_NIT_OTH => {
                self.nit_out.add_table(table);
                Ok(())
            }
            _ => Ok(()),
        };
        if let Err(e) = result {
            warn!(
                "could not rewrite table id {:#04x} on PID {}, sending it unmodified: {}",
                table.table_id(),
                pid,
                e
            );
            if let Some(out) = self.passthrough_for(table.table_id()) {
                out.add_table(table);
            }
        }
    }
}

/// Renames one service of a transport stream.
///
/// Every packet of the stream must be passed to `process_packet()`, which may overwrite it.  The
/// number of packets is never changed; until the PAT has been seen, every packet is replaced by
/// a null packet.
#[derive(Debug)]
pub struct ServiceRenamer {
    demux: SectionDemux,
    tables: TableRewriter,
}

impl ServiceRenamer {
    pub fn new(options: RenameOptions) -> Result<ServiceRenamer, RenameError> {
        let resolver = ServiceResolver::new(options.old, options.new)?;
        let mut demux = SectionDemux::default();
        demux.add_pid(Pid::SDT_BAT);
        // without the service id, the PAT is of no use until the service is found in the SDT
        if resolver.resolution() == Resolution::IdKnown {
            demux.add_pid(Pid::PAT);
        }
        Ok(ServiceRenamer {
            demux,
            tables: TableRewriter {
                resolver,
                ignore_bat: options.ignore_bat,
                ignore_nit: options.ignore_nit,
                phase: Phase::WaitingForPat,
                ts_id: None,
                pat_out: CyclingPacketizer::new(Pid::PAT),
                pmt_out: CyclingPacketizer::new(Pid::STUFFING),
                sdt_bat_out: CyclingPacketizer::new(Pid::SDT_BAT),
                nit_out: CyclingPacketizer::new(Pid::NIT),
            },
        })
    }

    pub fn phase(&self) -> &Phase {
        &self.tables.phase
    }

    pub fn is_ready(&self) -> bool {
        self.tables.phase == Phase::Ready
    }

    /// The reason renaming stopped, if it has.
    pub fn error(&self) -> Option<&RenameError> {
        match self.tables.phase {
            Phase::Aborted(ref e) => Some(e),
            _ => None,
        }
    }

    /// The service being renamed, including any id learned so far.
    pub fn service(&self) -> &Service {
        self.tables.resolver.old()
    }

    /// Processes one packet, possibly overwriting it.
    pub fn process_packet(&mut self, buf: &mut [u8; Packet::SIZE]) -> Status {
        let pid = match Packet::try_new(&buf[..]) {
            Some(pk) => {
                self.demux.feed_packet(&pk, &mut self.tables);
                Some(pk.pid())
            }
            None => None,
        };
        match self.tables.phase {
            Phase::Aborted(_) => return Status::End,
            Phase::WaitingForPat => {
                *buf = NULL_PACKET;
                return Status::Null;
            }
            Phase::Ready => (),
        }
        match pid.and_then(|pid| self.tables.packetizer_for(pid)) {
            Some(out) => {
                *buf = out.next_packet();
                Status::Replace
            }
            None => Status::Pass,
        }
    }
}
