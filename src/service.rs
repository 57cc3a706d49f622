//! Identification of the service being renamed.
//!
//! The service to rename may be designated by its service id or by its name.  When only the name
//! is known, the id is learned from the first _Service Description Table_ carrying a service of
//! that name, and never changes afterwards.

use crate::packet::Pid;
use crate::psi::sdt::Sdt;
use crate::rename::RenameError;
use crate::text;
use log::info;

/// A set of optional service properties.  Used both to describe the service to look for, and the
/// values to give it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Service {
    pub id: Option<u16>,
    pub name: Option<String>,
    pub service_type: Option<u8>,
    /// logical channel number
    pub lcn: Option<u16>,
    /// the _free_CA_mode_ flag
    pub ca_controlled: Option<bool>,
    pub running_status: Option<u8>,
    /// PID of the service's _Program Map Table_
    pub pmt_pid: Option<Pid>,
}

impl Service {
    /// Interprets a decimal or `0x`-prefixed hexadecimal integer as a service id, and anything
    /// else as a service name.
    ///
    /// ```rust
    /// # use svrename::service::Service;
    /// assert_eq!(Service::from_designation("0x1001").id, Some(0x1001));
    /// assert_eq!(Service::from_designation("BBC ONE").name.as_deref(), Some("BBC ONE"));
    /// ```
    pub fn from_designation(designation: &str) -> Service {
        let trimmed = designation.trim();
        let id = match trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            Some(hex) => u16::from_str_radix(hex, 16).ok(),
            None => trimmed.parse::<u16>().ok(),
        };
        match id {
            Some(id) => Service {
                id: Some(id),
                ..Service::default()
            },
            None => Service {
                name: Some(designation.to_string()),
                ..Service::default()
            },
        }
    }

    /// `true` if either an id or a name is present.
    pub fn is_specified(&self) -> bool {
        self.id.is_some() || self.name.is_some()
    }

    /// Compares the given name with this service's, ignoring case and whitespace.
    pub fn has_name(&self, name: &str) -> bool {
        self.name
            .as_deref()
            .map(|n| text::similar_names(n, name))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Only the name of the service is known so far
    NameOnly,
    /// The service id is known, either because it was configured or because it has been found
    /// by name
    IdKnown,
}

/// Tracks the service to look for (`old`) and the properties to give it (`new`).
#[derive(Debug)]
pub struct ServiceResolver {
    old: Service,
    new: Service,
}

impl ServiceResolver {
    pub fn new(old: Service, new: Service) -> Result<ServiceResolver, RenameError> {
        if !old.is_specified() {
            return Err(RenameError::NoService);
        }
        Ok(ServiceResolver { old, new })
    }

    pub fn old(&self) -> &Service {
        &self.old
    }

    pub fn new_service(&self) -> &Service {
        &self.new
    }

    pub fn resolution(&self) -> Resolution {
        if self.old.id.is_some() {
            Resolution::IdKnown
        } else {
            Resolution::NameOnly
        }
    }

    pub fn old_id(&self) -> Option<u16> {
        self.old.id
    }

    /// Records the id of the service found by name.  Has no effect if the id is already known,
    /// returning `false`.
    pub fn latch_id(&mut self, id: u16) -> bool {
        if self.old.id.is_some() {
            return false;
        }
        self.old.id = Some(id);
        true
    }

    /// Records the PMT PID of the service, which is the same before and after renaming.
    pub fn set_pmt_pid(&mut self, pid: Pid) {
        self.old.pmt_pid = Some(pid);
        self.new.pmt_pid = Some(pid);
    }

    pub fn pmt_pid(&self) -> Option<Pid> {
        self.old.pmt_pid
    }

    /// The new service id, if one is configured and the old id is known and different.
    pub fn changed_id(&self) -> Option<u16> {
        match (self.old.id, self.new.id) {
            (Some(old), Some(new)) if old != new => Some(new),
            _ => None,
        }
    }

    /// Finds the service within the given SDT, returning its service id.
    ///
    /// When the id is already known, `Ok(None)` indicates that this SDT does not describe the
    /// service.  When searching by name, a missing service is an error, and a service that is
    /// found has its id latched.
    pub fn locate(&mut self, sdt: &Sdt) -> Result<Option<u16>, RenameError> {
        if let Some(id) = self.old.id {
            return Ok(Some(id).filter(|id| sdt.services.contains_key(id)));
        }
        let name = self.old.name.clone().unwrap_or_default();
        match sdt.find_service(&name) {
            Some(id) => {
                info!("found service \"{}\", service id is {:#06x}", name, id);
                self.latch_id(id);
                Ok(Some(id))
            }
            None => Err(RenameError::ServiceNameNotFound { name }),
        }
    }
}
