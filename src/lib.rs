//! Renaming of a service within an MPEG2 Transport Stream, per the _ISO/IEC 13818-1_ and
//! _ETSI EN 300 468_ (DVB SI) standards.
//!
//! The service to rename is found by its service id, or by the name given in the _Service
//! Description Table_.  Its id, name, type, logical channel number, CA mode and running status may
//! then be changed consistently across the PAT, its PMT, the SDT, and the service list and
//! logical channel number descriptors of the NIT and BAT.
//!
//! # Design principals
//!
//!  * *Single pass*.  Each packet given to the
//!    [`ServiceRenamer`](rename/struct.ServiceRenamer.html) results in exactly one packet out,
//!    decided before the next packet is considered, so the timing of the stream is kept.
//!  * *Non-blocking*.  The caller 'pushes' packets one at a time; there are no threads and no
//!    I/O within the library.
//!  * *Leave alone what isn't understood*.  Tables and descriptors not involved in the rename are
//!    passed through byte for byte.
//!  * *Transport Neutral*.  The APIs accept 188-byte packet buffers, and the caller handles
//!    providing the data from wherever.  The `svrename` binary is one such caller.
//!
//! # Example
//!
//! ```rust
//! use svrename::rename::{RenameOptions, ServiceRenamer, Status};
//! use svrename::service::Service;
//!
//! let options = RenameOptions {
//!     old: Service::from_designation("0x1001"),
//!     new: Service {
//!         name: Some("NEWSVC".to_string()),
//!         ..Service::default()
//!     },
//!     ..RenameOptions::default()
//! };
//! let mut renamer = ServiceRenamer::new(options).unwrap();
//! let mut packet = svrename::packet::NULL_PACKET;
//! // no PAT yet, so everything is nulled
//! assert_eq!(renamer.process_packet(&mut packet), Status::Null);
//! ```

#![forbid(unsafe_code)]
#![deny(future_incompatible)]

pub mod demultiplex;
pub mod descriptor;
pub mod packet;
pub mod packetizer;
pub mod psi;
pub mod rename;
pub mod rewrite;
pub mod service;
pub mod text;
