#![no_main]

use libfuzzer_sys::fuzz_target;
use svrename::packet::Packet;
use svrename::rename::{RenameOptions, ServiceRenamer, Status};
use svrename::service::Service;

fuzz_target!(|data: &[u8]| {
    // first byte selects whether the service is designated by id or by name
    let (select, data) = match data.split_first() {
        Some(v) => v,
        None => return,
    };
    let old = if select & 1 == 0 {
        Service::from_designation("0x0001")
    } else {
        Service::from_designation("svc")
    };
    let options = RenameOptions {
        old,
        new: Service {
            id: Some(0x2002),
            name: Some("NEWSVC".to_string()),
            lcn: Some(7),
            ..Service::default()
        },
        ignore_bat: select & 2 != 0,
        ignore_nit: select & 4 != 0,
    };
    let mut renamer = ServiceRenamer::new(options).unwrap();
    let mut buf = [0u8; Packet::SIZE];
    for chunk in data.chunks_exact(Packet::SIZE) {
        buf.copy_from_slice(chunk);
        // make most packets valid, to get further into the parsers
        buf[0] = Packet::SYNC_BYTE;
        if renamer.process_packet(&mut buf) == Status::End {
            break;
        }
    }
});
