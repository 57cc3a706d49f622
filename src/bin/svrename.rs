use anyhow::{bail, Context};
use clap::Parser;
use clap_num::{maybe_hex, number_range};
use log::{info, warn};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;
use svrename::packet::Packet;
use svrename::rename::{RenameOptions, ServiceRenamer, Status};
use svrename::service::Service;

/// Rename a service: assign a new service name and/or new service id in the PAT, PMT, SDT-Actual,
/// NIT-Actual and BAT.
#[derive(Parser, Debug)]
#[command(version)]
struct Opt {
    /// The service to rename, as a service id (decimal or 0x-hex) or a service name
    service: String,

    /// New service id
    #[arg(short, long, value_parser = maybe_hex::<u16>)]
    id: Option<u16>,

    /// New service name
    #[arg(short, long)]
    name: Option<String>,

    /// New service type
    #[arg(short = 't', long = "type", value_parser = maybe_hex::<u8>)]
    service_type: Option<u8>,

    /// New logical channel number
    #[arg(short, long, value_parser = maybe_hex::<u16>)]
    lcn: Option<u16>,

    /// New free_CA_mode in the SDT (0 or 1)
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=1))]
    free_ca_mode: Option<u8>,

    /// New running_status in the SDT (0 to 7)
    #[arg(short, long, value_parser = running_status)]
    running_status: Option<u8>,

    /// Do not modify the BAT
    #[arg(long)]
    ignore_bat: bool,

    /// Do not modify the NIT
    #[arg(long)]
    ignore_nit: bool,

    /// Input transport stream file (default: standard input)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Output transport stream file (default: standard output)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Log more detail (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn running_status(s: &str) -> Result<u8, String> {
    number_range(s, 0, 7)
}

impl Opt {
    fn options(&self) -> RenameOptions {
        RenameOptions {
            old: Service::from_designation(&self.service),
            new: Service {
                id: self.id,
                name: self.name.clone(),
                service_type: self.service_type,
                lcn: self.lcn,
                ca_controlled: self.free_ca_mode.map(|mode| mode != 0),
                running_status: self.running_status,
                pmt_pid: None,
            },
            ignore_bat: self.ignore_bat,
            ignore_nit: self.ignore_nit,
        }
    }

    fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

/// Fills `buf` with the next packet, returning `false` at the end of the input.
fn read_packet<R: Read>(r: &mut R, buf: &mut [u8; Packet::SIZE]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => {
                if filled > 0 {
                    warn!("ignoring {} bytes of truncated packet at end of input", filled);
                }
                return Ok(false);
            }
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

fn main() -> anyhow::Result<()> {
    let opt = Opt::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(opt.log_level()))
        .init();

    let mut renamer = ServiceRenamer::new(opt.options())?;

    let input: Box<dyn Read> = match opt.input {
        Some(ref path) => Box::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        ),
        None => Box::new(io::stdin().lock()),
    };
    let output: Box<dyn Write> = match opt.output {
        Some(ref path) => Box::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    let mut input = BufReader::new(input);
    let mut output = BufWriter::new(output);

    let mut buf = [0u8; Packet::SIZE];
    let mut count = 0u64;
    while read_packet(&mut input, &mut buf).context("reading input")? {
        count += 1;
        if renamer.process_packet(&mut buf) == Status::End {
            output.flush()?;
            match renamer.error() {
                Some(e) => return Err(e.clone()).context(format!("at packet {}", count)),
                None => bail!("processing ended at packet {}", count),
            }
        }
        output.write_all(&buf).context("writing output")?;
    }
    output.flush().context("writing output")?;
    if !renamer.is_ready() {
        warn!("no PAT found for service {:?}", opt.service);
    }
    info!("processed {} packets", count);
    Ok(())
}
