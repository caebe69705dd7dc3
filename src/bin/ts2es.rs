//! Extract MPEG audio elementary streams from a Transport Stream file.
//!
//! Each extracted PID is written to its own file, `<prefix>_<pid>.es`.

use clap::Parser;
use clap_num::maybe_hex;
use mpeg2ts_es::demultiplex::{
    DemuxConfig, Demultiplex, ElementaryStreamSink, PidSelection,
};
use mpeg2ts_es::packet::{Packet, Pid, PidRange};
use mpeg2ts_es::pes::Timestamp;
use mpeg2ts_es::report::{LogCrateSink, Severity};
use mpeg2ts_es::StreamType;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl From<LogLevel> for Severity {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Debug => Severity::Debug,
            LogLevel::Info => Severity::Info,
            LogLevel::Warning => Severity::Warning,
            LogLevel::Error => Severity::Error,
        }
    }
}

#[derive(Debug, Parser)]
#[clap(name = "ts2es")]
#[clap(about = "Extracts MPEG audio elementary streams from an MPEG Transport Stream", long_about = None)]
#[clap(version)]
struct Cli {
    /// The Transport Stream file to read.{n}
    /// Use `-` to read standard input.
    input: PathBuf,

    /// Output files are named `<PREFIX>_<pid>.es`
    #[clap(short, long, default_value = "out")]
    output: String,

    /// Lowest PID to extract (decimal, or hex with a `0x` prefix).{n}
    /// If neither a PID range nor a stream type is given, the first PID found carrying a
    /// valid PES header is extracted.
    #[clap(long, value_parser = maybe_hex::<u16>, requires = "pid_max")]
    pid_min: Option<u16>,

    /// Highest PID to extract
    #[clap(long, value_parser = maybe_hex::<u16>, requires = "pid_min")]
    pid_max: Option<u16>,

    /// Extract every stream the PMT lists with this stream_type
    #[clap(short = 't', long, value_parser = maybe_hex::<u8>, conflicts_with = "pid_min")]
    stream_type: Option<u8>,

    /// Messages less severe than this are not shown
    #[clap(short, long, value_enum, default_value = "info")]
    log_level: LogLevel,

    /// Size in bytes of the reassembly buffer for each stream
    #[clap(long, default_value_t = mpeg2ts_es::ES_MAX_SIZE)]
    buffer_size: usize,
}

/// Appends the data for each PID to its own file, creating the files on first use.
struct FileSink {
    prefix: String,
    files: HashMap<Pid, File>,
}

impl FileSink {
    fn new(prefix: String) -> FileSink {
        FileSink {
            prefix,
            files: HashMap::new(),
        }
    }
}

impl ElementaryStreamSink for FileSink {
    fn write_es(&mut self, pid: Pid, data: &[u8], _pts: Option<Timestamp>) -> io::Result<()> {
        let file = match self.files.entry(pid) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let path = format!("{}_{}.es", self.prefix, pid);
                log::info!("writing {:?} to {}", pid, path);
                let f = OpenOptions::new().create(true).append(true).open(path)?;
                e.insert(f)
            }
        };
        file.write_all(data)
    }
}

fn selection(cli: &Cli) -> Result<PidSelection, String> {
    if let Some(stream_type) = cli.stream_type {
        return Ok(PidSelection::StreamType(StreamType::from(stream_type)));
    }
    match (cli.pid_min, cli.pid_max) {
        (Some(min), Some(max)) => {
            let pid = |v: u16| {
                Pid::try_from(v).map_err(|()| format!("PID {:#x} is greater than 0x1fff", v))
            };
            Ok(PidSelection::Range(PidRange {
                min: pid(min)?,
                max: pid(max)?,
            }))
        }
        _ => Ok(PidSelection::Auto),
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = DemuxConfig {
        selection: selection(&cli)?,
        log_threshold: cli.log_level.into(),
        es_buffer_capacity: cli.buffer_size,
        ..DemuxConfig::default()
    };
    let mut input: Box<dyn Read> = if cli.input.as_os_str() == "-" {
        Box::new(io::stdin().lock())
    } else {
        Box::new(File::open(&cli.input)?)
    };
    let mut demux = Demultiplex::new(config, FileSink::new(cli.output), LogCrateSink)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = interrupted.clone();
        ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst))?;
    }

    let mut buf = [0u8; Packet::SIZE];
    while !interrupted.load(Ordering::SeqCst) {
        let n = read_packet(&mut input, &mut buf)?;
        if n == 0 {
            break;
        }
        if let Err(e) = demux.push_packet(&buf[..n]) {
            demux.finish()?;
            return Err(e.into());
        }
        if n < Packet::SIZE {
            break;
        }
    }
    if interrupted.load(Ordering::SeqCst) {
        log::warn!("interrupted");
    }
    demux.finish()?;
    let stats = demux.stats();
    println!(
        "{} packets processed, {} bytes of elementary stream written",
        stats.packets, stats.bytes
    );
    Ok(())
}

/// Fill `buf` with the next packet, returning a short count only at the end of the input.
fn read_packet(r: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let default_filter = match cli.log_level {
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warning => "warn",
        LogLevel::Error => "error",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
