//! Main types implementing the demultiplexer state-machine.
//!
//! Construct an instance of [`Demultiplex`](struct.Demultiplex.html) with a
//! [`DemuxConfig`](struct.DemuxConfig.html), an
//! [`ElementaryStreamSink`](trait.ElementaryStreamSink.html) to receive the extracted data and a
//! [`LogSink`](../report/trait.LogSink.html) to receive diagnostics, then feed transport stream
//! packets to [`push_packet()`](struct.Demultiplex.html#method.push_packet).

use crate::es::{ContinuityCheck, EsRecord, EsRegistry};
use crate::packet::{AdaptationControl, Packet, PacketError, Pid, PidRange};
use crate::pes::{PesHeader, Timestamp};
use crate::psi;
use crate::psi::pat::{PatSection, ProgramDescriptor};
use crate::psi::pmt::{PmtEntry, PmtSection, PmtTable};
use crate::report::{LogSink, Reporter, Severity};
use crate::sync;
use crate::{StreamType, ES_MAX_SIZE, MAX_NUM_ES, PAT_PID, STUFFING_PID};
use std::io;

/// Receives the elementary stream bytes extracted by the demultiplexer.
///
/// Implemented for any `FnMut(Pid, &[u8], Option<Timestamp>) -> io::Result<()>` closure.
pub trait ElementaryStreamSink {
    /// Called with the next contiguous run of bytes from the elementary stream carried on `pid`,
    /// along with the PTS of the PES packet the bytes were taken from (if it had one).
    ///
    /// An error ends demultiplexing; it is returned from `push_packet()` as
    /// `DemuxError::Output`.
    fn write_es(&mut self, pid: Pid, data: &[u8], pts: Option<Timestamp>) -> io::Result<()>;
}

impl<F> ElementaryStreamSink for F
where
    F: FnMut(Pid, &[u8], Option<Timestamp>) -> io::Result<()>,
{
    fn write_es(&mut self, pid: Pid, data: &[u8], pts: Option<Timestamp>) -> io::Result<()> {
        self(pid, data, pts)
    }
}

/// How the PIDs carrying the elementary streams to be extracted are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidSelection {
    /// The PID of the first packet found to start with a valid PES header is used
    Auto,
    /// Every PID within the given range is used
    Range(PidRange),
    /// Once the PMT has been received, the range spanning every PID the PMT gives for streams of
    /// this type is used
    StreamType(StreamType),
}

/// Settings fixed for the life of a `Demultiplex` instance.
#[derive(Debug, Clone)]
pub struct DemuxConfig {
    /// which PIDs to extract
    pub selection: PidSelection,
    /// messages less severe than this are not passed to the `LogSink`
    pub log_threshold: Severity,
    /// size of the reassembly buffer allocated for each elementary stream
    pub es_buffer_capacity: usize,
    /// the maximum number of elementary streams tracked, which also limits the number of PMT
    /// entries retained
    pub max_streams: usize,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        DemuxConfig {
            selection: PidSelection::Auto,
            log_threshold: Severity::Info,
            es_buffer_capacity: ES_MAX_SIZE,
            max_streams: MAX_NUM_ES,
        }
    }
}

/// Reasons a `DemuxConfig` is rejected.
#[derive(Debug, PartialEq, Eq, Clone, Copy, thiserror::Error)]
pub enum ConfigError {
    /// The range minimum was greater than its maximum
    #[error("invalid PID range [{min}, {max}]")]
    InvalidRange {
        /// the requested minimum
        min: Pid,
        /// the requested maximum
        max: Pid,
    },
    /// PID 0 carries the PAT, and can't be extracted as an elementary stream
    #[error("PID range [{}, {}] includes the PAT PID", .0.min, .0.max)]
    RangeIncludesPat(PidRange),
    /// The buffer could not even hold the payload of a single packet
    #[error("elementary stream buffer of {0} bytes is smaller than a TS packet")]
    BufferTooSmall(usize),
    /// At least one elementary stream must be allowed
    #[error("max_streams must be at least 1")]
    NoStreams,
}

impl DemuxConfig {
    /// Check the settings are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let PidSelection::Range(range) = self.selection {
            if range.min > range.max {
                return Err(ConfigError::InvalidRange {
                    min: range.min,
                    max: range.max,
                });
            }
            if range.contains(PAT_PID) {
                return Err(ConfigError::RangeIncludesPat(range));
            }
        }
        if self.es_buffer_capacity < Packet::SIZE {
            return Err(ConfigError::BufferTooSmall(self.es_buffer_capacity));
        }
        if self.max_streams == 0 {
            return Err(ConfigError::NoStreams);
        }
        Ok(())
    }
}

/// Errors that stop demultiplexing.
#[derive(Debug, thiserror::Error)]
pub enum DemuxError {
    /// The buffer given to `push_packet()` did not start with the sync byte.  No further packets
    /// should be pushed unless the caller re-aligns with the packet boundaries.
    #[error("TS sync byte not found at 0x{offset:x} (found {found:#04x})")]
    SyncLoss {
        /// byte offset of the packet within the input
        offset: u64,
        /// the byte found in place of the sync byte
        found: u8,
    },
    /// The `ElementaryStreamSink` failed
    #[error("failed to write elementary stream data for {pid:?}")]
    Output {
        /// the PID whose data was being written
        pid: Pid,
        /// the error returned by the sink
        #[source]
        source: io::Error,
    },
}

/// Running totals
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DemuxStats {
    /// number of packets pushed, including any which could not be processed
    pub packets: u64,
    /// number of elementary stream bytes passed to the sink
    pub bytes: u64,
}

/// Transport Stream demultiplexer.
///
/// Routes each packet pushed to it by PID: PAT and PMT packets update the program tables, and
/// packets of the selected elementary streams are reassembled and synchronised, with the
/// resulting bytes passed to the `ElementaryStreamSink`.  Only a single program is handled; if
/// the PAT lists several, the last is used.
pub struct Demultiplex<O, L> {
    config: DemuxConfig,
    window: Option<PidRange>,
    pmt_pid: Option<Pid>,
    pat_version: Option<u8>,
    pmt_version: Option<u8>,
    pmt_table: PmtTable,
    registry: EsRegistry,
    stats: DemuxStats,
    sink: O,
    report: Reporter<L>,
}

impl<O: ElementaryStreamSink, L: LogSink> Demultiplex<O, L> {
    /// Create a demultiplexer, allocating its tables, or fail if the configuration is invalid.
    pub fn new(config: DemuxConfig, sink: O, log: L) -> Result<Demultiplex<O, L>, ConfigError> {
        config.validate()?;
        let window = match config.selection {
            PidSelection::Range(range) => Some(range),
            PidSelection::Auto | PidSelection::StreamType(_) => None,
        };
        Ok(Demultiplex {
            window,
            pmt_pid: None,
            pat_version: None,
            pmt_version: None,
            pmt_table: PmtTable::with_capacity(config.max_streams),
            registry: EsRegistry::new(config.max_streams, config.es_buffer_capacity),
            stats: DemuxStats::default(),
            sink,
            report: Reporter::new(log, config.log_threshold),
            config,
        })
    }

    /// Process a single transport stream packet.
    ///
    /// The buffer should be `Packet::SIZE` bytes long, but the last packet of a stream may be
    /// shorter, in which case whatever is present is processed.  Problems within the packet are
    /// reported to the `LogSink`, and only a missing sync byte or a failure of the
    /// `ElementaryStreamSink` produce an `Err`.
    pub fn push_packet(&mut self, buf: &[u8]) -> Result<(), DemuxError> {
        self.stats.packets += 1;
        let offset = (self.stats.packets - 1) * Packet::SIZE as u64;
        self.report.set_offset(offset);
        let pk = match Packet::try_new(buf) {
            Ok(pk) => pk,
            Err(PacketError::SyncLoss { found }) => {
                report!(
                    self.report,
                    Error,
                    "TS sync byte not found at 0x{:x} (found {:#04x})",
                    offset,
                    found
                );
                return Err(DemuxError::SyncLoss { offset, found });
            }
            Err(e) => {
                report!(self.report, Warning, "{} at 0x{:x}", e, offset);
                return Ok(());
            }
        };
        let pid = pk.pid();
        if pid == STUFFING_PID {
            return Ok(());
        }
        if pid == PAT_PID {
            self.handle_pat(&pk);
            return Ok(());
        }
        if Some(pid) == self.pmt_pid {
            self.handle_pmt(&pk);
            return Ok(());
        }

        let auto_pending = self.window.is_none() && self.config.selection == PidSelection::Auto;
        if !(auto_pending || self.in_window(pid)) {
            return Ok(());
        }
        if pk.transport_error_indicator() {
            report!(
                self.report,
                Warning,
                "transport error at 0x{:x} {:?}",
                offset,
                pid
            );
            if let Some(record) = self.registry.get_mut(pid) {
                record.desync();
            }
            return Ok(());
        }
        if pk.transport_scrambling_control().is_scrambled() {
            report!(
                self.report,
                Warning,
                "{:?} is scrambled ({:?}), payload at 0x{:x} skipped",
                pid,
                pk.transport_scrambling_control(),
                offset
            );
            return Ok(());
        }
        let payload = match pk.adaptation_control() {
            AdaptationControl::AdaptationFieldOnly => return Ok(()),
            AdaptationControl::Reserved => {
                report!(
                    self.report,
                    Debug,
                    "{:?}: reserved adaptation_field_control value at 0x{:x}",
                    pid,
                    offset
                );
                return Ok(());
            }
            AdaptationControl::PayloadOnly | AdaptationControl::AdaptationFieldAndPayload => {
                match pk.payload() {
                    Some(payload) => payload,
                    None => {
                        report!(
                            self.report,
                            Debug,
                            "{:?}: adaptation_field_length leaves no payload at 0x{:x}",
                            pid,
                            offset
                        );
                        return Ok(());
                    }
                }
            }
        };

        if auto_pending && pk.payload_unit_start_indicator() {
            match PesHeader::from_bytes(payload) {
                Ok(_) => {
                    self.window = Some(PidRange::single(pid));
                    report!(self.report, Info, "Selected {:?} for extraction", pid);
                }
                Err(e) => {
                    report!(self.report, Debug, "{:?} not selected: {}", pid, e);
                }
            }
        }
        if !self.in_window(pid) {
            return Ok(());
        }

        let record = match self.registry.find_or_create(pid) {
            Ok(record) => record,
            Err(e) => {
                report!(self.report, Warning, "{}", e);
                return Ok(());
            }
        };
        if let ContinuityCheck::Gap {
            expected,
            observed,
            desynced,
        } = record.check_continuity(pk.continuity_counter())
        {
            if desynced {
                report!(
                    self.report,
                    Warning,
                    "TS continuity error at 0x{:x}, {:?}: expected {} found {}",
                    offset,
                    pid,
                    expected.count(),
                    observed.count()
                );
            } else {
                report!(
                    self.report,
                    Debug,
                    "continuity error at 0x{:x} {:?} while unsynced",
                    offset,
                    pid
                );
            }
        }
        let mut out = sync::Output {
            sink: &mut self.sink,
            report: &mut self.report,
            stats: &mut self.stats,
        };
        sync::consume(record, payload, pk.payload_unit_start_indicator(), &mut out)
    }

    /// Process a buffer holding any number of consecutive packets, stopping at the first error.
    /// A final partial packet is processed as a short packet.
    pub fn push(&mut self, buf: &[u8]) -> Result<(), DemuxError> {
        for pk in buf.chunks(Packet::SIZE) {
            self.push_packet(pk)?;
        }
        Ok(())
    }

    /// Pass any data still buffered for each elementary stream to the sink, as at the end of
    /// the input.
    pub fn finish(&mut self) -> Result<(), DemuxError> {
        let mut out = sync::Output {
            sink: &mut self.sink,
            report: &mut self.report,
            stats: &mut self.stats,
        };
        for record in self.registry.iter_mut() {
            out.flush(record)?;
        }
        Ok(())
    }

    fn in_window(&self, pid: Pid) -> bool {
        self.window.map_or(false, |w| w.contains(pid))
    }

    /// The section starting in the given packet, if it is complete and usable.
    fn psi_section<'buf>(
        &mut self,
        pk: &Packet<'buf>,
        table: &str,
    ) -> Option<psi::Section<'buf>> {
        let offset = self.report.offset();
        if !pk.payload_unit_start_indicator() {
            report!(
                self.report,
                Debug,
                "{} continuation packet at 0x{:x} ignored",
                table,
                offset
            );
            return None;
        }
        if pk.transport_error_indicator() {
            report!(
                self.report,
                Warning,
                "transport error at 0x{:x} {:?}, {} skipped",
                offset,
                pk.pid(),
                table
            );
            return None;
        }
        let payload = pk.payload()?;
        match psi::Section::from_payload(payload) {
            Ok(section) => Some(section),
            Err(e) => {
                report!(
                    self.report,
                    Warning,
                    "{} at 0x{:x} skipped: {}",
                    table,
                    offset,
                    e
                );
                None
            }
        }
    }

    fn handle_pat(&mut self, pk: &Packet<'_>) {
        let section = match self.psi_section(pk, "PAT") {
            Some(section) => section,
            None => return,
        };
        let pat = match PatSection::from_section(&section) {
            Ok(pat) => pat,
            Err(e) => {
                report!(self.report, Warning, "PAT skipped: {}", e);
                return;
            }
        };
        track_version(
            &mut self.report,
            &mut self.pat_version,
            "PAT",
            section.table_syntax_header().version(),
        );
        // every PAT re-establishes the program from scratch; the PID window stays in force until
        // the next PMT recomputes it
        let previous_pmt_pid = self.pmt_pid.take();
        self.pmt_table.clear();
        for program in pat.programs() {
            match program {
                ProgramDescriptor::Network { pid } => {
                    report!(self.report, Debug, "network information on {:?}", pid);
                }
                ProgramDescriptor::Program {
                    program_number,
                    pid,
                } => {
                    if previous_pmt_pid != Some(pid) {
                        report!(
                            self.report,
                            Info,
                            "program {} has PMT on {:?}",
                            program_number,
                            pid
                        );
                    }
                    self.pmt_pid = Some(pid);
                }
            }
        }
        if self.pmt_pid.is_none() {
            report!(self.report, Warning, "PAT lists no programs");
        }
    }

    fn handle_pmt(&mut self, pk: &Packet<'_>) {
        let section = match self.psi_section(pk, "PMT") {
            Some(section) => section,
            None => return,
        };
        let pmt = match PmtSection::from_section(&section) {
            Ok(pmt) => pmt,
            Err(e) => {
                report!(self.report, Warning, "PMT skipped: {}", e);
                return;
            }
        };
        let new_version = track_version(
            &mut self.report,
            &mut self.pmt_version,
            "PMT",
            section.table_syntax_header().version(),
        );
        report!(self.report, Debug, "PMT {:?}", pmt);
        self.pmt_table.clear();
        for info in pmt.streams() {
            let entry = match info {
                Ok(info) => PmtEntry::from(&info),
                Err(e) => {
                    report!(self.report, Warning, "PMT entry skipped: {}", e);
                    break;
                }
            };
            if let Err(e) = self.pmt_table.push(entry) {
                report!(self.report, Warning, "{}", e);
                break;
            }
        }
        if let PidSelection::StreamType(stream_type) = self.config.selection {
            let window = self.pmt_table.pid_window(stream_type);
            match window {
                Some(w) if window != self.window => report!(
                    self.report,
                    Info,
                    "{:?} streams on PIDs [{:?}, {:?}]",
                    stream_type,
                    w.min,
                    w.max
                ),
                None if new_version => {
                    report!(self.report, Warning, "PMT has no {:?} streams", stream_type)
                }
                _ => (),
            }
            self.window = window;
        }
    }

    /// Running totals of packets processed and bytes output
    pub fn stats(&self) -> &DemuxStats {
        &self.stats
    }

    /// The PID carrying the PMT of the program being processed, once the PAT has been seen
    pub fn pmt_pid(&self) -> Option<Pid> {
        self.pmt_pid
    }

    /// The elementary streams listed by the most recent PMT
    pub fn pmt_table(&self) -> &PmtTable {
        &self.pmt_table
    }

    /// The PIDs currently selected for extraction, if known yet
    pub fn pid_window(&self) -> Option<PidRange> {
        self.window
    }

    /// The state of the elementary stream on the given PID, if it is being extracted
    pub fn es_record(&self, pid: Pid) -> Option<&EsRecord> {
        self.registry.get(pid)
    }

    /// borrow the `ElementaryStreamSink`
    pub fn sink(&self) -> &O {
        &self.sink
    }

    /// borrow the `LogSink`
    pub fn log_sink(&self) -> &L {
        self.report.sink()
    }

    /// Give up the demultiplexer, returning the sinks it was created with.  Buffered data not
    /// yet passed to the sink via `finish()` is dropped.
    pub fn into_parts(self) -> (O, L) {
        (self.sink, self.report.into_sink())
    }
}

fn track_version<L: LogSink>(
    report: &mut Reporter<L>,
    last: &mut Option<u8>,
    table: &str,
    version: u8,
) -> bool {
    let changed = match *last {
        Some(v) if v == version => {
            report!(report, Debug, "{} version {} repeated", table, version);
            false
        }
        Some(v) => {
            report!(report, Info, "{} version changed {} -> {}", table, v, version);
            true
        }
        None => {
            report!(report, Info, "{} version {}", table, version);
            true
        }
    };
    *last = Some(version);
    changed
}
