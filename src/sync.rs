//! Reassembly of elementary stream data from the PES payloads of successive TS packets, and
//! alignment of that data to MPEG audio frame boundaries.
//!
//! Each [`EsRecord`](../es/struct.EsRecord.html) is either `Synced`, when bytes are appended to
//! its buffer, or `Unsynced`, when bytes are discarded until a valid frame header is found.

use crate::demultiplex::{DemuxError, DemuxStats, ElementaryStreamSink};
use crate::es::{EsRecord, PesRemaining, SyncState};
use crate::mpa::FrameHeader;
use crate::packet::Packet;
use crate::pes::PesHeader;
use crate::report::{LogSink, Reporter};

/// The parts of the demultiplexer state that the synchroniser writes to.
pub(crate) struct Output<'a, O, L> {
    pub sink: &'a mut O,
    pub report: &'a mut Reporter<L>,
    pub stats: &'a mut DemuxStats,
}

impl<'a, O: ElementaryStreamSink, L: LogSink> Output<'a, O, L> {
    /// Pass any buffered bytes of the given record to the sink, then empty the buffer.
    pub fn flush(&mut self, record: &mut EsRecord) -> Result<(), DemuxError> {
        if record.buffer.is_empty() {
            return Ok(());
        }
        let pid = record.pid();
        self.sink
            .write_es(pid, record.buffer.data(), record.pts)
            .map_err(|source| DemuxError::Output { pid, source })?;
        self.stats.bytes += record.buffer.len() as u64;
        record.buffer.clear();
        Ok(())
    }
}

/// Handle the payload of one TS packet belonging to the given record's PID.
///
/// `payload_len` used in the early-flush decision is the size of the whole TS payload, not just
/// the elementary stream bytes it contributed.
pub(crate) fn consume<O, L>(
    record: &mut EsRecord,
    payload: &[u8],
    unit_start: bool,
    out: &mut Output<'_, O, L>,
) -> Result<(), DemuxError>
where
    O: ElementaryStreamSink,
    L: LogSink,
{
    let es_data = if unit_start {
        out.flush(record)?;
        match begin_pes(record, payload, out.report) {
            Some(data) => data,
            None => return Ok(()),
        }
    } else {
        if record.skip_rest || record.stream_id.is_none() {
            return Ok(());
        }
        record.pes_remaining.take(payload)
    };

    let data = match record.state {
        SyncState::Synced => es_data,
        SyncState::Unsynced => match find_sync(record, es_data, out.report) {
            Some(data) => data,
            None => return Ok(()),
        },
    };
    if data.is_empty() {
        return Ok(());
    }
    append(record, data, out)?;

    let near_end = match record.pes_remaining {
        PesRemaining::Unbounded => true,
        PesRemaining::Bounded(remaining) => {
            remaining + payload.len() < Packet::MIN_PAYLOAD_CAPACITY
        }
    };
    if near_end {
        out.flush(record)?;
    }
    Ok(())
}

/// Validate the PES header at the start of `payload`, update the record from it, and return
/// the elementary stream bytes following the header (limited to the length the header declares).
///
/// Returns `None` if the payload is to be ignored, in which case continuation packets of this
/// PES packet are ignored too.
fn begin_pes<'p, L: LogSink>(
    record: &mut EsRecord,
    payload: &'p [u8],
    report: &mut Reporter<L>,
) -> Option<&'p [u8]> {
    record.skip_rest = true;
    record.pes_remaining = PesRemaining::Bounded(0);
    let pid = record.pid();
    let offset = report.offset();
    let header = match PesHeader::from_bytes(payload) {
        Ok(header) => header,
        Err(e) => {
            report!(
                report,
                Warning,
                "{:?}: dropping packet with malformed PES header at 0x{:x}: {}",
                pid,
                offset,
                e
            );
            return None;
        }
    };
    let stream_id = header.stream_id();
    if !stream_id.is_mpeg_audio() {
        report!(
            report,
            Debug,
            "{:?}: {:?} is not an MPEG audio stream_id",
            pid,
            stream_id
        );
    }
    match record.stream_id {
        None => {
            record.stream_id = Some(stream_id);
            record.state = SyncState::Unsynced;
            report!(
                report,
                Info,
                "Found valid PES packet at 0x{:x}: {:?} {:?} {:?}",
                offset,
                pid,
                stream_id,
                header.pes_packet_length()
            );
        }
        Some(expected) if expected != stream_id => {
            report!(
                report,
                Info,
                "{:?}: Ignoring additional {:?} (extracting {:?})",
                pid,
                stream_id,
                expected
            );
            return None;
        }
        Some(_) => (),
    }
    match header.pts_dts() {
        Ok(pts_dts) => {
            record.pts = pts_dts.pts();
            record.dts = pts_dts.dts();
        }
        Err(e) => {
            report!(report, Debug, "{:?}: timestamps unavailable: {}", pid, e);
            record.pts = None;
            record.dts = None;
        }
    }
    record.pes_remaining = match header.payload_length() {
        Some(len) => PesRemaining::Bounded(len),
        None => PesRemaining::Unbounded,
    };
    record.skip_rest = false;
    Some(record.pes_remaining.take(header.payload()))
}

/// Search for an audio frame header, and if found, mark the record `Synced` and return the data
/// from the start of the header onwards.  All data is discarded if no header is found.
fn find_sync<'d, L: LogSink>(
    record: &mut EsRecord,
    data: &'d [u8],
    report: &mut Reporter<L>,
) -> Option<&'d [u8]> {
    if data.len() < FrameHeader::SIZE {
        return None;
    }
    for start in 0..=data.len() - FrameHeader::SIZE {
        if let Ok(header) = FrameHeader::from_bytes(&data[start..]) {
            record.state = SyncState::Synced;
            let pid = record.pid();
            let offset = report.offset();
            if report.first_frame_info() {
                report!(
                    report,
                    Info,
                    "{:?}: first audio frame at 0x{:x}: {}",
                    pid,
                    offset,
                    header
                );
            } else {
                report!(report, Info, "{:?}: Regained sync at 0x{:x}", pid, offset);
            }
            return Some(&data[start..]);
        }
    }
    None
}

fn append<O, L>(
    record: &mut EsRecord,
    mut data: &[u8],
    out: &mut Output<'_, O, L>,
) -> Result<(), DemuxError>
where
    O: ElementaryStreamSink,
    L: LogSink,
{
    while let Err(overflow) = record.buffer.extend(data) {
        if record.buffer.capacity() == 0 {
            break;
        }
        let pid = record.pid();
        let offset = out.report.offset();
        report!(
            out.report,
            Warning,
            "{:?}: {} at 0x{:x}, flushing early",
            pid,
            overflow,
            offset
        );
        out.flush(record)?;
        data = &data[overflow.written..];
    }
    Ok(())
}
