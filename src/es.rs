//! Per-PID elementary stream state: the [`EsRecord`](struct.EsRecord.html) for each stream
//! being extracted, held within a fixed-capacity [`EsRegistry`](struct.EsRegistry.html).

use crate::packet;
use crate::pes;
use crate::TableOverflow;
use fixedbitset::FixedBitSet;

/// Whether the elementary stream data of a record is currently aligned to audio frame
/// boundaries.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SyncState {
    /// Data is being passed through to the buffer
    Synced,
    /// Data is discarded until a valid frame header is found
    Unsynced,
}

/// Elementary stream bytes still expected from the PES packet currently being received.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PesRemaining {
    /// The given number of bytes remain
    Bounded(usize),
    /// The PES packet has no declared length, and ends at the next PES header
    Unbounded,
}

impl PesRemaining {
    /// Limit the given chunk of payload to the bytes still owed to the PES packet, and reduce
    /// the amount remaining accordingly.
    pub fn take<'a>(&mut self, data: &'a [u8]) -> &'a [u8] {
        match self {
            PesRemaining::Unbounded => data,
            PesRemaining::Bounded(remaining) => {
                let len = data.len().min(*remaining);
                *remaining -= len;
                &data[..len]
            }
        }
    }
}

/// The outcome of checking a packet's continuity counter against the value expected.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ContinuityCheck {
    /// The counter had the expected value, or this is the first packet seen for the PID
    Accepted,
    /// Packets have been lost
    Gap {
        /// the counter value expected
        expected: packet::ContinuityCounter,
        /// the counter value found
        observed: packet::ContinuityCounter,
        /// `true` if the record was `Synced` before the gap, and now is not
        desynced: bool,
    },
}

/// Returned when the reassembly buffer could not accept all of the data offered.
#[derive(Debug, PartialEq, Eq, Clone, Copy, thiserror::Error)]
#[error("ES buffer full, accepted {written} bytes and rejected {rejected}")]
pub struct BufferOverflow {
    /// bytes which were appended, filling the buffer
    pub written: usize,
    /// bytes which did not fit
    pub rejected: usize,
}

/// A reassembly buffer whose length never exceeds the capacity it was created with.
#[derive(Debug)]
pub struct EsBuffer {
    data: Vec<u8>,
    capacity: usize,
}

impl EsBuffer {
    /// Allocates the full capacity up front
    pub fn with_capacity(capacity: usize) -> EsBuffer {
        EsBuffer {
            data: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append as much of the given data as fits.  If not all of it fits, the buffer is left
    /// full and the error reports how much was written.
    pub fn extend(&mut self, buf: &[u8]) -> Result<(), BufferOverflow> {
        let space = self.capacity - self.data.len();
        if buf.len() <= space {
            self.data.extend_from_slice(buf);
            Ok(())
        } else {
            self.data.extend_from_slice(&buf[..space]);
            Err(BufferOverflow {
                written: space,
                rejected: buf.len() - space,
            })
        }
    }

    /// the buffered bytes
    pub fn data(&self) -> &[u8] {
        &self.data[..]
    }

    /// number of bytes buffered
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` if no bytes are buffered
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// maximum number of bytes which may be buffered
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// discard the buffered bytes, retaining the allocation
    pub fn clear(&mut self) {
        self.data.clear();
    }
}

/// State retained for a single elementary stream.
#[derive(Debug)]
pub struct EsRecord {
    pid: packet::Pid,
    pub(crate) continuity: Option<packet::ContinuityCounter>,
    pub(crate) state: SyncState,
    pub(crate) stream_id: Option<pes::StreamId>,
    pub(crate) pes_remaining: PesRemaining,
    pub(crate) skip_rest: bool,
    pub(crate) pts: Option<pes::Timestamp>,
    pub(crate) dts: Option<pes::Timestamp>,
    pub(crate) buffer: EsBuffer,
}

impl EsRecord {
    fn new(pid: packet::Pid, buffer_capacity: usize) -> EsRecord {
        EsRecord {
            pid,
            continuity: None,
            state: SyncState::Synced,
            stream_id: None,
            pes_remaining: PesRemaining::Bounded(0),
            skip_rest: false,
            pts: None,
            dts: None,
            buffer: EsBuffer::with_capacity(buffer_capacity),
        }
    }

    /// The PID whose packets carry this stream
    pub fn pid(&self) -> packet::Pid {
        self.pid
    }

    /// current synchronisation state
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// the counter value expected on the next packet, or `None` if no packet has yet been seen
    pub fn expected_continuity(&self) -> Option<packet::ContinuityCounter> {
        self.continuity
    }

    /// The `stream_id` of the first PES header seen on this PID, which is the only stream
    /// extracted
    pub fn stream_id(&self) -> Option<pes::StreamId> {
        self.stream_id
    }

    /// bytes still expected from the current PES packet
    pub fn pes_remaining(&self) -> PesRemaining {
        self.pes_remaining
    }

    /// the PTS of the most recent PES header, if it had one
    pub fn pts(&self) -> Option<pes::Timestamp> {
        self.pts
    }

    /// the DTS of the most recent PES header, if it had one
    pub fn dts(&self) -> Option<pes::Timestamp> {
        self.dts
    }

    /// the bytes buffered, awaiting a flush
    pub fn buffer(&self) -> &EsBuffer {
        &self.buffer
    }

    /// Compare the counter of a newly received packet with the value expected.  On a mismatch a
    /// `Synced` record becomes `Unsynced`.  In every case the counter value following the
    /// observed one becomes the value expected next.
    pub fn check_continuity(&mut self, observed: packet::ContinuityCounter) -> ContinuityCheck {
        let result = match self.continuity {
            Some(expected) if expected != observed => {
                let desynced = self.state == SyncState::Synced;
                self.state = SyncState::Unsynced;
                ContinuityCheck::Gap {
                    expected,
                    observed,
                    desynced,
                }
            }
            _ => ContinuityCheck::Accepted,
        };
        self.continuity = Some(observed.next());
        result
    }

    /// Drop to `Unsynced`, so that data is discarded until the next frame header.
    pub fn desync(&mut self) {
        self.state = SyncState::Unsynced;
    }
}

/// The elementary streams being extracted, holding at most a fixed number of records.
///
/// Records are created on demand and never removed.
pub struct EsRegistry {
    records: Vec<EsRecord>,
    present: FixedBitSet,
    max_streams: usize,
    buffer_capacity: usize,
}

impl EsRegistry {
    /// Space for `max_streams` records is allocated immediately; each record allocates its
    /// `buffer_capacity` reassembly buffer when created.
    pub fn new(max_streams: usize, buffer_capacity: usize) -> EsRegistry {
        EsRegistry {
            records: Vec::with_capacity(max_streams),
            present: FixedBitSet::with_capacity(packet::Pid::PID_COUNT),
            max_streams,
            buffer_capacity,
        }
    }

    /// `true` if a record exists for the given PID
    pub fn contains(&self, pid: packet::Pid) -> bool {
        self.present.contains(usize::from(pid))
    }

    /// The record for the given PID, if one exists
    pub fn get(&self, pid: packet::Pid) -> Option<&EsRecord> {
        if !self.contains(pid) {
            return None;
        }
        self.records.iter().find(|r| r.pid == pid)
    }

    /// The record for the given PID, if one exists
    pub fn get_mut(&mut self, pid: packet::Pid) -> Option<&mut EsRecord> {
        if !self.contains(pid) {
            return None;
        }
        self.records.iter_mut().find(|r| r.pid == pid)
    }

    /// The record for the given PID, creating it if necessary, or `TableOverflow` if a new
    /// record is needed but the registry is full.
    pub fn find_or_create(&mut self, pid: packet::Pid) -> Result<&mut EsRecord, TableOverflow> {
        if let Some(idx) = self.position(pid) {
            return Ok(&mut self.records[idx]);
        }
        if self.records.len() >= self.max_streams {
            return Err(TableOverflow {
                table: "ES registry",
                capacity: self.max_streams,
                pid,
            });
        }
        self.present.insert(usize::from(pid));
        self.records.push(EsRecord::new(pid, self.buffer_capacity));
        let last = self.records.len() - 1;
        Ok(&mut self.records[last])
    }

    fn position(&self, pid: packet::Pid) -> Option<usize> {
        if !self.contains(pid) {
            return None;
        }
        self.records.iter().position(|r| r.pid == pid)
    }

    /// all records, in order of creation
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut EsRecord> {
        self.records.iter_mut()
    }

    /// number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// `true` if there are no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
