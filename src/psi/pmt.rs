//! Types related to the _Program Map Table_

use crate::packet;
use crate::packet::PidRange;
use crate::psi;
use crate::StreamType;
use crate::TableOverflow;
use std::fmt;

/// Sections of the _Program Map Table_ give details of the streams within a particular program
pub struct PmtSection<'buf> {
    data: &'buf [u8],
}
impl<'buf> fmt::Debug for PmtSection<'buf> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("PmtSection")
            .field("pcr_pid", &self.pcr_pid())
            .field("program_info_length", &self.program_info_length())
            .field("streams", &StreamsDebug(self))
            .finish()
    }
}
struct StreamsDebug<'buf>(&'buf PmtSection<'buf>);
impl<'buf> fmt::Debug for StreamsDebug<'buf> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_list().entries(self.0.streams()).finish()
    }
}

impl<'buf> PmtSection<'buf> {
    /// The `table_id` of Program Map Sections
    pub const TABLE_ID: u8 = 0x02;

    const HEADER_SIZE: usize = 4;

    /// Wrap the body of the given section, failing if it is not a Program Map Section, or is too
    /// short to hold the fixed PMT fields and the program descriptors.
    pub fn from_section(section: &psi::Section<'buf>) -> Result<PmtSection<'buf>, psi::PsiError> {
        section.expect_table_id(Self::TABLE_ID)?;
        let data = section.body();
        if data.len() < Self::HEADER_SIZE {
            return Err(psi::PsiError::NotEnoughData {
                field: "program_map_section",
                expected: Self::HEADER_SIZE,
                actual: data.len(),
            });
        }
        let result = PmtSection { data };
        let descriptor_end = Self::HEADER_SIZE + result.program_info_length() as usize;
        if descriptor_end > data.len() {
            return Err(psi::PsiError::NotEnoughData {
                field: "program_info",
                expected: descriptor_end,
                actual: data.len(),
            });
        }
        Ok(result)
    }

    /// Returns the Pid of packets that will contain the Program Clock Reference for this program
    pub fn pcr_pid(&self) -> packet::Pid {
        packet::Pid::from_masked(u16::from(self.data[0]) << 8 | u16::from(self.data[1]))
    }

    /// Number of bytes of program-level descriptors, which are skipped.
    pub fn program_info_length(&self) -> u16 {
        u16::from(self.data[2] & 0b0000_1111) << 8 | u16::from(self.data[3])
    }

    /// Returns an iterator over the streams of which this program is composed.  An entry whose
    /// `ES_info_length` overruns the section produces an error and ends the iteration.
    pub fn streams(&self) -> StreamInfoIter<'buf> {
        let descriptor_end = Self::HEADER_SIZE + self.program_info_length() as usize;
        StreamInfoIter::new(&self.data[descriptor_end..])
    }
}

/// Iterator over the `StreamInfo` entries in a `PmtSection`.
pub struct StreamInfoIter<'buf> {
    buf: &'buf [u8],
}
impl<'buf> StreamInfoIter<'buf> {
    fn new(buf: &'buf [u8]) -> StreamInfoIter<'buf> {
        StreamInfoIter { buf }
    }
}
impl<'buf> Iterator for StreamInfoIter<'buf> {
    type Item = Result<StreamInfo<'buf>, psi::PsiError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.is_empty() {
            return None;
        }
        match StreamInfo::from_bytes(self.buf) {
            Ok((stream_info, info_len)) => {
                self.buf = &self.buf[info_len..];
                Some(Ok(stream_info))
            }
            Err(e) => {
                self.buf = &self.buf[0..0];
                Some(Err(e))
            }
        }
    }
}

/// Details of a particular elementary stream within a program.
///
///  - `stream_type` gives an indication of the kind of content carried within the stream
///  - The `elementary_pid` property allows us to find Transport Stream packets that belong to the
///    elementary stream
///  - the `ES_info` descriptor bytes are not interpreted, but are summarised by
///    `descriptor_summary()`
pub struct StreamInfo<'buf> {
    data: &'buf [u8],
}

impl<'buf> StreamInfo<'buf> {
    const HEADER_SIZE: usize = 5;

    fn from_bytes(data: &'buf [u8]) -> Result<(StreamInfo<'buf>, usize), psi::PsiError> {
        if data.len() < Self::HEADER_SIZE {
            return Err(psi::PsiError::NotEnoughData {
                field: "stream_info",
                expected: Self::HEADER_SIZE,
                actual: data.len(),
            });
        }
        let result = StreamInfo { data };
        let descriptor_end = Self::HEADER_SIZE + result.es_info_length() as usize;
        if descriptor_end > data.len() {
            return Err(psi::PsiError::NotEnoughData {
                field: "ES_info",
                expected: descriptor_end,
                actual: data.len(),
            });
        }
        Ok((
            StreamInfo {
                data: &data[..descriptor_end],
            },
            descriptor_end,
        ))
    }

    /// The type of this stream
    pub fn stream_type(&self) -> StreamType {
        self.data[0].into()
    }
    /// The Pid that will be used for TS packets containing the data of this stream
    pub fn elementary_pid(&self) -> packet::Pid {
        packet::Pid::from_masked(u16::from(self.data[1]) << 8 | u16::from(self.data[2]))
    }
    /// Number of descriptor bytes attached to this stream
    pub fn es_info_length(&self) -> u16 {
        u16::from(self.data[3] & 0b0000_1111) << 8 | u16::from(self.data[4])
    }
    /// The raw descriptor bytes attached to this stream
    pub fn descriptor_data(&self) -> &'buf [u8] {
        &self.data[Self::HEADER_SIZE..]
    }
    /// The descriptor bytes folded big-endian into a single value; only the final four bytes
    /// contribute.
    pub fn descriptor_summary(&self) -> u32 {
        self.descriptor_data()
            .iter()
            .fold(0, |acc, &b| acc << 8 | u32::from(b))
    }
}
impl<'buf> fmt::Debug for StreamInfo<'buf> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("StreamInfo")
            .field("stream_type", &self.stream_type())
            .field("elementary_pid", &self.elementary_pid())
            .field("es_info_length", &self.es_info_length())
            .finish()
    }
}

/// An elementary stream declared by the program map table, as retained in a `PmtTable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmtEntry {
    /// kind of content carried by the stream
    pub stream_type: StreamType,
    /// PID of the packets carrying the stream
    pub pid: packet::Pid,
    /// number of descriptor bytes the PMT gave for the stream
    pub es_info_length: u16,
    /// summary of the descriptor bytes, see `StreamInfo::descriptor_summary()`
    pub descriptor: u32,
}

impl<'buf> From<&StreamInfo<'buf>> for PmtEntry {
    fn from(info: &StreamInfo<'buf>) -> Self {
        PmtEntry {
            stream_type: info.stream_type(),
            pid: info.elementary_pid(),
            es_info_length: info.es_info_length(),
            descriptor: info.descriptor_summary(),
        }
    }
}

/// The elementary streams of the active program, in the order the PMT listed them, holding no
/// more than a fixed number of entries.
#[derive(Debug)]
pub struct PmtTable {
    entries: Vec<PmtEntry>,
    capacity: usize,
}

impl PmtTable {
    /// Allocates space for `capacity` entries up front.
    pub fn with_capacity(capacity: usize) -> PmtTable {
        PmtTable {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry, or fail if the table already holds its maximum number of entries.
    pub fn push(&mut self, entry: PmtEntry) -> Result<(), TableOverflow> {
        if self.entries.len() >= self.capacity {
            return Err(TableOverflow {
                table: "PMT table",
                capacity: self.capacity,
                pid: entry.pid,
            });
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Remove all entries, prior to decoding a new PMT section.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The entries, in the order they were pushed
    pub fn entries(&self) -> &[PmtEntry] {
        &self.entries[..]
    }

    /// Number of entries held
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if no entries are held
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The smallest PID range covering every entry with the given `stream_type`, or `None` if
    /// there are no such entries.  Entries of other types between the matching PIDs will also
    /// fall within the range.
    pub fn pid_window(&self, stream_type: StreamType) -> Option<PidRange> {
        self.entries
            .iter()
            .filter(|e| e.stream_type == stream_type)
            .fold(None, |window: Option<PidRange>, e| match window {
                None => Some(PidRange::single(e.pid)),
                Some(w) => Some(w.include(e.pid)),
            })
    }
}
