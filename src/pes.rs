//! Support for Packetised Elementary Stream syntax within Transport Stream packet payloads.
//!
//! Only the header at the start of each PES packet is interpreted here; reassembly of the
//! elementary stream from the PES payload carried by successive TS packets is the job of the
//! synchroniser driven by [`Demultiplex`](../demultiplex/struct.Demultiplex.html).

use std::fmt;

/// Type for the length of a PES packet
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PesLength {
    /// The PES packet continues until the next TS packet that has `payload_unit_start_indicator`
    /// set.
    Unbounded,
    /// The PES packet's length in bytes, counted from the byte following the length field (likely
    /// to exceed the size of the TS packet that contains the PES packet header).
    Bounded(u16),
}

/// The `stream_id` value from a PES header, per _ISO/IEC 13818-1_, _Table 2-22_.
#[derive(PartialEq, Eq, Clone, Copy, Hash)]
pub struct StreamId(u8);

impl StreamId {
    /// Wrap the given `stream_id` value.
    pub const fn new(id: u8) -> StreamId {
        StreamId(id)
    }

    /// the raw `stream_id` value
    pub fn value(self) -> u8 {
        self.0
    }

    /// `true` for the range `0xC0` to `0xDF`, which identifies _ISO/IEC 13818-3_ or
    /// _ISO/IEC 11172-3_ audio streams.
    pub fn is_mpeg_audio(self) -> bool {
        matches!(self.0, 0b1100_0000..=0b1101_1111)
    }
}

impl From<u8> for StreamId {
    fn from(v: u8) -> Self {
        StreamId(v)
    }
}

impl fmt::Debug for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamId({:#04x})", self.0)
    }
}

/// Problems found in the header at the start of a PES packet, each of which means the PES
/// payload in this TS packet can't be used.
#[derive(Debug, PartialEq, Eq, Clone, Copy, thiserror::Error)]
pub enum PesError {
    /// There is not enough data in the buffer to hold the expected syntax element
    #[error("PES header needs {requested} bytes, only {available} available")]
    NotEnoughData {
        /// the number of bytes required to hold the requested syntax element
        requested: usize,
        /// the number of bytes actually remaining in the buffer
        available: usize,
    },
    /// The buffer did not begin with the `packet_start_code_prefix` value `0x000001`
    #[error("invalid packet_start_code_prefix {found:#08x}, expected 0x000001")]
    StartCodeMissing {
        /// the 24-bit value actually present
        found: u32,
    },
    /// The two bits preceding the scrambling control field were not `0b10`
    #[error("invalid PES header check bits {found:#04b}, expected 0b10")]
    CheckBitsInvalid {
        /// the two bits actually present
        found: u8,
    },
    /// The `PES_scrambling_control` field indicates that the payload is scrambled
    #[error("PES payload is scrambled (PES_scrambling_control={0})")]
    Scrambled(u8),
    /// The `pts_dts_flags` field of the PES packet signals that DTS is present and PTS is not,
    /// which not a valid combination
    #[error("PTS_DTS_flags value 0b01 is forbidden")]
    PtsDtsFlagsInvalid,
}

/// Detail about the formatting problem which prevented a [`Timestamp`](struct.Timestamp.html)
/// value being parsed.
#[derive(PartialEq, Eq, Debug, Clone, Copy, thiserror::Error)]
pub enum TimestampError {
    /// Parsing the timestamp failed because a 'marker-bit' value within the timestamp did not
    /// have the expected value
    #[error("timestamp marker bit {bit_number} not set")]
    MarkerBitNotSet {
        /// the bit-index of the bit which should have been 1, but was found to be 0
        bit_number: u8,
    },
}

/// A 33-bit Elementary Stream timestamp, used to represent PTS and DTS values which may appear in
/// an Elementary Stream header.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct Timestamp {
    val: u64,
}
impl Timestamp {
    /// The largest representable timestamp value before the timestamp wraps back around to zero.
    pub const MAX: Timestamp = Timestamp { val: (1 << 33) - 1 };

    /// 90kHz timebase in which PTS and DTS values are measured.
    pub const TIMEBASE: u64 = 90_000;

    /// The encoded size of a timestamp in a PES header.
    pub const SIZE: usize = 5;

    fn check_marker_bit(buf: &[u8], bit_number: u8) -> Result<(), TimestampError> {
        let byte_index = bit_number / 8;
        let bit_index = bit_number % 8;
        let bit_mask = 1 << (7 - bit_index);
        if buf[byte_index as usize] & bit_mask != 0 {
            Ok(())
        } else {
            Err(TimestampError::MarkerBitNotSet { bit_number })
        }
    }

    /// Parse a Time Stamp value from the 5 bytes at the start of the given slice.  The 4-bit
    /// prefix is not checked.
    ///
    /// Panics if fewer than 5 bytes given
    pub fn from_bytes(buf: &[u8]) -> Result<Timestamp, TimestampError> {
        Timestamp::check_marker_bit(buf, 7)?;
        Timestamp::check_marker_bit(buf, 23)?;
        Timestamp::check_marker_bit(buf, 39)?;
        Ok(Timestamp {
            val: (u64::from(buf[0] & 0b0000_1110) << 29)
                | u64::from(buf[1]) << 22
                | (u64::from(buf[2] & 0b1111_1110) << 14)
                | u64::from(buf[3]) << 7
                | u64::from(buf[4]) >> 1,
        })
    }

    /// Panics if the given val is greater than 2^33-1
    pub fn from_u64(val: u64) -> Timestamp {
        assert!(val <= Self::MAX.val);
        Timestamp { val }
    }

    /// produces the timestamp's value (only the low 33 bits are used)
    pub fn value(self) -> u64 {
        self.val
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = self.val * 1000 / Self::TIMEBASE;
        write!(f, "{}.{:03}s", millis / 1000, millis % 1000)
    }
}

/// Presentation Timestamp (PTS) and Decode Timestamp (DTS) values.
#[derive(PartialEq, Eq, Debug)]
pub enum PtsDts {
    /// There are no timestamps present
    None,
    /// Only the PTS is present
    PtsOnly(Result<Timestamp, TimestampError>),
    /// Both presentation and decode timestamps are present
    Both {
        /// Presentation Time Stamp
        pts: Result<Timestamp, TimestampError>,
        /// Decode Time Stamp
        dts: Result<Timestamp, TimestampError>,
    },
}

impl PtsDts {
    /// The PTS, if present and well formed
    pub fn pts(&self) -> Option<Timestamp> {
        match self {
            PtsDts::None => None,
            PtsDts::PtsOnly(pts) | PtsDts::Both { pts, .. } => pts.ok(),
        }
    }

    /// The DTS, if present and well formed
    pub fn dts(&self) -> Option<Timestamp> {
        match self {
            PtsDts::Both { dts, .. } => dts.ok(),
            _ => None,
        }
    }
}

/// Header at the start of every PES packet carrying audio or video.
///
/// `from_bytes()` checks the header is usable, so the accessors never read out of bounds.  The
/// header identifies,
///
///  * The stream identifier, returned by `stream_id()`
///  * The the size of the packet, returned by `pes_packet_length()`, which may well be larger than
///    the size of the payload buffer obtained from the header (the payload is likely split across
///    multiple Transport Stream packets)
///  * Optional timestamps, returned by `pts_dts()`
pub struct PesHeader<'buf> {
    buf: &'buf [u8],
}
impl<'buf> PesHeader<'buf> {
    /// Size of the fields preceding the variable length header data.
    pub const FIXED_HEADER_SIZE: usize = 9;

    /// Wraps the given slice in a PesHeader, having checked in turn that,
    ///
    ///  * the buffer holds the fixed part of the header
    ///  * the 'start code prefix' is present
    ///  * the check bits preceding `PES_scrambling_control` are `0b10`
    ///  * the payload is not scrambled
    ///  * the buffer holds all `PES_header_data_length` bytes of optional header fields
    pub fn from_bytes(buf: &'buf [u8]) -> Result<PesHeader<'buf>, PesError> {
        if buf.len() < Self::FIXED_HEADER_SIZE {
            return Err(PesError::NotEnoughData {
                requested: Self::FIXED_HEADER_SIZE,
                available: buf.len(),
            });
        }
        let packet_start_code_prefix =
            u32::from(buf[0]) << 16 | u32::from(buf[1]) << 8 | u32::from(buf[2]);
        if packet_start_code_prefix != 1 {
            return Err(PesError::StartCodeMissing {
                found: packet_start_code_prefix,
            });
        }
        let check_bits = buf[6] >> 6;
        if check_bits != 0b10 {
            return Err(PesError::CheckBitsInvalid { found: check_bits });
        }
        let scrambling = (buf[6] >> 4) & 0b11;
        if scrambling != 0 {
            return Err(PesError::Scrambled(scrambling));
        }
        let header_end = Self::FIXED_HEADER_SIZE + buf[8] as usize;
        if buf.len() < header_end {
            return Err(PesError::NotEnoughData {
                requested: header_end,
                available: buf.len(),
            });
        }
        Ok(PesHeader { buf })
    }

    /// Indicator of the type of stream per _ISO/IEC 13818-1_, _Table 2-22_.
    pub fn stream_id(&self) -> StreamId {
        StreamId(self.buf[3])
    }

    /// The overall length of the PES packet, once all pieces from the transport stream have
    /// been collected.
    pub fn pes_packet_length(&self) -> PesLength {
        match u16::from(self.buf[4]) << 8 | u16::from(self.buf[5]) {
            0 => PesLength::Unbounded,
            l => PesLength::Bounded(l),
        }
    }

    /// Size of the optional fields which follow the fixed header.
    pub fn header_data_length(&self) -> usize {
        self.buf[8] as usize
    }

    /// The number of elementary stream bytes to take for this PES packet, `PES_packet_length`
    /// less two and less `PES_header_data_length`, or `None` if the PES packet is unbounded.
    /// Never negative, even if the declared lengths are inconsistent.
    ///
    /// Since `PES_packet_length` also counts the `PES_header_data_length` byte itself, this is
    /// one more than the size of the payload proper.
    pub fn payload_length(&self) -> Option<usize> {
        match self.pes_packet_length() {
            PesLength::Unbounded => None,
            PesLength::Bounded(len) => {
                Some((len as usize).saturating_sub(2 + self.header_data_length()))
            }
        }
    }

    fn pts_dts_flags(&self) -> u8 {
        self.buf[7] >> 6
    }

    /// Returns the timestamps present in the header, or `Err(PesError::PtsDtsFlagsInvalid)` if
    /// the flags are set to the forbidden value `0b01`, or `Err(PesError::NotEnoughData)` if the
    /// header data is too short to hold the flagged timestamps.
    pub fn pts_dts(&self) -> Result<PtsDts, PesError> {
        let header_data = &self.buf[Self::FIXED_HEADER_SIZE..self.payload_start()];
        let timestamps = |count: usize| {
            let requested = count * Timestamp::SIZE;
            if header_data.len() < requested {
                Err(PesError::NotEnoughData {
                    requested,
                    available: header_data.len(),
                })
            } else {
                Ok(&header_data[..requested])
            }
        };
        match self.pts_dts_flags() {
            0b00 => Ok(PtsDts::None),
            0b01 => Err(PesError::PtsDtsFlagsInvalid),
            0b10 => timestamps(1).map(|s| PtsDts::PtsOnly(Timestamp::from_bytes(s))),
            _ => timestamps(2).map(|s| PtsDts::Both {
                pts: Timestamp::from_bytes(&s[..Timestamp::SIZE]),
                dts: Timestamp::from_bytes(&s[Timestamp::SIZE..]),
            }),
        }
    }

    fn payload_start(&self) -> usize {
        Self::FIXED_HEADER_SIZE + self.header_data_length()
    }

    /// The elementary stream data following the header, up to the end of the buffer given to
    /// `from_bytes()`.  May be empty.
    pub fn payload(&self) -> &'buf [u8] {
        &self.buf[self.payload_start()..]
    }
}

impl<'buf> fmt::Debug for PesHeader<'buf> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PesHeader")
            .field("stream_id", &self.stream_id())
            .field("pes_packet_length", &self.pes_packet_length())
            .field("header_data_length", &self.header_data_length())
            .field("pts_dts", &self.pts_dts())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test {
    use crate::pes;
    use assert_matches::assert_matches;
    use bitstream_io::{BigEndian, BitWrite};
    use bitstream_io::{BitWriter, BE};
    use hex_literal::*;
    use std::io;

    pub(crate) fn make_test_data<F>(builder: F) -> Vec<u8>
    where
        F: Fn(&mut BitWriter<Vec<u8>, BE>) -> Result<(), io::Error>,
    {
        let data: Vec<u8> = Vec::new();
        let mut w = BitWriter::endian(data, BigEndian);
        builder(&mut w).unwrap();
        w.into_writer()
    }

    /// `ts` is a 33-bit timestamp value
    fn write_ts(w: &mut BitWriter<Vec<u8>, BE>, ts: u64, prefix: u8) -> Result<(), io::Error> {
        assert!(
            ts < 1u64 << 33,
            "ts value too large {:#x} >= {:#x}",
            ts,
            1u64 << 33
        );
        w.write(4, prefix & 0b1111)?;
        w.write(3, (ts & 0b1_1100_0000_0000_0000_0000_0000_0000_0000) >> 30)?;
        w.write(1, 1)?; // marker_bit
        w.write(15, (ts & 0b0_0011_1111_1111_1111_1000_0000_0000_0000) >> 15)?;
        w.write(1, 1)?; // marker_bit
        w.write(15, ts & 0b0_0000_0000_0000_0000_0111_1111_1111_1111)?;
        w.write(1, 1) // marker_bit
    }

    /// A complete PES packet with the given `stream_id`, an optional PTS and the given payload,
    /// with `PES_packet_length` set to match the payload size (or zero if `unbounded`).
    pub(crate) fn make_pes_packet(
        stream_id: u8,
        pts: Option<u64>,
        payload: &[u8],
        unbounded: bool,
    ) -> Vec<u8> {
        let header_data_length: u16 = if pts.is_some() { 5 } else { 0 };
        let pes_packet_length = if unbounded {
            0
        } else {
            3 + header_data_length + payload.len() as u16
        };
        let mut data = make_test_data(|w| {
            w.write(24, 1)?; // packet_start_code_prefix
            w.write(8, stream_id)?;
            w.write(16, pes_packet_length)?;
            w.write(2, 0b10)?; // check bits
            w.write(2, 0)?; // PES_scrambling_control
            w.write(1, 0)?; // PES_priority
            w.write(1, 1)?; // data_alignment_indicator
            w.write(1, 0)?; // copyright
            w.write(1, 0)?; // original_or_copy
            w.write(2, if pts.is_some() { 0b10 } else { 0b00 })?; // PTS_DTS_flags
            w.write(6, 0)?; // remaining flags
            w.write(8, header_data_length)?; // PES_header_data_length
            if let Some(ts) = pts {
                write_ts(w, ts, 0b0010)?;
            }
            Ok(())
        });
        data.extend_from_slice(payload);
        data
    }

    #[test]
    fn pts() {
        let pts = make_test_data(|w| {
            write_ts(w, 0b1_0101_0101_0101_0101_0101_0101_0101_0101, 0b0010)
        });
        let a = pes::Timestamp::from_bytes(&pts[..]).unwrap().value();
        let b = 0b1_0101_0101_0101_0101_0101_0101_0101_0101;
        assert_eq!(
            a, b,
            "timestamp values don't match:\n  actual:{:#b}\nexpected:{:#b}",
            a, b
        );
    }

    #[test]
    fn timestamp_ones() {
        let pts = make_test_data(|w| {
            write_ts(w, 0b1_1111_1111_1111_1111_1111_1111_1111_1111, 0b0010)
        });
        let a = pes::Timestamp::from_bytes(&pts[..]).unwrap();
        assert_eq!(a, pes::Timestamp::MAX);
    }

    #[test]
    fn timestamp_bad_marker() {
        let mut pts = make_test_data(|w| write_ts(w, 1234, 0b0010));
        // make the first maker_bit (at index 7) invalid, by flipping a 1 to a 0,
        pts[0] &= 0b11111110;
        assert_matches!(
            pes::Timestamp::from_bytes(&pts[..]),
            Err(pes::TimestampError::MarkerBitNotSet { bit_number: 7 })
        )
    }

    #[test]
    fn timestamp_display() {
        assert_eq!("1.500s", pes::Timestamp::from_u64(135_000).to_string());
    }

    #[test]
    fn header_with_pts() {
        let data = make_pes_packet(0xc0, Some(0x1_2345_6789), &[0xff, 0xfb, 0x90, 0x00], false);
        let header = pes::PesHeader::from_bytes(&data[..]).unwrap();
        assert_eq!(pes::StreamId::new(0xc0), header.stream_id());
        assert!(header.stream_id().is_mpeg_audio());
        assert_eq!(pes::PesLength::Bounded(12), header.pes_packet_length());
        assert_eq!(5, header.header_data_length());
        assert_eq!(Some(5), header.payload_length());
        assert_eq!(&[0xff, 0xfb, 0x90, 0x00], header.payload());
        let pts_dts = header.pts_dts().unwrap();
        assert_eq!(Some(pes::Timestamp::from_u64(0x1_2345_6789)), pts_dts.pts());
        assert_eq!(None, pts_dts.dts());
    }

    #[test]
    fn header_without_timestamps() {
        let data = hex!("000001c0 0007 8000 00 fffb9000");
        let header = pes::PesHeader::from_bytes(&data[..]).unwrap();
        assert_eq!(pes::PtsDts::None, header.pts_dts().unwrap());
        assert_eq!(Some(5), header.payload_length());
        assert_eq!(4, header.payload().len());
    }

    #[test]
    fn unbounded() {
        let data = make_pes_packet(0xc1, None, &[0; 10], true);
        let header = pes::PesHeader::from_bytes(&data[..]).unwrap();
        assert_eq!(pes::PesLength::Unbounded, header.pes_packet_length());
        assert_eq!(None, header.payload_length());
    }

    #[test]
    fn video_stream_id_is_accepted() {
        let data = hex!("000001e0 0003 8000 00");
        let header = pes::PesHeader::from_bytes(&data[..]).unwrap();
        assert!(!header.stream_id().is_mpeg_audio());
        assert!(header.payload().is_empty());
    }

    #[test]
    fn too_short() {
        assert_matches!(
            pes::PesHeader::from_bytes(&hex!("000001c0000780")[..]),
            Err(pes::PesError::NotEnoughData {
                requested: 9,
                available: 7
            })
        );
    }

    #[test]
    fn bad_start_code() {
        assert_matches!(
            pes::PesHeader::from_bytes(&hex!("000002c0 0007 8000 00 fffb9000")[..]),
            Err(pes::PesError::StartCodeMissing { found: 2 })
        );
    }

    #[test]
    fn bad_check_bits() {
        assert_matches!(
            pes::PesHeader::from_bytes(&hex!("000001c0 0007 4000 00 fffb9000")[..]),
            Err(pes::PesError::CheckBitsInvalid { found: 0b01 })
        );
    }

    #[test]
    fn scrambled() {
        assert_matches!(
            pes::PesHeader::from_bytes(&hex!("000001c0 0007 9000 00 fffb9000")[..]),
            Err(pes::PesError::Scrambled(1))
        );
    }

    #[test]
    fn header_data_overruns_buffer() {
        assert_matches!(
            pes::PesHeader::from_bytes(&hex!("000001c0 0010 8080 05 2100")[..]),
            Err(pes::PesError::NotEnoughData {
                requested: 14,
                available: 11
            })
        );
    }

    #[test]
    fn pts_flagged_but_missing() {
        let data = hex!("000001c0 0007 8080 00 fffb9000");
        let header = pes::PesHeader::from_bytes(&data[..]).unwrap();
        assert_matches!(
            header.pts_dts(),
            Err(pes::PesError::NotEnoughData {
                requested: 5,
                available: 0
            })
        );
    }

    #[test]
    fn forbidden_pts_dts_flags() {
        let data = hex!("000001c0 0007 8040 00 fffb9000");
        let header = pes::PesHeader::from_bytes(&data[..]).unwrap();
        assert_matches!(header.pts_dts(), Err(pes::PesError::PtsDtsFlagsInvalid));
    }

    #[test]
    fn payload_length_excludes_two_bytes_and_header_data() {
        let data = hex!("000001c0 0010 8000 00 fffb9000");
        let header = pes::PesHeader::from_bytes(&data[..]).unwrap();
        assert_eq!(Some(0x10 - 2), header.payload_length());
        let data = hex!("000001c0 0010 8080 05 2100010001 fffb9000");
        let header = pes::PesHeader::from_bytes(&data[..]).unwrap();
        assert_eq!(Some(0x10 - 2 - 5), header.payload_length());
    }

    #[test]
    fn inconsistent_length_saturates() {
        let data = hex!("000001c0 0002 8000 04 00000000");
        let header = pes::PesHeader::from_bytes(&data[..]).unwrap();
        assert_eq!(Some(0), header.payload_length());
    }
}
