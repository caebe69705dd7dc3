//! A [`Packet`](./struct.Packet.html) struct and associated infrastructure to read the fixed
//! header fields of an MPEG Transport Stream packet

use std::fmt;

/// the different values indicating whether a `Packet`'s `payload()` method will return
/// `Some` or `None`, and whether an adaptation field precedes the payload.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum AdaptationControl {
    /// This value is used if the transport stream packet `adaptation_control` field uses the value
    /// `0b00`, which is not defined by ISO/IEC 13818-1.
    Reserved,
    /// indicates that this packet contains a payload, but not an adaptation field
    PayloadOnly,
    /// indicates that this packet contains an adaptation field, but not a payload
    AdaptationFieldOnly,
    /// indicates that this packet contains both an adaptation field and a payload
    AdaptationFieldAndPayload,
}

impl AdaptationControl {
    #[inline(always)]
    fn from(val: u8) -> AdaptationControl {
        match val & 0b11 {
            0 => AdaptationControl::Reserved,
            1 => AdaptationControl::PayloadOnly,
            2 => AdaptationControl::AdaptationFieldOnly,
            _ => AdaptationControl::AdaptationFieldAndPayload,
        }
    }
}

/// Indicates content scrambling in use, if any.
///
/// Actual content scrambling schemes, indicated through the `u8` value in the `Undefined`
/// variant, are undefined in ISO/IEC 13818-1 (left to be described by other standards).
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum TransportScramblingControl {
    /// The stream is not scrambled.
    NotScrambled,
    /// The stream is scrambled using a scheme not defined in ISO/IEC 13818-1.
    Undefined(u8),
}

impl TransportScramblingControl {
    fn from(val: u8) -> TransportScramblingControl {
        match val & 0b11 {
            0 => TransportScramblingControl::NotScrambled,
            v => TransportScramblingControl::Undefined(v),
        }
    }

    /// `true` for any value other than `NotScrambled`
    pub fn is_scrambled(self) -> bool {
        self != TransportScramblingControl::NotScrambled
    }
}

/// A counter value used within a transport stream to detect discontinuities in a sequence of packets.
/// The continuity counter should increase by one for each packet with a given PID for which
/// `adaptation_control` indicates that a payload should be present.
///
/// See [`Packet.continuity_counter()`](struct.Packet.html#method.continuity_counter)
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct ContinuityCounter {
    val: u8,
}

impl From<u8> for ContinuityCounter {
    #[inline]
    fn from(count: u8) -> ContinuityCounter {
        ContinuityCounter::new(count)
    }
}

impl ContinuityCounter {
    /// Only the low 4 bits of the given value are used.
    #[inline]
    pub fn new(count: u8) -> ContinuityCounter {
        ContinuityCounter {
            val: count & 0b1111,
        }
    }

    /// Returns this counter's value, which will be between 0 and 15 inclusive.
    #[inline]
    pub fn count(self) -> u8 {
        self.val
    }

    /// The counter value expected on the next packet, wrapping from 15 back around to 0.
    ///
    /// ```rust
    /// # use mpeg2ts_es::packet::ContinuityCounter;
    /// assert_eq!(ContinuityCounter::new(0), ContinuityCounter::new(15).next());
    /// ```
    #[inline]
    pub fn next(self) -> ContinuityCounter {
        ContinuityCounter {
            val: (self.val + 1) & 0b1111,
        }
    }

    /// true iff the given `ContinuityCounter` value follows this one.  Note that the maximum counter
    /// value is 15, and the counter 'wraps around':
    ///
    /// ```rust
    /// # use mpeg2ts_es::packet::ContinuityCounter;
    /// let a = ContinuityCounter::new(0);
    /// let b = ContinuityCounter::new(15);
    /// assert!(a.follows(b));  // after 15, counter wraps around to 0
    /// ```
    #[inline]
    pub fn follows(self, other: ContinuityCounter) -> bool {
        other.next() == self
    }
}

/// A Packet Identifier value, between `0x0000` and `0x1fff`.
///
/// PID values identify a particular sub-stream within the overall Transport Stream.
///
/// As returned by the [`Packet::pid`](struct.Packet.html#method.pid) method for example.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(u16);
impl Pid {
    /// The largest possible PID value, `0x1fff`.
    pub const MAX_VALUE: u16 = 0x1fff;

    /// The total number of distinct PID values, `0x2000` (equal to `MAX_VALUE` + 1)
    pub const PID_COUNT: usize = (Self::MAX_VALUE + 1) as usize;

    /// Panics if the given value is greater than `Pid::MAX_VALUE`.
    pub const fn new(pid: u16) -> Pid {
        assert!(pid <= Pid::MAX_VALUE);
        Pid(pid)
    }

    /// Masks the given value to 13 bits, as when reading a PID field out of a table entry.
    #[inline]
    pub(crate) fn from_masked(pid: u16) -> Pid {
        Pid(pid & Pid::MAX_VALUE)
    }
}
impl TryFrom<u16> for Pid {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        if value <= Pid::MAX_VALUE {
            Ok(Pid(value))
        } else {
            Err(())
        }
    }
}
impl From<Pid> for u16 {
    #[inline]
    fn from(pid: Pid) -> Self {
        pid.0
    }
}
impl From<Pid> for usize {
    #[inline]
    fn from(pid: Pid) -> Self {
        pid.0 as usize
    }
}
impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "Pid({:04x})", self.0)
    }
}
impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", self.0)
    }
}

/// An inclusive range of `Pid` values, `min..=max`, used to select which packets carry the
/// elementary streams to be extracted.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct PidRange {
    /// lowest PID in the range
    pub min: Pid,
    /// highest PID in the range
    pub max: Pid,
}
impl PidRange {
    /// A range containing just the given PID.
    pub fn single(pid: Pid) -> PidRange {
        PidRange { min: pid, max: pid }
    }

    /// true if `min <= pid <= max`
    #[inline]
    pub fn contains(&self, pid: Pid) -> bool {
        self.min <= pid && pid <= self.max
    }

    /// Widens the range, if required, so that it includes the given PID.
    pub fn include(self, pid: Pid) -> PidRange {
        PidRange {
            min: self.min.min(pid),
            max: self.max.max(pid),
        }
    }
}

/// Problems that prevent the fixed header of a transport stream packet from being read.
#[derive(Debug, PartialEq, Eq, Clone, Copy, thiserror::Error)]
pub enum PacketError {
    /// The first byte of the packet was not the sync byte `0x47`, so the caller has lost
    /// alignment with the 188-byte packet cadence.
    #[error("expected sync byte 0x47, found {found:#04x}")]
    SyncLoss {
        /// the byte found where the sync byte should have been
        found: u8,
    },
    /// The buffer is too short to hold even the fixed 4-byte packet header.
    #[error("{len} bytes is too short for a transport stream packet header")]
    Truncated {
        /// the length of the buffer given
        len: usize,
    },
}

/// A transport stream `Packet` is a wrapper around a byte slice which allows the bytes to be
/// interpreted as a packet structure per _ISO/IEC 13818-1, Section 2.4.3.3_.
///
/// The slice will normally be exactly `Packet::SIZE` bytes, but the final read from a stream
/// may be shorter; no accessor will read beyond the end of the slice it was given.
pub struct Packet<'buf> {
    buf: &'buf [u8],
}

const FIXED_HEADER_SIZE: usize = 4;
// when AF present, a 1-byte 'length' field precedes the content,
const ADAPTATION_FIELD_OFFSET: usize = FIXED_HEADER_SIZE + 1;

impl<'buf> Packet<'buf> {
    /// The value `0x47`, which must appear in the first byte of every transport stream packet.
    pub const SYNC_BYTE: u8 = 0x47;

    /// The fixed 188 byte size of a transport stream packet.
    pub const SIZE: usize = 188;

    /// Payload capacity of a packet that also carries an adaptation field of zero length; an
    /// amount of PES data smaller than this will certainly fit in a single packet.
    pub const MIN_PAYLOAD_CAPACITY: usize = Self::SIZE - ADAPTATION_FIELD_OFFSET;

    /// returns `true` if the given value is a valid synchronisation byte, the value
    /// `Packet::SYNC_BYTE` (0x47), which must appear at the start of every transport stream packet.
    #[inline(always)]
    pub fn is_sync_byte(b: u8) -> bool {
        b == Self::SYNC_BYTE
    }

    /// Wraps the given buffer, which must start with the sync byte and hold at least the 4-byte
    /// fixed header.  Bytes beyond `Packet::SIZE` are ignored.
    #[inline(always)]
    pub fn try_new(buf: &'buf [u8]) -> Result<Packet<'buf>, PacketError> {
        match buf.first() {
            Some(&b) if !Self::is_sync_byte(b) => return Err(PacketError::SyncLoss { found: b }),
            _ => (),
        }
        if buf.len() < FIXED_HEADER_SIZE {
            return Err(PacketError::Truncated { len: buf.len() });
        }
        let end = buf.len().min(Self::SIZE);
        Ok(Packet { buf: &buf[..end] })
    }

    /// *May* have been set if some previous processing of this TS data detected at least
    /// 1 uncorrectable bit error in this TS packet.
    #[inline]
    pub fn transport_error_indicator(&self) -> bool {
        self.buf[1] & 0b1000_0000 != 0
    }

    /// a structure larger than a single packet payload needs to be split across multiple packets,
    /// `payload_unit_start()` indicates if this packet payload contains the start of the
    /// structure.  If `false`, this packets payload is a continuation of a structure which began
    /// in an earlier packet within the transport stream.
    #[inline]
    pub fn payload_unit_start_indicator(&self) -> bool {
        self.buf[1] & 0b0100_0000 != 0
    }

    /// When `1`, this TS packet has higher priority than other packets of the the same PID having
    /// PID `0`.
    pub fn transport_priority(&self) -> bool {
        self.buf[1] & 0b0010_0000 != 0
    }

    /// The sub-stream to which a particular packet belongs is indicated by this Packet Identifier
    /// value.
    #[inline]
    pub fn pid(&self) -> Pid {
        Pid(u16::from(self.buf[1] & 0b0001_1111) << 8 | u16::from(self.buf[2]))
    }

    /// Value of the _transport_scrambling_control_ field.
    pub fn transport_scrambling_control(&self) -> TransportScramblingControl {
        TransportScramblingControl::from(self.buf[3] >> 6)
    }

    /// The returned enum value indicates if an adaptation field, a payload or both are present.
    #[inline]
    pub fn adaptation_control(&self) -> AdaptationControl {
        AdaptationControl::from(self.buf[3] >> 4)
    }

    /// Each packet with a given `pid()` value within a transport stream should have a continuity
    /// counter value which increases by 1 from the last counter value seen.  Unexpected continuity
    /// counter values allow the receiver of the transport stream to detect discontinuities in the
    /// stream (e.g. due to data loss during transmission).
    #[inline]
    pub fn continuity_counter(&self) -> ContinuityCounter {
        ContinuityCounter::new(self.buf[3] & 0b0000_1111)
    }

    /// Value of the _adaptation_field_length_ byte, or `None` if `adaptation_control()` says
    /// there is no adaptation field (or the packet is too short to hold the length byte).
    pub fn adaptation_field_length(&self) -> Option<usize> {
        match self.adaptation_control() {
            AdaptationControl::Reserved | AdaptationControl::PayloadOnly => None,
            AdaptationControl::AdaptationFieldOnly
            | AdaptationControl::AdaptationFieldAndPayload => {
                self.buf.get(FIXED_HEADER_SIZE).map(|&l| l as usize)
            }
        }
    }

    /// The data contained within the packet, not including the packet headers or adaptation
    /// field.  Not all packets have a payload, and `None` is returned if `adaptation_control()`
    /// indicates that no payload is present, or if the adaptation field length leaves no room
    /// for one.  If `Some` payload is returned, it is guaranteed not to be an empty slice.
    #[inline(always)]
    pub fn payload(&self) -> Option<&'buf [u8]> {
        let offset = match self.adaptation_control() {
            AdaptationControl::Reserved | AdaptationControl::AdaptationFieldOnly => return None,
            AdaptationControl::PayloadOnly => FIXED_HEADER_SIZE,
            AdaptationControl::AdaptationFieldAndPayload => {
                ADAPTATION_FIELD_OFFSET + self.adaptation_field_length()?
            }
        };
        if offset < self.buf.len() {
            Some(&self.buf[offset..])
        } else {
            None
        }
    }

    /// borrow a reference to the underlying buffer of this packet
    pub fn buffer(&self) -> &'buf [u8] {
        self.buf
    }
}

impl<'buf> fmt::Debug for Packet<'buf> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("pid", &self.pid())
            .field("transport_error_indicator", &self.transport_error_indicator())
            .field(
                "payload_unit_start_indicator",
                &self.payload_unit_start_indicator(),
            )
            .field(
                "transport_scrambling_control",
                &self.transport_scrambling_control(),
            )
            .field("adaptation_control", &self.adaptation_control())
            .field("continuity_counter", &self.continuity_counter())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use crate::packet::*;
    use assert_matches::assert_matches;

    #[test]
    fn pid() {
        assert!(Pid::try_from(0x2000).is_err());
        assert_eq!(Ok(Pid::new(0x1fff)), Pid::try_from(0x1fff));
    }

    #[test]
    fn zero_len() {
        let buf = [0u8; 0];
        assert_matches!(
            Packet::try_new(&buf[..]),
            Err(PacketError::Truncated { len: 0 })
        );
    }

    #[test]
    fn bad_sync_byte() {
        let mut buf = [0u8; Packet::SIZE];
        buf[0] = 0x48;
        assert_matches!(
            Packet::try_new(&buf[..]),
            Err(PacketError::SyncLoss { found: 0x48 })
        );
    }

    #[test]
    fn test_xmas_tree() {
        let mut buf = [0xffu8; Packet::SIZE];
        buf[0] = Packet::SYNC_BYTE;
        buf[4] = 28; // adaptation_field_length
        let pk = Packet::try_new(&buf[..]).unwrap();
        assert_eq!(u16::from(pk.pid()), 0b1111111111111u16);
        assert!(pk.transport_error_indicator());
        assert!(pk.payload_unit_start_indicator());
        assert!(pk.transport_priority());
        assert_eq!(
            pk.transport_scrambling_control(),
            TransportScramblingControl::Undefined(3)
        );
        assert_eq!(
            pk.adaptation_control(),
            AdaptationControl::AdaptationFieldAndPayload
        );
        assert_eq!(pk.continuity_counter().count(), 0b1111);
        assert_eq!(pk.adaptation_field_length(), Some(28));
        assert_eq!(pk.payload().map(|p| p.len()), Some(Packet::SIZE - 5 - 28));
    }

    // (byte1, byte2, byte3) -> (pid, tei, pusi, scrambling, adaptation, cc)
    const HEADER_VECTORS: &[([u8; 3], u16, bool, bool, u8, AdaptationControl, u8)] = &[
        ([0x00, 0x00, 0x10], 0x0000, false, false, 0, AdaptationControl::PayloadOnly, 0),
        ([0x41, 0x00, 0x17], 0x0100, false, true, 0, AdaptationControl::PayloadOnly, 7),
        ([0x81, 0x02, 0x2f], 0x0102, true, false, 0, AdaptationControl::AdaptationFieldOnly, 15),
        ([0x1f, 0xff, 0x30], 0x1fff, false, false, 0, AdaptationControl::AdaptationFieldAndPayload, 0),
        ([0x12, 0x34, 0x95], 0x1234, false, false, 2, AdaptationControl::PayloadOnly, 5),
        ([0x60, 0x01, 0xc3], 0x0001, false, true, 3, AdaptationControl::Reserved, 3),
    ];

    #[test]
    fn header_fields() {
        for (bytes, pid, tei, pusi, scrambling, adaptation, cc) in HEADER_VECTORS {
            let mut buf = [0u8; Packet::SIZE];
            buf[0] = Packet::SYNC_BYTE;
            buf[1..4].copy_from_slice(&bytes[..]);
            let pk = Packet::try_new(&buf[..]).unwrap();
            assert_eq!(Pid::new(*pid), pk.pid(), "pid for {:02x?}", bytes);
            assert_eq!(*tei, pk.transport_error_indicator(), "tei for {:02x?}", bytes);
            assert_eq!(*pusi, pk.payload_unit_start_indicator(), "pusi for {:02x?}", bytes);
            let expected_scrambling = if *scrambling == 0 {
                TransportScramblingControl::NotScrambled
            } else {
                TransportScramblingControl::Undefined(*scrambling)
            };
            assert_eq!(expected_scrambling, pk.transport_scrambling_control());
            assert_eq!(*adaptation, pk.adaptation_control(), "afc for {:02x?}", bytes);
            assert_eq!(*cc, pk.continuity_counter().count(), "cc for {:02x?}", bytes);
        }
    }

    #[test]
    fn payload_only() {
        let mut buf = [0u8; Packet::SIZE];
        buf[0] = Packet::SYNC_BYTE;
        buf[3] = 0x10;
        let pk = Packet::try_new(&buf[..]).unwrap();
        assert_eq!(pk.adaptation_field_length(), None);
        assert_eq!(pk.payload().unwrap().len(), 184);
    }

    #[test]
    fn adaptation_field_only_has_no_payload() {
        let mut buf = [0u8; Packet::SIZE];
        buf[0] = Packet::SYNC_BYTE;
        buf[3] = 0x20;
        buf[4] = 183;
        let pk = Packet::try_new(&buf[..]).unwrap();
        assert!(pk.payload().is_none());
    }

    #[test]
    fn oversized_adaptation_field() {
        let mut buf = [0u8; Packet::SIZE];
        buf[0] = Packet::SYNC_BYTE;
        buf[3] = 0x30;
        buf[4] = 183; // leaves no room for payload
        let pk = Packet::try_new(&buf[..]).unwrap();
        assert!(pk.payload().is_none());
        buf[4] = 200; // runs past the end of the packet
        let pk = Packet::try_new(&buf[..]).unwrap();
        assert!(pk.payload().is_none());
    }

    #[test]
    fn short_final_packet() {
        let mut buf = [0u8; 20];
        buf[0] = Packet::SYNC_BYTE;
        buf[3] = 0x10;
        let pk = Packet::try_new(&buf[..]).unwrap();
        assert_eq!(pk.payload().unwrap().len(), 16);
    }

    #[test]
    fn continuity_counter_wraps() {
        assert!(ContinuityCounter::new(0).follows(ContinuityCounter::new(15)));
        assert!(!ContinuityCounter::new(3).follows(ContinuityCounter::new(1)));
        assert_eq!(4, ContinuityCounter::new(3).next().count());
    }

    #[test]
    fn pid_range() {
        let r = PidRange::single(Pid::new(0x102)).include(Pid::new(0x100));
        assert!(r.contains(Pid::new(0x101)));
        assert!(!r.contains(Pid::new(0x103)));
        assert_eq!(Pid::new(0x100), r.min);
    }
}
