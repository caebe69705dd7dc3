//! Extraction of MPEG audio _Elementary Stream_ data from MPEG2 Transport Stream packets, per the
//! _ISO/IEC 13818-1_ standard, with frame-level synchronisation against _ISO/IEC 11172-3_ /
//! _ISO/IEC 13818-3_ audio frame headers.
//!
//! # Design principals
//!
//!  * *Push based*.  The caller hands over one 188-byte packet at a time via
//!    [`Demultiplex::push_packet()`](demultiplex/struct.Demultiplex.html#method.push_packet) and
//!    decides where the bytes come from.  There is no I/O inside the demultiplexer.
//!  * *Injected collaborators*.  Elementary stream bytes are handed to an
//!    [`ElementaryStreamSink`](demultiplex/trait.ElementaryStreamSink.html) and diagnostics to a
//!    [`LogSink`](report/trait.LogSink.html); there is no global state.
//!  * *Bounded*.  The number of elementary streams tracked, the size of the program map table and
//!    the size of each per-stream reassembly buffer are all fixed when the demultiplexer is
//!    created, and exceeding them is reported rather than written past.
//!  * *Loss tolerant*.  Continuity counter gaps, transport errors and malformed PES headers drop
//!    the affected data and the stream is re-aligned on the next valid audio frame header.
//!
//! # Example
//!
//! ```rust
//! use mpeg2ts_es::demultiplex::{Demultiplex, DemuxConfig, PidSelection};
//! use mpeg2ts_es::packet::Pid;
//! use mpeg2ts_es::pes::Timestamp;
//! use mpeg2ts_es::report::LogCrateSink;
//!
//! let config = DemuxConfig {
//!     selection: PidSelection::StreamType(mpeg2ts_es::StreamType::Iso11172Audio),
//!     ..DemuxConfig::default()
//! };
//! let mut out: Vec<u8> = Vec::new();
//! let sink = |_pid: Pid, data: &[u8], _pts: Option<Timestamp>| -> std::io::Result<()> {
//!     out.extend_from_slice(data);
//!     Ok(())
//! };
//! let mut demux = Demultiplex::new(config, sink, LogCrateSink).unwrap();
//! # let packets: Vec<[u8; 188]> = vec![];
//! for pk in &packets {
//!     demux.push_packet(&pk[..]).unwrap();
//! }
//! demux.finish().unwrap();
//! ```

#![forbid(unsafe_code)]

#[macro_use]
pub mod report;

pub mod demultiplex;
pub mod es;
pub mod mpa;
pub mod packet;
pub mod pes;
pub mod psi;
mod sync;

use std::fmt;

/// The maximum number of elementary streams tracked by default, which also bounds the number of
/// entries retained from a Program Map Table.
pub const MAX_NUM_ES: usize = 32;

/// Default capacity of the reassembly buffer held for each elementary stream.
pub const ES_MAX_SIZE: usize = 4 << 20;

/// The identifier of TS Packets containing 'stuffing' data, with value `0x1fff`
pub const STUFFING_PID: packet::Pid = packet::Pid::new(0x1fff);

/// The identifier of TS Packets containing Program Association Table sections, with value `0`.
pub const PAT_PID: packet::Pid = packet::Pid::new(0);

/// A fixed-capacity table was full and a new entry had to be rejected.
#[derive(Debug, PartialEq, Eq, Clone, Copy, thiserror::Error)]
#[error("{table} is full ({capacity} entries), rejecting entry for {pid:?}")]
pub struct TableOverflow {
    /// name of the table that was full
    pub table: &'static str,
    /// the number of entries the table can hold
    pub capacity: usize,
    /// the PID of the entry which could not be stored
    pub pid: packet::Pid,
}

/// The types of Elementary Stream specified in _ISO/IEC 13818-1_.
///
/// As returned by
/// [`StreamInfo::stream_type()`](psi/pmt/struct.StreamInfo.html#method.stream_type).
#[derive(PartialEq, Eq, Hash, Clone, Copy)]
pub enum StreamType {
    // 0x00 reserved
    /// ISO/IEC 11172 Video
    Iso11172Video,
    /// ITU-T Rec. H.262 | ISO/IEC 13818-2 Video or ISO/IEC 11172-2 constrained parameter video stream
    H262,
    /// ISO/IEC 11172 Audio
    Iso11172Audio,
    /// ISO/IEC 13818-3 Audio
    Iso138183Audio,
    /// ITU-T Rec. H.222.0 | ISO/IEC 13818-1 private_sections
    H2220PrivateSections,
    /// ITU-T Rec. H.222.0 | ISO/IEC 13818-1 PES packets containing private data
    H2220PesPrivateData,
    /// ISO/IEC 13522 MHEG
    Mheg,
    /// ITU-T Rec. H.222.0 | ISO/IEC 13818-1 Annex A DSM-CC
    H2220DsmCc,
    /// ITU-T Rec. H.222.1
    H2221,
    /// ISO/IEC 13818-7 Audio with ADTS transport syntax
    Adts,
    /// ISO/IEC 14496-2 Visual
    Iso144962Visual,
    /// ISO/IEC 14496-3 Audio with the LATM transport syntax as defined in ISO/IEC 14496-3 / AMD 1
    Latm,
    /// ITU-T Rec. H.264 | ISO/IEC 14496-10 Video
    H264,
    /// ITU-T Rec. H.265 | ISO/IEC 23008-2 Video
    H265,
    /// Chinese Video Standard (AVS)
    ChineseVideoStandard,
    /// ATSC Dolby Digital audio
    AtscDolbyDigitalAudio,
    /// Any value in the range `0x80` to `0xff`, not otherwise named above
    Private(u8),
    /// Any value from the reserved range, or a value not otherwise named above
    Reserved(u8),
}

impl StreamType {
    /// `true` for the stream types whose payload uses MPEG audio frame syntax, which the
    /// synchroniser in this crate understands.
    pub fn is_mpeg_audio(self) -> bool {
        matches!(self, StreamType::Iso11172Audio | StreamType::Iso138183Audio)
    }
}

impl From<u8> for StreamType {
    fn from(val: u8) -> Self {
        match val {
            0x01 => StreamType::Iso11172Video,
            0x02 => StreamType::H262,
            0x03 => StreamType::Iso11172Audio,
            0x04 => StreamType::Iso138183Audio,
            0x05 => StreamType::H2220PrivateSections,
            0x06 => StreamType::H2220PesPrivateData,
            0x07 => StreamType::Mheg,
            0x08 => StreamType::H2220DsmCc,
            0x09 => StreamType::H2221,
            0x0F => StreamType::Adts,
            0x10 => StreamType::Iso144962Visual,
            0x11 => StreamType::Latm,
            0x1b => StreamType::H264,
            0x24 => StreamType::H265,
            0x42 => StreamType::ChineseVideoStandard,
            0x81 => StreamType::AtscDolbyDigitalAudio,
            _ => {
                if val >= 0x80 {
                    StreamType::Private(val)
                } else {
                    StreamType::Reserved(val)
                }
            }
        }
    }
}

impl From<StreamType> for u8 {
    fn from(val: StreamType) -> Self {
        match val {
            StreamType::Iso11172Video => 0x01,
            StreamType::H262 => 0x02,
            StreamType::Iso11172Audio => 0x03,
            StreamType::Iso138183Audio => 0x04,
            StreamType::H2220PrivateSections => 0x05,
            StreamType::H2220PesPrivateData => 0x06,
            StreamType::Mheg => 0x07,
            StreamType::H2220DsmCc => 0x08,
            StreamType::H2221 => 0x09,
            StreamType::Adts => 0x0F,
            StreamType::Iso144962Visual => 0x10,
            StreamType::Latm => 0x11,
            StreamType::H264 => 0x1b,
            StreamType::H265 => 0x24,
            StreamType::ChineseVideoStandard => 0x42,
            StreamType::AtscDolbyDigitalAudio => 0x81,
            StreamType::Reserved(val) => val,
            StreamType::Private(val) => val,
        }
    }
}

impl fmt::Debug for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamType::Private(v) => write!(f, "Private({:#04x})", v),
            StreamType::Reserved(v) => write!(f, "Reserved({:#04x})", v),
            other => write!(f, "{}({:#04x})", other.name(), u8::from(*other)),
        }
    }
}

impl StreamType {
    fn name(self) -> &'static str {
        match self {
            StreamType::Iso11172Video => "Iso11172Video",
            StreamType::H262 => "H262",
            StreamType::Iso11172Audio => "Iso11172Audio",
            StreamType::Iso138183Audio => "Iso138183Audio",
            StreamType::H2220PrivateSections => "H2220PrivateSections",
            StreamType::H2220PesPrivateData => "H2220PesPrivateData",
            StreamType::Mheg => "Mheg",
            StreamType::H2220DsmCc => "H2220DsmCc",
            StreamType::H2221 => "H2221",
            StreamType::Adts => "Adts",
            StreamType::Iso144962Visual => "Iso144962Visual",
            StreamType::Latm => "Latm",
            StreamType::H264 => "H264",
            StreamType::H265 => "H265",
            StreamType::ChineseVideoStandard => "ChineseVideoStandard",
            StreamType::AtscDolbyDigitalAudio => "AtscDolbyDigitalAudio",
            StreamType::Private(_) => "Private",
            StreamType::Reserved(_) => "Reserved",
        }
    }
}

#[cfg(test)]
mod test {
    use super::StreamType;

    #[test]
    fn stream_type_roundtrips_every_value() {
        for v in 0..=255u8 {
            assert_eq!(v, u8::from(StreamType::from(v)));
        }
    }

    #[test]
    fn stream_type_debug() {
        assert_eq!("ChineseVideoStandard(0x42)", format!("{:?}", StreamType::from(66)));
        assert_eq!("Reserved(0x30)", format!("{:?}", StreamType::from(0x30)));
        assert!(StreamType::from(3).is_mpeg_audio());
        assert!(!StreamType::H264.is_mpeg_audio());
    }
}
