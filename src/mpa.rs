//! Parsing of the 4-byte header at the start of each MPEG audio frame (layers I, II and III of
//! _ISO/IEC 11172-3_, plus the lower sample rates of _ISO/IEC 13818-3_ and the unofficial
//! 'MPEG 2.5' extension).
//!
//! The synchroniser uses [`FrameHeader::from_bytes()`](struct.FrameHeader.html#method.from_bytes)
//! to find a frame boundary in the elementary stream data.

use std::fmt;

/// The audio version signalled by the header.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum MpegVersion {
    /// _ISO/IEC 11172-3_
    Mpeg1,
    /// _ISO/IEC 13818-3_ low sample rate extension
    Mpeg2,
    /// Non-standard extension to even lower sample rates, signalled by clearing the last bit of
    /// the sync word
    Mpeg25,
}

impl MpegVersion {
    fn index(self) -> usize {
        match self {
            MpegVersion::Mpeg1 => 0,
            MpegVersion::Mpeg2 => 1,
            MpegVersion::Mpeg25 => 2,
        }
    }
}

impl fmt::Display for MpegVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MpegVersion::Mpeg1 => "MPEG-1",
            MpegVersion::Mpeg2 => "MPEG-2",
            MpegVersion::Mpeg25 => "MPEG-2.5",
        })
    }
}

/// Audio layer
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Layer {
    /// Layer I
    I,
    /// Layer II
    II,
    /// Layer III
    III,
}

impl Layer {
    fn index(self) -> usize {
        match self {
            Layer::I => 0,
            Layer::II => 1,
            Layer::III => 2,
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Layer::I => "I",
            Layer::II => "II",
            Layer::III => "III",
        })
    }
}

/// Value of the `mode` field.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ChannelMode {
    /// stereo
    Stereo,
    /// joint stereo
    JointStereo,
    /// two independent mono channels
    DualChannel,
    /// one channel
    Mono,
}

impl ChannelMode {
    fn from(v: u32) -> ChannelMode {
        match v & 0b11 {
            0 => ChannelMode::Stereo,
            1 => ChannelMode::JointStereo,
            2 => ChannelMode::DualChannel,
            _ => ChannelMode::Mono,
        }
    }

    /// `1` for `Mono`, and `2` for all other modes
    pub fn channels(self) -> u8 {
        match self {
            ChannelMode::Mono => 1,
            _ => 2,
        }
    }
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChannelMode::Stereo => "stereo",
            ChannelMode::JointStereo => "joint stereo",
            ChannelMode::DualChannel => "dual channel",
            ChannelMode::Mono => "mono",
        })
    }
}

/// Reasons four bytes can not be the start of an MPEG audio frame, in the order they are checked.
#[derive(Debug, PartialEq, Eq, Clone, Copy, thiserror::Error)]
pub enum FrameHeaderError {
    /// Fewer than 4 bytes were available
    #[error("{0} bytes is too short for an audio frame header")]
    NotEnoughData(usize),
    /// The first byte was not `0xFF`
    #[error("first byte {0:#04x} is not 0xff")]
    LeadingByte(u8),
    /// The 12-bit sync word, with its last bit masked off, was not `0xFFE`
    #[error("sync word {0:#05x} invalid")]
    SyncWord(u16),
    /// The layer field held the reserved value `0b00`
    #[error("reserved layer value")]
    ReservedLayer,
    /// The bitrate index was `0` (free format) or `15` (forbidden)
    #[error("bitrate index {0} not supported")]
    Bitrate(u8),
    /// The sample rate index held the reserved value `3`
    #[error("samplerate index {0} reserved")]
    Samplerate(u8),
}

// kbit/s, by [version][layer][bitrate_index]; MPEG-2 and 2.5 share a table
const BITRATES: [[[u16; 16]; 3]; 3] = {
    const MPEG1: [[u16; 16]; 3] = [
        [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448, 0],
        [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 0],
        [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 0],
    ];
    const MPEG2: [[u16; 16]; 3] = [
        [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256, 0],
        [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0],
        [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0],
    ];
    [MPEG1, MPEG2, MPEG2]
};

// Hz, by [version][samplerate_index]
const SAMPLERATES: [[u32; 4]; 3] = [
    [44100, 48000, 32000, 0],
    [22050, 24000, 16000, 0],
    [11025, 12000, 8000, 0],
];

/// A validated MPEG audio frame header.
///
/// Only constructed by `from_bytes()`, so every accessor returns a meaningful value.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct FrameHeader {
    version: MpegVersion,
    layer: Layer,
    protected: bool,
    bitrate_kbps: u16,
    samplerate: u32,
    padding: bool,
    mode: ChannelMode,
}

impl FrameHeader {
    /// Size of the header in bytes
    pub const SIZE: usize = 4;

    /// Parse the header from the first 4 bytes of the given buffer, which must pass (in order)
    /// checks of the leading byte, sync word, layer, bitrate index and sample rate
    /// index.
    pub fn from_bytes(buf: &[u8]) -> Result<FrameHeader, FrameHeaderError> {
        if buf.len() < Self::SIZE {
            return Err(FrameHeaderError::NotEnoughData(buf.len()));
        }
        if buf[0] != 0xff {
            return Err(FrameHeaderError::LeadingByte(buf[0]));
        }
        let header = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let sync = (header >> 20) as u16;
        if sync & 0xffe != 0xffe {
            return Err(FrameHeaderError::SyncWord(sync));
        }
        let layer = match (header >> 17) & 0b11 {
            0b11 => Layer::I,
            0b10 => Layer::II,
            0b01 => Layer::III,
            _ => return Err(FrameHeaderError::ReservedLayer),
        };
        // MPEG-2.5 is signalled by the last sync bit alone
        let version = match (sync & 1, (header >> 19) & 1) {
            (1, 1) => MpegVersion::Mpeg1,
            (1, _) => MpegVersion::Mpeg2,
            _ => MpegVersion::Mpeg25,
        };
        let bitrate_index = ((header >> 12) & 0b1111) as u8;
        let bitrate_kbps = BITRATES[version.index()][layer.index()][bitrate_index as usize];
        if bitrate_kbps == 0 {
            return Err(FrameHeaderError::Bitrate(bitrate_index));
        }
        let samplerate_index = ((header >> 10) & 0b11) as u8;
        let samplerate = SAMPLERATES[version.index()][samplerate_index as usize];
        if samplerate == 0 {
            return Err(FrameHeaderError::Samplerate(samplerate_index));
        }
        Ok(FrameHeader {
            version,
            layer,
            protected: (header >> 16) & 1 == 0,
            bitrate_kbps,
            samplerate,
            padding: (header >> 9) & 1 != 0,
            mode: ChannelMode::from(header >> 6),
        })
    }

    /// MPEG-1, MPEG-2 or MPEG-2.5
    pub fn version(&self) -> MpegVersion {
        self.version
    }
    /// Layer I, II or III
    pub fn layer(&self) -> Layer {
        self.layer
    }
    /// `true` if a CRC follows the header
    pub fn protected(&self) -> bool {
        self.protected
    }
    /// bitrate in kbit/s
    pub fn bitrate_kbps(&self) -> u16 {
        self.bitrate_kbps
    }
    /// sample rate in Hz
    pub fn samplerate(&self) -> u32 {
        self.samplerate
    }
    /// `true` if the frame carries an extra padding byte
    pub fn padding(&self) -> bool {
        self.padding
    }
    /// the channel mode
    pub fn mode(&self) -> ChannelMode {
        self.mode
    }
    /// 1 or 2
    pub fn channels(&self) -> u8 {
        self.mode.channels()
    }
    /// 1152 for MPEG-1, 576 otherwise
    pub fn samples_per_frame(&self) -> u32 {
        match self.version {
            MpegVersion::Mpeg1 => 1152,
            _ => 576,
        }
    }
    /// Size of the whole frame in bytes, including this header.
    ///
    /// Calculated as `samples * bitrate / samplerate / 8 + padding`, rounding down.
    pub fn frame_size(&self) -> usize {
        let bits = u64::from(self.samples_per_frame()) * u64::from(self.bitrate_kbps) * 1000;
        (bits / u64::from(self.samplerate) / 8) as usize + usize::from(self.padding)
    }
}

impl fmt::Display for FrameHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} layer {}, {} kbit/s, {} Hz, {}, {} samples per frame, frame size {} bytes",
            self.version,
            self.layer,
            self.bitrate_kbps,
            self.samplerate,
            self.mode,
            self.samples_per_frame(),
            self.frame_size()
        )
    }
}
