//! Types for processing tables of *Program Specific Information* in a transport stream.
//!
//! # Concepts
//!
//! * There are multiple standard types of Program Specific Information, of which only the
//!   *Program Association Table* and *Program Map Table* are needed to find the elementary
//!   streams of a program.
//! * A PSI *Table* can split into *Sections*
//! * A Section could in general be split across a small number of transport stream *Packets*,
//!   however the PAT and PMT of a single program are small enough that this crate only handles
//!   sections which start and end within the packet having `payload_unit_start_indicator` set.
//!
//! The CRC present at the end of each section is not verified.

pub mod pat;
pub mod pmt;

/// Problems which prevent a PSI section from being interpreted.
#[derive(Debug, PartialEq, Eq, Clone, Copy, thiserror::Error)]
pub enum PsiError {
    /// The `pointer_field` points beyond the end of the packet payload
    #[error("pointer_field {pointer} exceeds the {available} bytes of payload remaining")]
    PointerFieldOverrun {
        /// value of the `pointer_field`
        pointer: usize,
        /// bytes available following the `pointer_field`
        available: usize,
    },
    /// A syntax element was too large for the data available to hold it
    #[error("{field} requires {expected} bytes, but only {actual} available")]
    NotEnoughData {
        /// name of the syntax element
        field: &'static str,
        /// number of bytes the element requires
        expected: usize,
        /// number of bytes actually available
        actual: usize,
    },
    /// The section continues beyond the end of the packet
    #[error("section_length {section_length} overruns the {available} bytes available")]
    SectionOverrun {
        /// declared `section_length`
        section_length: usize,
        /// bytes available after the `section_length` field
        available: usize,
    },
    /// The `section_syntax_indicator` was not set for a table which requires it
    #[error("section_syntax_indicator not set for table_id {0:#04x}")]
    NotSectionSyntax(u8),
    /// The section is not of the expected table type
    #[error("unexpected table_id {found:#04x}, expected {expected:#04x}")]
    UnexpectedTableId {
        /// the `table_id` for the type of table being decoded
        expected: u8,
        /// the `table_id` actually present
        found: u8,
    },
}

/// Is this table applicable now, or will it become applicable at some future time.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CurrentNext {
    /// The table is applicable now
    Current,
    /// The table will become applicable at some future time
    Next,
}

impl CurrentNext {
    fn from(v: u8) -> CurrentNext {
        match v & 1 {
            0 => CurrentNext::Next,
            _ => CurrentNext::Current,
        }
    }
}

/// The three bytes at the start of every PSI section.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct SectionCommonHeader {
    /// Identifies the kind of table; `0x00` for the PAT and `0x02` for the PMT
    pub table_id: u8,
    /// `true` if the section uses the common 'section syntax' described by
    /// [`TableSyntaxHeader`](struct.TableSyntaxHeader.html)
    pub section_syntax_indicator: bool,
    /// Flag whose meaning is left to private table definitions
    pub private_indicator: bool,
    /// Number of bytes of the section which follow the `section_length` field itself
    pub section_length: usize,
}

impl SectionCommonHeader {
    /// Size of the header in bytes
    pub const SIZE: usize = 3;

    /// Panics if fewer than `SectionCommonHeader::SIZE` bytes are provided
    pub fn new(buf: &[u8]) -> SectionCommonHeader {
        SectionCommonHeader {
            table_id: buf[0],
            section_syntax_indicator: buf[1] & 0b1000_0000 != 0,
            private_indicator: buf[1] & 0b0100_0000 != 0,
            section_length: ((u16::from(buf[1] & 0b0000_1111) << 8) | u16::from(buf[2])) as usize,
        }
    }
}

/// Represents the fields that appear within table sections that use the common 'section syntax'.
///
/// This will only be used for a table section if the
/// [`section_syntax_indicator`](struct.SectionCommonHeader.html#structfield.section_syntax_indicator)
/// field in the `SectionCommonHeader` of the section is `true`.
#[derive(Debug)]
pub struct TableSyntaxHeader<'buf> {
    buf: &'buf [u8],
}

impl<'buf> TableSyntaxHeader<'buf> {
    /// Size of the header in bytes
    pub const SIZE: usize = 5;

    fn new(buf: &'buf [u8]) -> TableSyntaxHeader<'buf> {
        TableSyntaxHeader { buf }
    }
    /// The initial 16-bit field within a 'section syntax' PSI table (which immediately follows the
    /// `section_length` field).
    /// _13818-1_ refers to this field as,
    ///  - `transport_stream_id` when it appears within a Program Association Section
    ///  - `program_number` when it appears within a Program Map Section
    pub fn id(&self) -> u16 {
        u16::from(self.buf[0]) << 8 | u16::from(self.buf[1])
    }
    /// A 5-bit value that can be used to quickly check if this table has changed since the last
    /// time it was periodically inserted within the transport stream being read.
    pub fn version(&self) -> u8 {
        (self.buf[2] >> 1) & 0b0001_1111
    }
    /// Is this table applicable now, or will it become applicable at some future time.
    pub fn current_next_indicator(&self) -> CurrentNext {
        CurrentNext::from(self.buf[2])
    }
    /// The number of this section, within a potentially multi-section table.
    pub fn section_number(&self) -> u8 {
        self.buf[3]
    }
    /// Indicates the value of `section_number()` that will appear within the last section within
    /// a table.
    pub fn last_section_number(&self) -> u8 {
        self.buf[4]
    }
}

const CRC_SIZE: usize = 4;

/// A complete 'section syntax' PSI section held within a single packet payload.
#[derive(Debug)]
pub struct Section<'buf> {
    header: SectionCommonHeader,
    data: &'buf [u8],
}

impl<'buf> Section<'buf> {
    /// Locate the section which starts in the payload of a packet having
    /// `payload_unit_start_indicator` set, by skipping the `pointer_field` and the number of
    /// bytes it indicates.
    pub fn from_payload(payload: &'buf [u8]) -> Result<Section<'buf>, PsiError> {
        let (&pointer, rest) = payload.split_first().ok_or(PsiError::NotEnoughData {
            field: "pointer_field",
            expected: 1,
            actual: 0,
        })?;
        let pointer = pointer as usize;
        if pointer > rest.len() {
            return Err(PsiError::PointerFieldOverrun {
                pointer,
                available: rest.len(),
            });
        }
        Section::from_bytes(&rest[pointer..])
    }

    /// Wrap the section starting with the `table_id` in the first byte of the given buffer,
    /// checking that the section uses section syntax and fits within the buffer.
    pub fn from_bytes(buf: &'buf [u8]) -> Result<Section<'buf>, PsiError> {
        if buf.len() < SectionCommonHeader::SIZE {
            return Err(PsiError::NotEnoughData {
                field: "section header",
                expected: SectionCommonHeader::SIZE,
                actual: buf.len(),
            });
        }
        let header = SectionCommonHeader::new(buf);
        if !header.section_syntax_indicator {
            return Err(PsiError::NotSectionSyntax(header.table_id));
        }
        let available = buf.len() - SectionCommonHeader::SIZE;
        if header.section_length > available {
            return Err(PsiError::SectionOverrun {
                section_length: header.section_length,
                available,
            });
        }
        if header.section_length < TableSyntaxHeader::SIZE + CRC_SIZE {
            return Err(PsiError::NotEnoughData {
                field: "section_length",
                expected: TableSyntaxHeader::SIZE + CRC_SIZE,
                actual: header.section_length,
            });
        }
        let end = SectionCommonHeader::SIZE + header.section_length;
        Ok(Section {
            header,
            data: &buf[..end],
        })
    }

    /// The fields common to every section
    pub fn header(&self) -> &SectionCommonHeader {
        &self.header
    }

    /// The 'section syntax' fields following the common header
    pub fn table_syntax_header(&self) -> TableSyntaxHeader<'buf> {
        TableSyntaxHeader::new(
            &self.data[SectionCommonHeader::SIZE..SectionCommonHeader::SIZE + TableSyntaxHeader::SIZE],
        )
    }

    /// The table-specific content following the `TableSyntaxHeader`, excluding the trailing CRC.
    pub fn body(&self) -> &'buf [u8] {
        let start = SectionCommonHeader::SIZE + TableSyntaxHeader::SIZE;
        &self.data[start..self.data.len() - CRC_SIZE]
    }

    /// Fails with `PsiError::UnexpectedTableId` unless this section has the given `table_id`
    fn expect_table_id(&self, expected: u8) -> Result<(), PsiError> {
        if self.header.table_id == expected {
            Ok(())
        } else {
            Err(PsiError::UnexpectedTableId {
                expected,
                found: self.header.table_id,
            })
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_matches::assert_matches;
    use hex_literal::*;

    #[test]
    fn pointer_field_is_skipped() {
        // pointer_field=2, two stuffing bytes, then a PAT section with one program
        let payload = hex!("02 ffff 00b00d 0001 c1 0000 0001 e100 00000000 ffff");
        let section = Section::from_payload(&payload[..]).unwrap();
        assert_eq!(0, section.header().table_id);
        assert_eq!(13, section.header().section_length);
        let tsh = section.table_syntax_header();
        assert_eq!(1, tsh.id());
        assert_eq!(0, tsh.version());
        assert_eq!(CurrentNext::Current, tsh.current_next_indicator());
        assert_eq!(0, tsh.section_number());
        assert_eq!(0, tsh.last_section_number());
        assert_eq!(&hex!("0001 e100"), section.body());
    }

    #[test]
    fn version_number() {
        let payload = hex!("00 00b00d 0001 cb 0000 0001 e100 00000000");
        let section = Section::from_payload(&payload[..]).unwrap();
        assert_eq!(5, section.table_syntax_header().version());
    }

    #[test]
    fn pointer_field_overrun() {
        assert_matches!(
            Section::from_payload(&hex!("05 0000")[..]),
            Err(PsiError::PointerFieldOverrun {
                pointer: 5,
                available: 2
            })
        );
    }

    #[test]
    fn empty_payload() {
        assert_matches!(
            Section::from_payload(&[][..]),
            Err(PsiError::NotEnoughData { expected: 1, .. })
        );
    }

    #[test]
    fn section_overrun() {
        assert_matches!(
            Section::from_payload(&hex!("00 00b020 0001 c1 0000")[..]),
            Err(PsiError::SectionOverrun {
                section_length: 0x20,
                available: 5
            })
        );
    }

    #[test]
    fn section_too_short() {
        assert_matches!(
            Section::from_payload(&hex!("00 00b004 0001 c100")[..]),
            Err(PsiError::NotEnoughData {
                field: "section_length",
                ..
            })
        );
    }

    #[test]
    fn compact_syntax_rejected() {
        assert_matches!(
            Section::from_payload(&hex!("00 70300d 0001 c1 0000 0001 e100 00000000")[..]),
            Err(PsiError::NotSectionSyntax(0x70))
        );
    }
}
