//! Types related to the _Program Association Table_

use crate::packet;
use crate::psi;

/// A single entry from a `PatSection`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgramDescriptor {
    /// `program_number` 0 is reserved to give the PID of the _Network Information Table_
    Network {
        /// The PID of NIT section packets
        pid: packet::Pid,
    },
    /// Gives the PID carrying the _Program Map Table_ of the given program
    Program {
        /// The program number
        program_number: u16,
        /// The PID where PMT sections for this program can be found
        pid: packet::Pid,
    },
}

impl ProgramDescriptor {
    /// panics if fewer than 4 bytes are provided
    pub fn from_bytes(data: &[u8]) -> ProgramDescriptor {
        let program_number = (u16::from(data[0]) << 8) | u16::from(data[1]);
        let pid = packet::Pid::from_masked(u16::from(data[2]) << 8 | u16::from(data[3]));
        if program_number == 0 {
            ProgramDescriptor::Network { pid }
        } else {
            ProgramDescriptor::Program {
                program_number,
                pid,
            }
        }
    }

    /// produces the Pid of either the NIT or PMT, depending on which type of
    /// `ProgramDescriptor` this is
    pub fn pid(&self) -> packet::Pid {
        match *self {
            ProgramDescriptor::Network { pid } => pid,
            ProgramDescriptor::Program { pid, .. } => pid,
        }
    }
}

/// Sections of the _Program Association Table_ give details of the programs within a transport
/// stream.  There may be only one program, or in the case of a broadcast multiplex, there may
/// be many.
#[derive(Clone, Debug)]
pub struct PatSection<'buf> {
    data: &'buf [u8],
}
impl<'buf> PatSection<'buf> {
    /// The `table_id` of Program Association Sections
    pub const TABLE_ID: u8 = 0x00;

    /// Wrap the body of the given section, failing if it is not a Program Association Section.
    pub fn from_section(section: &psi::Section<'buf>) -> Result<PatSection<'buf>, psi::PsiError> {
        section.expect_table_id(Self::TABLE_ID)?;
        Ok(PatSection {
            data: section.body(),
        })
    }

    /// Returns an iterator over the entries in this program association table section.  Any
    /// trailing bytes too few to make up a whole entry are ignored.
    pub fn programs(&self) -> impl Iterator<Item = ProgramDescriptor> + 'buf {
        self.data.chunks_exact(4).map(ProgramDescriptor::from_bytes)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::packet::Pid;
    use crate::psi::Section;
    use assert_matches::assert_matches;
    use hex_literal::*;

    #[test]
    fn single_program() {
        let payload = hex!("00 00b00d 0001 c1 0000 0001 e100 00000000");
        let section = Section::from_payload(&payload[..]).unwrap();
        let pat = PatSection::from_section(&section).unwrap();
        let programs: Vec<_> = pat.programs().collect();
        assert_eq!(
            programs,
            vec![ProgramDescriptor::Program {
                program_number: 1,
                pid: Pid::new(0x100)
            }]
        );
    }

    #[test]
    fn network_and_programs() {
        let payload = hex!("00 00b015 0001 c1 0000 0000 e010 0001 e100 0002 e200 00000000");
        let section = Section::from_payload(&payload[..]).unwrap();
        let pat = PatSection::from_section(&section).unwrap();
        let pids: Vec<_> = pat.programs().map(|p| p.pid()).collect();
        assert_eq!(pids, vec![Pid::new(0x10), Pid::new(0x100), Pid::new(0x200)]);
        assert_matches!(
            pat.programs().next(),
            Some(ProgramDescriptor::Network { .. })
        );
    }

    #[test]
    fn wrong_table_id() {
        let payload = hex!("00 02b00d 0001 c1 0000 0001 e100 00000000");
        let section = Section::from_payload(&payload[..]).unwrap();
        assert_matches!(
            PatSection::from_section(&section),
            Err(psi::PsiError::UnexpectedTableId {
                expected: 0,
                found: 2
            })
        );
    }
}
