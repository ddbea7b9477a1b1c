//! Interpretation of the `VERSION` register.

use core::fmt;

/// Known silicon revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipVersion {
    /// FM17522 and other clones.
    Clone,
    V0_0,
    V1_0,
    V2_0,
}

impl ChipVersion {
    pub fn raw(self) -> u8 {
        match self {
            ChipVersion::Clone => 0x88,
            ChipVersion::V0_0 => 0x90,
            ChipVersion::V1_0 => 0x91,
            ChipVersion::V2_0 => 0x92,
        }
    }
}

impl fmt::Display for ChipVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChipVersion::Clone => "clone",
            ChipVersion::V0_0 => "v0.0",
            ChipVersion::V1_0 => "v1.0",
            ChipVersion::V2_0 => "v2.0",
        };
        f.write_str(name)
    }
}

/// What a version byte says about the link.
///
/// Only `LinkFault` means "no device". An unrecognized but nonzero value is
/// plausible and left to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identification {
    /// `0x00` or `0xFF`: data-in stuck low or high. Wiring or power.
    LinkFault(u8),
    Known(ChipVersion),
    Unrecognized(u8),
}

impl Identification {
    pub fn from_version(version: u8) -> Self {
        match version {
            0x00 | 0xFF => Identification::LinkFault(version),
            0x88 => Identification::Known(ChipVersion::Clone),
            0x90 => Identification::Known(ChipVersion::V0_0),
            0x91 => Identification::Known(ChipVersion::V1_0),
            0x92 => Identification::Known(ChipVersion::V2_0),
            other => Identification::Unrecognized(other),
        }
    }

    /// The byte this was classified from.
    pub fn raw(self) -> u8 {
        match self {
            Identification::LinkFault(v) | Identification::Unrecognized(v) => v,
            Identification::Known(chip) => chip.raw(),
        }
    }

    pub fn is_link_fault(self) -> bool {
        matches!(self, Identification::LinkFault(_))
    }
}

impl From<u8> for Identification {
    fn from(version: u8) -> Self {
        Self::from_version(version)
    }
}
