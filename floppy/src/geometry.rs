//! Disk geometry of a double sided, 40 track, 9 sector floppy

use crate::request::RequestError;

pub const SECTOR_SIZE: usize = 512;
pub const TRACKS: u8 = 40;
pub const SECTORS_PER_TRACK: u8 = 9;
pub const SIDES: u8 = 2;

/// Total number of sectors on one disk
pub const TOTAL_SECTORS: usize = TRACKS as usize * SIDES as usize * SECTORS_PER_TRACK as usize;

pub type SectorBuffer = [u8; SECTOR_SIZE];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drive {
    A,
    B,
}

impl Drive {
    pub const fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Zero,
    One,
}

impl Side {
    pub const fn index(self) -> usize {
        match self {
            Self::Zero => 0,
            Self::One => 1,
        }
    }
}

/// A track number in `0..TRACKS`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Track(u8);

impl Track {
    pub const ZERO: Self = Self(0);

    pub const fn new(track: u8) -> Result<Self, RequestError> {
        if track < TRACKS {
            Ok(Self(track))
        } else {
            Err(RequestError::TrackOutOfRange(track as i32))
        }
    }

    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i32> for Track {
    type Error = RequestError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .map_err(|_| RequestError::TrackOutOfRange(value))
            .and_then(Self::new)
    }
}

/// A sector number in `1..=SECTORS_PER_TRACK`. Sectors are numbered from one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Sector(u8);

impl Sector {
    pub const fn new(sector: u8) -> Result<Self, RequestError> {
        if sector >= 1 && sector <= SECTORS_PER_TRACK {
            Ok(Self(sector))
        } else {
            Err(RequestError::SectorOutOfRange(sector as i32))
        }
    }

    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i32> for Sector {
    type Error = RequestError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .map_err(|_| RequestError::SectorOutOfRange(value))
            .and_then(Self::new)
    }
}

/// Physical location of a block. Consecutive blocks fill side 0 of a track,
/// then side 1, before the head moves to the next track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chs {
    pub track: Track,
    pub side: Side,
    pub sector: Sector,
}

impl Chs {
    pub fn from_lba(lba: usize) -> Option<Self> {
        if lba >= TOTAL_SECTORS {
            return None;
        }

        let per_track = SECTORS_PER_TRACK as usize;
        let per_cylinder = per_track * SIDES as usize;

        let side = match (lba % per_cylinder) / per_track {
            0 => Side::Zero,
            _ => Side::One,
        };

        Some(Self {
            track: Track((lba / per_cylinder) as u8),
            side,
            sector: Sector((lba % per_track) as u8 + 1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lba_fills_both_sides_before_stepping() {
        let first = Chs::from_lba(0).unwrap();
        assert_eq!(first.track.get(), 0);
        assert_eq!(first.side, Side::Zero);
        assert_eq!(first.sector.get(), 1);

        let second_side = Chs::from_lba(9).unwrap();
        assert_eq!(second_side.track.get(), 0);
        assert_eq!(second_side.side, Side::One);
        assert_eq!(second_side.sector.get(), 1);

        let last = Chs::from_lba(TOTAL_SECTORS - 1).unwrap();
        assert_eq!(last.track.get(), TRACKS - 1);
        assert_eq!(last.side, Side::One);
        assert_eq!(last.sector.get(), SECTORS_PER_TRACK);

        assert!(Chs::from_lba(TOTAL_SECTORS).is_none());
    }

    #[test]
    fn track_and_sector_ranges_are_enforced() {
        assert!(Track::new(39).is_ok());
        assert_eq!(Track::new(40), Err(RequestError::TrackOutOfRange(40)));
        assert_eq!(Track::try_from(-1), Err(RequestError::TrackOutOfRange(-1)));

        assert!(Sector::new(1).is_ok());
        assert!(Sector::new(9).is_ok());
        assert_eq!(Sector::new(0), Err(RequestError::SectorOutOfRange(0)));
        assert_eq!(Sector::try_from(10), Err(RequestError::SectorOutOfRange(10)));
    }
}
