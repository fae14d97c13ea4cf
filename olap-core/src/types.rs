use std::fmt;

use crate::error::{StoreError, StoreResult};
use crate::quality;

/// 1-based fragment identifier; 0 is reserved
pub type FragId = u32;

/// Largest fragment id that fits the 31-bit on-disk field
pub const MAX_FRAG_ID: FragId = (1 << 31) - 1;

/// One logical overlap record, filed under `a_id`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OverlapRecord {
    pub a_id: FragId,
    pub b_id: FragId,
    pub flipped: bool,
    pub a_hang: i16,
    pub b_hang: i16,
    pub orig_erate: u16,
    pub corr_erate: u16,
}

impl OverlapRecord {
    /// Create a record whose corrected error rate starts at the original one
    pub fn new(a_id: FragId, b_id: FragId, flipped: bool, a_hang: i16, b_hang: i16, erate: u16) -> Self {
        Self {
            a_id,
            b_id,
            flipped,
            a_hang,
            b_hang,
            orig_erate: erate,
            corr_erate: erate,
        }
    }

    /// The same overlap seen from `b_id`
    ///
    /// Flipped overlaps swap the hangs, normal overlaps negate them.
    pub fn reciprocal(&self) -> Self {
        let (a_hang, b_hang) = if self.flipped {
            (self.b_hang, self.a_hang)
        } else {
            (self.a_hang.saturating_neg(), self.b_hang.saturating_neg())
        };
        Self {
            a_id: self.b_id,
            b_id: self.a_id,
            flipped: self.flipped,
            a_hang,
            b_hang,
            orig_erate: self.orig_erate,
            corr_erate: self.corr_erate,
        }
    }

    pub fn class(&self) -> OverlapClass {
        OverlapClass::from_hangs(self.a_hang, self.b_hang)
    }

    /// Orientation letter used by the text dump format
    pub fn orientation_char(&self) -> char {
        if self.flipped {
            'I'
        } else {
            'N'
        }
    }

    pub fn orig_erate_percent(&self) -> f32 {
        quality::expand_percent(self.orig_erate)
    }

    pub fn corr_erate_percent(&self) -> f32 {
        quality::expand_percent(self.corr_erate)
    }
}

impl fmt::Display for OverlapRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:8} {:8} {} {:5} {:5} {:4.2} {:4.2}",
            self.a_id,
            self.b_id,
            self.orientation_char(),
            self.a_hang,
            self.b_hang,
            self.orig_erate_percent(),
            self.corr_erate_percent()
        )
    }
}

/// Overlap shape as implied by the hang signs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverlapClass {
    /// Both hangs negative: B extends off A's 5' end
    FivePrime,
    /// Both hangs positive: B extends off A's 3' end
    ThreePrime,
    /// A contains B
    Contains,
    /// B contains A
    Contained,
}

impl OverlapClass {
    pub fn from_hangs(a_hang: i16, b_hang: i16) -> Self {
        if a_hang >= 0 && b_hang <= 0 {
            OverlapClass::Contains
        } else if a_hang <= 0 && b_hang >= 0 {
            OverlapClass::Contained
        } else if a_hang < 0 {
            OverlapClass::FivePrime
        } else {
            OverlapClass::ThreePrime
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OverlapClass::FivePrime => "5'-dovetail",
            OverlapClass::ThreePrime => "3'-dovetail",
            OverlapClass::Contains => "contains",
            OverlapClass::Contained => "contained",
        }
    }
}

/// Relative orientation of an overlap message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    /// AB_AB
    Normal,
    /// BA_BA
    Anti,
    /// AB_BA
    Innie,
    /// BA_AB
    Outtie,
    Unknown,
}

impl From<char> for Orientation {
    fn from(c: char) -> Self {
        match c.to_ascii_uppercase() {
            'N' => Orientation::Normal,
            'A' => Orientation::Anti,
            'I' => Orientation::Innie,
            'O' => Orientation::Outtie,
            _ => Orientation::Unknown,
        }
    }
}

impl From<Orientation> for char {
    fn from(orientation: Orientation) -> Self {
        match orientation {
            Orientation::Normal => 'N',
            Orientation::Anti => 'A',
            Orientation::Innie => 'I',
            Orientation::Outtie => 'O',
            Orientation::Unknown => 'U',
        }
    }
}

/// One computed overlap between two fragments, as emitted by the overlapper
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalOverlap {
    pub a_id: FragId,
    pub b_id: FragId,
    pub orientation: Orientation,
    pub a_hang: i32,
    pub b_hang: i32,
    /// Error rate as a fraction
    pub quality: f32,
}

impl PhysicalOverlap {
    /// Normalize into the two reciprocal records filed under each fragment
    ///
    /// Returns `Ok(None)` for overlaps with unknown orientation.
    pub fn to_records(&self) -> StoreResult<Option<(OverlapRecord, OverlapRecord)>> {
        check_frag_id(self.a_id)?;
        check_frag_id(self.b_id)?;
        let ah = to_hang(self.a_hang)?;
        let bh = to_hang(self.b_hang)?;
        let erate = quality::shrink(self.quality);

        let fwd = match self.orientation {
            Orientation::Normal => OverlapRecord::new(self.a_id, self.b_id, false, ah, bh, erate),
            Orientation::Innie => OverlapRecord::new(self.a_id, self.b_id, true, ah, bh, erate),
            Orientation::Outtie => OverlapRecord::new(self.b_id, self.a_id, true, -ah, -bh, erate),
            Orientation::Anti => OverlapRecord::new(self.a_id, self.b_id, false, -bh, -ah, erate),
            Orientation::Unknown => return Ok(None),
        };

        Ok(Some((fwd, fwd.reciprocal())))
    }
}

/// Validate that an id is usable as an on-disk fragment id
pub fn check_frag_id(id: u32) -> StoreResult<FragId> {
    if id == 0 || id > MAX_FRAG_ID {
        return Err(StoreError::invalid_input(format!(
            "fragment id {id} outside [1, {MAX_FRAG_ID}]"
        )));
    }
    Ok(id)
}

/// Narrow a hang to 16 bits, keeping it negatable
pub fn to_hang(hang: i32) -> StoreResult<i16> {
    if hang.unsigned_abs() > i16::MAX as u32 {
        return Err(StoreError::invalid_input(format!(
            "hang {hang} does not fit in 16 bits"
        )));
    }
    Ok(hang as i16)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overlap(orientation: Orientation) -> PhysicalOverlap {
        PhysicalOverlap {
            a_id: 7,
            b_id: 9,
            orientation,
            a_hang: 30,
            b_hang: -12,
            quality: 0.015,
        }
    }

    #[test]
    fn test_normal_normalization() {
        let (fwd, rev) = overlap(Orientation::Normal).to_records().unwrap().unwrap();
        assert_eq!((fwd.a_id, fwd.b_id, fwd.a_hang, fwd.b_hang, fwd.flipped), (7, 9, 30, -12, false));
        assert_eq!((rev.a_id, rev.b_id, rev.a_hang, rev.b_hang, rev.flipped), (9, 7, -30, 12, false));
        assert_eq!(fwd.orig_erate, 15);
        assert_eq!(rev.corr_erate, 15);
    }

    #[test]
    fn test_innie_swaps_hangs() {
        let (fwd, rev) = overlap(Orientation::Innie).to_records().unwrap().unwrap();
        assert_eq!((fwd.a_hang, fwd.b_hang), (30, -12));
        assert_eq!((rev.a_id, rev.a_hang, rev.b_hang), (9, -12, 30));
        assert!(rev.flipped);
    }

    #[test]
    fn test_outtie_files_under_b_first() {
        let (fwd, rev) = overlap(Orientation::Outtie).to_records().unwrap().unwrap();
        assert_eq!((fwd.a_id, fwd.b_id, fwd.a_hang, fwd.b_hang), (9, 7, -30, 12));
        assert_eq!((rev.a_id, rev.b_id, rev.a_hang, rev.b_hang), (7, 9, 12, -30));
        assert!(fwd.flipped && rev.flipped);
    }

    #[test]
    fn test_anti_normalization() {
        let (fwd, rev) = overlap(Orientation::Anti).to_records().unwrap().unwrap();
        assert_eq!((fwd.a_id, fwd.a_hang, fwd.b_hang), (7, 12, -30));
        assert_eq!((rev.a_id, rev.a_hang, rev.b_hang), (9, -12, 30));
    }

    #[test]
    fn test_unknown_orientation_is_skipped() {
        assert!(overlap(Orientation::Unknown).to_records().unwrap().is_none());
    }

    #[test]
    fn test_reciprocal_is_involution() {
        let rec = OverlapRecord::new(3, 4, true, 3, -2, 50);
        assert_eq!(rec.reciprocal().reciprocal(), rec);
        let rec = OverlapRecord::new(1, 2, false, -10, -5, 20);
        assert_eq!(rec.reciprocal().reciprocal(), rec);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let mut ovl = overlap(Orientation::Normal);
        ovl.a_hang = 40_000;
        assert!(matches!(ovl.to_records(), Err(StoreError::InvalidInput(_))));

        let mut ovl = overlap(Orientation::Normal);
        ovl.b_id = 0;
        assert!(ovl.to_records().is_err());
    }

    #[test]
    fn test_overlap_classes() {
        assert_eq!(OverlapClass::from_hangs(-10, -5), OverlapClass::FivePrime);
        assert_eq!(OverlapClass::from_hangs(10, 5), OverlapClass::ThreePrime);
        assert_eq!(OverlapClass::from_hangs(3, -2), OverlapClass::Contains);
        assert_eq!(OverlapClass::from_hangs(0, 0), OverlapClass::Contains);
        assert_eq!(OverlapClass::from_hangs(-3, 2), OverlapClass::Contained);
    }

    #[test]
    fn test_orientation_chars() {
        assert_eq!(Orientation::from('n'), Orientation::Normal);
        assert_eq!(Orientation::from('O'), Orientation::Outtie);
        assert_eq!(Orientation::from('x'), Orientation::Unknown);
        assert_eq!(char::from(Orientation::Innie), 'I');
    }
}
