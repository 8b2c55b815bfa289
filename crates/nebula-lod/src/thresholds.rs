//! Distance-based split/unify decisions with a hysteresis band per level.

use crate::error::LodError;

/// What a node should do given its distance to the viewer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LodAction {
    /// Stay as-is (inside the hysteresis band).
    Keep,
    /// Refine into four children.
    Split,
    /// Collapse the children back into one chunk.
    Unify,
}

/// Distance multipliers for one subdivision level.
///
/// A node of size `s` splits closer than `s * split` and unifies farther than
/// `s * unify`. Between the two nothing changes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LevelFactors {
    pub split: f64,
    pub unify: f64,
}

impl LevelFactors {
    fn validate(&self, level: usize) -> Result<(), LodError> {
        if !(self.split.is_finite() && self.split > 0.0) {
            return Err(LodError::InvalidThresholds(format!(
                "level {level}: split factor {} must be positive",
                self.split
            )));
        }
        if !(self.unify.is_finite() && self.unify > self.split) {
            return Err(LodError::InvalidThresholds(format!(
                "level {level}: unify factor {} must exceed split factor {}",
                self.unify, self.split
            )));
        }
        Ok(())
    }
}

/// Split/unify factors, either uniform or per level.
///
/// Levels start at 1. Levels beyond the table reuse its last entry.
#[derive(Clone, Debug, PartialEq)]
pub struct LodThresholds {
    levels: Vec<LevelFactors>,
}

impl LodThresholds {
    /// Same factors for every level.
    pub fn uniform(split: f64, unify: f64) -> Result<Self, LodError> {
        Self::per_level(vec![LevelFactors { split, unify }])
    }

    /// One entry per level, starting at level 1.
    pub fn per_level(levels: Vec<LevelFactors>) -> Result<Self, LodError> {
        if levels.is_empty() {
            return Err(LodError::InvalidThresholds(
                "at least one level is required".into(),
            ));
        }
        for (i, factors) in levels.iter().enumerate() {
            factors.validate(i + 1)?;
        }
        Ok(Self { levels })
    }

    /// Factors that apply at `level`.
    pub fn factors(&self, level: u32) -> LevelFactors {
        let index = (level.max(1) as usize - 1).min(self.levels.len() - 1);
        self.levels[index]
    }

    /// Distance below which a node of `size` at `level` splits.
    pub fn split_distance(&self, level: u32, size: f64) -> f64 {
        size * self.factors(level).split
    }

    /// Distance above which a node of `size` at `level` unifies.
    pub fn unify_distance(&self, level: u32, size: f64) -> f64 {
        size * self.factors(level).unify
    }

    /// Classify `distance` against the band for a node of `size` at `level`.
    pub fn classify(&self, level: u32, size: f64, distance: f64) -> LodAction {
        if distance < self.split_distance(level, size) {
            LodAction::Split
        } else if distance > self.unify_distance(level, size) {
            LodAction::Unify
        } else {
            LodAction::Keep
        }
    }
}

impl Default for LodThresholds {
    fn default() -> Self {
        Self {
            levels: vec![LevelFactors {
                split: 2.0,
                unify: 2.5,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_inside_band_keep_outside_unify() {
        let t = LodThresholds::uniform(4.0, 6.0).unwrap();
        assert_eq!(t.classify(1, 100.0, 10.0), LodAction::Split);
        assert_eq!(t.classify(1, 100.0, 399.9), LodAction::Split);
        assert_eq!(t.classify(1, 100.0, 400.0), LodAction::Keep);
        assert_eq!(t.classify(1, 100.0, 600.0), LodAction::Keep);
        assert_eq!(t.classify(1, 100.0, 600.1), LodAction::Unify);
    }

    #[test]
    fn test_no_oscillation_inside_band() {
        let t = LodThresholds::default();
        // Once split, a child of half size sees the same viewer; the parent
        // only unifies once the viewer leaves the wider band.
        for d in [200.0, 210.0, 240.0, 250.0] {
            assert_ne!(t.classify(1, 100.0, d), LodAction::Unify);
            assert_ne!(t.classify(1, 100.0, d), LodAction::Split);
        }
    }

    #[test]
    fn test_per_level_table_clamps_to_last_entry() {
        let t = LodThresholds::per_level(vec![
            LevelFactors {
                split: 3.0,
                unify: 4.0,
            },
            LevelFactors {
                split: 1.5,
                unify: 2.0,
            },
        ])
        .unwrap();
        assert_eq!(t.factors(1).split, 3.0);
        assert_eq!(t.factors(2).split, 1.5);
        assert_eq!(t.factors(9).unify, 2.0);
        assert_eq!(t.factors(0).split, 3.0);
    }

    #[test]
    fn test_rejects_inverted_or_empty_bands() {
        assert!(LodThresholds::uniform(4.0, 4.0).is_err());
        assert!(LodThresholds::uniform(4.0, 3.0).is_err());
        assert!(LodThresholds::uniform(0.0, 3.0).is_err());
        assert!(LodThresholds::uniform(f64::NAN, 3.0).is_err());
        assert!(matches!(
            LodThresholds::per_level(Vec::new()),
            Err(LodError::InvalidThresholds(_))
        ));
    }
}
