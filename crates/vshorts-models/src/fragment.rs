//! Fragmentation of a composed video into fixed-length pieces.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::features::FeatureSetError;

/// Requested fragment length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct FragmentSpec {
    pub duration_secs: u32,
}

impl Default for FragmentSpec {
    fn default() -> Self {
        Self {
            duration_secs: Self::DEFAULT_SECS,
        }
    }
}

impl FragmentSpec {
    pub const MIN_SECS: u32 = 15;
    pub const MAX_SECS: u32 = 60;
    pub const DEFAULT_SECS: u32 = 30;

    /// A trailing remainder longer than this becomes its own fragment.
    pub const REMAINDER_THRESHOLD_SECS: f64 = 10.0;

    /// Fragments shorter than this are dropped.
    pub const MIN_FRAGMENT_SECS: f64 = 5.0;

    pub fn new(duration_secs: u32) -> Self {
        Self { duration_secs }
    }

    pub fn validate(&self) -> Result<(), FeatureSetError> {
        if (Self::MIN_SECS..=Self::MAX_SECS).contains(&self.duration_secs) {
            Ok(())
        } else {
            Err(FeatureSetError::FragmentDuration(self.duration_secs))
        }
    }

    /// Compute the cuts for a video of `total_secs`.
    ///
    /// Shorter-than-one-fragment media yields a single cut over the whole
    /// video. Otherwise there are `floor(total / d)` cuts, plus one when the
    /// remainder exceeds [`Self::REMAINDER_THRESHOLD_SECS`]; the last cut runs
    /// to the end of the video.
    pub fn cut_list(&self, total_secs: f64) -> CutList {
        let d = f64::from(self.duration_secs.max(1));
        if !total_secs.is_finite() || total_secs <= 0.0 {
            return CutList::default();
        }

        let count = if total_secs < d {
            1
        } else {
            let full = (total_secs / d).floor() as u32;
            let remainder = total_secs - f64::from(full) * d;
            if remainder > Self::REMAINDER_THRESHOLD_SECS {
                full + 1
            } else {
                full
            }
        };

        let cuts = (0..count)
            .filter_map(|i| {
                let start = f64::from(i) * d;
                let duration = if i + 1 == count {
                    total_secs - start
                } else {
                    d
                };
                (duration >= Self::MIN_FRAGMENT_SECS).then_some(Cut {
                    number: i + 1,
                    start_secs: start,
                    duration_secs: duration,
                })
            })
            .collect();

        CutList { cuts }
    }
}

/// One planned cut of the composed output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Cut {
    /// 1-based, stable even when a short cut is dropped
    pub number: u32,
    pub start_secs: f64,
    pub duration_secs: f64,
}

impl Cut {
    pub fn end_secs(&self) -> f64 {
        self.start_secs + self.duration_secs
    }

    pub fn file_name(&self) -> String {
        format!("fragment_{:03}.mp4", self.number)
    }
}

/// Ordered cuts applied to the finished artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CutList {
    pub cuts: Vec<Cut>,
}

impl CutList {
    pub fn len(&self) -> usize {
        self.cuts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cuts.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Cut> {
        self.cuts.iter()
    }
}

impl<'a> IntoIterator for &'a CutList {
    type Item = &'a Cut;
    type IntoIter = std::slice::Iter<'a, Cut>;

    fn into_iter(self) -> Self::IntoIter {
        self.cuts.iter()
    }
}

/// A fragment file produced from a [`Cut`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Fragment {
    pub number: u32,
    pub start_secs: f64,
    pub duration_secs: f64,
    pub path: PathBuf,
    pub size_bytes: u64,
}
