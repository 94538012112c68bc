//! Match-threshold evaluation over labeled descriptors.
//!
//! Every descriptor is compared with every other one; comparisons within the
//! same label should match, across labels they should not. The error rates
//! at a given threshold guide the choice of
//! [`DEFAULT_MATCH_THRESHOLD`](likeness_core::types::DEFAULT_MATCH_THRESHOLD).

use likeness_core::{Descriptors, DimensionMismatch, Matcher};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    /// Same-label comparisons.
    pub total_match: usize,
    /// Same-label comparisons the matcher rejected.
    pub false_non_match: usize,
    /// Cross-label comparisons.
    pub total_non_match: usize,
    /// Cross-label comparisons the matcher accepted.
    pub false_match: usize,
}

impl Evaluation {
    pub fn total(&self) -> usize {
        self.total_match + self.total_non_match
    }

    pub fn false_match_rate(&self) -> f32 {
        rate(self.false_match, self.total_non_match)
    }

    pub fn false_non_match_rate(&self) -> f32 {
        rate(self.false_non_match, self.total_match)
    }
}

fn rate(n: usize, total: usize) -> f32 {
    if total == 0 {
        0.0
    } else {
        n as f32 / total as f32
    }
}

/// Stop once both kinds of comparison reached their minimum count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub min_match: usize,
    pub min_non_match: usize,
}

/// Compare every descriptor against every other descriptor.
///
/// A descriptor is never compared with itself. With `limits`, evaluation
/// stops as soon as both minimums are reached.
pub fn evaluate(
    labeled: &BTreeMap<String, Vec<Descriptors>>,
    matcher: &impl Matcher,
    limits: Option<Limits>,
) -> Result<Evaluation, DimensionMismatch> {
    let mut eval = Evaluation::default();

    for (name1, dd1) in labeled {
        for (i, d1) in dd1.iter().enumerate() {
            for (name2, dd2) in labeled {
                for (j, d2) in dd2.iter().enumerate() {
                    let same = name1 == name2;
                    if same && i == j {
                        continue;
                    }

                    let matched = matcher.is_match(d1, d2)?;
                    if same {
                        eval.total_match += 1;
                        if !matched {
                            eval.false_non_match += 1;
                        }
                    } else {
                        eval.total_non_match += 1;
                        if matched {
                            eval.false_match += 1;
                        }
                    }

                    if limits.is_some_and(|l| eval.total_match >= l.min_match && eval.total_non_match >= l.min_non_match) {
                        tracing::info!(
                            total_match = eval.total_match,
                            total_non_match = eval.total_non_match,
                            "evaluation limits reached"
                        );
                        return Ok(eval);
                    }
                }
            }
        }
    }

    Ok(eval)
}
