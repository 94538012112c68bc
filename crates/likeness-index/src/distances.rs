//! Offline pass filling the face distance table.

use crate::IndexError;
use likeness_core::{CancelToken, FaceItem};
use likeness_store::{FaceDistanceStore, FaceStore};
use std::collections::BTreeMap;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DistanceReport {
    /// Identifier pairs written.
    pub pairs: usize,
    /// Face comparisons skipped for mismatched descriptor lengths.
    pub skipped: usize,
}

/// Store the distance between every pair of distinct identifiers.
///
/// An identifier may own several faces; the pair's distance is the smallest
/// distance between any of their faces. Re-running replaces earlier values.
pub async fn precompute_distances<F, D>(faces: &F, distances: &D, cancel: &CancelToken) -> Result<DistanceReport, IndexError>
where
    F: FaceStore,
    D: FaceDistanceStore,
{
    let all = cancel.run(faces.get_all_faces()).await?;

    let mut by_id: BTreeMap<&str, Vec<&FaceItem>> = BTreeMap::new();
    for face in &all {
        by_id.entry(face.identifier.as_str()).or_default().push(face);
    }
    let ids: Vec<_> = by_id.values().collect();
    tracing::info!(faces = all.len(), identifiers = ids.len(), "precomputing face distances");

    let mut report = DistanceReport::default();
    for (i, left) in ids.iter().enumerate() {
        for right in &ids[i + 1..] {
            cancel.check()?;

            let mut best: Option<(f32, &FaceItem, &FaceItem)> = None;
            for &a in left.iter() {
                for &b in right.iter() {
                    match a.descriptors.distance_to(&b.descriptors) {
                        Ok(d) if best.map_or(true, |(min, _, _)| d < min) => best = Some((d, a, b)),
                        Ok(_) => {}
                        Err(err) => {
                            tracing::warn!(
                                a = %a.identifier,
                                b = %b.identifier,
                                error = %err,
                                "skipping face pair"
                            );
                            report.skipped += 1;
                        }
                    }
                }
            }

            if let Some((d, a, b)) = best {
                cancel.run(distances.store_face_distance(a, b, d)).await?;
                report.pairs += 1;
            }
        }
    }

    tracing::info!(pairs = report.pairs, skipped = report.skipped, "face distances stored");
    Ok(report)
}
