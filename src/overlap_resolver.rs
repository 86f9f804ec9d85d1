use crate::annotator::AnnotationHit;

/// Reduce candidate hits to a non-overlapping set by greedy interval
/// scheduling: walk the candidates by descending alignment score and accept
/// a hit only if its `[target_start, target_end)` interval intersects no
/// already-accepted hit. Hits on opposite strands compete for a locus like
/// any others. Not globally optimal in total score, but deterministic and
/// linear after the sort.
///
/// Ties are broken toward the longer span, then the earlier start; the
/// remaining fields only make the order total. Output is sorted by
/// position. Applying the function to its own output is a no-op.
pub fn resolve_overlaps(mut hits: Vec<AnnotationHit>) -> Vec<AnnotationHit> {
    hits.sort_by(|a, b| {
        b.alignment_score
            .cmp(&a.alignment_score)
            .then_with(|| {
                (b.target_end - b.target_start).cmp(&(a.target_end - a.target_start))
            })
            .then_with(|| a.target_start.cmp(&b.target_start))
            .then_with(|| a.target_end.cmp(&b.target_end))
            .then_with(|| a.component_id.cmp(&b.component_id))
            .then_with(|| b.strand.cmp(&a.strand))
    });

    let mut accepted: Vec<AnnotationHit> = Vec::new();
    for hit in hits {
        let conflicts = accepted
            .iter()
            .any(|kept| hit.target_start < kept.target_end && kept.target_start < hit.target_end);
        if !conflicts {
            accepted.push(hit);
        }
    }

    accepted.sort_by(|a, b| {
        a.target_start
            .cmp(&b.target_start)
            .then_with(|| a.target_end.cmp(&b.target_end))
            .then_with(|| a.component_id.cmp(&b.component_id))
    });
    accepted
}
