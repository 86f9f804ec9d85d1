use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use itertools::Itertools;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::alignment::{smith_waterman, AlignmentResult, Band, ScoringParams};
use crate::component::{Category, Component};
use crate::component_database::ComponentStore;
use crate::error::PartScanError;
use crate::iupac_code::{is_strict_dna, reverse_complement, validate_sequence};
use crate::overlap_resolver::resolve_overlaps;

pub const FORWARD: i8 = 1;
pub const REVERSE: i8 = -1;

/// Configuration of the auto-annotation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationConfig {
    /// Minimum percent identity to keep a hit (0-100).
    pub min_identity: f64,
    /// Minimum percent of the component covered by the alignment (0-100).
    pub min_coverage: f64,
    pub scoring: ScoringParams,
    /// Half-width of the alignment band around a seeded diagonal.
    pub band_width: usize,
    /// Exact-word length used to anchor banded alignments.
    pub word_size: usize,
    /// Components up to this length skip seeding and get a full matrix.
    pub full_matrix_max_subject: usize,
    /// Alignments scoring below this are not considered at all.
    pub min_score: i32,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            min_identity: 80.0,
            min_coverage: 80.0,
            scoring: ScoringParams::default(),
            band_width: 50,
            word_size: 11,
            full_matrix_max_subject: 64,
            min_score: 20,
        }
    }
}

/// A known component found in the query sequence. Coordinates are 0-based,
/// half-open, on the query. For circular queries a hit straddling the origin
/// keeps `target_start < len` and `target_end = target_start + span`, which
/// may exceed the sequence length; wrapping is the caller's concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationHit {
    pub component_id: i64,
    pub component_name: String,
    pub category: Category,
    pub target_start: usize,
    pub target_end: usize,
    /// +1 forward, -1 reverse complement.
    pub strand: i8,
    pub percent_identity: f64,
    /// Percent of the component covered by the alignment.
    pub query_coverage: f64,
    pub alignment_score: i32,
    pub color: String,
}

/// Annotate a query sequence against a component store.
///
/// Every DNA component is aligned on both strands (the component is
/// reverse-complemented, the query never is). Hits passing both the
/// identity and the coverage threshold go through overlap resolution;
/// the survivors come back sorted by position.
///
/// An empty query or an empty store yields `Ok(vec![])`; no matches is a
/// normal outcome, not a failure. Only an unreadable store is fatal.
/// `cancel` is checked between per-component work items; a cancelled run
/// returns `Err(PartScanError::Cancelled)` rather than a partial result.
pub fn auto_annotate(
    query: &str,
    is_circular: bool,
    config: &AnnotationConfig,
    store: &dyn ComponentStore,
    cancel: &AtomicBool,
) -> Result<Vec<AnnotationHit>, PartScanError> {
    if query.is_empty() {
        return Ok(vec![]);
    }
    if let Err((pos, letter)) = validate_sequence(query.as_bytes()) {
        return Err(PartScanError::Input(format!(
            "query has invalid letter '{}' at position {pos}",
            letter as char
        )));
    }

    let components = store
        .list_components(None)
        .map_err(PartScanError::Store)?;
    if components.is_empty() {
        return Ok(vec![]);
    }

    let len = query.len();
    let mut search = query.as_bytes().to_ascii_uppercase();
    if is_circular {
        // Extend past the origin so alignments can straddle it; hits that
        // start inside the extension are shifted copies and are dropped below.
        let longest = components.iter().map(|c| c.length).max().unwrap_or(0);
        let extension = (longest + config.band_width).min(len);
        search.extend_from_within(..extension);
    }
    let word_index = build_word_index(&search, config.word_size);

    let per_component: Vec<Vec<AnnotationHit>> = components
        .par_iter()
        .map(|component| {
            if cancel.load(Ordering::Relaxed) {
                return vec![];
            }
            // Catalogs may carry parts that are not plain DNA; those are
            // listable but not alignable.
            if !is_strict_dna(component.sequence.as_bytes()) {
                return vec![];
            }
            let mut hits = component_candidates(&search, &word_index, component, FORWARD, config);
            hits.extend(component_candidates(&search, &word_index, component, REVERSE, config));
            hits
        })
        .collect();

    if cancel.load(Ordering::Relaxed) {
        return Err(PartScanError::Cancelled);
    }

    let mut hits: Vec<AnnotationHit> = per_component.into_iter().flatten().collect();

    if is_circular {
        for hit in &mut hits {
            if hit.target_start >= len {
                hit.target_start -= len;
                hit.target_end -= len;
            }
        }
    }

    // Adjacent seed clusters can rediscover the same alignment, and the
    // circular extension re-finds every hit near the origin. Keep the
    // best-scoring instance of each identical interval.
    hits.sort_by(|a, b| {
        b.alignment_score
            .cmp(&a.alignment_score)
            .then_with(|| a.component_id.cmp(&b.component_id))
            .then_with(|| b.strand.cmp(&a.strand))
            .then_with(|| a.target_start.cmp(&b.target_start))
    });
    let hits: Vec<AnnotationHit> = hits
        .into_iter()
        .unique_by(|h| (h.component_id, h.strand, h.target_start, h.target_end))
        .collect();

    Ok(resolve_overlaps(hits))
}

/// Candidate hits of one component on one strand, thresholds applied.
fn component_candidates(
    search: &[u8],
    word_index: &HashMap<u64, Vec<u32>>,
    component: &Component,
    strand: i8,
    config: &AnnotationConfig,
) -> Vec<AnnotationHit> {
    let forward = component.sequence.as_bytes();
    let reverse;
    let subject: &[u8] = if strand == REVERSE {
        reverse = reverse_complement(forward);
        &reverse
    } else {
        forward
    };

    let mut alignments: Vec<AlignmentResult> = Vec::new();
    if subject.len() <= config.full_matrix_max_subject || subject.len() < config.word_size {
        // Short subjects are cheap enough for an exact full matrix.
        if let Some(result) =
            smith_waterman(search, subject, &config.scoring, Band::Full, config.min_score)
        {
            alignments.push(result);
        }
    } else {
        for center in seed_diagonals(word_index, subject, config.word_size, config.band_width) {
            if let Some(result) = align_banded_window(
                search,
                subject,
                center,
                config.band_width,
                &config.scoring,
                config.min_score,
            ) {
                alignments.push(result);
            }
        }
    }

    alignments
        .into_iter()
        .filter_map(|result| {
            let percent_identity = result.identity() * 100.0;
            let query_coverage = result.subject_coverage(subject.len()) * 100.0;
            if percent_identity < config.min_identity || query_coverage < config.min_coverage {
                return None;
            }
            Some(AnnotationHit {
                component_id: component.id,
                component_name: component.name.clone(),
                category: component.category,
                target_start: result.query_start,
                target_end: result.query_end,
                strand,
                percent_identity,
                query_coverage,
                alignment_score: result.score,
                color: component.category.color().to_string(),
            })
        })
        .collect()
}

/// 2-bit encode the word at `start`; `None` if it contains an ambiguous base.
#[inline]
fn encode_word(seq: &[u8], start: usize, k: usize) -> Option<u64> {
    let mut code = 0u64;
    for &base in &seq[start..start + k] {
        let bits = match base {
            b'T' | b't' | b'U' | b'u' => 0,
            b'C' | b'c' => 1,
            b'A' | b'a' => 2,
            b'G' | b'g' => 3,
            _ => return None,
        };
        code = (code << 2) | bits;
    }
    Some(code)
}

/// Positions of every unambiguous word of the search sequence.
fn build_word_index(seq: &[u8], k: usize) -> HashMap<u64, Vec<u32>> {
    let mut index: HashMap<u64, Vec<u32>> = HashMap::new();
    if seq.len() < k {
        return index;
    }
    for pos in 0..=(seq.len() - k) {
        if let Some(code) = encode_word(seq, pos, k) {
            index.entry(code).or_default().push(pos as u32);
        }
    }
    index
}

/// Diagonals (query position minus subject position) on which the subject
/// shares at least one exact word with the search sequence, clustered so
/// that one banded alignment covers each group.
fn seed_diagonals(
    word_index: &HashMap<u64, Vec<u32>>,
    subject: &[u8],
    k: usize,
    band_width: usize,
) -> Vec<isize> {
    let mut diagonals: Vec<isize> = Vec::new();
    for pos in 0..=(subject.len() - k) {
        if let Some(code) = encode_word(subject, pos, k) {
            if let Some(query_positions) = word_index.get(&code) {
                for &q in query_positions {
                    diagonals.push(q as isize - pos as isize);
                }
            }
        }
    }
    diagonals.sort_unstable();
    diagonals.dedup();

    let mut centers = Vec::new();
    let mut iter = diagonals.into_iter();
    if let Some(first) = iter.next() {
        let mut lo = first;
        let mut hi = first;
        for d in iter {
            if d - lo <= band_width as isize {
                hi = d;
            } else {
                centers.push(lo + (hi - lo) / 2);
                lo = d;
                hi = d;
            }
        }
        centers.push(lo + (hi - lo) / 2);
    }
    centers
}

/// Run one banded alignment around `center`, on the query window that the
/// band can actually reach, and map coordinates back to the full query.
fn align_banded_window(
    search: &[u8],
    subject: &[u8],
    center: isize,
    width: usize,
    params: &ScoringParams,
    min_score: i32,
) -> Option<AlignmentResult> {
    let m = subject.len() as isize;
    let lo = (center - width as isize).max(0) as usize;
    let hi = ((center + m + width as isize).max(0) as usize).min(search.len());
    if lo >= hi {
        return None;
    }
    let band = Band::Diagonal {
        center: center - lo as isize,
        width,
    };
    smith_waterman(&search[lo..hi], subject, params, band, min_score).map(|mut result| {
        result.query_start += lo;
        result.query_end += lo;
        result
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component_database::ComponentDatabase;
    use anyhow::anyhow;

    const T7_PROMOTER: &str = "TAATACGACTCACTATAGG";

    fn no_cancel() -> AtomicBool {
        AtomicBool::new(false)
    }

    fn test_db(parts: &[(&str, Category, &str)]) -> ComponentDatabase {
        let mut db = ComponentDatabase::empty();
        for (name, category, sequence) in parts {
            let part = Component::new(*name, *category, *sequence).unwrap();
            db.insert_component(part).unwrap();
        }
        db
    }

    /// 1000 bp query with an exact T7 promoter copy at 370.
    fn plasmid_with_t7() -> String {
        let mut query = "T".repeat(370);
        query.push_str(T7_PROMOTER);
        query.push_str(&"T".repeat(1000 - query.len()));
        query
    }

    #[test]
    fn test_exact_forward_hit() {
        let db = test_db(&[("T7 promoter", Category::Promoter, T7_PROMOTER)]);
        let hits = auto_annotate(
            &plasmid_with_t7(),
            false,
            &AnnotationConfig::default(),
            &db,
            &no_cancel(),
        )
        .unwrap();

        assert_eq!(hits.len(), 1);
        let hit = &hits[0];
        assert_eq!(hit.component_name, "T7 promoter");
        assert_eq!(hit.target_start, 370);
        assert_eq!(hit.target_end, 370 + T7_PROMOTER.len());
        assert_eq!(hit.strand, FORWARD);
        assert!((hit.percent_identity - 100.0).abs() < 1e-9);
        assert!((hit.query_coverage - 100.0).abs() < 1e-9);
        assert_eq!(hit.category, Category::Promoter);
        assert_eq!(hit.color, Category::Promoter.color());
    }

    #[test]
    fn test_reverse_strand_hit() {
        let part = "AAACCCGGGAAACCCGGGAAA";
        let rc: Vec<u8> = reverse_complement(part.as_bytes());
        let mut query = "G".repeat(40);
        query.push_str(std::str::from_utf8(&rc).unwrap());
        query.push_str(&"G".repeat(40));

        let db = test_db(&[("palindromeless", Category::Misc, part)]);
        let hits =
            auto_annotate(&query, false, &AnnotationConfig::default(), &db, &no_cancel()).unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].strand, REVERSE);
        assert_eq!(hits[0].target_start, 40);
        assert_eq!(hits[0].target_end, 40 + part.len());
        assert!((hits[0].percent_identity - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_reverse_complement_symmetry() {
        // Annotating S and annotating revcomp(S) must find the same part on
        // opposite strands with identical scores and reflected coordinates.
        let part = "ATGGTGAGCAAGGGCGAGGAGCTG";
        let mut query = "CATCAT".repeat(10);
        query.push_str(part);
        query.push_str(&"GGATTA".repeat(10));
        let rc_query =
            String::from_utf8(reverse_complement(query.as_bytes())).unwrap();

        let db = test_db(&[("part", Category::Cds, part)]);
        let config = AnnotationConfig::default();
        let fwd = auto_annotate(&query, false, &config, &db, &no_cancel()).unwrap();
        let rev = auto_annotate(&rc_query, false, &config, &db, &no_cancel()).unwrap();

        assert_eq!(fwd.len(), 1);
        assert_eq!(rev.len(), 1);
        assert_eq!(fwd[0].strand, FORWARD);
        assert_eq!(rev[0].strand, REVERSE);
        assert_eq!(fwd[0].alignment_score, rev[0].alignment_score);
        let len = query.len();
        assert_eq!(rev[0].target_start, len - fwd[0].target_end);
        assert_eq!(rev[0].target_end, len - fwd[0].target_start);
    }

    #[test]
    fn test_threshold_monotonicity() {
        // 2 mismatches in a 20 bp part: 90% identity.
        let part = "ACGTACGTACGTACGTACGT";
        let found = "ACGAACGTACGTACTTACGT";
        let mut query = "G".repeat(50);
        query.push_str(found);
        query.push_str(&"G".repeat(50));
        let db = test_db(&[("imperfect", Category::Misc, part)]);

        let mut counts = Vec::new();
        for min_identity in [50.0, 85.0, 95.0] {
            let config = AnnotationConfig {
                min_identity,
                min_coverage: 50.0,
                ..Default::default()
            };
            counts.push(
                auto_annotate(&query, false, &config, &db, &no_cancel())
                    .unwrap()
                    .len(),
            );
        }
        assert!(counts[0] >= counts[1] && counts[1] >= counts[2]);
        assert_eq!(counts[1], 1);
        assert_eq!(counts[2], 0);
    }

    #[test]
    fn test_overlapping_components_resolved() {
        // Both parts match the same locus; the longer exact match scores
        // higher and must be the only survivor.
        let long_part = "ACGGATTACAGGATTACAGGATTACA";
        let short_part = "ACGGATTACAGGATTACA";
        let mut query = "T".repeat(30);
        query.push_str(long_part);
        query.push_str(&"T".repeat(30));
        let db = test_db(&[
            ("short", Category::Misc, short_part),
            ("long", Category::Misc, long_part),
        ]);

        let hits =
            auto_annotate(&query, false, &AnnotationConfig::default(), &db, &no_cancel()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].component_name, "long");
    }

    #[test]
    fn test_circular_hit_straddles_origin() {
        let part = "TAATACGACTCACTATAGGAGACCACAACGG";
        let (head, tail) = part.split_at(16);
        // Sequence starts with the tail of the part and ends with its head:
        // only the circular join contains the whole part.
        let mut query = tail.to_string();
        query.push_str(&"C".repeat(80));
        query.push_str(head);

        let db = test_db(&[("split part", Category::Promoter, part)]);
        let config = AnnotationConfig::default();

        let linear = auto_annotate(&query, false, &config, &db, &no_cancel()).unwrap();
        assert!(linear.is_empty(), "halves alone are below coverage");

        let circular = auto_annotate(&query, true, &config, &db, &no_cancel()).unwrap();
        assert_eq!(circular.len(), 1);
        let hit = &circular[0];
        let len = query.len();
        assert_eq!(hit.target_start, len - head.len());
        assert_eq!(hit.target_end, len - head.len() + part.len());
        assert!(hit.target_end > len, "hit must straddle the origin unwrapped");
        assert!((hit.percent_identity - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_circular_does_not_duplicate_interior_hits() {
        let db = test_db(&[("T7 promoter", Category::Promoter, T7_PROMOTER)]);
        let query = plasmid_with_t7();
        let linear =
            auto_annotate(&query, false, &AnnotationConfig::default(), &db, &no_cancel()).unwrap();
        let circular =
            auto_annotate(&query, true, &AnnotationConfig::default(), &db, &no_cancel()).unwrap();
        assert_eq!(linear, circular);
    }

    #[test]
    fn test_empty_query_is_no_match() {
        let db = test_db(&[("T7 promoter", Category::Promoter, T7_PROMOTER)]);
        let hits =
            auto_annotate("", false, &AnnotationConfig::default(), &db, &no_cancel()).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_empty_store_is_no_match() {
        let db = ComponentDatabase::empty();
        let hits = auto_annotate(
            "ACGTACGTACGT",
            false,
            &AnnotationConfig::default(),
            &db,
            &no_cancel(),
        )
        .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_invalid_query_rejected() {
        let db = test_db(&[("T7 promoter", Category::Promoter, T7_PROMOTER)]);
        let err = auto_annotate(
            "ACGT!ACGT",
            false,
            &AnnotationConfig::default(),
            &db,
            &no_cancel(),
        )
        .unwrap_err();
        assert!(matches!(err, PartScanError::Input(_)));
    }

    #[test]
    fn test_ambiguous_component_skipped_not_fatal() {
        let db = test_db(&[
            ("fuzzy", Category::Misc, "ACGTNNNNNNNNNNNNACGT"),
            ("T7 promoter", Category::Promoter, T7_PROMOTER),
        ]);
        let hits = auto_annotate(
            &plasmid_with_t7(),
            false,
            &AnnotationConfig::default(),
            &db,
            &no_cancel(),
        )
        .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].component_name, "T7 promoter");
    }

    #[test]
    fn test_cancellation() {
        let db = test_db(&[("T7 promoter", Category::Promoter, T7_PROMOTER)]);
        let cancel = AtomicBool::new(true);
        let err = auto_annotate(
            &plasmid_with_t7(),
            false,
            &AnnotationConfig::default(),
            &db,
            &cancel,
        )
        .unwrap_err();
        assert!(matches!(err, PartScanError::Cancelled));
    }

    #[test]
    fn test_store_failure_is_fatal() {
        struct BrokenStore;
        impl ComponentStore for BrokenStore {
            fn list_components(
                &self,
                _category: Option<Category>,
            ) -> anyhow::Result<Vec<Component>> {
                Err(anyhow!("disk on fire"))
            }
            fn get_component(&self, _id: i64) -> anyhow::Result<Option<Component>> {
                Err(anyhow!("disk on fire"))
            }
        }

        let err = auto_annotate(
            "ACGTACGT",
            false,
            &AnnotationConfig::default(),
            &BrokenStore,
            &no_cancel(),
        )
        .unwrap_err();
        assert!(matches!(err, PartScanError::Store(_)));
    }

    #[test]
    fn test_determinism() {
        let db = ComponentDatabase::default();
        let egfp = db.search_components("EGFP")[0].sequence.clone();
        let mut query = "GCATTACGCT".repeat(4);
        query.push_str(T7_PROMOTER);
        query.push_str("CCGGAATTGCCAGCTGGGGCGCCCTCTGG");
        query.push_str(&egfp);
        query.push_str(&"TCCTTAGCAC".repeat(4));

        let config = AnnotationConfig::default();
        let first = auto_annotate(&query, false, &config, &db, &no_cancel()).unwrap();
        let second = auto_annotate(&query, false, &config, &db, &no_cancel()).unwrap();
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn test_builtin_catalog_annotation_with_seeded_path() {
        // EGFP (720 bp) exercises the seeded banded path; the T7 promoter
        // the full-matrix path. pHluorin2 and the T7 primer lose their loci
        // to the better or earlier-seeded twin in overlap resolution.
        let db = ComponentDatabase::default();
        let egfp = db.search_components("EGFP")[0].sequence.clone();
        let mut query = "GCATTACGCT".repeat(3);
        let t7_at = query.len();
        query.push_str(T7_PROMOTER);
        query.push_str("CCGGAATTGCCAGCTGGGGCGCCCTCTGG");
        let egfp_at = query.len();
        query.push_str(&egfp);
        query.push_str(&"TCCTTAGCAC".repeat(3));

        let hits = auto_annotate(&query, false, &AnnotationConfig::default(), &db, &no_cancel())
            .unwrap();

        let egfp_hit = hits
            .iter()
            .find(|h| h.component_name == "EGFP")
            .expect("EGFP not found");
        assert_eq!(egfp_hit.target_start, egfp_at);
        assert_eq!(egfp_hit.target_end, egfp_at + egfp.len());
        assert_eq!(egfp_hit.strand, FORWARD);
        assert!((egfp_hit.percent_identity - 100.0).abs() < 1e-9);

        let t7_hit = hits
            .iter()
            .find(|h| h.target_start == t7_at)
            .expect("no hit at the T7 locus");
        assert_eq!(t7_hit.target_end, t7_at + T7_PROMOTER.len());

        // Resolver invariant: no two surviving hits overlap.
        for pair in hits.windows(2) {
            assert!(pair[0].target_end <= pair[1].target_start);
        }
    }

    #[test]
    fn test_word_index_and_seeding() {
        let seq = b"AAACCCGGGTTTAAACCCGGGTTT";
        let index = build_word_index(seq, 11);
        assert!(!index.is_empty());

        // The subject equals the first half; seeds must vote for diagonals
        // 0 and 12, far enough apart to form two clusters at width 5.
        let subject = b"AAACCCGGGTTT";
        let centers = seed_diagonals(&index, subject, 11, 5);
        assert_eq!(centers, vec![0, 12]);
    }

    #[test]
    fn test_encode_word_rejects_ambiguity() {
        assert!(encode_word(b"ACGTACGTACG", 0, 11).is_some());
        assert!(encode_word(b"ACGTNCGTACG", 0, 11).is_none());
    }
}
