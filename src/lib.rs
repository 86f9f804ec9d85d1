//! Sequence annotation engine: finds known biological parts (promoters,
//! coding sequences, terminators, origins, resistance markers, ...) in an
//! arbitrary DNA sequence by banded local alignment on both strands, and
//! resolves overlapping candidate matches into a consistent annotation set.

pub mod alignment;
pub mod annotator;
pub mod component;
pub mod component_database;
pub mod error;
pub mod iupac_code;
pub mod overlap_resolver;
