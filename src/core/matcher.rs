//! Nearest-template search by cosine similarity.
//!
//! A flat scan over every stored embedding. There is no "no match yet"
//! sentinel score: an empty or incomparable store yields no candidate and
//! therefore always a rejection, whatever the threshold.

use crate::core::embeddings::cosine_similarity;
use crate::models::prediction::{Candidate, Decision};
use crate::models::template::TemplateListing;

/// Score every comparable template against `query`
fn scored<'a>(
    query: &'a [f32],
    listing: &'a TemplateListing,
) -> impl Iterator<Item = Candidate> + 'a {
    listing.iter().flat_map(move |(dish, records)| {
        records.iter().filter_map(move |record| {
            if record.embedding.len() != query.len() {
                log::debug!(
                    "Skipping {}/{}: embedding length {} != query length {}",
                    dish,
                    record.file,
                    record.embedding.len(),
                    query.len()
                );
                return None;
            }
            let score = cosine_similarity(query, &record.embedding);
            if score.is_nan() {
                return None;
            }
            Some(Candidate::new(dish.as_str(), record.file.as_str(), score))
        })
    })
}

/// Find the single best-scoring template
pub fn best_match(query: &[f32], listing: &TemplateListing) -> Option<Candidate> {
    scored(query, listing).fold(None, |best, candidate| match best {
        Some(current) if !candidate.outranks(&current) => Some(current),
        _ => Some(candidate),
    })
}

/// Accept `best` if its score reaches `threshold`
pub fn decide(best: Option<Candidate>, threshold: f32) -> Decision {
    match best {
        Some(candidate) if candidate.score >= threshold => Decision::Accepted(candidate),
        best => Decision::Rejected { best },
    }
}

/// Best match followed by the threshold decision
pub fn match_query(query: &[f32], listing: &TemplateListing, threshold: f32) -> Decision {
    decide(best_match(query, listing), threshold)
}

/// Up to `k` candidates at or above `threshold`, best first
pub fn top_k(query: &[f32], listing: &TemplateListing, threshold: f32, k: usize) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = scored(query, listing)
        .filter(|c| c.score >= threshold)
        .collect();
    candidates.sort_by(|a, b| {
        if a.outranks(b) {
            std::cmp::Ordering::Less
        } else if b.outranks(a) {
            std::cmp::Ordering::Greater
        } else {
            std::cmp::Ordering::Equal
        }
    });
    candidates.truncate(k);
    candidates
}
