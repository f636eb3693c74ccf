use serde::Serialize;

/// A scored `(dish, template)` pair.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Candidate {
    /// Dish the template belongs to.
    pub dish: String,
    /// Template filename within the dish.
    pub file: String,
    /// Cosine similarity between the query and the template.
    pub score: f32,
}

impl Candidate {
    /// Creates a new candidate.
    pub fn new(dish: impl Into<String>, file: impl Into<String>, score: f32) -> Self {
        Self {
            dish: dish.into(),
            file: file.into(),
            score,
        }
    }

    /// Whether `self` ranks ahead of `other`.
    ///
    /// Higher score wins; equal scores fall back to the lexicographically
    /// smaller `(dish, file)` so the ranking never depends on listing order.
    pub fn outranks(&self, other: &Candidate) -> bool {
        if self.score != other.score {
            return self.score > other.score;
        }
        (self.dish.as_str(), self.file.as_str()) < (other.dish.as_str(), other.file.as_str())
    }
}

/// Outcome of thresholding the best candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// The best candidate met the threshold.
    Accepted(Candidate),
    /// No candidate met the threshold. `best` is `None` only when the store
    /// held no comparable template at all.
    Rejected {
        /// Closest candidate found, if any.
        best: Option<Candidate>,
    },
}

impl Decision {
    /// Whether the query was recognized.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Decision::Accepted(_))
    }

    /// The best candidate regardless of the decision.
    pub fn best(&self) -> Option<&Candidate> {
        match self {
            Decision::Accepted(c) => Some(c),
            Decision::Rejected { best } => best.as_ref(),
        }
    }
}

/// Full result of a prediction request.
#[derive(Debug, Clone)]
pub struct Prediction {
    /// Accept/reject decision on the best candidate.
    pub decision: Decision,
    /// Threshold the decision was made with.
    pub threshold: f32,
    /// Ranked candidates at or above the threshold, when requested.
    pub candidates: Option<Vec<Candidate>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outranks_by_score_then_name() {
        let a = Candidate::new("pizza", "a.jpg", 0.9);
        let b = Candidate::new("burger", "z.jpg", 0.8);
        assert!(a.outranks(&b));
        assert!(!b.outranks(&a));

        let c = Candidate::new("burger", "z.jpg", 0.9);
        assert!(c.outranks(&a));
        let d = Candidate::new("pizza", "0.jpg", 0.9);
        assert!(d.outranks(&a));
        assert!(!a.outranks(&a.clone()));
    }

    #[test]
    fn test_decision_best() {
        let accepted = Decision::Accepted(Candidate::new("pizza", "a.jpg", 0.95));
        assert!(accepted.is_accepted());
        assert_eq!(accepted.best().map(|c| c.dish.as_str()), Some("pizza"));

        let empty = Decision::Rejected { best: None };
        assert!(!empty.is_accepted());
        assert!(empty.best().is_none());
    }
}
