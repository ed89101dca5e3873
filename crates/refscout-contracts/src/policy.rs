use std::collections::HashSet;

use thiserror::Error;

use crate::posts::Rating;

/// Configuration mistakes caught at construction time, before any search
/// runs. Distinct from search outcomes: exhausting the fallback walk is an
/// ordinary result, not an error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("rating policy allows no ratings")]
    NoAllowedRatings,

    #[error("unknown rating name: {0}")]
    UnknownRating(String),

    #[error("candidate pool size must be at least 1")]
    EmptyPool,

    #[error("fallback tag must normalize to exactly one tag")]
    InvalidFallbackTag,

    #[error("result limit must be at least 1")]
    ZeroResultLimit,
}

/// Which content ratings are acceptable. Unset means permissive — acceptable
/// content is a caller decision, not a search-mechanics one, so the selector
/// takes this as an optional policy rather than hardwiring a default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingPolicy {
    allowed: HashSet<Rating>,
}

impl RatingPolicy {
    pub fn allow<I>(ratings: I) -> Result<Self, PolicyError>
    where
        I: IntoIterator<Item = Rating>,
    {
        let allowed: HashSet<Rating> = ratings.into_iter().collect();
        if allowed.is_empty() {
            return Err(PolicyError::NoAllowedRatings);
        }
        Ok(Self { allowed })
    }

    /// Build a policy from configuration text (e.g. a `--ratings` value).
    /// Unrecognized names are rejected rather than silently dropped.
    pub fn from_names<I, S>(names: I) -> Result<Self, PolicyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ratings = Vec::new();
        for name in names {
            let name = name.as_ref();
            let rating = Rating::from_name(name)
                .ok_or_else(|| PolicyError::UnknownRating(name.trim().to_string()))?;
            ratings.push(rating);
        }
        Self::allow(ratings)
    }

    pub fn permits(&self, rating: Rating) -> bool {
        self.allowed.contains(&rating)
    }
}
