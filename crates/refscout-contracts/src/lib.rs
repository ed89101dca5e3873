mod policy;
mod posts;
mod selection;
mod tags;

pub use policy::{PolicyError, RatingPolicy};
pub use posts::{Post, Rating};
pub use selection::{CandidateSelector, DEFAULT_POOL_SIZE};
pub use tags::{normalize_tags, split_raw};
