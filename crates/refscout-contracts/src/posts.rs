use serde::{Deserialize, Deserializer};

/// Content rating attached to a provider post. The provider's legacy API
/// reports single letters, the current one full words; anything unrecognized
/// (including the field being absent) lands on `Unknown` so a restrictive
/// rating policy excludes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rating {
    General,
    Safe,
    Questionable,
    Explicit,
    #[default]
    Unknown,
}

impl Rating {
    /// Lenient parse for wire data: unrecognized values become `Unknown`.
    pub fn parse(value: &str) -> Rating {
        Self::from_name(value).unwrap_or(Rating::Unknown)
    }

    /// Strict parse for configuration surfaces: unrecognized values are `None`.
    pub fn from_name(value: &str) -> Option<Rating> {
        match value.trim().to_ascii_lowercase().as_str() {
            "general" | "g" => Some(Rating::General),
            "safe" | "s" => Some(Rating::Safe),
            "questionable" | "q" => Some(Rating::Questionable),
            "explicit" | "e" => Some(Rating::Explicit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::General => "general",
            Rating::Safe => "safe",
            Rating::Questionable => "questionable",
            Rating::Explicit => "explicit",
            Rating::Unknown => "unknown",
        }
    }
}

/// One record from a provider search response. Deserialization is lenient:
/// a missing score is 0, a missing or empty `file_url` is `None` (the record
/// is then unusable as an image source), extra provider fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Post {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub tags: String,
    #[serde(default, deserialize_with = "rating_lenient")]
    pub rating: Rating,
    #[serde(default)]
    pub score: i64,
    #[serde(default, deserialize_with = "url_lenient")]
    pub file_url: Option<String>,
}

impl Post {
    pub fn has_file(&self) -> bool {
        self.file_url
            .as_deref()
            .map(|url| !url.trim().is_empty())
            .unwrap_or(false)
    }
}

fn rating_lenient<'de, D>(deserializer: D) -> Result<Rating, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().map(Rating::parse).unwrap_or_default())
}

fn url_lenient<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty()))
}
