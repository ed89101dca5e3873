/// Canonicalize raw tokens into the provider's tag form: trimmed, lowercased,
/// internal whitespace replaced with underscores. Tokens that are empty after
/// trimming are dropped. Order is preserved; earlier tags are treated as more
/// important by the fallback search, so callers must not reorder the result.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .filter_map(|tag| normalize_token(tag.as_ref()))
        .collect()
}

/// Split a free-form space-separated tag description into raw tokens.
pub fn split_raw(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

fn normalize_token(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let tag = trimmed
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase();
    Some(tag)
}
