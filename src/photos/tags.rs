use std::collections::HashSet;

/// Produce the desired tag name set from raw user input: trim, lowercase,
/// drop empties, deduplicate (first occurrence wins).
pub fn normalize_tags<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for tag in raw {
        let name = tag.as_ref().trim().to_lowercase();
        if !name.is_empty() && seen.insert(name.clone()) {
            names.push(name);
        }
    }
    names
}
