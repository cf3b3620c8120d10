use sha2::{Digest, Sha256};

pub fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    format!("{:x}", digest)
}

/// Exact-duplicate key of an article.
pub fn content_hash(title: &str, description: &str, content: &str) -> String {
    sha256_hex(&format!("{}\n{}\n{}", title, description, content))
}

pub fn source_key(city: &str, topic: &str, keyword: &str) -> String {
    format!("{}::{}::{}", city.trim(), topic.trim(), keyword.trim()).to_lowercase()
}

/// ASCII-lowercases and hyphenates `parts`, cutting at a hyphen boundary so
/// the result never exceeds `max_len`. Anything outside ASCII alphanumerics
/// acts as a separator.
pub fn slugify(parts: &[&str], max_len: usize) -> String {
    let mut slug = String::new();
    for part in parts {
        for c in part.chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
            } else if !slug.is_empty() && !slug.ends_with('-') {
                slug.push('-');
            }
        }
        if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }

    let mut slug = slug.trim_end_matches('-').to_string();
    if slug.len() > max_len {
        slug.truncate(max_len);
        if let Some(cut) = slug.rfind('-') {
            if cut > 0 {
                slug.truncate(cut);
            }
        }
        slug = slug.trim_end_matches('-').to_string();
    }
    slug
}
