use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

use crate::types::{ArticleDraft, Outline};
use crate::{Error, Result};

lazy_static! {
    static ref SLUG_PATTERN: Regex = Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("valid slug pattern");
}

pub fn is_valid_slug(slug: &str) -> bool {
    SLUG_PATTERN.is_match(slug)
}

/// Checks the shape every generated draft must have before it is scored.
pub fn validate_draft(draft: &ArticleDraft) -> Result<()> {
    if draft.title.trim().is_empty() {
        return Err(Error::Schema("title must not be empty".to_string()));
    }
    if draft.description.trim().is_empty() {
        return Err(Error::Schema("description must not be empty".to_string()));
    }
    if draft.content.trim().is_empty() {
        return Err(Error::Schema("content must not be empty".to_string()));
    }
    if !is_valid_slug(&draft.slug) {
        return Err(Error::Schema(format!("slug is not a lowercase hyphen sequence: {:?}", draft.slug)));
    }
    if draft.tags.iter().all(|t| t.trim().is_empty()) {
        return Err(Error::Schema("at least one tag is required".to_string()));
    }
    Ok(())
}

pub fn validate_outline(outline: &Outline) -> Result<()> {
    if outline.title.trim().is_empty() {
        return Err(Error::Schema("outline title must not be empty".to_string()));
    }
    Ok(())
}

/// Trims tags and drops empty or case-insensitive duplicates, keeping order.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.to_lowercase()))
        .map(str::to_string)
        .collect()
}
