use locus_core::ArticleDraft;
use locus_quality::text::has_sources_section;
use url::Url;

/// Parses `raw` as an http(s) URL without query or fragment.
pub fn normalize_source_link(raw: &str) -> Option<Url> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    url.set_fragment(None);
    url.set_query(None);
    Some(url)
}

/// Normalized, deduplicated links in first-seen order. Anything that is not
/// an http(s) URL is dropped.
pub fn normalize_source_links(urls: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(urls.len());
    for url in urls.iter().filter_map(|u| normalize_source_link(u)) {
        let url = url.to_string();
        if !out.contains(&url) {
            out.push(url);
        }
    }
    out
}

/// Normalizes the draft's links and appends a "Sources" section listing them
/// when the body has none. Running it twice changes nothing.
pub fn ensure_sources_section(draft: &mut ArticleDraft) {
    draft.source_links = normalize_source_links(&draft.source_links);
    if draft.source_links.is_empty() || has_sources_section(&draft.content) {
        return;
    }

    let list = draft
        .source_links
        .iter()
        .map(|link| format!("- {}", link))
        .collect::<Vec<_>>()
        .join("\n");
    let body = draft.content.trim_end();
    draft.content = format!("{}\n\n## Sources\n\n{}", body, list);
}
