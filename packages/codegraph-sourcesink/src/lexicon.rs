//! Policy tables
//!
//! Keyword → category, claim phrase → confirmation, hedge → confidence and
//! sink category → vulnerability mappings. All tables are ordered: lookups
//! walk them front to back and the first match wins, so reordering an entry
//! changes classification outcomes. Keywords match whole words only.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::SourceSinkCategory;

/// Category keyword sets, one ordered table per role
pub type CategoryTable = [(SourceSinkCategory, &'static [&'static str])];

/// Source categories in priority order
pub const SOURCE_CATEGORY_KEYWORDS: &CategoryTable = &[
    (
        SourceSinkCategory::UserInput,
        &[
            "user input",
            "request",
            "form",
            "query param",
            "argv",
            "stdin",
            "cookie",
            "header",
            "upload",
        ],
    ),
    (
        SourceSinkCategory::DatabaseRead,
        &["database", "sql", "select", "fetch", "cursor", "orm", "record"],
    ),
    (
        SourceSinkCategory::FileRead,
        &["file", "read", "open", "path", "load"],
    ),
    (
        SourceSinkCategory::NetworkReceive,
        &["network", "socket", "http", "recv", "download", "api response"],
    ),
    (
        SourceSinkCategory::EnvironmentVariable,
        &["environment", "env var", "getenv", "environ"],
    ),
    (
        SourceSinkCategory::Configuration,
        &["config", "setting", "option", "ini", "yaml"],
    ),
];

/// Sink categories in priority order
pub const SINK_CATEGORY_KEYWORDS: &CategoryTable = &[
    (
        SourceSinkCategory::DatabaseWrite,
        &["database", "sql", "insert", "update", "delete", "execute query", "commit"],
    ),
    (
        SourceSinkCategory::FileWrite,
        &["file", "write", "save", "dump", "persist"],
    ),
    (
        SourceSinkCategory::NetworkSend,
        &["network", "socket", "send", "post", "upload", "http request"],
    ),
    (
        SourceSinkCategory::CommandExecution,
        &["command", "exec", "shell", "subprocess", "system", "spawn", "eval"],
    ),
    (
        SourceSinkCategory::MarkupRendering,
        &["html", "render", "template", "markup", "dom"],
    ),
    (
        SourceSinkCategory::Logging,
        &["log", "logger", "audit", "trace"],
    ),
    (
        SourceSinkCategory::ResponseGeneration,
        &["response", "reply", "return to client", "redirect"],
    ),
];

/// Verbs that introduce a role claim ("it is a source", "acts as a sink")
pub const CLAIM_VERBS: &[&str] = &["is", "acts as", "serves as", "might be"];

/// Adjectives allowed between the article and the role noun
pub const CLAIM_QUALIFIERS: &[&str] = &["potential", "possible", "likely"];

/// Hedge word → confidence, strongest first
pub const HEDGE_CONFIDENCE: &[(&str, f64)] = &[
    ("definitely", 0.9),
    ("likely", 0.7),
    ("probably", 0.6),
    ("possibly", 0.4),
    ("might", 0.3),
];

/// Confidence when a completion carries no hedge word
pub const DEFAULT_HEDGE_CONFIDENCE: f64 = 0.5;

/// Default keyword funnel terms for source candidates
pub const DEFAULT_SOURCE_KEYWORDS: &[&str] = &[
    "input",
    "request",
    "read",
    "param",
    "form",
    "cookie",
    "header",
    "recv",
    "receive",
    "environ",
    "getenv",
    "config",
    "load",
    "fetch",
    "download",
    "stdin",
];

/// Default keyword funnel terms for sink candidates
pub const DEFAULT_SINK_KEYWORDS: &[&str] = &[
    "execute",
    "exec",
    "query",
    "write",
    "save",
    "send",
    "render",
    "template",
    "html",
    "command",
    "subprocess",
    "shell",
    "eval",
    "log",
    "response",
    "redirect",
];

/// Vulnerability hypothesis for a sink category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VulnerabilityProfile {
    pub vulnerability_type: &'static str,
    pub recommendations: &'static [&'static str],
}

static VULNERABILITY_PROFILES: &[(SourceSinkCategory, VulnerabilityProfile)] = &[
    (
        SourceSinkCategory::DatabaseWrite,
        VulnerabilityProfile {
            vulnerability_type: "SQL Injection",
            recommendations: &[
                "Use parameterized queries or prepared statements",
                "Validate and constrain input before it reaches the query layer",
            ],
        },
    ),
    (
        SourceSinkCategory::CommandExecution,
        VulnerabilityProfile {
            vulnerability_type: "Command Injection",
            recommendations: &[
                "Avoid invoking a shell; pass arguments as a list",
                "Allow-list permitted commands and arguments",
            ],
        },
    ),
    (
        SourceSinkCategory::MarkupRendering,
        VulnerabilityProfile {
            vulnerability_type: "Cross-Site Scripting",
            recommendations: &[
                "Enable context-aware output escaping in the template engine",
                "Sanitize untrusted markup before rendering",
            ],
        },
    ),
    (
        SourceSinkCategory::FileWrite,
        VulnerabilityProfile {
            vulnerability_type: "Path Traversal",
            recommendations: &[
                "Canonicalize paths and confine writes to an allowed directory",
                "Reject path separators and parent references in file names",
            ],
        },
    ),
    (
        SourceSinkCategory::NetworkSend,
        VulnerabilityProfile {
            vulnerability_type: "Server-Side Request Forgery",
            recommendations: &[
                "Allow-list destination hosts and schemes",
                "Do not forward untrusted data to internal services",
            ],
        },
    ),
    (
        SourceSinkCategory::Logging,
        VulnerabilityProfile {
            vulnerability_type: "Log Injection",
            recommendations: &[
                "Strip or encode line breaks in logged values",
                "Avoid logging secrets and personal data",
            ],
        },
    ),
    (
        SourceSinkCategory::ResponseGeneration,
        VulnerabilityProfile {
            vulnerability_type: "Information Disclosure",
            recommendations: &[
                "Filter internal fields out of client responses",
                "Validate redirect targets against an allow-list",
            ],
        },
    ),
];

const FALLBACK_PROFILE: VulnerabilityProfile = VulnerabilityProfile {
    vulnerability_type: "Untrusted Data Flow",
    recommendations: &["Validate untrusted data before it reaches the sink"],
};

pub fn vulnerability_profile(sink_category: SourceSinkCategory) -> VulnerabilityProfile {
    VULNERABILITY_PROFILES
        .iter()
        .find(|(category, _)| *category == sink_category)
        .map(|(_, profile)| *profile)
        .unwrap_or(FALLBACK_PROFILE)
}

fn alternation<'a>(words: impl IntoIterator<Item = &'a str>) -> String {
    words
        .into_iter()
        .map(|word| {
            word.split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s+")
        })
        .collect::<Vec<_>>()
        .join("|")
}

/// Whole-word pattern; a plural or verb suffix still counts, so "reads"
/// matches "read" but "information" does not match "form".
fn keyword_regex(keyword: &str) -> Option<Regex> {
    Regex::new(&format!(r"\b(?:{})(?:s|es|ed|ing)?\b", alternation([keyword]))).ok()
}

static KEYWORD_PATTERNS: Lazy<HashMap<&'static str, Regex>> = Lazy::new(|| {
    SOURCE_CATEGORY_KEYWORDS
        .iter()
        .chain(SINK_CATEGORY_KEYWORDS)
        .flat_map(|(_, keywords)| keywords.iter().copied())
        .filter_map(|keyword| keyword_regex(keyword).map(|re| (keyword, re)))
        .collect()
});

static HEDGE_PATTERNS: Lazy<Vec<(Regex, f64)>> = Lazy::new(|| {
    HEDGE_CONFIDENCE
        .iter()
        .filter_map(|(word, confidence)| {
            Regex::new(&format!(r"\b{}\b", regex::escape(word)))
                .ok()
                .map(|re| (re, *confidence))
        })
        .collect()
});

/// `<verb> [hedge] a|an [qualifier] <noun>`, e.g. "is likely a source".
/// A negation between verb and article ("is not a source") never matches.
fn claim_regex(noun: &str) -> Regex {
    let pattern = format!(
        r"(?i)\b(?:{verbs})\s+(?:(?:{hedges})\s+)?an?\s+(?:(?:{qualifiers})\s+)?{noun}s?\b",
        verbs = alternation(CLAIM_VERBS.iter().copied()),
        hedges = alternation(HEDGE_CONFIDENCE.iter().map(|(word, _)| *word)),
        qualifiers = alternation(CLAIM_QUALIFIERS.iter().copied()),
        noun = regex::escape(noun),
    );
    Regex::new(&pattern).expect("claim regex is valid")
}

static SOURCE_CLAIM: Lazy<Regex> = Lazy::new(|| claim_regex("source"));
static SINK_CLAIM: Lazy<Regex> = Lazy::new(|| claim_regex("sink"));

/// Whether lowercased `text` mentions `keyword` as a whole word.
pub fn mentions(text: &str, keyword: &str) -> bool {
    match KEYWORD_PATTERNS.get(keyword) {
        Some(re) => re.is_match(text),
        None => keyword_regex(keyword).map_or(false, |re| re.is_match(text)),
    }
}

/// First category in `table` with any keyword mentioned in `text`.
///
/// `text` is matched case-insensitively. Priority is table order, not
/// position or frequency in the text.
pub fn first_matching_category(text: &str, table: &CategoryTable) -> Option<SourceSinkCategory> {
    let text = text.to_lowercase();
    table
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| mentions(&text, keyword)))
        .map(|(category, _)| *category)
}

/// Keywords of one category mentioned in lowercased `text`, in table order.
pub fn matched_keywords(text: &str, keywords: &[&'static str]) -> Vec<&'static str> {
    keywords
        .iter()
        .copied()
        .filter(|keyword| mentions(text, keyword))
        .collect()
}

/// Category with the most distinct keyword hits in `text`, with its hit count.
///
/// Ties go to the earlier table entry. `None` when nothing matches.
pub fn best_matching_category(
    text: &str,
    table: &CategoryTable,
) -> Option<(SourceSinkCategory, usize)> {
    let text = text.to_lowercase();
    let mut best: Option<(SourceSinkCategory, usize)> = None;
    for (category, keywords) in table {
        let hits = matched_keywords(&text, keywords).len();
        if hits > 0 && best.map_or(true, |(_, top)| hits > top) {
            best = Some((*category, hits));
        }
    }
    best
}

/// Whether `text` claims the code is a source.
pub fn claims_source(text: &str) -> bool {
    SOURCE_CLAIM.is_match(text)
}

/// Whether `text` claims the code is a sink.
pub fn claims_sink(text: &str) -> bool {
    SINK_CLAIM.is_match(text)
}

/// Confidence implied by the strongest hedge word in `text`.
pub fn hedge_confidence(text: &str) -> f64 {
    let text = text.to_lowercase();
    HEDGE_PATTERNS
        .iter()
        .find(|(re, _)| re.is_match(&text))
        .map(|(_, confidence)| *confidence)
        .unwrap_or(DEFAULT_HEDGE_CONFIDENCE)
}
