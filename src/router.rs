//! Deterministic query router (C5): a frozen six-node decision tree over
//! linguistic features, not an LLM call.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Simple,
    Complex,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Simple => "simple",
            Classification::Complex => "complex",
        }
    }
}

const COMPLEXITY_KEYWORDS: &[&str] = &[
    "compare",
    "comparison",
    "difference",
    "differences",
    "versus",
    "vs",
    "integrate",
    "integration",
    "configure",
    "configuration",
    "migrate",
    "migration",
    "troubleshoot",
    "troubleshooting",
    "architecture",
    "workflow",
    "optimize",
    "optimization",
    "analyze",
    "analysis",
    "strategy",
    "strategies",
    "compliance",
    "security",
    "audit",
    "enterprise",
    "scalability",
    "performance",
    "benchmark",
    "custom",
    "advanced",
    "multiple",
    "several",
    "complex",
    "detailed",
    "comprehensive",
    "explain how",
    "walk me through",
    "step by step",
    "in depth",
];

const AMBIGUITY_MARKERS: &[&str] = &[
    "it depends",
    "what if",
    "hypothetically",
    "in general",
    "is it possible",
    "can you explain",
    "could you elaborate",
    "what are the pros and cons",
    "trade-off",
    "tradeoff",
    "best practice",
    "best practices",
    "recommend",
    "recommendation",
    "should i",
    "which one",
    "what would",
];

const COMPLAINT_MARKERS: &[&str] = &[
    "not working",
    "broken",
    "bug",
    "issue",
    "problem",
    "error",
    "frustrated",
    "disappointed",
    "unacceptable",
    "terrible",
    "worst",
    "angry",
    "complaint",
    "escalate",
    "refund",
    "cancel",
    "cancellation",
    "speak to manager",
    "supervisor",
];

static COMPLEXITY_KEYWORD_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    COMPLEXITY_KEYWORDS
        .iter()
        .map(|kw| Regex::new(&format!(r"(?i)\b{}\b", regex::escape(kw))).unwrap())
        .collect()
});

static COMPARISON_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)\bvs\.?\b").unwrap(),
        Regex::new(r"(?i)\bversus\b").unwrap(),
        Regex::new(r"(?i)\bcompared?\s+to\b").unwrap(),
        Regex::new(r"(?i)\bdifference\s+between\b").unwrap(),
        Regex::new(r"(?i)\bbetter\s+than\b").unwrap(),
        Regex::new(r"(?i)\bworse\s+than\b").unwrap(),
        Regex::new(r"(?i)\bor\b.*\bor\b").unwrap(),
    ]
});

static SENTENCE_END_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.?!](?:\s|$)").unwrap());

struct Features {
    word_count: usize,
    question_count: usize,
    sentence_count: usize,
    has_complexity_keywords: bool,
    has_ambiguity_markers: bool,
    has_complaint_markers: bool,
    has_comparison_pattern: bool,
}

fn extract_features(query: &str) -> Features {
    let lower = query.to_lowercase();

    let word_count = query.split_whitespace().count();
    let question_count = query.matches('?').count();
    let sentence_count = SENTENCE_END_RE.find_iter(query).count();

    let has_complexity_keywords = COMPLEXITY_KEYWORD_RES.iter().any(|re| re.is_match(query));
    let has_ambiguity_markers = AMBIGUITY_MARKERS.iter().any(|m| lower.contains(m));
    let has_complaint_markers = COMPLAINT_MARKERS.iter().any(|m| lower.contains(m));
    let has_comparison_pattern = COMPARISON_PATTERNS.iter().any(|re| re.is_match(query));

    Features {
        word_count,
        question_count,
        sentence_count,
        has_complexity_keywords,
        has_ambiguity_markers,
        has_complaint_markers,
        has_comparison_pattern,
    }
}

/// Classify a non-empty query into `simple` or `complex` via the frozen
/// six-node decision tree (first match wins).
pub fn classify(query: &str) -> Classification {
    let f = extract_features(query);

    // NODE 1
    if f.word_count <= 3 && f.question_count <= 1 && !f.has_complexity_keywords {
        return Classification::Simple;
    }
    // NODE 2
    if f.has_complaint_markers {
        return Classification::Complex;
    }
    // NODE 3
    if f.question_count >= 3 {
        return Classification::Complex;
    }
    // NODE 4
    if f.has_comparison_pattern {
        return Classification::Complex;
    }
    // NODE 5
    let mut score = 0;
    if f.has_complexity_keywords {
        score += 2;
    }
    if f.has_ambiguity_markers {
        score += 2;
    }
    if f.word_count > 40 {
        score += 1;
    }
    if f.sentence_count >= 3 {
        score += 1;
    }
    if score >= 2 {
        return Classification::Complex;
    }
    // NODE 6
    if f.word_count > 25 && f.has_ambiguity_markers {
        return Classification::Complex;
    }

    Classification::Simple
}
