//! Priority-ordered intent rules.
//!
//! A message is tested against [`RULES`] top to bottom. Matching a rule only
//! makes its branch a candidate: the chart branch can still decline (no
//! category, no active dataset, no rows), in which case the next matching
//! rule is tried. [`Classification::General`] is the fallback.

use datastore::Classification;

pub const ANALYTICS_KEYWORDS: &[&str] = &["analytics", "metrics", "kpi", "performance", "insights", "dashboard"];

pub const TROUBLESHOOTING_KEYWORDS: &[&str] =
    &["error", "not working", "broken", "issue", "problem", "help", "fix", "bug"];

pub struct Rule {
    pub classification: Classification,
    pub matches: fn(&str) -> bool,
}

pub const RULES: &[Rule] = &[
    Rule {
        classification: Classification::Chart,
        matches: insights::detect_intent,
    },
    Rule {
        classification: Classification::Analytics,
        matches: is_analytics,
    },
    Rule {
        classification: Classification::Troubleshooting,
        matches: is_troubleshooting,
    },
];

pub(crate) fn mentions(message: &str, keywords: &[&str]) -> bool {
    let lower = message.to_lowercase();
    keywords.iter().any(|k| lower.contains(k))
}

pub fn is_analytics(message: &str) -> bool {
    mentions(message, ANALYTICS_KEYWORDS)
}

pub fn is_troubleshooting(message: &str) -> bool {
    mentions(message, TROUBLESHOOTING_KEYWORDS)
}

/// Every branch the message qualifies for, in priority order, ending with
/// `General`.
pub fn candidates(message: &str) -> Vec<Classification> {
    RULES
        .iter()
        .filter(|r| (r.matches)(message))
        .map(|r| r.classification)
        .chain(std::iter::once(Classification::General))
        .collect()
}

/// The first matching rule, ignoring whether its branch can produce output.
pub fn classify(message: &str) -> Classification {
    candidates(message)[0]
}
