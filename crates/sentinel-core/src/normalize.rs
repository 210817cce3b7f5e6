//! Description normalization
//!
//! Turns free-text ledger descriptions into a canonical form so that postings
//! differing only in accents, case, spacing or payroll-prefix spelling land in
//! the same duplicate bucket.

use std::sync::OnceLock;

use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Ordinal and degree indicators that carry no meaning for matching
const STRIPPED_SYMBOLS: [char; 3] = ['º', 'ª', '°'];

/// Variants of a leading payroll marker ("salário", "sal.", "pgto salario - ")
fn salary_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:(?:pgto|pagto|pagamento)\.?\s+(?:de\s+)?)?(?:salarios?|sal\.|sal\b)[\s\-:./]*",
        )
        .expect("valid regex")
    })
}

/// Normalize a description for comparison
///
/// Decomposes to NFD and drops combining marks, removes ordinal symbols,
/// lowercases, collapses whitespace and rewrites payroll prefixes to
/// `"salario "`. Total and idempotent.
pub fn normalize_description(raw: &str) -> String {
    let stripped: String = raw
        .nfd()
        .filter(|c| !is_combining_mark(*c) && !STRIPPED_SYMBOLS.contains(c))
        .collect::<String>()
        .to_lowercase();

    let collapsed = collapse_whitespace(&stripped);
    let rewritten = salary_prefix().replace(&collapsed, "salario ");

    collapse_whitespace(&rewritten)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
