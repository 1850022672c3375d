use once_cell::sync::Lazy;
use qms_types::{CitationAssertion, IdentifierKind, Verdict};
use regex::Regex;
use std::collections::HashSet;

static PMID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)["']?\bpmid\b["']?[:\s=,]*["']?(\d+)"#).unwrap());
static DOI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(10\.\d{4,9}/[\w.\-()/:]+)").unwrap());
static ARXIV_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\barxiv:\s*(\d{4}\.\d{4,5}(?:v\d+)?|[a-z\-]+(?:\.[a-z]{2})?/\d{7}(?:v\d+)?)\b")
        .unwrap()
});
static NCT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(NCT\d{8})\b").unwrap());
static DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").unwrap());

/// Pulls every identifier an agent's own text mentions (the "cited set",
/// Cᴀ) out of free-form model output, independent of what tool calls
/// actually returned.
pub fn extract_identifiers(text: &str) -> Vec<(IdentifierKind, String)> {
    let mut out = Vec::new();
    for caps in PMID_RE.captures_iter(text) {
        out.push((IdentifierKind::Pmid, caps[1].to_string()));
    }
    for caps in DOI_RE.captures_iter(text) {
        out.push((IdentifierKind::Doi, caps[1].trim_end_matches('.').to_string()));
    }
    for caps in ARXIV_RE.captures_iter(text) {
        out.push((IdentifierKind::ArxivId, caps[1].to_string()));
    }
    for caps in NCT_RE.captures_iter(text) {
        out.push((IdentifierKind::NctId, caps[1].to_string()));
    }
    out
}

/// Pulls every ISO `YYYY-MM-DD` date token out of free-form text, used to
/// ground the timeline agent's replies against the milestone lookups it
/// actually performed this turn.
pub fn extract_iso_dates(text: &str) -> Vec<String> {
    DATE_RE
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Diffs the cited set against the verified set (identifiers tool calls
/// actually returned) and produces one `CitationAssertion` per cited
/// identifier: `Grounded` if verified, `Hallucinated` otherwise. An
/// identifier the agent never mentioned is not represented here — only
/// cited identifiers are judged.
pub fn grounding_check(
    agent_key: &str,
    task_id: &str,
    cited: &[(IdentifierKind, String)],
    verified: &HashSet<(IdentifierKind, String)>,
) -> Vec<CitationAssertion> {
    cited
        .iter()
        .map(|(kind, identifier)| CitationAssertion {
            agent_key: agent_key.to_string(),
            task_id: task_id.to_string(),
            identifier_kind: *kind,
            identifier: identifier.clone(),
            verdict: if verified.contains(&(*kind, identifier.clone())) {
                Verdict::Grounded
            } else {
                Verdict::Hallucinated
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_all_identifier_kinds_from_mixed_text() {
        let text = "See PMID: 34521234 and DOI 10.1001/jama.2023.0001, also arXiv:2301.01234 and NCT04567890.";
        let found = extract_identifiers(text);
        assert!(found.contains(&(IdentifierKind::Pmid, "34521234".to_string())));
        assert!(found.contains(&(IdentifierKind::Doi, "10.1001/jama.2023.0001".to_string())));
        assert!(found.contains(&(IdentifierKind::ArxivId, "2301.01234".to_string())));
        assert!(found.contains(&(IdentifierKind::NctId, "NCT04567890".to_string())));
    }

    #[test]
    fn recognizes_json_like_and_legacy_identifier_forms() {
        let text = r#"{"pmid": 34521234} and arXiv:hep-th/9901001 and PMID=7654321"#;
        let found = extract_identifiers(text);
        assert!(found.contains(&(IdentifierKind::Pmid, "34521234".to_string())));
        assert!(found.contains(&(IdentifierKind::Pmid, "7654321".to_string())));
        assert!(found.contains(&(IdentifierKind::ArxivId, "hep-th/9901001".to_string())));
    }

    #[test]
    fn extracts_iso_dates_from_text() {
        let text = "The milestone is due 2026-09-15, started 2026-01-01.";
        let dates = extract_iso_dates(text);
        assert_eq!(dates, vec!["2026-09-15".to_string(), "2026-01-01".to_string()]);
    }

    #[test]
    fn unverified_citation_is_flagged_hallucinated() {
        let cited = vec![(IdentifierKind::Pmid, "11111111".to_string())];
        let verified = HashSet::new();
        let assertions = grounding_check("citation_validation", "t-1", &cited, &verified);
        assert_eq!(assertions.len(), 1);
        assert_eq!(assertions[0].verdict, Verdict::Hallucinated);
    }

    #[test]
    fn verified_citation_is_grounded() {
        let cited = vec![(IdentifierKind::Doi, "10.1/x".to_string())];
        let mut verified = HashSet::new();
        verified.insert((IdentifierKind::Doi, "10.1/x".to_string()));
        let assertions = grounding_check("citation_validation", "t-1", &cited, &verified);
        assert_eq!(assertions[0].verdict, Verdict::Grounded);
    }
}
