//! Per-dimension digests shared with later tiers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Compact structured summary of one dimension's findings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DimensionDigest {
    pub summary: String,
    pub candidate_count: usize,
    pub key_findings: Vec<String>,
    pub cross_refs: BTreeMap<String, serde_json::Value>,
    pub gaps: Vec<String>,
}

impl DimensionDigest {
    /// Digest synthesized from raw analysis text when the Formatter produced none.
    pub fn fallback(analysis_text: &str, candidate_count: usize, max_chars: usize) -> Self {
        Self {
            summary: truncate_chars(analysis_text.trim(), max_chars),
            candidate_count,
            ..Default::default()
        }
    }
}

/// Extracts a [`DimensionDigest`] from a Formatter's free-text reply
pub trait DigestParser: Send + Sync {
    fn parse(&self, reply: &str) -> Option<DimensionDigest>;
}

/// Finds a JSON object in the reply, either inside a ```json fence or as the
/// outermost `{...}` span, optionally wrapped as `{"dimensionDigest": {...}}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDigestParser;

impl JsonDigestParser {
    fn candidates(reply: &str) -> Vec<&str> {
        let mut found = Vec::new();

        let mut rest = reply;
        while let Some(start) = rest.find("```json") {
            let body = &rest[start + "```json".len()..];
            match body.find("```") {
                Some(end) => {
                    found.push(body[..end].trim());
                    rest = &body[end + 3..];
                }
                None => break,
            }
        }

        if let (Some(open), Some(close)) = (reply.find('{'), reply.rfind('}')) {
            if open < close {
                found.push(&reply[open..=close]);
            }
        }

        found
    }
}

impl DigestParser for JsonDigestParser {
    fn parse(&self, reply: &str) -> Option<DimensionDigest> {
        for candidate in Self::candidates(reply) {
            let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate) else {
                continue;
            };
            let inner = value.get("dimensionDigest").cloned().unwrap_or(value);
            if inner.get("summary").and_then(|s| s.as_str()).is_none() {
                continue;
            }
            if let Ok(digest) = serde_json::from_value::<DimensionDigest>(inner) {
                return Some(digest);
            }
        }
        None
    }
}

/// Truncate on a char boundary, marking the cut with an ellipsis.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_truncates_summary() {
        let text = "a".repeat(1000);
        let digest = DimensionDigest::fallback(&text, 3, 500);

        assert_eq!(digest.summary.chars().count(), 501);
        assert!(digest.summary.ends_with('…'));
        assert_eq!(digest.candidate_count, 3);
        assert!(digest.key_findings.is_empty());
        assert!(digest.cross_refs.is_empty());
        assert!(digest.gaps.is_empty());
    }

    #[test]
    fn test_fallback_keeps_short_text() {
        let digest = DimensionDigest::fallback("  short analysis  ", 0, 500);
        assert_eq!(digest.summary, "short analysis");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 4), "héll…");
    }

    #[test]
    fn test_parse_fenced_digest() {
        let reply = r#"Submitted 3 items.

```json
{"dimensionDigest": {"summary": "Layered service architecture", "candidateCount": 3,
 "keyFindings": ["handlers never touch storage"], "crossRefs": {"conventions": "naming"},
 "gaps": ["no docs for plugins"]}}
```
"#;
        let digest = JsonDigestParser.parse(reply).unwrap();
        assert_eq!(digest.summary, "Layered service architecture");
        assert_eq!(digest.candidate_count, 3);
        assert_eq!(digest.key_findings.len(), 1);
        assert_eq!(digest.cross_refs["conventions"], "naming");
        assert_eq!(digest.gaps, vec!["no docs for plugins"]);
    }

    #[test]
    fn test_parse_bare_object() {
        let reply = r#"Done. {"summary": "Uses tokio everywhere", "keyFindings": []}"#;
        let digest = JsonDigestParser.parse(reply).unwrap();
        assert_eq!(digest.summary, "Uses tokio everywhere");
        assert_eq!(digest.candidate_count, 0);
    }

    #[test]
    fn test_parse_failure_returns_none() {
        assert!(JsonDigestParser.parse("no structured output here").is_none());
        assert!(JsonDigestParser.parse("{not json}").is_none());
        assert!(JsonDigestParser.parse(r#"{"other": 1}"#).is_none());
    }
}
