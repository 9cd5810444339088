//! Findings parsing: raw model text → `Vec<Finding>`.
//!
//! Models are asked for `{"findings": [{"page", "issue"}]}` but do not always
//! comply to the letter. Accepted deviations:
//!
//! - the JSON object wrapped in ```` ```json ```` fences or surrounded by prose
//! - `page` as a numeric string (`"3"`) or float (`3.0`)
//! - an optional `severity` with loose spelling
//! - a missing `findings` key, read as "no findings"
//!
//! Individually malformed entries are skipped with a warning. A body that is
//! not a JSON object at all is a [`ChunkError::MalformedResponse`], which the
//! orchestrator does not retry.

use crate::error::ChunkError;
use crate::model::{Finding, Severity};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

static RE_FENCED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\s*\n?(.*?)\n?```\s*$").unwrap());

/// Parse a model response into findings.
pub fn parse_findings(raw: &str) -> Result<Vec<Finding>, ChunkError> {
    let value = parse_object(raw)?;

    let entries = match value.get("findings") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            return Err(ChunkError::MalformedResponse {
                detail: format!("\"findings\" is not a list: {}", kind_of(other)),
            })
        }
    };

    let mut findings = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        match finding_from(entry) {
            Some(f) => findings.push(f),
            None => warn!("Skipping malformed finding #{}: {}", i, entry),
        }
    }
    Ok(findings)
}

fn parse_object(raw: &str) -> Result<Value, ChunkError> {
    let trimmed = raw.trim();
    let body = RE_FENCED
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(trimmed);

    let parsed = serde_json::from_str::<Value>(body).or_else(|e| {
        // Prose around the object: try the outermost brace pair.
        match (body.find('{'), body.rfind('}')) {
            (Some(start), Some(end)) if start < end => {
                serde_json::from_str::<Value>(&body[start..=end]).map_err(|_| e)
            }
            _ => Err(e),
        }
    });

    match parsed {
        Ok(v @ Value::Object(_)) => Ok(v),
        Ok(other) => Err(ChunkError::MalformedResponse {
            detail: format!("expected a JSON object, got {}", kind_of(&other)),
        }),
        Err(e) => Err(ChunkError::MalformedResponse {
            detail: format!("{e}: {}", preview(body)),
        }),
    }
}

fn finding_from(entry: &Value) -> Option<Finding> {
    let page = match entry.get("page")? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    let page = u32::try_from(page).ok()?;

    let issue = entry.get("issue")?.as_str()?.trim();
    if issue.is_empty() {
        return None;
    }

    let finding = Finding::new(page, issue);
    Some(
        match entry
            .get("severity")
            .and_then(Value::as_str)
            .and_then(Severity::parse)
        {
            Some(s) => finding.with_severity(s),
            None => finding,
        },
    )
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn preview(s: &str) -> String {
    let mut out: String = s.chars().take(120).collect();
    if s.chars().count() > 120 {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_object() {
        let f = parse_findings(r#"{"findings":[{"page":2,"issue":"CFM too low"}]}"#).unwrap();
        assert_eq!(f, vec![Finding::new(2, "CFM too low")]);
    }

    #[test]
    fn fenced_object() {
        let raw = "```json\n{\"findings\":[{\"page\":1,\"issue\":\"OA damper stuck\"}]}\n```";
        assert_eq!(parse_findings(raw).unwrap(), vec![Finding::new(1, "OA damper stuck")]);
    }

    #[test]
    fn object_inside_prose() {
        let raw = "Here you go:\n{\"findings\": [{\"page\": \"7\", \"issue\": \"x\"}]}\nThanks";
        assert_eq!(parse_findings(raw).unwrap(), vec![Finding::new(7, "x")]);
    }

    #[test]
    fn missing_key_means_no_findings() {
        assert!(parse_findings("{}").unwrap().is_empty());
        assert!(parse_findings(r#"{"findings": null}"#).unwrap().is_empty());
    }

    #[test]
    fn severity_is_optional_and_lenient() {
        let f = parse_findings(
            r#"{"findings":[{"page":3.0,"issue":"a","severity":"HIGH"},{"page":3,"issue":"b","severity":"??"}]}"#,
        )
        .unwrap();
        assert_eq!(f[0], Finding::new(3, "a").with_severity(Severity::High));
        assert_eq!(f[1], Finding::new(3, "b"));
    }

    #[test]
    fn bad_entries_are_skipped() {
        let f = parse_findings(
            r#"{"findings":[{"page":-1,"issue":"neg"},{"issue":"no page"},{"page":1},{"page":1,"issue":"  "},{"page":4,"issue":"ok"}]}"#,
        )
        .unwrap();
        assert_eq!(f, vec![Finding::new(4, "ok")]);
    }

    #[test]
    fn non_json_is_malformed() {
        let err = parse_findings("I could not find any issues.").unwrap_err();
        assert!(matches!(err, ChunkError::MalformedResponse { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn non_object_is_malformed() {
        assert!(matches!(
            parse_findings("[1,2,3]"),
            Err(ChunkError::MalformedResponse { .. })
        ));
        assert!(matches!(
            parse_findings(r#"{"findings":"none"}"#),
            Err(ChunkError::MalformedResponse { .. })
        ));
    }
}
