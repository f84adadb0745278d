//! Recovers a JSON object from raw generator output.
//!
//! The generator is asked for JSON but nothing forces it to comply, so the
//! decoder tries progressively harder:
//!
//! 1. parse the whole text,
//! 2. isolate the first balanced `{...}` span and parse that,
//! 3. run the span through [`REPAIR_RULES`] until nothing changes (bounded by
//!    [`MAX_REPAIR_PASSES`]) and parse once more.
//!
//! Every rule is a pure `&str -> String` transform that leaves valid JSON
//! untouched.

use serde_json::{Map, Value};

use crate::error::{ExtractionFailure, ExtractionStage};

pub type StructuredRecord = Map<String, Value>;

pub const MAX_REPAIR_PASSES: usize = 4;

/// A named text transform targeting one common generator mistake.
pub struct RepairRule {
    pub name: &'static str,
    pub apply: fn(&str) -> String,
}

pub const REPAIR_RULES: &[RepairRule] = &[
    RepairRule {
        name: "escape_control_chars",
        apply: escape_control_chars,
    },
    RepairRule {
        name: "strip_trailing_commas",
        apply: strip_trailing_commas,
    },
    RepairRule {
        name: "close_truncated",
        apply: close_truncated,
    },
];

/// Decode raw LLM text into a JSON object.
pub fn decode_record(raw: &str) -> Result<StructuredRecord, ExtractionFailure> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw.trim()) {
        return Ok(map);
    }

    let Some(candidate) = find_object_span(raw) else {
        return Err(failure(ExtractionStage::NoSpanFound, "no '{' in output", raw));
    };

    let first_error = match parse_object(candidate) {
        Ok(map) => return Ok(map),
        Err(e) => e,
    };

    let repaired = repair(candidate);
    if repaired == candidate {
        tracing::debug!(error = %first_error, "no repair rule applied");
        return Err(failure(ExtractionStage::ParseFailed, &first_error, raw));
    }

    parse_object(&repaired)
        .map_err(|e| failure(ExtractionStage::ParseFailedAfterRepair, &e, raw))
}

/// Runs every rule in order, pass after pass, until a pass changes nothing.
pub fn repair(text: &str) -> String {
    let mut current = text.to_string();

    for pass in 0..MAX_REPAIR_PASSES {
        let mut changed = false;
        for rule in REPAIR_RULES {
            let next = (rule.apply)(&current);
            if next != current {
                tracing::trace!(rule = rule.name, pass, "repair rule applied");
                current = next;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    current
}

/// Text of a field; non-string values are rendered as JSON.
pub fn field_text(record: &StructuredRecord, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn failure(stage: ExtractionStage, detail: &str, raw: &str) -> ExtractionFailure {
    ExtractionFailure {
        stage,
        detail: detail.to_string(),
        raw: raw.to_string(),
    }
}

fn parse_object(text: &str) -> Result<StructuredRecord, String> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("top-level value is not an object".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// From the first `{` to the brace that closes it. Text cut off before the
/// closing brace yields everything from `{` to the end, for `close_truncated`
/// to finish.
fn find_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    Some(&text[start..])
}

/// Raw newlines, carriage returns and tabs inside string literals.
fn escape_control_chars(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            match c {
                _ if escaped => {
                    escaped = false;
                    out.push(c);
                }
                '\\' => {
                    escaped = true;
                    out.push(c);
                }
                '"' => {
                    in_string = false;
                    out.push(c);
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                _ => out.push(c),
            }
        } else {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
        }
    }

    out
}

/// `[1, 2,]` and `{"a": 1,}`: a comma followed only by whitespace and a closer.
fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            out.push(c);
            continue;
        }

        match c {
            '"' => in_string = true,
            ',' => {
                let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace()).copied();
                if matches!(next, Some('}') | Some(']')) {
                    continue;
                }
            }
            _ => {}
        }
        out.push(c);
    }

    out
}

/// Closes an unterminated string and any brackets still open at the end.
fn close_truncated(text: &str) -> String {
    let mut closers: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => closers.push('}'),
            '[' => closers.push(']'),
            '}' | ']' => {
                closers.pop();
            }
            _ => {}
        }
    }

    if !in_string && closers.is_empty() {
        return text.to_string();
    }

    let mut out = text.trim_end().to_string();
    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }
    while let Some(closer) = closers.pop() {
        out.push(closer);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_clean_object_directly() {
        let record = decode_record(r#"{"question": "Q", "answer": "A"}"#).unwrap();
        assert_eq!(field_text(&record, "answer").as_deref(), Some("A"));
    }

    #[test]
    fn repairs_trailing_commas_inside_noise() {
        let record = decode_record("noise {\"a\": 1, \"b\": [1,2,],} noise").unwrap();
        assert_eq!(Value::Object(record), json!({"a": 1, "b": [1, 2]}));
    }

    #[test]
    fn picks_first_balanced_object() {
        let raw = "Sure! ```json\n{\"a\": {\"b\": \"}\"}}\n``` and {\"c\": 2}";
        let record = decode_record(raw).unwrap();
        assert_eq!(Value::Object(record), json!({"a": {"b": "}"}}));
    }

    #[test]
    fn no_brace_is_tagged_no_span_found() {
        let err = decode_record("I cannot answer that.").unwrap_err();
        assert_eq!(err.stage, ExtractionStage::NoSpanFound);
        assert_eq!(err.raw, "I cannot answer that.");
    }

    #[test]
    fn unrepairable_text_is_tagged_after_repair() {
        let err = decode_record("{\"a\": 1,, \"b\": [2,]}").unwrap_err();
        assert_eq!(err.stage, ExtractionStage::ParseFailedAfterRepair);
    }

    #[test]
    fn garbage_no_rule_touches_is_tagged_parse_failed() {
        let err = decode_record("{not json at all}").unwrap_err();
        assert_eq!(err.stage, ExtractionStage::ParseFailed);
    }

    #[test]
    fn closes_truncated_output() {
        let record = decode_record("{\"question\": \"Q\", \"answer\": \"cut off mid").unwrap();
        assert_eq!(field_text(&record, "answer").as_deref(), Some("cut off mid"));

        let record = decode_record("{\"items\": [1, 2,").unwrap();
        assert_eq!(Value::Object(record), json!({"items": [1, 2]}));
    }

    #[test]
    fn escapes_raw_newlines_in_strings() {
        let record = decode_record("{\"answer\": \"line one\nline two\"}").unwrap();
        assert_eq!(
            field_text(&record, "answer").as_deref(),
            Some("line one\nline two")
        );
    }

    #[test]
    fn repair_is_identity_on_valid_json() {
        let valid = r#"{"a": [1, 2, {"b": "x, ]"}], "c": "tab\tnewline\n"}"#;
        assert_eq!(repair(valid), valid);

        let first: Value = serde_json::from_str(&repair(valid)).unwrap();
        let reserialized = serde_json::to_string(&first).unwrap();
        let second: Value = serde_json::from_str(&repair(&reserialized)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn each_rule_leaves_valid_json_alone() {
        let valid = r#"{"list": [1, 2], "text": "a, } b"}"#;
        for rule in REPAIR_RULES {
            assert_eq!((rule.apply)(valid), valid, "rule {} changed valid JSON", rule.name);
        }
    }

    #[test]
    fn trailing_comma_inside_string_is_kept() {
        assert_eq!(strip_trailing_commas(r#"{"a": ",]"}"#), r#"{"a": ",]"}"#);
        assert_eq!(strip_trailing_commas("[1, 2 , ]"), "[1, 2  ]");
    }

    #[test]
    fn field_text_renders_non_strings() {
        let record = decode_record(r#"{"n": 3, "none": null}"#).unwrap();
        assert_eq!(field_text(&record, "n").as_deref(), Some("3"));
        assert_eq!(field_text(&record, "none"), None);
        assert_eq!(field_text(&record, "missing"), None);
    }
}
