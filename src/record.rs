//! Record codec: one JSONL line in, one structured record out.
//!
//! Parse failures are ordinary values here. Callers count them, cache them
//! and skip them; nothing in this module returns an error.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Why a line could not be turned into a structured value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Empty or whitespace-only line. Usually skipped silently.
    EmptyLine,
    /// Non-empty text that is not valid JSON.
    Malformed(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::EmptyLine => write!(f, "empty line"),
            FailureReason::Malformed(msg) => write!(f, "{}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub raw: String,
    pub reason: FailureReason,
}

/// A parsed line.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Value(Value),
    Invalid(ParseFailure),
}

impl Record {
    pub fn is_valid(&self) -> bool {
        matches!(self, Record::Value(_))
    }

    pub fn is_empty_line(&self) -> bool {
        matches!(
            self,
            Record::Invalid(ParseFailure {
                reason: FailureReason::EmptyLine,
                ..
            })
        )
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Record::Value(v) => Some(v),
            Record::Invalid(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&ParseFailure> {
        match self {
            Record::Value(_) => None,
            Record::Invalid(f) => Some(f),
        }
    }
}

/// Parse a single line.
pub fn parse(line: &str) -> Record {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.trim().is_empty() {
        return Record::Invalid(ParseFailure {
            raw: line.to_string(),
            reason: FailureReason::EmptyLine,
        });
    }

    match serde_json::from_str::<Value>(line) {
        Ok(value) => Record::Value(value),
        Err(e) => Record::Invalid(ParseFailure {
            raw: line.to_string(),
            reason: FailureReason::Malformed(e.to_string()),
        }),
    }
}

/// Split `name[0][2]` into the key and its array indices.
///
/// A segment whose brackets do not parse as indices is treated as a plain key.
fn split_segment(segment: &str) -> (&str, Vec<usize>) {
    let Some(open) = segment.find('[') else {
        return (segment, Vec::new());
    };

    let key = &segment[..open];
    let mut indices = Vec::new();
    let mut rest = &segment[open..];

    while let Some(inner) = rest.strip_prefix('[') {
        let Some(close) = inner.find(']') else {
            return (segment, Vec::new());
        };
        match inner[..close].parse::<usize>() {
            Ok(i) => indices.push(i),
            Err(_) => return (segment, Vec::new()),
        }
        rest = &inner[close + 1..];
    }

    if rest.is_empty() {
        (key, indices)
    } else {
        (segment, Vec::new())
    }
}

/// Walk a dot path through a value.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;

    for segment in path.split('.') {
        let (key, indices) = split_segment(segment);
        if !key.is_empty() {
            current = current.as_object()?.get(key)?;
        }
        for i in indices {
            current = current.as_array()?.get(i)?;
        }
    }

    Some(current)
}

/// Field lookup on a record. Invalid records have no fields.
pub fn get_field<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    lookup(record.value()?, path)
}

/// Compare a field against an expected value.
///
/// Strings compare case-insensitively, everything else exactly.
/// An absent field never matches.
pub fn matches(record: &Record, path: &str, expected: &Value) -> bool {
    let Some(actual) = get_field(record, path) else {
        return false;
    };

    match (actual, expected) {
        (Value::String(a), Value::String(b)) => a.to_lowercase() == b.to_lowercase(),
        (a, b) => a == b,
    }
}

/// Flatten a record into `dotted.path[i] -> scalar`.
///
/// Empty objects and arrays are kept as leaves so the column they name
/// stays visible. Invalid records flatten to an empty map.
pub fn flatten(record: &Record) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    if let Some(value) = record.value() {
        flatten_into(value, String::new(), &mut out);
    }
    out
}

fn flatten_into(value: &Value, prefix: String, out: &mut BTreeMap<String, Value>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_into(child, path, out);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (i, child) in items.iter().enumerate() {
                flatten_into(child, format!("{}[{}]", prefix, i), out);
            }
        }
        leaf => {
            out.insert(prefix, leaf.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_object() {
        let record = parse(r#"{"level":"info","msg":"started"}"#);
        assert!(record.is_valid());
        assert_eq!(get_field(&record, "level"), Some(&json!("info")));
    }

    #[test]
    fn test_parse_strips_carriage_return() {
        let record = parse("{\"a\":1}\r");
        assert_eq!(record, Record::Value(json!({"a": 1})));
    }

    #[test]
    fn test_empty_line_is_distinct_failure() {
        for line in ["", "   ", "\t \t"] {
            let record = parse(line);
            assert!(record.is_empty_line(), "{:?} should be an empty line", line);
        }

        let malformed = parse("not valid json");
        assert!(!malformed.is_valid());
        assert!(!malformed.is_empty_line());
        let failure = malformed.failure().unwrap();
        assert_eq!(failure.raw, "not valid json");
        assert!(matches!(failure.reason, FailureReason::Malformed(_)));
    }

    #[test]
    fn test_get_field_nested() {
        let record = parse(r#"{"user":{"id":"123","profile":{"age":30}}}"#);
        assert_eq!(get_field(&record, "user.id"), Some(&json!("123")));
        assert_eq!(get_field(&record, "user.profile.age"), Some(&json!(30)));
    }

    #[test]
    fn test_get_field_missing_segment() {
        let record = parse(r#"{"user":{"id":"123"}}"#);
        assert_eq!(get_field(&record, "user.name"), None);
        assert_eq!(get_field(&record, "account.id"), None);
        assert_eq!(get_field(&record, "user.id.deeper"), None);
    }

    #[test]
    fn test_get_field_on_invalid_record() {
        let record = parse("{broken");
        assert_eq!(get_field(&record, "level"), None);
    }

    #[test]
    fn test_get_field_bracket_notation() {
        let record = parse(r#"{"user":{"tags":["a","b"]},"grid":[[1,2],[3,4]]}"#);
        assert_eq!(get_field(&record, "user.tags[1]"), Some(&json!("b")));
        assert_eq!(get_field(&record, "grid[1][0]"), Some(&json!(3)));
        assert_eq!(get_field(&record, "user.tags[5]"), None);
    }

    #[test]
    fn test_matches_case_insensitive_strings() {
        let record = parse(r#"{"level":"ERROR","code":500,"ok":false}"#);
        assert!(matches(&record, "level", &json!("error")));
        assert!(matches(&record, "level", &json!("Error")));
        assert!(!matches(&record, "level", &json!("warn")));
    }

    #[test]
    fn test_matches_non_strings_exact() {
        let record = parse(r#"{"code":500,"ok":false,"ratio":0.5}"#);
        assert!(matches(&record, "code", &json!(500)));
        assert!(!matches(&record, "code", &json!("500")));
        assert!(matches(&record, "ok", &json!(false)));
        assert!(matches(&record, "ratio", &json!(0.5)));
    }

    #[test]
    fn test_matches_absent_field() {
        let record = parse(r#"{"level":"info"}"#);
        assert!(!matches(&record, "missing", &Value::Null));
        assert!(!matches(&parse("garbage"), "level", &json!("info")));
    }

    #[test]
    fn test_flatten_nested() {
        let record = parse(r#"{"user":{"name":"Alice","tags":["a","b"]}}"#);
        let flat = flatten(&record);

        let expected: BTreeMap<String, Value> = [
            ("user.name".to_string(), json!("Alice")),
            ("user.tags[0]".to_string(), json!("a")),
            ("user.tags[1]".to_string(), json!("b")),
        ]
        .into_iter()
        .collect();
        assert_eq!(flat, expected);
    }

    #[test]
    fn test_flatten_array_of_objects() {
        let record = parse(r#"{"items":[{"id":1},{"id":2}],"n":null}"#);
        let flat = flatten(&record);
        assert_eq!(flat.get("items[0].id"), Some(&json!(1)));
        assert_eq!(flat.get("items[1].id"), Some(&json!(2)));
        assert_eq!(flat.get("n"), Some(&Value::Null));
        assert_eq!(flat.len(), 3);
    }

    #[test]
    fn test_flatten_keeps_empty_containers() {
        let record = parse(r#"{"meta":{},"tags":[]}"#);
        let flat = flatten(&record);
        assert_eq!(flat.get("meta"), Some(&json!({})));
        assert_eq!(flat.get("tags"), Some(&json!([])));
    }

    #[test]
    fn test_flatten_paths_resolve_with_get_field() {
        let record = parse(r#"{"a":{"b":[{"c":"x"}]}}"#);
        for (path, value) in flatten(&record) {
            assert_eq!(get_field(&record, &path), Some(&value));
        }
    }

    #[test]
    fn test_flatten_scalar_root_and_invalid() {
        let flat = flatten(&parse("42"));
        assert_eq!(flat.get(""), Some(&json!(42)));
        assert!(flatten(&parse("nope")).is_empty());
    }
}
