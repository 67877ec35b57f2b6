//! Wire encoding for procedure inputs and outputs.
//!
//! Values travel as `{"json": <plain JSON>, "meta": {"values": <tree>, "v": 1}}`.
//! The plain part is what a JSON-only client sees; the annotation tree records
//! which nodes were dates, big integers, maps, sets or `undefined` so the
//! receiver can restore them.
//!
//! A typed node is annotated `[type]`, or `[type, {<child path>: <tree>}]` when
//! its children carry annotations of their own. Plain objects and arrays have no
//! annotation; their annotated descendants are hoisted into the nearest typed
//! ancestor (or into `values` itself) under a relative path. Paths join object
//! keys and array indices with `.`; a literal `.` inside a key is written `\.`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map as JsonMap, Number, Value};
use std::collections::BTreeMap;

const DATE: &str = "Date";
const BIGINT: &str = "bigint";
const MAP: &str = "map";
const SET: &str = "set";
const UNDEFINED: &str = "undefined";
const META_VERSION: u64 = 1;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TransformError {
    #[error("expected an object with a `json` field")]
    MissingJson,

    #[error("malformed meta: {0}")]
    InvalidMeta(String),

    #[error("annotation '{kind}' at path '{path}' does not match the value")]
    InvalidAnnotation { path: String, kind: String },

    #[error("unknown annotation '{kind}' at path '{path}'")]
    UnknownAnnotation { path: String, kind: String },
}

/// A value with the types plain JSON cannot express
#[derive(Debug, Clone, PartialEq)]
pub enum RichValue {
    Undefined,
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    BigInt(i128),
    Date(DateTime<Utc>),
    Array(Vec<RichValue>),
    Object(BTreeMap<String, RichValue>),
    Map(Vec<(RichValue, RichValue)>),
    Set(Vec<RichValue>),
}

impl RichValue {
    /// Lift plain JSON without any annotations
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => RichValue::Null,
            Value::Bool(b) => RichValue::Bool(b),
            Value::Number(n) => RichValue::Number(n),
            Value::String(s) => RichValue::String(s),
            Value::Array(items) => {
                RichValue::Array(items.into_iter().map(RichValue::from_json).collect())
            }
            Value::Object(map) => RichValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, RichValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Serialize any value through `serde_json`; dates come out as strings
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(RichValue::from_json)
    }

    /// Build an object from key/value pairs
    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, RichValue)>) -> Self {
        RichValue::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn string(value: impl Into<String>) -> Self {
        RichValue::String(value.into())
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, RichValue::Undefined)
    }

    pub fn get(&self, key: &str) -> Option<&RichValue> {
        match self {
            RichValue::Object(map) => map.get(key),
            _ => None,
        }
    }

    /// Lossy projection onto plain JSON, used to deserialize procedure inputs
    ///
    /// Dates become RFC 3339 strings, big integers become numbers when they fit
    /// and strings otherwise, sets become arrays, maps become objects when all
    /// keys are strings. `undefined` object members are dropped.
    pub fn into_plain_json(self) -> Value {
        match self {
            RichValue::Undefined | RichValue::Null => Value::Null,
            RichValue::Bool(b) => Value::Bool(b),
            RichValue::Number(n) => Value::Number(n),
            RichValue::String(s) => Value::String(s),
            RichValue::BigInt(n) => bigint_to_plain(n),
            RichValue::Date(d) => Value::String(format_date(&d)),
            RichValue::Array(items) | RichValue::Set(items) => {
                Value::Array(items.into_iter().map(RichValue::into_plain_json).collect())
            }
            RichValue::Object(map) => Value::Object(
                map.into_iter()
                    .filter(|(_, v)| !v.is_undefined())
                    .map(|(k, v)| (k, v.into_plain_json()))
                    .collect(),
            ),
            RichValue::Map(entries) => {
                if entries.iter().all(|(k, _)| matches!(k, RichValue::String(_))) {
                    let mut object = JsonMap::new();
                    for (k, v) in entries {
                        if let RichValue::String(k) = k {
                            object.insert(k, v.into_plain_json());
                        }
                    }
                    Value::Object(object)
                } else {
                    Value::Array(
                        entries
                            .into_iter()
                            .map(|(k, v)| Value::Array(vec![k.into_plain_json(), v.into_plain_json()]))
                            .collect(),
                    )
                }
            }
        }
    }

    /// Encode as a `{json, meta}` envelope
    pub fn to_envelope(&self) -> Value {
        let (json, tree) = encode(self);

        let mut envelope = JsonMap::new();
        envelope.insert("json".to_string(), json);
        if let Some(tree) = tree {
            let mut meta = JsonMap::new();
            meta.insert("values".to_string(), tree.into_value());
            meta.insert("v".to_string(), Value::from(META_VERSION));
            envelope.insert("meta".to_string(), Value::Object(meta));
        }
        Value::Object(envelope)
    }

    /// Decode a `{json, meta}` envelope
    pub fn from_envelope(envelope: Value) -> Result<Self, TransformError> {
        let Value::Object(mut envelope) = envelope else {
            return Err(TransformError::MissingJson);
        };
        let json = envelope.remove("json").ok_or(TransformError::MissingJson)?;
        let mut root = RichValue::from_json(json);

        let mut annotations = match envelope.remove("meta") {
            None | Some(Value::Null) => Vec::new(),
            Some(meta) => parse_meta(meta)?,
        };
        // children are restored before the containers that hold them
        annotations.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        for (segments, kind) in annotations {
            apply_annotation(&mut root, &segments, &kind)?;
        }

        Ok(root)
    }
}

impl From<Value> for RichValue {
    fn from(value: Value) -> Self {
        RichValue::from_json(value)
    }
}

impl From<DateTime<Utc>> for RichValue {
    fn from(value: DateTime<Utc>) -> Self {
        RichValue::Date(value)
    }
}

impl From<bool> for RichValue {
    fn from(value: bool) -> Self {
        RichValue::Bool(value)
    }
}

impl From<u64> for RichValue {
    fn from(value: u64) -> Self {
        RichValue::Number(value.into())
    }
}

impl From<String> for RichValue {
    fn from(value: String) -> Self {
        RichValue::String(value)
    }
}

impl From<&str> for RichValue {
    fn from(value: &str) -> Self {
        RichValue::String(value.to_string())
    }
}

impl<T: Into<RichValue>> From<Option<T>> for RichValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(RichValue::Null, Into::into)
    }
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn bigint_to_plain(n: i128) -> Value {
    if let Ok(v) = i64::try_from(n) {
        Value::Number(v.into())
    } else if let Ok(v) = u64::try_from(n) {
        Value::Number(v.into())
    } else {
        Value::String(n.to_string())
    }
}

fn escape_segment(segment: &str) -> String {
    segment.replace('.', "\\.")
}

fn join_path(path: &[String]) -> String {
    path.iter()
        .map(|s| escape_segment(s))
        .collect::<Vec<_>>()
        .join(".")
}

fn split_path(path: &str) -> Vec<String> {
    if path.is_empty() {
        return Vec::new();
    }

    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'.') => {
                current.push('.');
                chars.next();
            }
            '.' => segments.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    segments.push(current);
    segments
}

/// Annotations produced while encoding one node
enum Tree {
    /// A typed node and the annotations below it, keyed by relative path
    Node(&'static str, JsonMap<String, Value>),
    /// Annotations below a plain object or array, keyed by relative path
    Children(JsonMap<String, Value>),
}

impl Tree {
    fn leaf(kind: &'static str) -> Option<Self> {
        Some(Tree::Node(kind, JsonMap::new()))
    }

    fn into_value(self) -> Value {
        match self {
            Tree::Node(kind, children) if children.is_empty() => {
                Value::Array(vec![Value::String(kind.to_string())])
            }
            Tree::Node(kind, children) => {
                Value::Array(vec![Value::String(kind.to_string()), Value::Object(children)])
            }
            Tree::Children(children) => Value::Object(children),
        }
    }
}

/// Record the annotations of child `key` in its parent's child map
fn attach(children: &mut JsonMap<String, Value>, key: &str, tree: Option<Tree>) {
    let key = escape_segment(key);
    match tree {
        None => {}
        Some(Tree::Children(nested)) => {
            for (path, subtree) in nested {
                children.insert(format!("{}.{}", key, path), subtree);
            }
        }
        Some(node) => {
            children.insert(key, node.into_value());
        }
    }
}

fn encode_items(items: &[RichValue], children: &mut JsonMap<String, Value>) -> Vec<Value> {
    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let (json, tree) = encode(item);
            attach(children, &index.to_string(), tree);
            json
        })
        .collect()
}

fn encode(value: &RichValue) -> (Value, Option<Tree>) {
    match value {
        RichValue::Undefined => (Value::Null, Tree::leaf(UNDEFINED)),
        RichValue::Null => (Value::Null, None),
        RichValue::Bool(b) => (Value::Bool(*b), None),
        RichValue::Number(n) => (Value::Number(n.clone()), None),
        RichValue::String(s) => (Value::String(s.clone()), None),
        RichValue::BigInt(n) => (Value::String(n.to_string()), Tree::leaf(BIGINT)),
        RichValue::Date(d) => (Value::String(format_date(d)), Tree::leaf(DATE)),
        RichValue::Array(items) => {
            let mut children = JsonMap::new();
            let json = Value::Array(encode_items(items, &mut children));
            (json, (!children.is_empty()).then_some(Tree::Children(children)))
        }
        RichValue::Set(items) => {
            let mut children = JsonMap::new();
            let json = Value::Array(encode_items(items, &mut children));
            (json, Some(Tree::Node(SET, children)))
        }
        RichValue::Object(map) => {
            let mut object = JsonMap::new();
            let mut children = JsonMap::new();
            for (key, item) in map {
                let (json, tree) = encode(item);
                attach(&mut children, key, tree);
                // JSON has no undefined; the member only lives in the annotations
                if !item.is_undefined() {
                    object.insert(key.clone(), json);
                }
            }
            (
                Value::Object(object),
                (!children.is_empty()).then_some(Tree::Children(children)),
            )
        }
        RichValue::Map(entries) => {
            let mut children = JsonMap::new();
            let pairs = entries
                .iter()
                .enumerate()
                .map(|(index, (key, item))| {
                    let (key_json, key_tree) = encode(key);
                    let (item_json, item_tree) = encode(item);

                    let mut pair_children = JsonMap::new();
                    attach(&mut pair_children, "0", key_tree);
                    attach(&mut pair_children, "1", item_tree);
                    attach(&mut children, &index.to_string(), Some(Tree::Children(pair_children)));

                    Value::Array(vec![key_json, item_json])
                })
                .collect();
            (Value::Array(pairs), Some(Tree::Node(MAP, children)))
        }
    }
}

fn parse_meta(meta: Value) -> Result<Vec<(Vec<String>, String)>, TransformError> {
    let Value::Object(mut meta) = meta else {
        return Err(TransformError::InvalidMeta("meta must be an object".into()));
    };

    let mut annotations = Vec::new();
    match meta.remove("values") {
        None | Some(Value::Null) => {}
        Some(values) => collect_tree(values, &[], &mut annotations)?,
    }
    Ok(annotations)
}

/// Flatten an annotation tree rooted at `origin` into `(path, type)` pairs
fn collect_tree(
    tree: Value,
    origin: &[String],
    out: &mut Vec<(Vec<String>, String)>,
) -> Result<(), TransformError> {
    let bad = || TransformError::InvalidMeta(format!("bad annotation at '{}'", join_path(origin)));

    match tree {
        Value::Object(children) => collect_children(children, origin, out),
        Value::Array(node) => {
            let mut node = node.into_iter();
            let kind = match node.next() {
                Some(Value::String(kind)) => kind,
                // composite annotations such as ["class", "Point"]
                Some(Value::Array(parts)) => parts
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(":"),
                _ => return Err(bad()),
            };
            match node.next() {
                None => {}
                Some(Value::Object(children)) => collect_children(children, origin, out)?,
                Some(_) => return Err(bad()),
            }
            if node.next().is_some() {
                return Err(bad());
            }
            out.push((origin.to_vec(), kind));
            Ok(())
        }
        _ => Err(bad()),
    }
}

fn collect_children(
    children: JsonMap<String, Value>,
    origin: &[String],
    out: &mut Vec<(Vec<String>, String)>,
) -> Result<(), TransformError> {
    for (path, subtree) in children {
        let mut segments = origin.to_vec();
        segments.extend(split_path(&path));
        collect_tree(subtree, &segments, out)?;
    }
    Ok(())
}

fn node_mut<'a>(root: &'a mut RichValue, segments: &[String]) -> Option<&'a mut RichValue> {
    let mut current = root;
    for segment in segments {
        current = match current {
            RichValue::Object(map) => map.get_mut(segment)?,
            RichValue::Array(items) | RichValue::Set(items) => {
                items.get_mut(segment.parse::<usize>().ok()?)?
            }
            _ => return None,
        };
    }
    Some(current)
}

fn apply_annotation(
    root: &mut RichValue,
    segments: &[String],
    kind: &str,
) -> Result<(), TransformError> {
    let path = join_path(segments);
    let mismatch = || TransformError::InvalidAnnotation {
        path: path.clone(),
        kind: kind.to_string(),
    };

    if kind == UNDEFINED {
        // JSON encoders may have dropped the member entirely
        if let Some((last, parent)) = segments.split_last() {
            if let Some(RichValue::Object(map)) = node_mut(root, parent) {
                map.insert(last.clone(), RichValue::Undefined);
                return Ok(());
            }
        }
        let node = node_mut(root, segments).ok_or_else(mismatch)?;
        *node = RichValue::Undefined;
        return Ok(());
    }

    let node = node_mut(root, segments).ok_or_else(mismatch)?;
    let value = std::mem::replace(node, RichValue::Null);

    *node = match (kind, value) {
        (DATE, RichValue::String(s)) => DateTime::parse_from_rfc3339(&s)
            .map(|d| RichValue::Date(d.with_timezone(&Utc)))
            .map_err(|_| mismatch())?,
        (BIGINT, RichValue::String(s)) => {
            RichValue::BigInt(s.parse::<i128>().map_err(|_| mismatch())?)
        }
        (BIGINT, RichValue::Number(n)) => RichValue::BigInt(
            n.as_i64()
                .map(i128::from)
                .or_else(|| n.as_u64().map(i128::from))
                .ok_or_else(mismatch)?,
        ),
        (SET, RichValue::Array(items)) => RichValue::Set(items),
        (MAP, RichValue::Array(pairs)) => {
            let mut entries = Vec::with_capacity(pairs.len());
            for pair in pairs {
                match pair {
                    RichValue::Array(mut kv) if kv.len() == 2 => {
                        let value = kv.pop().ok_or_else(mismatch)?;
                        let key = kv.pop().ok_or_else(mismatch)?;
                        entries.push((key, value));
                    }
                    _ => return Err(mismatch()),
                }
            }
            RichValue::Map(entries)
        }
        (DATE | BIGINT | SET | MAP, _) => return Err(mismatch()),
        (other, _) => {
            return Err(TransformError::UnknownAnnotation {
                path: path.clone(),
                kind: other.to_string(),
            })
        }
    };

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn test_plain_values_have_no_meta() {
        let value = RichValue::from_json(json!({"a": [1, "two", null, true]}));
        assert_eq!(value.to_envelope(), json!({"json": {"a": [1, "two", null, true]}}));
    }

    #[test]
    fn test_annotated_envelope_shape() {
        let value = RichValue::object([
            ("createdAt", RichValue::Date(date())),
            ("count", RichValue::BigInt(9_007_199_254_740_993)),
            ("tags", RichValue::Set(vec!["a".into(), "b".into()])),
            ("missing", RichValue::Undefined),
            ("a.b", RichValue::Date(date())),
        ]);

        assert_eq!(
            value.to_envelope(),
            json!({
                "json": {
                    "a.b": "2024-05-01T12:30:00.000Z",
                    "count": "9007199254740993",
                    "createdAt": "2024-05-01T12:30:00.000Z",
                    "tags": ["a", "b"]
                },
                "meta": {
                    "values": {
                        "a\\.b": ["Date"],
                        "count": ["bigint"],
                        "createdAt": ["Date"],
                        "missing": ["undefined"],
                        "tags": ["set"]
                    },
                    "v": 1
                }
            })
        );
    }

    /// Envelopes as emitted by the JavaScript client library for the same values
    fn client_fixtures() -> Vec<(Value, RichValue)> {
        vec![
            (
                json!({"json": "2024-05-01T12:30:00.000Z", "meta": {"values": ["Date"], "v": 1}}),
                RichValue::Date(date()),
            ),
            (
                json!({
                    "json": ["2024-05-01T12:30:00.000Z"],
                    "meta": {"values": ["set", {"0": ["Date"]}], "v": 1}
                }),
                RichValue::Set(vec![RichValue::Date(date())]),
            ),
            (
                json!({
                    "json": {
                        "createdAt": "2024-05-01T12:30:00.000Z",
                        "tags": ["2024-05-01T12:30:00.000Z"],
                        "lookup": [["a", "1"]]
                    },
                    "meta": {
                        "values": {
                            "createdAt": ["Date"],
                            "tags": ["set", {"0": ["Date"]}],
                            "lookup": ["map", {"0.1": ["bigint"]}]
                        },
                        "v": 1
                    }
                }),
                RichValue::object([
                    ("createdAt", RichValue::Date(date())),
                    ("tags", RichValue::Set(vec![RichValue::Date(date())])),
                    ("lookup", RichValue::Map(vec![("a".into(), RichValue::BigInt(1))])),
                ]),
            ),
            (
                json!({
                    "json": {"list": ["2024-05-01T12:30:00.000Z", 1]},
                    "meta": {"values": {"list.0": ["Date"]}, "v": 1}
                }),
                RichValue::object([(
                    "list",
                    RichValue::Array(vec![RichValue::Date(date()), 1u64.into()]),
                )]),
            ),
            (
                json!({
                    "json": [["2024-05-01T12:30:00.000Z", [["x", "7"]]]],
                    "meta": {
                        "values": ["map", {
                            "0.0": ["Date"],
                            "0.1": ["map", {"0.1": ["bigint"]}]
                        }],
                        "v": 1
                    }
                }),
                RichValue::Map(vec![(
                    RichValue::Date(date()),
                    RichValue::Map(vec![("x".into(), RichValue::BigInt(7))]),
                )]),
            ),
        ]
    }

    #[test]
    fn test_client_envelopes_decode() {
        for (envelope, expected) in client_fixtures() {
            assert_eq!(RichValue::from_envelope(envelope.clone()).unwrap(), expected, "{}", envelope);
        }
    }

    #[test]
    fn test_encoding_matches_client_envelopes() {
        for (envelope, value) in client_fixtures() {
            assert_eq!(value.to_envelope(), envelope);
        }
    }

    #[test]
    fn test_inner_node_without_version() {
        let decoded = RichValue::from_envelope(json!({
            "json": {"s": ["2024-05-01T12:30:00.000Z"]},
            "meta": {"values": {"s": ["set", {"0": ["Date"]}]}}
        }))
        .unwrap();
        assert_eq!(decoded.get("s"), Some(&RichValue::Set(vec![RichValue::Date(date())])));
    }

    #[test]
    fn test_flat_sibling_annotations_still_decode() {
        let decoded = RichValue::from_envelope(json!({
            "json": {"s": ["2024-05-01T12:30:00.000Z"]},
            "meta": {"values": {"s": ["set"], "s.0": ["Date"]}}
        }))
        .unwrap();
        assert_eq!(decoded.get("s"), Some(&RichValue::Set(vec![RichValue::Date(date())])));
    }

    #[test]
    fn test_nested_round_trip() {
        let value = RichValue::object([
            (
                "lookup",
                RichValue::Map(vec![
                    (RichValue::Date(date()), RichValue::Set(vec![RichValue::BigInt(-5)])),
                    ("plain".into(), RichValue::Null),
                ]),
            ),
            ("list", RichValue::Array(vec![RichValue::Date(date()), RichValue::Undefined])),
        ]);

        let decoded = RichValue::from_envelope(value.to_envelope()).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_root_undefined() {
        let envelope = RichValue::Undefined.to_envelope();
        assert_eq!(envelope, json!({"json": null, "meta": {"values": ["undefined"], "v": 1}}));
        assert_eq!(RichValue::from_envelope(envelope).unwrap(), RichValue::Undefined);
    }

    #[test]
    fn test_dropped_undefined_member_is_restored() {
        let decoded = RichValue::from_envelope(json!({
            "json": {"a": 1},
            "meta": {"values": {"b": ["undefined"]}}
        }))
        .unwrap();
        assert_eq!(decoded.get("b"), Some(&RichValue::Undefined));
    }

    #[test]
    fn test_bad_envelopes() {
        assert_eq!(
            RichValue::from_envelope(json!({"email": "x"})),
            Err(TransformError::MissingJson)
        );
        assert!(matches!(
            RichValue::from_envelope(json!({"json": 1, "meta": {"values": ["Date"]}})),
            Err(TransformError::InvalidAnnotation { .. })
        ));
        assert!(matches!(
            RichValue::from_envelope(json!({"json": "x", "meta": {"values": ["regexp"]}})),
            Err(TransformError::UnknownAnnotation { .. })
        ));
        assert!(matches!(
            RichValue::from_envelope(json!({"json": {}, "meta": {"values": {"a": "Date"}}})),
            Err(TransformError::InvalidMeta(_))
        ));
    }

    #[test]
    fn test_plain_projection() {
        let value = RichValue::object([
            ("at", RichValue::Date(date())),
            ("big", RichValue::BigInt(i128::MAX)),
            ("small", RichValue::BigInt(42)),
            ("gone", RichValue::Undefined),
            ("m", RichValue::Map(vec![("k".into(), 1u64.into())])),
        ]);
        assert_eq!(
            value.into_plain_json(),
            json!({
                "at": "2024-05-01T12:30:00.000Z",
                "big": i128::MAX.to_string(),
                "small": 42,
                "m": {"k": 1}
            })
        );
    }

    #[test]
    fn test_path_escaping() {
        assert_eq!(split_path("a\\.b.c"), vec!["a.b", "c"]);
        assert_eq!(join_path(&["a.b".to_string(), "c".to_string()]), "a\\.b.c");
        assert!(split_path("").is_empty());
    }
}
