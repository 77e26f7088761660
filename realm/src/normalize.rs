//! Single boundary between raw backend payloads and the client's canonical
//! types. Every gateway response passes through here; shapes that are not
//! recognised become `ClientError::Decode` instead of being coerced.

use crate::http_pool::HttpResponse;
use realm_core::{ActionAck, ClientError, ClientResult, Collection, ItemId, PlayerSnapshot};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Builds a collection from any of the list shapes the backend sends:
///
/// - a bare array of records,
/// - `{"data": <any of these shapes>, ...}` (sibling keys such as `status`
///   are ignored),
/// - an id-keyed map of records,
/// - a single record, wrapped into a one-element collection.
///
/// Array records are keyed by `id_field`, then `id`, then their position.
pub fn collection_from_value(value: &Value, id_field: &str) -> ClientResult<Collection> {
    match value {
        Value::Array(items) => from_array(items, id_field),
        Value::Object(map) => {
            if let Some(inner) = map.get("data").filter(|_| !has_id(map, id_field)) {
                return match inner {
                    Value::Array(_) | Value::Object(_) => collection_from_value(inner, id_field),
                    other => Err(ClientError::Decode(format!(
                        "expected list under \"data\", got {}",
                        kind_of(other)
                    ))),
                };
            }
            if map.is_empty() {
                return Ok(Collection::new());
            }
            if is_single_record(map, id_field) {
                return from_array(std::slice::from_ref(value), id_field);
            }
            Ok(map
                .iter()
                .map(|(key, record)| (ItemId::from_key(key), record.clone()))
                .collect())
        }
        other => Err(ClientError::Decode(format!(
            "expected list payload, got {}",
            kind_of(other)
        ))),
    }
}

fn from_array(items: &[Value], id_field: &str) -> ClientResult<Collection> {
    let mut out = Collection::new();
    for (idx, record) in items.iter().enumerate() {
        if !record.is_object() {
            return Err(ClientError::Decode(format!(
                "list element {idx} is {}, expected object",
                kind_of(record)
            )));
        }
        let id = record
            .get(id_field)
            .and_then(ItemId::from_value)
            .or_else(|| record.get("id").and_then(ItemId::from_value))
            .unwrap_or(ItemId::Num(idx as i64));
        out.insert(id, record.clone());
    }
    Ok(out)
}

/// An object is one record (rather than an id-keyed map) when it carries an id
/// field or when any of its values is not itself an object.
fn is_single_record(map: &Map<String, Value>, id_field: &str) -> bool {
    has_id(map, id_field) || map.values().any(|v| !v.is_object())
}

fn has_id(map: &Map<String, Value>, id_field: &str) -> bool {
    map.contains_key(id_field) || map.contains_key("id")
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Human-readable detail from an error payload: `detail` (string or a list of
/// `{msg}` entries), then `message`, then `error`.
pub fn error_detail(value: &Value) -> Option<String> {
    if let Some(detail) = value.get("detail") {
        match detail {
            Value::String(s) if !s.trim().is_empty() => return Some(s.clone()),
            Value::Array(entries) => {
                let msgs: Vec<&str> = entries
                    .iter()
                    .filter_map(|e| e.get("msg").and_then(Value::as_str))
                    .collect();
                if !msgs.is_empty() {
                    return Some(msgs.join("; "));
                }
            }
            _ => {}
        }
    }
    ["message", "error"].iter().find_map(|key| {
        value
            .get(*key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    })
}

/// Rejects non-2xx responses with the server's detail text and returns the
/// JSON body of the rest.
pub fn expect_json(resp: HttpResponse) -> ClientResult<Value> {
    if !resp.is_success() {
        return Err(server_error(&resp));
    }
    resp.json.ok_or_else(|| {
        ClientError::Decode(match resp.text {
            Some(text) => format!("expected json body, got: {}", truncate(&text, 120)),
            None => "empty response body".to_string(),
        })
    })
}

pub fn server_error(resp: &HttpResponse) -> ClientError {
    let message = resp
        .json
        .as_ref()
        .and_then(error_detail)
        .or_else(|| resp.text.clone().filter(|t| !t.trim().is_empty() && t.len() <= 200))
        .unwrap_or_default();
    ClientError::server(resp.status, message)
}

/// Write endpoints answer `{status, message}`; some send `success` instead
/// and some only an empty 2xx body, which counts as success. An explicit
/// `status: false` becomes a server error carrying the message.
pub fn parse_ack(resp: HttpResponse) -> ClientResult<ActionAck> {
    if !resp.is_success() {
        return Err(server_error(&resp));
    }
    let Some(body) = resp.json.as_ref() else {
        return Ok(ActionAck::ok(""));
    };
    let status = match body.get("status").or_else(|| body.get("success")) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !matches!(s.as_str(), "error" | "failed" | "false"),
        Some(Value::Number(n)) => n.as_i64() != Some(0),
        _ => true,
    };
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| (!status).then(|| error_detail(body)).flatten())
        .unwrap_or_default();
    if status {
        Ok(ActionAck::ok(message))
    } else {
        Err(ClientError::server(resp.status, message))
    }
}

/// Decodes a single DTO, unwrapping a `{"data": ...}` envelope if present.
pub fn decode<T: DeserializeOwned>(value: Value) -> ClientResult<T> {
    let inner = match value {
        Value::Object(mut map) if map.len() == 1 && map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };
    Ok(serde_json::from_value(inner)?)
}

/// Decodes a list of DTOs accepting the same shapes as
/// [`collection_from_value`].
pub fn decode_list<T: DeserializeOwned>(value: &Value) -> ClientResult<Vec<T>> {
    collection_from_value(value, "id")?
        .iter()
        .map(|(_, record)| Ok(serde_json::from_value(record.clone())?))
        .collect()
}

/// Player payload: either the player object itself or wrapped in `data` /
/// `player`. Missing inventory or equipment are empty collections.
pub fn player_from_value(value: Value) -> ClientResult<PlayerSnapshot> {
    let mut value = value;
    for envelope in ["data", "player"] {
        if let Some(inner) = value.get(envelope).filter(|v| v.is_object()) {
            value = inner.clone();
        }
    }
    let Some(obj) = value.as_object() else {
        return Err(ClientError::Decode(format!(
            "expected player object, got {}",
            kind_of(&value)
        )));
    };

    let int = |keys: &[&str]| -> i64 {
        keys.iter()
            .find_map(|k| obj.get(*k))
            .and_then(|v| {
                v.as_i64()
                    .or_else(|| v.as_f64().map(|f| f as i64))
                    .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
            })
            .unwrap_or(0)
    };
    let collection = |key: &str| -> ClientResult<Collection> {
        match obj.get(key) {
            None | Some(Value::Null) => Ok(Collection::new()),
            Some(v) => collection_from_value(v, "item_id"),
        }
    };

    Ok(PlayerSnapshot {
        id: obj.get("id").and_then(ItemId::from_value),
        name: obj
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        level: int(&["level", "lvl"]),
        money: int(&["money", "gold"]),
        premium_money: int(&["premium_money", "donate_money", "premium"]),
        image: obj.get("image").and_then(Value::as_str).map(str::to_string),
        inventory: collection("inventory")?,
        equipment: collection("equipment")?,
    })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
