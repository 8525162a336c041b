//! Attribute resolver - tolerant lookup over GeoJSON property bags
//!
//! Cadastral datasets disagree on field naming ("TGI", "tgi ", "Nro TGI"...),
//! so every read of a feature property goes through `resolve`.
//!
//! Lookup order, first match wins:
//! 1. exact key
//! 2. case-insensitive, trimmed key equality
//! 3. case-insensitive substring (key contains the logical name)

use geojson::JsonObject;
use serde_json::Value;

/// Placeholder shown for a field that is missing or null
pub const SENTINEL: &str = "-";

/// Resolve a logical field name inside a property bag.
///
/// Returns `None` for a missing bag, a missing key, or a `null` value.
/// Real falsy values (`0`, `false`, `""`) are returned as-is.
pub fn resolve<'a>(properties: Option<&'a JsonObject>, logical_name: &str) -> Option<&'a Value> {
    let props = properties?;

    if let Some(value) = props.get(logical_name) {
        return present(value);
    }

    let wanted = fold_case(logical_name);
    if wanted.is_empty() {
        return None;
    }

    if let Some((_, value)) = props.iter().find(|(key, _)| fold_case(key) == wanted) {
        return present(value);
    }

    props
        .iter()
        .find(|(key, _)| fold_case(key).contains(&wanted))
        .and_then(|(_, value)| present(value))
}

/// Resolve and render for display, substituting the sentinel for absence
pub fn resolve_display(properties: Option<&JsonObject>, logical_name: &str) -> String {
    resolve(properties, logical_name)
        .map(display_value)
        .unwrap_or_else(|| SENTINEL.to_string())
}

/// Render a scalar property the way it should appear in tables
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => SENTINEL.to_string(),
        other => other.to_string(),
    }
}

/// Uppercase + trim, used for key matching in the resolver
pub fn fold_case(s: &str) -> String {
    s.trim().to_uppercase()
}

/// Uppercase + trim + strip Spanish diacritics ("Sección" -> "SECCION")
pub fn normalize_key(s: &str) -> String {
    fold_case(s)
        .chars()
        .map(|c| match c {
            'Á' | 'À' | 'Ä' => 'A',
            'É' | 'È' | 'Ë' => 'E',
            'Í' | 'Ì' | 'Ï' => 'I',
            'Ó' | 'Ò' | 'Ö' => 'O',
            'Ú' | 'Ù' | 'Ü' => 'U',
            other => other,
        })
        .collect()
}

fn present(value: &Value) -> Option<&Value> {
    if value.is_null() {
        None
    } else {
        Some(value)
    }
}
