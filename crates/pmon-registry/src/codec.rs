//! Coercion, comparison and writing of registry values.
//!
//! Every function here is driven by the declared [`ValueKind`]. Coercion is
//! deliberately permissive so that YAML scalars like `90`, `"90"` and
//! `90.0` all satisfy a registry value of `90`: operators rely on that.

use crate::hive::RegistryKey;
use crate::kind::ValueKind;
use crate::value::{ConfigValue, RegistryValue};
use pmon_common::{RegistryError, RegistryResult};
use tracing::debug;

/// Coerce a value to a 32-bit unsigned integer.
///
/// Integers and floats truncate to the target width. Strings accept an
/// optional leading `+` followed by decimal digits; anything after the
/// digits is ignored, so `"90.5"` reads as 90.
pub fn to_u32(value: &ConfigValue) -> RegistryResult<u32> {
    match value {
        ConfigValue::Int(i) => Ok(*i as u32),
        ConfigValue::UInt(u) => Ok(*u as u32),
        ConfigValue::Float(x) => Ok(*x as u32),
        ConfigValue::Text(s) => parse_leading_digits(s)
            .map(|n| n as u32)
            .ok_or_else(|| RegistryError::coercion("dword", format!("string '{s}'"))),
        other => Err(RegistryError::coercion("dword", other.type_name())),
    }
}

/// Coerce a value to a 64-bit unsigned integer. Same rules as [`to_u32`].
pub fn to_u64(value: &ConfigValue) -> RegistryResult<u64> {
    match value {
        ConfigValue::Int(i) => Ok(*i as u64),
        ConfigValue::UInt(u) => Ok(*u),
        ConfigValue::Float(x) => Ok(*x as u64),
        ConfigValue::Text(s) => parse_leading_digits(s)
            .ok_or_else(|| RegistryError::coercion("qword", format!("string '{s}'"))),
        other => Err(RegistryError::coercion("qword", other.type_name())),
    }
}

fn parse_leading_digits(s: &str) -> Option<u64> {
    let s = s.trim_start();
    let s = s.strip_prefix('+').unwrap_or(s);
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    s[..end].parse().ok()
}

/// Bytes from a byte value, the UTF-8 bytes of a string, or a list of
/// integers in `0..=255`.
pub fn to_bytes(value: &ConfigValue) -> RegistryResult<Vec<u8>> {
    match value {
        ConfigValue::Binary(bytes) => Ok(bytes.clone()),
        ConfigValue::Text(s) => Ok(s.as_bytes().to_vec()),
        ConfigValue::List(items) => items
            .iter()
            .map(|item| match item {
                ConfigValue::Int(i) => u8::try_from(*i).ok(),
                ConfigValue::UInt(u) => u8::try_from(*u).ok(),
                _ => None,
            })
            .collect::<Option<Vec<u8>>>()
            .ok_or_else(|| RegistryError::coercion("binary", "list with non-byte items")),
        other => Err(RegistryError::coercion("binary", other.type_name())),
    }
}

/// A single string becomes a one-element list; list items are stringified.
pub fn to_strings(value: &ConfigValue) -> RegistryResult<Vec<String>> {
    match value {
        ConfigValue::Text(s) => Ok(vec![s.clone()]),
        ConfigValue::List(items) => items
            .iter()
            .map(|item| {
                if item.is_scalar() {
                    Ok(item.to_string())
                } else {
                    Err(RegistryError::coercion(
                        "multi_string",
                        format!("list containing {}", item.type_name()),
                    ))
                }
            })
            .collect(),
        other => Err(RegistryError::coercion("multi_string", other.type_name())),
    }
}

/// Convert a configuration value into the canonical value for `kind`.
pub fn coerce(kind: ValueKind, value: &ConfigValue) -> RegistryResult<RegistryValue> {
    match kind {
        ValueKind::String | ValueKind::ExpandString => {
            if !value.is_scalar() {
                return Err(RegistryError::coercion(kind.as_str(), value.type_name()));
            }
            let text = value.to_string();
            Ok(if kind == ValueKind::String {
                RegistryValue::String(text)
            } else {
                RegistryValue::ExpandString(text)
            })
        }
        ValueKind::Binary => to_bytes(value).map(RegistryValue::Binary),
        ValueKind::Dword => to_u32(value).map(RegistryValue::Dword),
        ValueKind::Qword => to_u64(value).map(RegistryValue::Qword),
        ValueKind::MultiString => to_strings(value).map(RegistryValue::MultiString),
    }
}

/// Compare an observed value with an expectation under the declared kind.
///
/// No expectation always compares equal. A side that cannot be coerced to
/// the kind is a mismatch, never an error.
pub fn compare_values(actual: &ConfigValue, expected: Option<&ConfigValue>, kind: ValueKind) -> bool {
    let Some(expected) = expected else {
        return true;
    };

    let outcome = match kind {
        ValueKind::String | ValueKind::ExpandString => Ok(actual.to_string() == expected.to_string()),
        ValueKind::Dword => to_u32(actual).and_then(|a| Ok(a == to_u32(expected)?)),
        ValueKind::Qword => to_u64(actual).and_then(|a| Ok(a == to_u64(expected)?)),
        ValueKind::Binary => to_bytes(actual).and_then(|a| Ok(a == to_bytes(expected)?)),
        ValueKind::MultiString => to_strings(actual).and_then(|a| Ok(a == to_strings(expected)?)),
    };

    outcome.unwrap_or_else(|err| {
        debug!("Comparison treated as mismatch ({}): {}", kind, err);
        false
    })
}

/// Compare a value read from the registry with an expectation.
pub fn matches_expectation(actual: &RegistryValue, expected: Option<&ConfigValue>, kind: ValueKind) -> bool {
    compare_values(&actual.as_config_value(), expected, kind)
}

/// Write `value` under `name` using the coercion rules of `kind`.
///
/// Returns the canonical value that was written.
pub fn set_registry_value(
    key: &dyn RegistryKey,
    name: &str,
    kind: ValueKind,
    value: &ConfigValue,
) -> RegistryResult<RegistryValue> {
    let canonical = coerce(kind, value)?;
    debug!("Setting registry value {} = {} ({})", name, canonical, kind);
    key.write(name, &canonical)?;
    Ok(canonical)
}
