//! Typed registry values and loosely-typed configuration values.

use crate::kind::ValueKind;
use serde::Deserialize;
use std::fmt;

/// A value as stored in the registry, in its canonical native form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryValue {
    String(String),
    ExpandString(String),
    Binary(Vec<u8>),
    Dword(u32),
    Qword(u64),
    MultiString(Vec<String>),
    /// Raw data under a storage type outside the six kinds, or data that
    /// does not decode as its storage type (a two-byte DWORD).
    Other { storage_type: u32, data: Vec<u8> },
}

impl RegistryValue {
    /// `None` for [`RegistryValue::Other`], which never matches a declared kind.
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            RegistryValue::String(_) => Some(ValueKind::String),
            RegistryValue::ExpandString(_) => Some(ValueKind::ExpandString),
            RegistryValue::Binary(_) => Some(ValueKind::Binary),
            RegistryValue::Dword(_) => Some(ValueKind::Dword),
            RegistryValue::Qword(_) => Some(ValueKind::Qword),
            RegistryValue::MultiString(_) => Some(ValueKind::MultiString),
            RegistryValue::Other { .. } => None,
        }
    }

    /// Native `REG_*` type code.
    pub fn storage_type(&self) -> u32 {
        match self {
            RegistryValue::Other { storage_type, .. } => *storage_type,
            known => known.kind().map_or(0, |kind| kind.storage_type()),
        }
    }

    pub fn kind_name(&self) -> String {
        match self.kind() {
            Some(kind) => kind.to_string(),
            None => format!("storage type {}", self.storage_type()),
        }
    }

    /// View this value the way configuration values are compared.
    pub fn as_config_value(&self) -> ConfigValue {
        match self {
            RegistryValue::String(s) | RegistryValue::ExpandString(s) => ConfigValue::Text(s.clone()),
            RegistryValue::Binary(b) | RegistryValue::Other { data: b, .. } => ConfigValue::Binary(b.clone()),
            RegistryValue::Dword(d) => ConfigValue::UInt(u64::from(*d)),
            RegistryValue::Qword(q) => ConfigValue::UInt(*q),
            RegistryValue::MultiString(items) => {
                ConfigValue::List(items.iter().cloned().map(ConfigValue::Text).collect())
            }
        }
    }
}

impl fmt::Display for RegistryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_config_value().fmt(f)
    }
}

/// An expected value as written in YAML.
///
/// YAML scalars are loosely typed (`90`, `"90"` and `90.0` are three
/// different things), so the comparator coerces per declared kind instead
/// of relying on the parsed shape.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "serde_yaml::Value")]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Binary(Vec<u8>),
    List(Vec<ConfigValue>),
}

impl ConfigValue {
    /// Short type name used in coercion errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            ConfigValue::Bool(_) => "bool",
            ConfigValue::Int(_) => "integer",
            ConfigValue::UInt(_) => "unsigned integer",
            ConfigValue::Float(_) => "float",
            ConfigValue::Text(_) => "string",
            ConfigValue::Binary(_) => "bytes",
            ConfigValue::List(_) => "list",
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, ConfigValue::Binary(_) | ConfigValue::List(_))
    }

    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ConfigValue>,
    {
        ConfigValue::List(items.into_iter().map(Into::into).collect())
    }
}

/// Values print the way an operator would write them: floats without a
/// trailing `.0`, byte strings and lists as space separated brackets.
impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(b) => write!(f, "{b}"),
            ConfigValue::Int(i) => write!(f, "{i}"),
            ConfigValue::UInt(u) => write!(f, "{u}"),
            ConfigValue::Float(x) => write!(f, "{x}"),
            ConfigValue::Text(s) => f.write_str(s),
            ConfigValue::Binary(bytes) => {
                f.write_str("[")?;
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{b}")?;
                }
                f.write_str("]")
            }
            ConfigValue::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl TryFrom<serde_yaml::Value> for ConfigValue {
    type Error = String;

    fn try_from(value: serde_yaml::Value) -> Result<Self, Self::Error> {
        use serde_yaml::Value;

        match value {
            Value::Bool(b) => Ok(ConfigValue::Bool(b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(ConfigValue::Int(i))
                } else if let Some(u) = n.as_u64() {
                    Ok(ConfigValue::UInt(u))
                } else {
                    n.as_f64()
                        .map(ConfigValue::Float)
                        .ok_or_else(|| format!("unsupported number: {n}"))
                }
            }
            Value::String(s) => Ok(ConfigValue::Text(s)),
            Value::Sequence(items) => items
                .into_iter()
                .map(ConfigValue::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(ConfigValue::List),
            Value::Tagged(tagged) => ConfigValue::try_from(tagged.value),
            Value::Null => Err("null is not allowed inside an expected value".to_string()),
            Value::Mapping(_) => Err("mappings are not supported as expected values".to_string()),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::Text(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::Text(s)
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Bool(b)
    }
}

impl From<i64> for ConfigValue {
    fn from(i: i64) -> Self {
        ConfigValue::Int(i)
    }
}

impl From<u32> for ConfigValue {
    fn from(u: u32) -> Self {
        ConfigValue::UInt(u64::from(u))
    }
}

impl From<u64> for ConfigValue {
    fn from(u: u64) -> Self {
        ConfigValue::UInt(u)
    }
}

impl From<f64> for ConfigValue {
    fn from(x: f64) -> Self {
        ConfigValue::Float(x)
    }
}

impl From<Vec<u8>> for ConfigValue {
    fn from(bytes: Vec<u8>) -> Self {
        ConfigValue::Binary(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_operator_notation() {
        assert_eq!(ConfigValue::Float(90.0).to_string(), "90");
        assert_eq!(ConfigValue::Float(90.5).to_string(), "90.5");
        assert_eq!(ConfigValue::Int(-3).to_string(), "-3");
        assert_eq!(ConfigValue::Binary(vec![1, 2, 3]).to_string(), "[1 2 3]");
        assert_eq!(ConfigValue::list(["a", "b"]).to_string(), "[a b]");
    }

    #[test]
    fn test_yaml_scalars() {
        let v: ConfigValue = serde_yaml::from_str("90").unwrap();
        assert_eq!(v, ConfigValue::Int(90));
        let v: ConfigValue = serde_yaml::from_str("\"90\"").unwrap();
        assert_eq!(v, ConfigValue::Text("90".to_string()));
        let v: ConfigValue = serde_yaml::from_str("90.5").unwrap();
        assert_eq!(v, ConfigValue::Float(90.5));
        let v: ConfigValue = serde_yaml::from_str("true").unwrap();
        assert_eq!(v, ConfigValue::Bool(true));
        let v: ConfigValue = serde_yaml::from_str("18446744073709551615").unwrap();
        assert_eq!(v, ConfigValue::UInt(u64::MAX));
    }

    #[test]
    fn test_yaml_lists_and_null() {
        let v: ConfigValue = serde_yaml::from_str("[first, 2]").unwrap();
        assert_eq!(
            v,
            ConfigValue::List(vec![ConfigValue::Text("first".into()), ConfigValue::Int(2)])
        );

        let v: Option<ConfigValue> = serde_yaml::from_str("null").unwrap();
        assert!(v.is_none());

        assert!(serde_yaml::from_str::<ConfigValue>("{a: 1}").is_err());
    }

    #[test]
    fn test_registry_value_view() {
        assert_eq!(RegistryValue::Dword(7).as_config_value(), ConfigValue::UInt(7));
        assert_eq!(
            RegistryValue::MultiString(vec!["a".into()]).as_config_value(),
            ConfigValue::list(["a"])
        );
        assert_eq!(RegistryValue::ExpandString("%PATH%".into()).kind(), Some(ValueKind::ExpandString));
        assert_eq!(RegistryValue::Dword(1).storage_type(), 4);

        let none = RegistryValue::Other { storage_type: 0, data: vec![1] };
        assert_eq!(none.kind(), None);
        assert_eq!(none.storage_type(), 0);
        assert_eq!(none.kind_name(), "storage type 0");
        assert_eq!(RegistryValue::Binary(vec![9, 10]).to_string(), "[9 10]");
    }
}
