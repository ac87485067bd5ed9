//! Inspector protocol objects
//!
//! Each exported type has two fixed serialized forms: a JSON text form that
//! omits absent optional fields, and a compact binary form (bincode). Both
//! decode to the same logical value.
//!
//! bincode is not self-describing, so a skipped field would shift every field
//! after it. Types that skip fields in JSON name a positional `Binary` mirror
//! that always writes every field.

use crate::console::ConsoleLevel;
use crate::script::ScriptValue;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InspectError {
    #[error("JSON form: {0}")]
    Json(#[from] serde_json::Error),

    #[error("binary form: {0}")]
    Binary(#[from] bincode::Error),
}

/// Protocol object with a JSON and a binary form
pub trait Exported: Serialize + DeserializeOwned + Clone {
    /// Shape of the binary form
    type Binary: Serialize + DeserializeOwned + From<Self> + Into<Self>;

    fn to_json_string(&self) -> Result<String, InspectError> {
        Ok(serde_json::to_string(self)?)
    }

    fn from_json_string(text: &str) -> Result<Self, InspectError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Append the binary form to `out`
    fn append_serialized(&self, out: &mut Vec<u8>) -> Result<(), InspectError> {
        bincode::serialize_into(out, &Self::Binary::from(self.clone()))?;
        Ok(())
    }

    #[deprecated(note = "use `append_serialized`, which produces the same bytes")]
    fn write_binary(&self, out: &mut Vec<u8>) -> Result<(), InspectError> {
        self.append_serialized(out)
    }

    fn from_binary(bytes: &[u8]) -> Result<Self, InspectError> {
        Ok(bincode::deserialize::<Self::Binary>(bytes)?.into())
    }
}

/// Mirror of a scripting value for the inspector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
}

/// Binary form of `RemoteObject`, every field in declaration order
#[derive(Serialize, Deserialize)]
pub struct RemoteObjectBinary(String, Option<String>, Option<String>, Option<String>, Option<String>);

impl From<RemoteObject> for RemoteObjectBinary {
    fn from(remote: RemoteObject) -> Self {
        Self(remote.kind, remote.subtype, remote.class_name, remote.description, remote.object_id)
    }
}

impl From<RemoteObjectBinary> for RemoteObject {
    fn from(RemoteObjectBinary(kind, subtype, class_name, description, object_id): RemoteObjectBinary) -> Self {
        Self {
            kind,
            subtype,
            class_name,
            description,
            object_id,
        }
    }
}

impl RemoteObject {
    pub fn from_value(value: &ScriptValue) -> Self {
        let kind = value.type_name().to_string();
        match value {
            ScriptValue::Undefined => Self {
                kind,
                ..Default::default()
            },
            ScriptValue::Null => Self {
                kind,
                subtype: Some("null".into()),
                description: Some("null".into()),
                ..Default::default()
            },
            ScriptValue::Object(wrapper) => {
                let class = wrapper.class().name().to_string();
                let description = if wrapper.is_released() {
                    format!("{} (released)", class)
                } else {
                    class.clone()
                };
                Self {
                    kind,
                    class_name: Some(class),
                    description: Some(description),
                    object_id: Some(wrapper.ptr().to_string()),
                    ..Default::default()
                }
            }
            ScriptValue::Constructor(class) => Self {
                kind,
                class_name: Some("Function".into()),
                description: Some(format!("class {}", class.name())),
                object_id: Some(format!("class:{}", class.id())),
                ..Default::default()
            },
            ScriptValue::Record(_) => Self {
                kind,
                class_name: Some("Object".into()),
                description: Some(value.to_string()),
                ..Default::default()
            },
            _ => Self {
                kind,
                description: Some(value.to_string()),
                ..Default::default()
            },
        }
    }
}

impl Exported for RemoteObject {
    type Binary = RemoteObjectBinary;
}

/// Protocol domain advertised to a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub name: String,
    pub version: String,
}

impl Domain {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl Exported for Domain {
    type Binary = Self;
}

/// Console entry reported to the log domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleMessage {
    pub level: ConsoleLevel,
    pub text: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: f64,
}

impl Exported for ConsoleMessage {
    type Binary = Self;
}
