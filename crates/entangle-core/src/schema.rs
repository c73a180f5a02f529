//! Declared shape of a synchronized type.
//!
//! Schemas are supplied from outside the engine, either declared one at a time
//! or loaded from a generated schema document.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, Result};
use crate::types::StorageKey;

/// Name, primary keys and synchronized attributes of a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    name: String,
    primary_keys: Vec<String>,
    attributes: Vec<String>,
}

impl Schema {
    /// Declare a schema.
    ///
    /// The name must be non-empty and primary keys must not repeat.
    pub fn new<K, A>(name: impl Into<String>, primary_keys: K, attributes: A) -> Result<Self>
    where
        K: IntoIterator,
        K::Item: Into<String>,
        A: IntoIterator,
        A::Item: Into<String>,
    {
        let name = name.into();
        if name.is_empty() {
            return Err(CoreError::InvalidSchema("type name is empty".into()));
        }
        let primary_keys: Vec<String> = primary_keys.into_iter().map(Into::into).collect();
        for (i, key) in primary_keys.iter().enumerate() {
            if primary_keys[..i].contains(key) {
                return Err(CoreError::InvalidSchema(format!(
                    "{name}: primary key {key} listed twice"
                )));
            }
        }
        Ok(Self {
            name,
            primary_keys,
            attributes: attributes.into_iter().map(Into::into).collect(),
        })
    }

    /// The type tag.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primary_keys(&self) -> &[String] {
        &self.primary_keys
    }

    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Compute the identity-map key of a message or attribute bag.
    pub fn storage_key<'a, F>(&self, get: F) -> Option<StorageKey>
    where
        F: FnMut(&str) -> Option<&'a Value>,
    {
        if self.primary_keys.is_empty() {
            return None;
        }
        StorageKey::lookup(&self.primary_keys, get)
    }
}

/// One entry of a schema document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaItem {
    pub name: String,
    pub keys: Vec<String>,
    pub attributes: Vec<String>,
}

impl TryFrom<SchemaItem> for Schema {
    type Error = CoreError;

    fn try_from(item: SchemaItem) -> Result<Self> {
        Schema::new(item.name, item.keys, item.attributes)
    }
}

/// A list of schema items, as emitted by a server-side schema generator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaDocument(pub Vec<SchemaItem>);

impl SchemaDocument {
    /// Parse a JSON schema document.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn items(&self) -> &[SchemaItem] {
        &self.0
    }
}
