//! JSON-backed tag access.
//!
//! A document maps tag paths to tag bodies. Blocks are arrays of objects,
//! flags fields are arrays of set bit names and every other field is a
//! number, string or array of numbers.

use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::source::{TagBackend, TagFields};

/// Tag backend serving tags from an in-memory JSON document.
#[derive(Debug, Clone, Default)]
pub struct JsonTagBackend {
    tags: Map<String, Value>,
    initialized: bool,
}

impl JsonTagBackend {
    /// Build a backend from a `{ "<tag path>": { ... } }` document.
    pub fn from_value(document: Value) -> Result<Self> {
        match document {
            Value::Object(tags) => Ok(Self {
                tags,
                initialized: false,
            }),
            _ => Err(Error::FieldType {
                field: String::new(),
                expected: "an object of tags",
            }),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_value(serde_json::from_str(&text)?)
    }

    pub fn insert(&mut self, path: impl Into<String>, tag: Value) {
        self.tags.insert(path.into(), tag);
    }

    pub fn tag_paths(&self) -> impl Iterator<Item = &str> {
        self.tags.keys().map(String::as_str)
    }
}

impl TagBackend for JsonTagBackend {
    fn initialize(&mut self) -> Result<()> {
        tracing::debug!("json tag backend initialized with {} tags", self.tags.len());
        self.initialized = true;
        Ok(())
    }

    fn shutdown(&mut self) {
        self.initialized = false;
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn open(&self, path: &str) -> Result<Box<dyn TagFields + '_>> {
        if !self.initialized {
            return Err(Error::BackendNotInitialized);
        }
        let root = self
            .tags
            .get(path)
            .ok_or_else(|| Error::TagNotFound(path.to_owned()))?;
        Ok(Box::new(JsonTag {
            path: path.to_owned(),
            root,
        }))
    }
}

struct JsonTag<'a> {
    path: String,
    root: &'a Value,
}

/// Split `name[3]` into `("name", Some(3))`.
fn segment(raw: &str) -> Option<(&str, Option<usize>)> {
    match raw.strip_suffix(']') {
        Some(rest) => {
            let (name, index) = rest.rsplit_once('[')?;
            Some((name, Some(index.parse().ok()?)))
        }
        None => Some((raw, None)),
    }
}

impl JsonTag<'_> {
    fn lookup(&self, path: &str) -> Option<&Value> {
        let mut value = self.root;
        for raw in path.split('/') {
            let (name, index) = segment(raw)?;
            value = value.get(name)?;
            if let Some(index) = index {
                value = value.get(index)?;
            }
        }
        Some(value)
    }

    fn field(&self, path: &str) -> Result<&Value> {
        self.lookup(path).ok_or_else(|| Error::FieldNotFound {
            tag: self.path.clone(),
            field: path.to_owned(),
        })
    }

    fn wrong_type(path: &str, expected: &'static str) -> Error {
        Error::FieldType {
            field: path.to_owned(),
            expected,
        }
    }
}

impl TagFields for JsonTag<'_> {
    fn tag_path(&self) -> &str {
        &self.path
    }

    fn has_field(&self, path: &str) -> bool {
        self.lookup(path).is_some()
    }

    fn element_count(&self, path: &str) -> Result<usize> {
        match self.lookup(path) {
            None | Some(Value::Null) => Ok(0),
            Some(Value::Array(elements)) => Ok(elements.len()),
            Some(_) => Err(Self::wrong_type(path, "a block")),
        }
    }

    fn integer(&self, path: &str) -> Result<i64> {
        self.field(path)?
            .as_i64()
            .ok_or_else(|| Self::wrong_type(path, "an integer"))
    }

    fn real(&self, path: &str) -> Result<f32> {
        self.field(path)?
            .as_f64()
            .map(|value| value as f32)
            .ok_or_else(|| Self::wrong_type(path, "a real"))
    }

    fn reals(&self, path: &str) -> Result<Vec<f32>> {
        match self.field(path)? {
            Value::Array(values) => values
                .iter()
                .map(|value| {
                    value
                        .as_f64()
                        .map(|value| value as f32)
                        .ok_or_else(|| Self::wrong_type(path, "an array of reals"))
                })
                .collect(),
            Value::Number(number) => number
                .as_f64()
                .map(|value| vec![value as f32])
                .ok_or_else(|| Self::wrong_type(path, "an array of reals")),
            _ => Err(Self::wrong_type(path, "an array of reals")),
        }
    }

    fn integers(&self, path: &str) -> Result<Vec<i64>> {
        match self.field(path)? {
            Value::Array(values) => values
                .iter()
                .map(|value| {
                    value
                        .as_i64()
                        .ok_or_else(|| Self::wrong_type(path, "an array of integers"))
                })
                .collect(),
            Value::Number(number) => number
                .as_i64()
                .map(|value| vec![value])
                .ok_or_else(|| Self::wrong_type(path, "an array of integers")),
            _ => Err(Self::wrong_type(path, "an array of integers")),
        }
    }

    fn string(&self, path: &str) -> Result<String> {
        self.field(path)?
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| Self::wrong_type(path, "a string"))
    }

    fn flag(&self, path: &str, bit: &str) -> Result<bool> {
        match self.lookup(path) {
            None | Some(Value::Null) => Ok(false),
            Some(Value::Array(bits)) => Ok(bits.iter().any(|set| set.as_str() == Some(bit))),
            Some(_) => Err(Self::wrong_type(path, "a flags field")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::real_array;
    use serde_json::json;

    fn backend() -> JsonTagBackend {
        let mut backend = JsonTagBackend::from_value(json!({
            "objects/crate.render_model": {
                "name": "crate",
                "nodes": [{ "name": "root", "default translation": [1.0, 2.0, 3.0] }],
                "flags": ["is water surface"],
                "count": 7
            }
        }))
        .unwrap();
        backend.initialize().unwrap();
        backend
    }

    #[test]
    fn open_requires_initialization() {
        let mut backend = backend();
        backend.shutdown();
        assert!(matches!(
            backend.open("objects/crate.render_model"),
            Err(Error::BackendNotInitialized)
        ));
        backend.initialize().unwrap();
        assert!(backend.open("objects/crate.render_model").is_ok());
        assert!(matches!(
            backend.open("objects/missing.render_model"),
            Err(Error::TagNotFound(_))
        ));
    }

    #[test]
    fn paths_address_block_elements() {
        let backend = backend();
        let tag = backend.open("objects/crate.render_model").unwrap();
        assert_eq!(tag.string("nodes[0]/name").unwrap(), "root");
        assert_eq!(
            real_array::<3>(&*tag, "nodes[0]/default translation").unwrap(),
            [1.0, 2.0, 3.0]
        );
        assert_eq!(tag.element_count("nodes").unwrap(), 1);
        assert_eq!(tag.element_count("regions").unwrap(), 0);
        assert!(!tag.has_field("nodes[1]/name"));
        assert!(matches!(
            tag.string("nodes[1]/name"),
            Err(Error::FieldNotFound { .. })
        ));
    }

    #[test]
    fn scalar_and_flag_fields() {
        let backend = backend();
        let tag = backend.open("objects/crate.render_model").unwrap();
        assert_eq!(tag.int32("count").unwrap(), 7);
        assert!(tag.flag("flags", "is water surface").unwrap());
        assert!(!tag.flag("flags", "draw cull distance close").unwrap());
        assert!(!tag.flag("missing flags", "anything").unwrap());
        assert!(matches!(tag.integer("name"), Err(Error::FieldType { .. })));
        assert!(real_array::<4>(&*tag, "nodes[0]/default translation").is_err());
    }
}
