//! Node attribute bag.
//!
//! # Responsibility
//! - Keep the reserved keys (`content`, `style`, `src`) in dedicated slots
//!   with string accessors; other JSON values are stored as given.
//! - Carry every other key as an open JSON-valued extension.
//!
//! # Invariants
//! - Reserved keys never appear in the extension map.
//! - Assigning JSON `null` to a reserved key clears it.

use serde_json::{Map, Value};

/// Text payload key (aliased by the `text` path key).
pub const CONTENT_KEY: &str = "content";
/// Inline style string used by rendering.
pub const STYLE_KEY: &str = "style";
/// Image source used by rendering.
pub const SRC_KEY: &str = "src";

/// Attribute storage for one node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    content: Option<Value>,
    style: Option<Value>,
    src: Option<Value>,
    extra: Map<String, Value>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds attributes from a JSON object.
    pub fn from_map(map: Map<String, Value>) -> Self {
        let mut attributes = Self::default();
        for (key, value) in map {
            attributes.set(&key, value);
        }
        attributes
    }

    /// `content` when it holds a string.
    pub fn content(&self) -> Option<&str> {
        self.content.as_ref().and_then(Value::as_str)
    }

    /// `style` when it holds a string.
    pub fn style(&self) -> Option<&str> {
        self.style.as_ref().and_then(Value::as_str)
    }

    /// `src` when it holds a string.
    pub fn src(&self) -> Option<&str> {
        self.src.as_ref().and_then(Value::as_str)
    }

    /// Text form of `key` for rendering: strings as-is, other values as JSON.
    pub fn text(&self, key: &str) -> Option<String> {
        let value = match reserved_slot(key) {
            Some(slot) => self.slot(slot).as_ref(),
            None => self.extra.get(key),
        }?;
        Some(match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
    }

    /// Returns a copy of the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        match reserved_slot(key) {
            Some(slot) => self.slot(slot).clone(),
            None => self.extra.get(key).cloned(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        match reserved_slot(key) {
            Some(slot) => self.slot(slot).is_some(),
            None => self.extra.contains_key(key),
        }
    }

    /// Creates or replaces one attribute. `null` clears a reserved key.
    pub fn set(&mut self, key: &str, value: Value) {
        match reserved_slot(key) {
            Some(slot) => *self.slot_mut(slot) = (!value.is_null()).then_some(value),
            None => {
                self.extra.insert(key.to_string(), value);
            }
        }
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = Some(Value::String(content.into()));
    }

    /// Removes one attribute and returns its previous value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        match reserved_slot(key) {
            Some(slot) => self.slot_mut(slot).take(),
            None => self.extra.remove(key),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.style.is_none() && self.src.is_none() && self.extra.is_empty()
    }

    /// Flattens the attributes into one JSON object.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = self.extra.clone();
        for (key, value) in [
            (CONTENT_KEY, &self.content),
            (STYLE_KEY, &self.style),
            (SRC_KEY, &self.src),
        ] {
            if let Some(value) = value {
                map.insert(key.to_string(), value.clone());
            }
        }
        map
    }

    fn slot(&self, slot: Reserved) -> &Option<Value> {
        match slot {
            Reserved::Content => &self.content,
            Reserved::Style => &self.style,
            Reserved::Src => &self.src,
        }
    }

    fn slot_mut(&mut self, slot: Reserved) -> &mut Option<Value> {
        match slot {
            Reserved::Content => &mut self.content,
            Reserved::Style => &mut self.style,
            Reserved::Src => &mut self.src,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Reserved {
    Content,
    Style,
    Src,
}

fn reserved_slot(key: &str) -> Option<Reserved> {
    match key {
        CONTENT_KEY => Some(Reserved::Content),
        STYLE_KEY => Some(Reserved::Style),
        SRC_KEY => Some(Reserved::Src),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::Attributes;
    use serde_json::json;

    #[test]
    fn reserved_keys_keep_non_string_values() {
        let mut attributes = Attributes::new();
        attributes.set("style", json!("color: red"));
        assert_eq!(attributes.style(), Some("color: red"));

        attributes.set("src", json!(42));
        assert_eq!(attributes.get("src"), Some(json!(42)));
        assert_eq!(attributes.src(), None);
        assert_eq!(attributes.text("src").as_deref(), Some("42"));
        assert_eq!(attributes.to_map().get("src"), Some(&json!(42)));
    }

    #[test]
    fn null_clears_reserved_key_but_is_kept_for_extensions() {
        let mut attributes = Attributes::new();
        attributes.set("content", json!("hi"));
        attributes.set("content", json!(null));
        assert!(!attributes.contains("content"));

        attributes.set("level", json!(null));
        assert!(attributes.contains("level"));
    }

    #[test]
    fn to_map_merges_reserved_and_extension_keys() {
        let mut attributes = Attributes::new();
        attributes.set_content("body");
        attributes.set("level", json!(2));

        let map = attributes.to_map();
        assert_eq!(map.get("content"), Some(&json!("body")));
        assert_eq!(map.get("level"), Some(&json!(2)));
        assert_eq!(map.len(), 2);
    }
}
