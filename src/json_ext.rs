//! Addressing and merging of response trees.

use std::fmt;

use serde::de::Visitor;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map;
pub use serde_json_bytes::Value;

use crate::error::JsonExtError;

/// A JSON object.
pub type Object = Map<ByteString, Value>;

/// One segment of a [`Path`] into a response tree.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum PathElement {
    /// An object member, by response key.
    Key(String),

    /// An array offset.
    Index(usize),
}

impl Serialize for PathElement {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            PathElement::Key(key) => serializer.serialize_str(key),
            PathElement::Index(index) => serializer.serialize_u64(*index as u64),
        }
    }
}

impl<'de> Deserialize<'de> for PathElement {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct PathElementVisitor;

        impl<'de> Visitor<'de> for PathElementVisitor {
            type Value = PathElement;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a string or an unsigned integer")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(PathElement::Index(v as usize))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(PathElement::Key(v.to_string()))
            }
        }

        deserializer.deserialize_any(PathElementVisitor)
    }
}

/// A path into a response tree, as found in the `path` of a wire error.
///
/// Serializes to the GraphQL wire form: an array of response keys and list
/// indices, e.g. `["users", 0, "name"]`.
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Path(pub Vec<PathElement>);

impl Path {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn from_slice<T: AsRef<str>>(segments: &[T]) -> Self {
        Self(
            segments
                .iter()
                .map(|segment| {
                    let segment = segment.as_ref();
                    match segment.parse::<usize>() {
                        Ok(index) => PathElement::Index(index),
                        Err(_) => PathElement::Key(segment.to_string()),
                    }
                })
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathElement> {
        self.0.iter()
    }

    /// Returns a new path with `element` appended.
    pub fn join(&self, element: PathElement) -> Self {
        let mut elements = self.0.clone();
        elements.push(element);
        Self(elements)
    }

    /// Returns a new path with `key` appended as an object member segment.
    pub fn join_key(&self, key: impl Into<String>) -> Self {
        self.join(PathElement::Key(key.into()))
    }

    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    pub fn last_key(&self) -> Option<&str> {
        match self.0.last() {
            Some(PathElement::Key(key)) => Some(key.as_str()),
            _ => None,
        }
    }
}

impl From<&str> for Path {
    fn from(value: &str) -> Self {
        Self(
            value
                .split('/')
                .filter(|segment| !segment.is_empty())
                .map(|segment| match segment.parse::<usize>() {
                    Ok(index) => PathElement::Index(index),
                    Err(_) => PathElement::Key(segment.to_string()),
                })
                .collect(),
        )
    }
}

impl From<String> for Path {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for element in &self.0 {
            write!(f, "/")?;
            match element {
                PathElement::Key(key) => write!(f, "{key}")?,
                PathElement::Index(index) => write!(f, "{index}")?,
            }
        }
        Ok(())
    }
}

/// Extension methods on [`Value`] used by normalization and the envelope.
pub trait ValueExt {
    /// Returns the node reached by following `path` from this value.
    fn get_path<'a>(&'a self, path: &Path) -> Result<&'a Value, JsonExtError>;

    /// Deep merge `other` into this value. Objects merge member by member,
    /// arrays merge by index, everything else is replaced.
    fn deep_merge(&mut self, other: Value);
}

impl ValueExt for Value {
    fn get_path<'a>(&'a self, path: &Path) -> Result<&'a Value, JsonExtError> {
        let mut current = self;
        for element in path.iter() {
            current = match (current, element) {
                (Value::Object(object), PathElement::Key(key)) => {
                    object.get(key.as_str()).ok_or(JsonExtError::PathNotFound)?
                }
                (Value::Array(array), PathElement::Index(index)) => {
                    array.get(*index).ok_or(JsonExtError::PathNotFound)?
                }
                _ => return Err(JsonExtError::PathNotFound),
            };
        }
        Ok(current)
    }

    fn deep_merge(&mut self, other: Value) {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => {
                for (key, value) in b {
                    match a.get_mut(&key) {
                        Some(existing) => existing.deep_merge(value),
                        None => {
                            a.insert(key, value);
                        }
                    }
                }
            }
            (Value::Array(a), Value::Array(b)) => {
                for (index, value) in b.into_iter().enumerate() {
                    match a.get_mut(index) {
                        Some(existing) => existing.deep_merge(value),
                        None => a.push(value),
                    }
                }
            }
            (a, b) => {
                *a = b;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    #[test]
    fn path_parses_keys_and_indices() {
        let path = Path::from("posts/2/title");
        assert_eq!(
            path.0,
            vec![
                PathElement::Key("posts".to_string()),
                PathElement::Index(2),
                PathElement::Key("title".to_string()),
            ]
        );
        assert_eq!(path.to_string(), "/posts/2/title");
    }

    #[test]
    fn path_wire_form_is_an_array() {
        let path = Path::from("user/address/zip");
        let wire = serde_json::to_string(&path).unwrap();
        assert_eq!(wire, r#"["user","address","zip"]"#);

        let back: Path = serde_json::from_str(r#"["posts",2,"title"]"#).unwrap();
        assert_eq!(back, Path::from("posts/2/title"));
    }

    #[test]
    fn get_path_follows_objects_and_arrays() {
        let data = json!({"user": {"posts": [{"title": "a"}, {"title": "b"}]}});
        let title = data.get_path(&Path::from("user/posts/1/title")).unwrap();
        assert_eq!(title, &json!("b"));

        assert!(data.get_path(&Path::from("user/missing")).is_err());
        assert!(data.get_path(&Path::from("user/posts/7")).is_err());
    }

    #[test]
    fn deep_merge_merges_objects_and_replaces_scalars() {
        let mut a = json!({"user": {"name": "ada", "posts": [{"id": 1}]}});
        a.deep_merge(json!({"user": {"age": 36, "posts": [{"title": "x"}]}}));
        assert_eq!(
            a,
            json!({"user": {"name": "ada", "posts": [{"id": 1, "title": "x"}], "age": 36}})
        );
    }
}
