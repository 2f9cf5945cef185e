use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Stream};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    number: u32,
    generation: u16,
}

impl ObjectId {
    pub fn new(number: u32, generation: u16) -> Self {
        Self { number, generation }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn generation(&self) -> u16 {
        self.generation
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.number, self.generation)
    }
}

/// Tag of an [`Object`] value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Null,
    Boolean,
    Integer,
    Real,
    String,
    Name,
    Array,
    Dictionary,
    Stream,
    Command,
    Reference,
}

impl ObjectType {
    /// Human readable tag name, used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            ObjectType::Null => "null",
            ObjectType::Boolean => "boolean",
            ObjectType::Integer => "integer",
            ObjectType::Real => "real",
            ObjectType::String => "string",
            ObjectType::Name => "name",
            ObjectType::Array => "array",
            ObjectType::Dictionary => "dictionary",
            ObjectType::Stream => "stream",
            ObjectType::Command => "command",
            ObjectType::Reference => "reference",
        }
    }

    /// Default value for a freshly created indirect object of this tag.
    ///
    /// Returns `None` for [`ObjectType::Reference`]: a reference can never be
    /// the direct value of an indirect object.
    pub fn default_value(&self) -> Option<Object> {
        let value = match self {
            ObjectType::Null => Object::Null,
            ObjectType::Boolean => Object::Boolean(false),
            ObjectType::Integer => Object::Integer(0),
            ObjectType::Real => Object::Real(0.0),
            ObjectType::String => Object::String(Vec::new()),
            ObjectType::Name => Object::Name(String::new()),
            ObjectType::Array => Object::Array(Vec::new()),
            ObjectType::Dictionary => Object::Dictionary(Dictionary::new()),
            ObjectType::Stream => Object::Stream(Stream::new(Vec::new())),
            ObjectType::Command => Object::Command(String::new()),
            ObjectType::Reference => return None,
        };
        Some(value)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(Vec<u8>),
    Name(String),
    Array(Vec<Object>),
    Dictionary(Dictionary),
    Stream(Stream),
    /// Content stream operator token
    Command(String),
    Reference(ObjectId),
}

impl Object {
    pub fn object_type(&self) -> ObjectType {
        match self {
            Object::Null => ObjectType::Null,
            Object::Boolean(_) => ObjectType::Boolean,
            Object::Integer(_) => ObjectType::Integer,
            Object::Real(_) => ObjectType::Real,
            Object::String(_) => ObjectType::String,
            Object::Name(_) => ObjectType::Name,
            Object::Array(_) => ObjectType::Array,
            Object::Dictionary(_) => ObjectType::Dictionary,
            Object::Stream(_) => ObjectType::Stream,
            Object::Command(_) => ObjectType::Command,
            Object::Reference(_) => ObjectType::Reference,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.object_type().name()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Object::Reference(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Object::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Object::Real(f) => Some(*f),
            Object::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Object>> {
        match self {
            Object::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Object>> {
        match self {
            Object::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Dictionary of a dictionary or of a stream.
    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Object::Dictionary(dict) => Some(dict),
            Object::Stream(stream) => Some(stream.dictionary()),
            _ => None,
        }
    }

    pub fn as_dict_mut(&mut self) -> Option<&mut Dictionary> {
        match self {
            Object::Dictionary(dict) => Some(dict),
            Object::Stream(stream) => Some(stream.dictionary_mut()),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&Stream> {
        match self {
            Object::Stream(stream) => Some(stream),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<ObjectId> {
        match self {
            Object::Reference(id) => Some(*id),
            _ => None,
        }
    }

    /// References held directly by this value: the value itself if it is a
    /// reference, or the reference-typed elements of an array.
    ///
    /// Dictionary values are not descended into.
    pub fn direct_references(&self) -> Vec<ObjectId> {
        match self {
            Object::Reference(id) => vec![*id],
            Object::Array(items) => items.iter().filter_map(Object::as_reference).collect(),
            _ => Vec::new(),
        }
    }

    /// Independent deep copy of this value.
    ///
    /// Fails with [`PdfError::CloneFailure`] when the container nesting of the
    /// value is deeper than `max_depth`.
    pub fn deep_copy(&self, max_depth: Option<usize>) -> Result<Object> {
        self.copy_at(1, max_depth)
    }

    fn copy_at(&self, depth: usize, max_depth: Option<usize>) -> Result<Object> {
        let is_container = matches!(
            self,
            Object::Array(_) | Object::Dictionary(_) | Object::Stream(_)
        );
        if is_container {
            if let Some(limit) = max_depth {
                if depth > limit {
                    return Err(PdfError::CloneFailure(format!(
                        "nesting depth {depth} exceeds limit {limit}"
                    )));
                }
            }
        }

        match self {
            Object::Array(items) => {
                let copied = items
                    .iter()
                    .map(|item| item.copy_at(depth + 1, max_depth))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Object::Array(copied))
            }
            Object::Dictionary(dict) => Ok(Object::Dictionary(copy_dict(dict, depth, max_depth)?)),
            Object::Stream(stream) => {
                let dict = copy_dict(stream.dictionary(), depth, max_depth)?;
                Ok(Object::Stream(Stream::from_parts(dict, stream.data().to_vec())))
            }
            scalar => Ok(scalar.clone()),
        }
    }
}

fn copy_dict(dict: &Dictionary, depth: usize, max_depth: Option<usize>) -> Result<Dictionary> {
    let mut copied = Dictionary::with_capacity(dict.len());
    for (key, value) in dict.iter() {
        copied.set(key.clone(), value.copy_at(depth + 1, max_depth)?);
    }
    Ok(copied)
}

impl From<bool> for Object {
    fn from(b: bool) -> Self {
        Object::Boolean(b)
    }
}

impl From<i32> for Object {
    fn from(i: i32) -> Self {
        Object::Integer(i as i64)
    }
}

impl From<i64> for Object {
    fn from(i: i64) -> Self {
        Object::Integer(i)
    }
}

impl From<f32> for Object {
    fn from(f: f32) -> Self {
        Object::Real(f as f64)
    }
}

impl From<f64> for Object {
    fn from(f: f64) -> Self {
        Object::Real(f)
    }
}

impl From<&str> for Object {
    fn from(s: &str) -> Self {
        Object::String(s.as_bytes().to_vec())
    }
}

impl From<Vec<Object>> for Object {
    fn from(v: Vec<Object>) -> Self {
        Object::Array(v)
    }
}

impl From<Dictionary> for Object {
    fn from(d: Dictionary) -> Self {
        Object::Dictionary(d)
    }
}

impl From<Stream> for Object {
    fn from(s: Stream) -> Self {
        Object::Stream(s)
    }
}

impl From<ObjectId> for Object {
    fn from(id: ObjectId) -> Self {
        Object::Reference(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested(levels: usize) -> Object {
        let mut value = Object::Integer(1);
        for _ in 0..levels {
            value = Object::Array(vec![value]);
        }
        value
    }

    #[test]
    fn test_object_id_display_and_order() {
        let a = ObjectId::new(3, 0);
        let b = ObjectId::new(3, 1);
        let c = ObjectId::new(10, 0);
        assert_eq!(a.to_string(), "3 0 R");
        assert!(a < b && b < c);
    }

    #[test]
    fn test_default_values() {
        assert_eq!(ObjectType::Integer.default_value(), Some(Object::Integer(0)));
        assert_eq!(ObjectType::Array.default_value(), Some(Object::Array(vec![])));
        assert_eq!(
            ObjectType::Dictionary.default_value(),
            Some(Object::Dictionary(Dictionary::new()))
        );
        assert_eq!(ObjectType::Reference.default_value(), None);

        for tag in [
            ObjectType::Null,
            ObjectType::Boolean,
            ObjectType::Real,
            ObjectType::String,
            ObjectType::Name,
            ObjectType::Stream,
            ObjectType::Command,
        ] {
            let value = tag.default_value().unwrap();
            assert_eq!(value.object_type(), tag);
        }
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let mut dict = Dictionary::new();
        dict.set("Kids", Object::Array(vec![Object::Reference(ObjectId::new(4, 0))]));
        let original = Object::Dictionary(dict);

        let mut copy = original.deep_copy(None).unwrap();
        copy.as_dict_mut()
            .unwrap()
            .get_mut("Kids")
            .and_then(Object::as_array_mut)
            .unwrap()
            .push(Object::Integer(7));

        assert_eq!(
            original.as_dict().unwrap().get("Kids").unwrap().as_array().unwrap().len(),
            1
        );
        assert_ne!(original, copy);
    }

    #[test]
    fn test_deep_copy_depth_limit() {
        assert!(nested(3).deep_copy(Some(3)).is_ok());
        assert!(matches!(
            nested(4).deep_copy(Some(3)),
            Err(PdfError::CloneFailure(_))
        ));
        assert!(nested(200).deep_copy(None).is_ok());
        assert!(Object::Integer(5).deep_copy(Some(0)).is_ok());
    }

    #[test]
    fn test_direct_references() {
        let id = ObjectId::new(12, 0);
        assert_eq!(Object::Reference(id).direct_references(), vec![id]);

        let array = Object::Array(vec![
            Object::Reference(ObjectId::new(1, 0)),
            Object::Integer(3),
            Object::Reference(ObjectId::new(2, 0)),
        ]);
        assert_eq!(
            array.direct_references(),
            vec![ObjectId::new(1, 0), ObjectId::new(2, 0)]
        );

        let mut dict = Dictionary::new();
        dict.set("P", Object::Reference(id));
        assert!(Object::Dictionary(dict).direct_references().is_empty());
    }

    #[test]
    fn test_as_dict_on_stream() {
        let stream = Stream::new(b"q Q".to_vec());
        let obj = Object::Stream(stream);
        assert_eq!(obj.as_dict().unwrap().get("Length"), Some(&Object::Integer(3)));
        assert_eq!(obj.type_name(), "stream");
    }
}
