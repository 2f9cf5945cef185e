//! Typed accessors over dictionaries and arrays
//!
//! Every getter distinguishes a missing entry ([`PdfError::NotFound`]) from an
//! entry with the wrong tag ([`PdfError::TypeMismatch`]). Helpers that take a
//! [`Resolve`] follow exactly one reference hop.

use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Object, ObjectId, ObjectType};

/// Anything that can turn a reference into its current value.
pub trait Resolve {
    /// Current value of `id`; unknown references resolve to [`Object::Null`].
    fn resolve(&self, id: ObjectId) -> Result<Object>;
}

/// Value of the `/Type` entry, or an empty string when absent or not a name.
pub fn dict_type(dict: &Dictionary) -> String {
    dict.get("Type")
        .and_then(Object::as_name)
        .unwrap_or_default()
        .to_string()
}

fn entry<'a>(dict: &'a Dictionary, key: &str) -> Result<&'a Object> {
    dict.get(key)
        .ok_or_else(|| PdfError::NotFound(format!("dictionary key /{key}")))
}

pub fn int_from_dict(dict: &Dictionary, key: &str) -> Result<i64> {
    let value = entry(dict, key)?;
    value
        .as_integer()
        .ok_or_else(|| PdfError::type_mismatch("integer", value.type_name()))
}

pub fn ref_from_dict(dict: &Dictionary, key: &str) -> Result<ObjectId> {
    let value = entry(dict, key)?;
    value
        .as_reference()
        .ok_or_else(|| PdfError::type_mismatch("reference", value.type_name()))
}

pub fn string_from_dict(dict: &Dictionary, key: &str) -> Result<Vec<u8>> {
    let value = entry(dict, key)?;
    value
        .as_string()
        .map(|s| s.to_vec())
        .ok_or_else(|| PdfError::type_mismatch("string", value.type_name()))
}

pub fn name_from_dict(dict: &Dictionary, key: &str) -> Result<String> {
    let value = entry(dict, key)?;
    value
        .as_name()
        .map(str::to_string)
        .ok_or_else(|| PdfError::type_mismatch("name", value.type_name()))
}

/// Dereferences a reference-typed value whose target must be a dictionary.
pub fn dict_from_ref(resolver: &dyn Resolve, value: &Object) -> Result<Dictionary> {
    let id = value
        .as_reference()
        .ok_or_else(|| PdfError::type_mismatch("reference", value.type_name()))?;
    match resolver.resolve(id)? {
        Object::Dictionary(dict) => Ok(dict),
        other => Err(PdfError::type_mismatch("dictionary", other.type_name())),
    }
}

/// Entry `key` of `dict` with one reference hop, checked against `expected`.
pub fn typed_from_dict(
    resolver: &dyn Resolve,
    dict: &Dictionary,
    key: &str,
    expected: ObjectType,
) -> Result<Object> {
    let mut value = entry(dict, key)?.clone();
    if let Object::Reference(id) = value {
        value = resolver.resolve(id)?;
    }
    if value.object_type() != expected {
        return Err(PdfError::type_mismatch(expected.name(), value.type_name()));
    }
    Ok(value)
}

fn element(array: &[Object], position: usize) -> Result<&Object> {
    array
        .get(position)
        .ok_or_else(|| PdfError::NotFound(format!("array index {position}")))
}

pub fn int_from_array(array: &[Object], position: usize) -> Result<i64> {
    let value = element(array, position)?;
    value
        .as_integer()
        .ok_or_else(|| PdfError::type_mismatch("integer", value.type_name()))
}

/// Integer or real element as `f64`.
pub fn real_from_array(array: &[Object], position: usize) -> Result<f64> {
    let value = element(array, position)?;
    value
        .as_real()
        .ok_or_else(|| PdfError::type_mismatch("real", value.type_name()))
}

pub fn set_int_in_array(array: &mut [Object], position: usize, value: i64) -> Result<()> {
    let slot = array
        .get_mut(position)
        .ok_or_else(|| PdfError::NotFound(format!("array index {position}")))?;
    match slot {
        Object::Integer(current) => {
            *current = value;
            Ok(())
        }
        other => Err(PdfError::type_mismatch("integer", other.type_name())),
    }
}

/// Writes into a real slot, or truncates into an integer slot.
pub fn set_real_in_array(array: &mut [Object], position: usize, value: f64) -> Result<()> {
    let slot = array
        .get_mut(position)
        .ok_or_else(|| PdfError::NotFound(format!("array index {position}")))?;
    match slot {
        Object::Real(current) => *current = value,
        Object::Integer(current) => *current = value as i64,
        other => return Err(PdfError::type_mismatch("real", other.type_name())),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapResolver(HashMap<ObjectId, Object>);

    impl Resolve for MapResolver {
        fn resolve(&self, id: ObjectId) -> Result<Object> {
            Ok(self.0.get(&id).cloned().unwrap_or(Object::Null))
        }
    }

    fn sample() -> Dictionary {
        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name("Annot".into()));
        dict.set("F", 4);
        dict.set("T", "author");
        dict.set("P", ObjectId::new(3, 0));
        dict.set("Rect", Object::Array(vec![0.into(), 0.into(), 10.5.into(), 20.into()]));
        dict
    }

    #[test]
    fn test_dict_type() {
        assert_eq!(dict_type(&sample()), "Annot");
        assert_eq!(dict_type(&Dictionary::new()), "");
    }

    #[test]
    fn test_scalar_getters() {
        let dict = sample();
        assert_eq!(int_from_dict(&dict, "F").unwrap(), 4);
        assert_eq!(ref_from_dict(&dict, "P").unwrap(), ObjectId::new(3, 0));
        assert_eq!(string_from_dict(&dict, "T").unwrap(), b"author".to_vec());
        assert_eq!(name_from_dict(&dict, "Type").unwrap(), "Annot");
    }

    #[test]
    fn test_missing_vs_wrong_type() {
        let dict = sample();
        assert!(matches!(int_from_dict(&dict, "Q"), Err(PdfError::NotFound(_))));
        assert!(matches!(
            int_from_dict(&dict, "T"),
            Err(PdfError::TypeMismatch {
                expected: "integer",
                found: "string"
            })
        ));
    }

    #[test]
    fn test_typed_from_dict_follows_one_hop() {
        let mut objects = HashMap::new();
        let mut page = Dictionary::new();
        page.set("Type", Object::Name("Page".into()));
        objects.insert(ObjectId::new(3, 0), Object::Dictionary(page.clone()));
        let resolver = MapResolver(objects);

        let value = typed_from_dict(&resolver, &sample(), "P", ObjectType::Dictionary).unwrap();
        assert_eq!(value, Object::Dictionary(page));

        let err = typed_from_dict(&resolver, &sample(), "P", ObjectType::Stream).unwrap_err();
        assert!(matches!(err, PdfError::TypeMismatch { .. }));

        let dict = dict_from_ref(&resolver, &Object::Reference(ObjectId::new(3, 0))).unwrap();
        assert_eq!(dict_type(&dict), "Page");
        assert!(dict_from_ref(&resolver, &Object::Integer(3)).is_err());
    }

    #[test]
    fn test_array_helpers() {
        let mut rect = vec![Object::Integer(0), Object::Real(1.5), Object::Name("X".into())];
        assert_eq!(int_from_array(&rect, 0).unwrap(), 0);
        assert_eq!(real_from_array(&rect, 0).unwrap(), 0.0);
        assert_eq!(real_from_array(&rect, 1).unwrap(), 1.5);
        assert!(matches!(int_from_array(&rect, 1), Err(PdfError::TypeMismatch { .. })));
        assert!(matches!(int_from_array(&rect, 9), Err(PdfError::NotFound(_))));

        set_int_in_array(&mut rect, 0, 42).unwrap();
        assert_eq!(rect[0], Object::Integer(42));
        set_real_in_array(&mut rect, 1, 2.25).unwrap();
        assert_eq!(rect[1], Object::Real(2.25));
        set_real_in_array(&mut rect, 0, 7.9).unwrap();
        assert_eq!(rect[0], Object::Integer(7));
        assert!(set_int_in_array(&mut rect, 2, 1).is_err());
    }
}
