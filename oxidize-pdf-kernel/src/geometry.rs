//! Basic geometric types for page boxes and annotation rectangles

use crate::error::{PdfError, Result};
use crate::objects::{helpers, Object};

/// A point in 2D space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A rectangle defined by two corners, as stored in `/MediaBox` or `/Rect`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rectangle {
    pub lower_left: Point,
    pub upper_right: Point,
}

impl Rectangle {
    pub fn new(lower_left: Point, upper_right: Point) -> Self {
        Self {
            lower_left,
            upper_right,
        }
    }

    /// Create a rectangle from position and size
    pub fn from_position_and_size(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            lower_left: Point::new(x, y),
            upper_right: Point::new(x + width, y + height),
        }
    }

    pub fn width(&self) -> f64 {
        self.upper_right.x - self.lower_left.x
    }

    pub fn height(&self) -> f64 {
        self.upper_right.y - self.lower_left.y
    }

    /// Reads a four element number array. Corners are normalized so that
    /// `lower_left` holds the minimum coordinates.
    pub fn from_object(value: &Object) -> Result<Self> {
        let items = value
            .as_array()
            .ok_or_else(|| PdfError::type_mismatch("array", value.type_name()))?;
        if items.len() != 4 {
            return Err(PdfError::InvalidOperation(format!(
                "rectangle needs 4 numbers, found {}",
                items.len()
            )));
        }

        let x1 = helpers::real_from_array(items, 0)?;
        let y1 = helpers::real_from_array(items, 1)?;
        let x2 = helpers::real_from_array(items, 2)?;
        let y2 = helpers::real_from_array(items, 3)?;

        Ok(Self::new(
            Point::new(x1.min(x2), y1.min(y2)),
            Point::new(x1.max(x2), y1.max(y2)),
        ))
    }

    pub fn to_object(&self) -> Object {
        Object::Array(vec![
            Object::Real(self.lower_left.x),
            Object::Real(self.lower_left.y),
            Object::Real(self.upper_right.x),
            Object::Real(self.upper_right.y),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rectangle_size() {
        let rect = Rectangle::from_position_and_size(10.0, 20.0, 100.0, 50.0);
        assert_eq!(rect.width(), 100.0);
        assert_eq!(rect.height(), 50.0);
        assert_eq!(rect.upper_right, Point::new(110.0, 70.0));
    }

    #[test]
    fn test_from_object_mixed_numbers() {
        let value = Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(612.0),
            Object::Integer(792),
        ]);
        let rect = Rectangle::from_object(&value).unwrap();
        assert_eq!(rect.width(), 612.0);
        assert_eq!(rect.height(), 792.0);
    }

    #[test]
    fn test_from_object_normalizes_corners() {
        let value = Object::Array(vec![50.into(), 80.into(), 10.into(), 20.into()]);
        let rect = Rectangle::from_object(&value).unwrap();
        assert_eq!(rect.lower_left, Point::new(10.0, 20.0));
        assert_eq!(rect.upper_right, Point::new(50.0, 80.0));
    }

    #[test]
    fn test_from_object_errors() {
        assert!(matches!(
            Rectangle::from_object(&Object::Integer(1)),
            Err(PdfError::TypeMismatch { .. })
        ));
        assert!(Rectangle::from_object(&Object::Array(vec![1.into(), 2.into()])).is_err());
        let bad = Object::Array(vec![1.into(), 2.into(), Object::Name("x".into()), 4.into()]);
        assert!(Rectangle::from_object(&bad).is_err());
    }

    #[test]
    fn test_to_object_round_trip() {
        let rect = Rectangle::from_position_and_size(0.0, 0.0, 595.0, 842.0);
        assert_eq!(Rectangle::from_object(&rect.to_object()).unwrap(), rect);
    }
}
