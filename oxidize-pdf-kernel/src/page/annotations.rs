//! Annotation wrappers handed out by a page

use crate::error::{PdfError, Result};
use crate::geometry::Rectangle;
use crate::objects::{helpers, Dictionary, Object, ObjectId};
use bitflags::bitflags;
use std::cell::Cell;

bitflags! {
    /// Annotation flags (`/F`) according to ISO 32000-1 Section 12.5.3
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AnnotationFlags: u32 {
        const INVISIBLE = 1 << 0;
        const HIDDEN = 1 << 1;
        const PRINT = 1 << 2;
        const NO_ZOOM = 1 << 3;
        const NO_ROTATE = 1 << 4;
        const NO_VIEW = 1 << 5;
        const READ_ONLY = 1 << 6;
        const LOCKED = 1 << 7;
        const TOGGLE_NO_VIEW = 1 << 8;
        const LOCKED_CONTENTS = 1 << 9;
    }
}

/// Annotation subtypes according to ISO 32000-1 Table 169
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationType {
    Text,
    Link,
    FreeText,
    Line,
    Square,
    Circle,
    Polygon,
    PolyLine,
    Highlight,
    Underline,
    Squiggly,
    StrikeOut,
    Stamp,
    Caret,
    Ink,
    Popup,
    FileAttachment,
    Widget,
}

impl AnnotationType {
    pub fn pdf_name(&self) -> &'static str {
        match self {
            AnnotationType::Text => "Text",
            AnnotationType::Link => "Link",
            AnnotationType::FreeText => "FreeText",
            AnnotationType::Line => "Line",
            AnnotationType::Square => "Square",
            AnnotationType::Circle => "Circle",
            AnnotationType::Polygon => "Polygon",
            AnnotationType::PolyLine => "PolyLine",
            AnnotationType::Highlight => "Highlight",
            AnnotationType::Underline => "Underline",
            AnnotationType::Squiggly => "Squiggly",
            AnnotationType::StrikeOut => "StrikeOut",
            AnnotationType::Stamp => "Stamp",
            AnnotationType::Caret => "Caret",
            AnnotationType::Ink => "Ink",
            AnnotationType::Popup => "Popup",
            AnnotationType::FileAttachment => "FileAttachment",
            AnnotationType::Widget => "Widget",
        }
    }

    pub fn from_pdf_name(name: &str) -> Option<Self> {
        const ALL: [AnnotationType; 18] = [
            AnnotationType::Text,
            AnnotationType::Link,
            AnnotationType::FreeText,
            AnnotationType::Line,
            AnnotationType::Square,
            AnnotationType::Circle,
            AnnotationType::Polygon,
            AnnotationType::PolyLine,
            AnnotationType::Highlight,
            AnnotationType::Underline,
            AnnotationType::Squiggly,
            AnnotationType::StrikeOut,
            AnnotationType::Stamp,
            AnnotationType::Caret,
            AnnotationType::Ink,
            AnnotationType::Popup,
            AnnotationType::FileAttachment,
            AnnotationType::Widget,
        ];
        ALL.into_iter().find(|kind| kind.pdf_name() == name)
    }

    /// Minimal annotation dictionary of this subtype covering `rect`.
    pub fn dictionary(&self, rect: Rectangle) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name("Annot".into()));
        dict.set("Subtype", Object::Name(self.pdf_name().into()));
        dict.set("Rect", rect.to_object());
        dict
    }
}

/// One entry of a page's `/Annots` array.
///
/// Holds the dictionary as it was when the page cache was built. The wrapper
/// is invalidated once its entry is removed or replaced, or when its page is
/// invalidated.
#[derive(Debug)]
pub struct Annotation {
    reference: Option<ObjectId>,
    dictionary: Dictionary,
    valid: Cell<bool>,
}

impl Annotation {
    pub(crate) fn new(reference: Option<ObjectId>, dictionary: Dictionary) -> Self {
        Self {
            reference,
            dictionary,
            valid: Cell::new(true),
        }
    }

    /// Indirect reference of the annotation, `None` for a direct dictionary.
    pub fn reference(&self) -> Option<ObjectId> {
        self.reference
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn subtype(&self) -> Option<&str> {
        self.dictionary.get("Subtype").and_then(Object::as_name)
    }

    pub fn annotation_type(&self) -> Option<AnnotationType> {
        self.subtype().and_then(AnnotationType::from_pdf_name)
    }

    pub fn rect(&self) -> Result<Rectangle> {
        let rect = self
            .dictionary
            .get("Rect")
            .ok_or_else(|| PdfError::NotFound("annotation /Rect".to_string()))?;
        Rectangle::from_object(rect)
    }

    pub fn flags(&self) -> AnnotationFlags {
        helpers::int_from_dict(&self.dictionary, "F")
            .ok()
            .and_then(|bits| u32::try_from(bits).ok())
            .map(AnnotationFlags::from_bits_truncate)
            .unwrap_or_else(AnnotationFlags::empty)
    }

    pub fn is_valid(&self) -> bool {
        self.valid.get()
    }

    pub(crate) fn invalidate(&self) {
        self.valid.set(false);
    }

    pub(crate) fn matches(&self, reference: Option<ObjectId>, dictionary: &Dictionary) -> bool {
        self.reference == reference && &self.dictionary == dictionary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    fn link() -> Dictionary {
        let mut dict = AnnotationType::Link
            .dictionary(Rectangle::from_position_and_size(10.0, 10.0, 50.0, 20.0));
        dict.set("F", 4 | 64);
        dict
    }

    #[test]
    fn test_accessors() {
        let annotation = Annotation::new(Some(ObjectId::new(9, 0)), link());
        assert_eq!(annotation.reference(), Some(ObjectId::new(9, 0)));
        assert_eq!(annotation.subtype(), Some("Link"));
        assert_eq!(annotation.annotation_type(), Some(AnnotationType::Link));
        assert_eq!(annotation.rect().unwrap().upper_right, Point::new(60.0, 30.0));
        assert_eq!(
            annotation.flags(),
            AnnotationFlags::PRINT | AnnotationFlags::READ_ONLY
        );
        assert!(annotation.is_valid());
    }

    #[test]
    fn test_missing_fields() {
        let annotation = Annotation::new(None, Dictionary::new());
        assert_eq!(annotation.subtype(), None);
        assert_eq!(annotation.flags(), AnnotationFlags::empty());
        assert!(matches!(annotation.rect(), Err(PdfError::NotFound(_))));
    }

    #[test]
    fn test_invalidate_and_matches() {
        let annotation = Annotation::new(Some(ObjectId::new(9, 0)), link());
        assert!(annotation.matches(Some(ObjectId::new(9, 0)), &link()));
        assert!(!annotation.matches(None, &link()));
        annotation.invalidate();
        assert!(!annotation.is_valid());
    }

    #[test]
    fn test_type_names() {
        assert_eq!(AnnotationType::from_pdf_name("Highlight"), Some(AnnotationType::Highlight));
        assert_eq!(AnnotationType::from_pdf_name("Bogus"), None);
    }
}
