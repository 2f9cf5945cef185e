//! Integration tests for page caches following document edits

use oxidize_pdf_kernel::{
    AnnotationType, ChangeContext, Dictionary, Document, MemoryCatalog, Object, ObjectId,
    Observer, PdfError, Rectangle, Result, Stream, Subject,
};
use pretty_assertions::assert_eq;
use std::cell::RefCell;
use std::rc::Rc;

const ANNOTS: u32 = 10;
const PAGE: u32 = 3;

fn id(number: u32) -> ObjectId {
    ObjectId::new(number, 0)
}

fn annotation(subtype: AnnotationType, x: f64) -> Dictionary {
    subtype.dictionary(Rectangle::from_position_and_size(x, 0.0, 10.0, 10.0))
}

/// Document with a catalog at 1, pages root at 2 and one page at 3 whose
/// `/Annots` is the indirect array 10 holding annotations 11..=13.
fn document() -> Document {
    let mut catalog_dict = Dictionary::new();
    catalog_dict.set("Type", Object::Name("Catalog".into()));
    catalog_dict.set("Pages", id(2));

    let mut pages = Dictionary::new();
    pages.set("Type", Object::Name("Pages".into()));
    pages.set("Kids", vec![Object::Reference(id(PAGE))]);
    pages.set("Count", 1);

    let mut page = Dictionary::new();
    page.set("Type", Object::Name("Page".into()));
    page.set("Parent", id(2));
    page.set("Annots", id(ANNOTS));
    page.set("Contents", vec![Object::Reference(id(20)), Object::Reference(id(21))]);

    let mut catalog = MemoryCatalog::empty()
        .with_object(id(1), catalog_dict)
        .with_object(id(2), pages)
        .with_object(id(PAGE), page)
        .with_object(
            id(ANNOTS),
            vec![
                Object::Reference(id(11)),
                Object::Reference(id(12)),
                Object::Reference(id(13)),
            ],
        )
        .with_object(id(11), annotation(AnnotationType::Text, 0.0))
        .with_object(id(12), annotation(AnnotationType::Link, 20.0))
        .with_object(id(13), annotation(AnnotationType::Square, 40.0))
        .with_object(id(14), annotation(AnnotationType::Highlight, 60.0))
        .with_object(id(20), Stream::new(b"BT /F1 12 Tf 72 700".to_vec()))
        .with_object(id(21), Stream::new(b"Td (Hi) Tj ET".to_vec()));
    catalog.set_trailer_entry("Root", id(1));
    Document::new(catalog)
}

#[test]
fn test_replacing_an_element_moves_the_subscription() {
    let doc = document();
    let page = doc.page(id(PAGE)).unwrap();
    let before = page.annotations().unwrap();
    assert_eq!(before.len(), 3);

    doc.array_set(id(ANNOTS), 1, id(14)).unwrap();

    let after = page.annotations().unwrap();
    let references: Vec<_> = after.iter().map(|a| a.reference()).collect();
    assert_eq!(references, vec![Some(id(11)), Some(id(14)), Some(id(13))]);
    assert!(Rc::ptr_eq(&before[0], &after[0]));
    assert!(Rc::ptr_eq(&before[2], &after[2]));
    assert!(!before[1].is_valid());

    assert_eq!(doc.observer_count(Subject::Object(id(12))), 0);
    for current in [11, 14, 13, ANNOTS] {
        assert_eq!(doc.observer_count(Subject::Object(id(current))), 1);
    }
}

#[test]
fn test_replacing_the_container_reference() {
    let doc = document();
    let page = doc.page(id(PAGE)).unwrap();
    page.annotations().unwrap();

    doc.set_property(id(PAGE), "Annots", vec![Object::Reference(id(14))])
        .unwrap();
    let after = page.annotations().unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].subtype(), Some("Highlight"));
    assert_eq!(doc.observer_count(Subject::Object(id(ANNOTS))), 0);
    assert_eq!(doc.observer_count(Subject::Object(id(11))), 0);
}

#[test]
fn test_failed_rebuild_keeps_only_the_page_subscription() {
    let doc = document();
    let page = doc.page(id(PAGE)).unwrap();
    page.annotations().unwrap();
    assert_eq!(doc.observer_count(Subject::Object(id(ANNOTS))), 1);

    doc.set_property(id(PAGE), "Annots", 7).unwrap();
    for stale in [ANNOTS, 11, 12, 13] {
        assert_eq!(doc.observer_count(Subject::Object(id(stale))), 0);
    }
    assert_eq!(doc.observer_count(Subject::Object(id(PAGE))), 2);
    assert!(matches!(
        page.annotations(),
        Err(PdfError::TypeMismatch { .. })
    ));

    // repairing the page dictionary brings the cache back
    doc.set_property(id(PAGE), "Annots", id(ANNOTS)).unwrap();
    assert_eq!(page.annotations().unwrap().len(), 3);
    assert_eq!(doc.observer_count(Subject::Object(id(12))), 1);
}

#[test]
fn test_transform_matrix_without_cm_is_painted_first() {
    let doc = document();
    let page = doc.page(id(PAGE)).unwrap();
    page.set_transform_matrix([1.0, 0.0, 0.0, 1.0, 0.0, -20.0])
        .unwrap();

    let segments = page.content_streams().unwrap();
    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0].operations()[0].operator, "cm");
    assert_eq!(segments[0].operations()[0].operands[5], Object::Integer(-20));
    assert_eq!(segments[1].streams(), &[id(20), id(21)]);
}

#[test]
fn test_split_text_object_is_one_segment() {
    let doc = document();
    let page = doc.page(id(PAGE)).unwrap();

    let segments = page.content_streams().unwrap();
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].streams(), &[id(20), id(21)]);
    let operators: Vec<_> = segments[0]
        .operations()
        .iter()
        .map(|op| op.operator.as_str())
        .collect();
    assert_eq!(operators, vec!["BT", "Tf", "Td", "Tj", "ET"]);

    // without the dangling operands each stream stands alone
    doc.change(id(20), &Stream::new(b"BT /F1 12 Tf".to_vec()).into())
        .unwrap();
    assert!(!segments[0].is_valid());
    assert_eq!(page.content_streams().unwrap().len(), 2);
}

#[test]
fn test_page_ids_walk_the_tree() {
    let doc = document();
    assert_eq!(doc.page_ids().unwrap(), vec![id(PAGE)]);

    let mut second = Dictionary::new();
    second.set("Type", Object::Name("Page".into()));
    let second = doc.add_object(second).unwrap();

    // the nested node lists the root again, which must not loop
    let mut kids = Dictionary::new();
    kids.set("Type", Object::Name("Pages".into()));
    kids.set("Kids", vec![Object::Reference(second), Object::Reference(id(2))]);
    let nested = doc.add_object(kids).unwrap();
    doc.set_property(second, "Parent", nested).unwrap();
    doc.set_property(
        id(2),
        "Kids",
        vec![Object::Reference(id(PAGE)), Object::Reference(nested)],
    )
    .unwrap();

    assert_eq!(doc.page_ids().unwrap(), vec![id(PAGE), second]);
    assert_eq!(doc.pages().unwrap().len(), 2);
}

#[test]
fn test_annotations_round_trip_through_incremental_save() {
    let doc = document();
    let page = doc.page(id(PAGE)).unwrap();
    let added = page
        .add_annotation(&annotation(AnnotationType::Ink, 80.0))
        .unwrap();
    assert_eq!(page.annotations().unwrap().len(), 4);

    doc.save_incremental(4096).unwrap();
    assert!(!page.is_valid());
    assert!(matches!(page.annotations(), Err(PdfError::InvalidOperation(_))));

    let reopened = doc.page(id(PAGE)).unwrap();
    let annotations = reopened.annotations().unwrap();
    assert_eq!(annotations.len(), 4);
    assert_eq!(annotations[3].reference(), Some(added));
    assert_eq!(
        annotations[3].dictionary().get("P"),
        Some(&Object::Reference(id(PAGE)))
    );
}

struct Recorder {
    doc: Document,
    attempts: RefCell<Vec<Result<Option<Object>>>>,
    seen: RefCell<Vec<ChangeContext>>,
}

impl Observer for Recorder {
    fn notify(&self, _new_value: &Object, context: &ChangeContext) {
        self.seen.borrow_mut().push(context.clone());
        let attempt = self.doc.set_property(id(PAGE), "Rotate", 90);
        self.attempts.borrow_mut().push(attempt);
    }

    fn priority(&self) -> i32 {
        10
    }
}

#[test]
fn test_observers_cannot_edit_during_delivery() {
    let doc = document();
    let page = doc.page(id(PAGE)).unwrap();
    page.annotations().unwrap();

    let recorder = Rc::new(Recorder {
        doc: doc.clone(),
        attempts: RefCell::new(Vec::new()),
        seen: RefCell::new(Vec::new()),
    });
    let observer: Rc<dyn Observer> = recorder.clone();
    assert!(doc.register_observer(Subject::Object(id(ANNOTS)), observer.clone()));
    assert!(!doc.register_observer(Subject::Object(id(ANNOTS)), observer.clone()));

    doc.array_remove(id(ANNOTS), 0).unwrap();
    assert_eq!(recorder.seen.borrow().len(), 1);
    assert!(matches!(
        recorder.attempts.borrow()[0],
        Err(PdfError::InvalidOperation(_))
    ));
    // the page cache still followed the edit
    assert_eq!(page.annotations().unwrap().len(), 2);
    assert_eq!(page.rotation().unwrap(), 0);

    assert!(doc.unregister_observer(Subject::Object(id(ANNOTS)), &observer));
}
