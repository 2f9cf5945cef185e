//! # oxidize-pdf-kernel
//!
//! Incremental editing kernel for PDF documents: a copy-on-write object store
//! layered over a read-only cross-reference catalog, with change notification
//! and page caches that follow every edit.
//!
//! ## Features
//!
//! - **Copy-on-write store**: every edit lands in an overlay; the base revision is never touched
//! - **Reference allocation**: free object numbers are reused, new ones minted within PDF limits
//! - **Change notification**: observers per indirect object, called synchronously in priority order
//! - **Page caches**: annotation and content stream lists rebuilt after every relevant edit
//! - **Incremental revisions**: pending changes become a new revision chained through `/Prev`
//! - **Content parsing**: content stream operations, inline images included
//!
//! ## Quick Start
//!
//! ```rust
//! use oxidize_pdf_kernel::{Dictionary, Document, MemoryCatalog, Object, ObjectId, Operation, Result};
//!
//! # fn main() -> Result<()> {
//! let mut page = Dictionary::new();
//! page.set("Type", Object::Name("Page".into()));
//! let catalog = MemoryCatalog::empty().with_object(ObjectId::new(1, 0), page);
//!
//! let doc = Document::new(catalog);
//! let page = doc.page(ObjectId::new(1, 0))?;
//! page.add_content_stream_to_back(&[
//!     Operation::new("q", vec![]),
//!     Operation::new("Q", vec![]),
//! ])?;
//! assert_eq!(page.content_streams()?.len(), 1);
//!
//! // Append the changes as a new revision and continue from it
//! doc.save_incremental(1024)?;
//! assert_eq!(doc.store().last_xref_offset(), 1024);
//! assert!(!page.is_valid());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`store`] - Indirect object store, reference allocator and base catalogs
//! - [`observer`] - Observer registry and change contexts
//! - [`document`] - Editing facade that notifies observers
//! - [`page`] - Pages with annotation and content stream caches
//! - [`content`] - Content stream tokenizer, parser and writer
//! - [`objects`] - PDF object model and lookup helpers

pub mod content;
pub mod document;
pub mod error;
pub mod geometry;
pub mod objects;
pub mod observer;
pub mod page;
pub mod store;

pub use content::{ContentParser, Operation, ParsedContent};
pub use document::Document;
pub use error::{PdfError, Result};
pub use geometry::{Point, Rectangle};
pub use objects::{Dictionary, Object, ObjectId, ObjectType, Resolve, Stream};
pub use observer::{ChangeContext, ChangeKind, Observer, ObserverBus, Priority, PropertyId, Subject};
pub use page::annotations::{Annotation, AnnotationFlags, AnnotationType};
pub use page::contents::ContentStream;
pub use page::Page;
pub use store::{
    BaseCatalog, IndirectObjectStore, MemoryCatalog, RefState, ReferenceAllocator, Revision,
    StoreOptions,
};

/// Current version of oxidize-pdf-kernel
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
