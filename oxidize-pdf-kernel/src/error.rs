use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Clone failure: {0}")]
    CloneFailure(String),

    #[error("Indirect objects exhausted: no free object number left")]
    ReferenceExhausted,

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid object reference: {0} {1} R")]
    InvalidObjectReference(u32, u16),

    #[error("Parse error at position {position}: {message}")]
    ParseError { position: usize, message: String },

    #[error("Compression error: {0}")]
    CompressionError(String),
}

impl PdfError {
    pub(crate) fn type_mismatch(expected: &'static str, found: &'static str) -> Self {
        PdfError::TypeMismatch { expected, found }
    }
}

pub type Result<T> = std::result::Result<T, PdfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_error_display() {
        let error = PdfError::NotFound("trailer entry Custom".to_string());
        assert_eq!(error.to_string(), "Not found: trailer entry Custom");
    }

    #[test]
    fn test_type_mismatch_display() {
        let error = PdfError::type_mismatch("array", "dictionary");
        assert_eq!(
            error.to_string(),
            "Type mismatch: expected array, found dictionary"
        );
    }

    #[test]
    fn test_error_chain_display() {
        let errors = [
            (
                "Invalid object reference: 0 0 R",
                PdfError::InvalidObjectReference(0, 0),
            ),
            (
                "Clone failure: nesting depth 65 exceeds limit 64",
                PdfError::CloneFailure("nesting depth 65 exceeds limit 64".to_string()),
            ),
            (
                "Indirect objects exhausted: no free object number left",
                PdfError::ReferenceExhausted,
            ),
            (
                "Invalid operation: page is invalidated",
                PdfError::InvalidOperation("page is invalidated".to_string()),
            ),
            (
                "Parse error at position 12: Unterminated hex string",
                PdfError::ParseError {
                    position: 12,
                    message: "Unterminated hex string".to_string(),
                },
            ),
        ];

        for (expected, error) in errors {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_not_found_and_clone_failure_are_distinct() {
        let absent = PdfError::NotFound("Custom".to_string());
        let failed = PdfError::CloneFailure("Custom".to_string());

        assert!(matches!(absent, PdfError::NotFound(_)));
        assert!(matches!(failed, PdfError::CloneFailure(_)));
        assert_ne!(absent.to_string(), failed.to_string());
    }

    #[test]
    fn test_error_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PdfError>();
    }
}
