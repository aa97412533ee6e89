use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlacklineError {
    /// The input contains a construct the comparison model cannot represent.
    /// Raised before atomization; the document pair cannot be compared.
    #[error("Unsupported content: {construct}")]
    UnsupportedContent { construct: String },

    /// An algorithm invariant was violated. Always a bug signal; the
    /// comparison aborts rather than produce a silently wrong result.
    #[error("Internal invariant violated: {0}")]
    InternalInvariant(String),

    /// A cross-reference could not be resolved and no local recovery was
    /// possible.
    #[error("Malformed reference: {reference}")]
    MalformedReference { reference: String },

    /// The caller raised the cooperative cancellation flag.
    #[error("Comparison cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, BlacklineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formats_correctly() {
        let err = BlacklineError::UnsupportedContent {
            construct: "moved-from".to_string(),
        };
        assert_eq!(err.to_string(), "Unsupported content: moved-from");
    }

    #[test]
    fn invariant_error_formats_correctly() {
        let err = BlacklineError::InternalInvariant("expected ancestor not found".to_string());
        assert_eq!(
            err.to_string(),
            "Internal invariant violated: expected ancestor not found"
        );
    }
}
