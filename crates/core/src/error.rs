//! Error types for metadata validation.

/// Errors raised while validating a metadata delta.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetaError {
    /// A delta contained an empty key.
    #[error("metadata keys must not be empty")]
    EmptyKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_display() {
        assert_eq!(
            MetaError::EmptyKey.to_string(),
            "metadata keys must not be empty"
        );
    }
}
