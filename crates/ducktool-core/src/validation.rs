//! VBA identifier validation.
//!
//! Names are compared case-insensitively throughout the language, so keyword
//! checks ignore case as well.

use thiserror::Error;

/// Error for validation failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Invalid VBA identifier name.
    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest identifier the language accepts.
pub const MAX_IDENTIFIER_LEN: usize = 255;

/// Reserved words that cannot be used as identifiers.
pub const VBA_KEYWORDS: &[&str] = &[
    "AddressOf", "And", "Any", "As", "Boolean", "ByRef", "Byte", "ByVal", "Call", "Case", "CBool",
    "CByte", "CCur", "CDate", "CDbl", "CDec", "CInt", "CLng", "CLngLng", "CLngPtr", "Const",
    "CSng", "CStr", "Currency", "CVar", "Date", "Declare", "Dim", "Do",
    "Double", "Each", "Else", "ElseIf", "Empty", "End", "Enum", "Eqv", "Erase", "Event", "Exit",
    "False", "For", "Friend", "Function", "Get", "Global", "GoSub", "GoTo", "If", "Imp",
    "Implements", "In", "Integer", "Is", "Let", "Like", "Long", "LongLong", "LongPtr", "Loop",
    "LSet", "Me", "Mod", "New", "Next", "Not", "Nothing", "Null", "On", "Option", "Optional",
    "Or", "ParamArray", "Preserve", "Private", "Property", "PtrSafe", "Public", "RaiseEvent",
    "ReDim", "Rem", "Resume", "Return", "RSet", "Select", "Set", "Single", "Static", "Stop",
    "String", "Sub", "Then", "To", "True", "Type", "TypeOf", "Until", "Variant", "Wend", "While",
    "With", "WithEvents", "Xor",
];

/// Check if a name is a reserved word (case-insensitive).
pub fn is_vba_keyword(name: &str) -> bool {
    VBA_KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(name))
}

/// Validate that a string is a valid VBA identifier.
///
/// Checks:
/// - Non-empty and at most [`MAX_IDENTIFIER_LEN`] bytes
/// - Starts with an ASCII letter
/// - Contains only ASCII alphanumerics and underscore
/// - Not a reserved word
pub fn validate_vba_identifier(name: &str) -> ValidationResult<()> {
    let invalid = |reason: String| ValidationError::InvalidName {
        name: name.to_string(),
        reason,
    };

    let Some(first) = name.chars().next() else {
        return Err(invalid("name cannot be empty".to_string()));
    };
    if !first.is_ascii_alphabetic() {
        return Err(invalid("must start with a letter".to_string()));
    }
    if let Some(ch) = name.chars().find(|c| !c.is_ascii_alphanumeric() && *c != '_') {
        return Err(invalid(format!("invalid character: '{}'", ch)));
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(invalid(format!(
            "longer than {} characters",
            MAX_IDENTIFIER_LEN
        )));
    }
    if is_vba_keyword(name) {
        return Err(invalid("cannot use a reserved word as identifier".to_string()));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod valid_identifiers {
        use super::*;

        #[test]
        fn simple_names() {
            assert!(validate_vba_identifier("foo").is_ok());
            assert!(validate_vba_identifier("Value").is_ok());
            assert!(validate_vba_identifier("x").is_ok());
        }

        #[test]
        fn underscores_and_digits() {
            assert!(validate_vba_identifier("IClass1_Foo").is_ok());
            assert!(validate_vba_identifier("field_2").is_ok());
        }

        #[test]
        fn keyword_prefix_is_fine() {
            assert!(validate_vba_identifier("Ending").is_ok());
            assert!(validate_vba_identifier("SetValue").is_ok());
        }
    }

    mod invalid_identifiers {
        use super::*;

        #[test]
        fn empty_name() {
            let err = validate_vba_identifier("").unwrap_err();
            assert!(matches!(err, ValidationError::InvalidName { .. }));
        }

        #[test]
        fn leading_underscore_or_digit() {
            assert!(validate_vba_identifier("_private").is_err());
            assert!(validate_vba_identifier("1st").is_err());
        }

        #[test]
        fn invalid_characters() {
            assert!(validate_vba_identifier("foo-bar").is_err());
            assert!(validate_vba_identifier("foo bar").is_err());
            assert!(validate_vba_identifier("naïve").is_err());
        }

        #[test]
        fn keywords_any_case() {
            assert!(validate_vba_identifier("Sub").is_err());
            assert!(validate_vba_identifier("sub").is_err());
            assert!(validate_vba_identifier("WITHEVENTS").is_err());
        }

        #[test]
        fn too_long() {
            let name = "a".repeat(MAX_IDENTIFIER_LEN + 1);
            let err = validate_vba_identifier(&name).unwrap_err();
            assert_eq!(
                err.to_string(),
                format!("invalid name '{}': longer than 255 characters", name)
            );
        }
    }
}
