//! Input validation for values that reach the database.

use std::fmt;

use crate::models::{MemoryType, MessageRole, MessageStatus};

/// Validation error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Value too long.
    TooLong { field: String, max: usize, actual: usize },
    /// Too many items in a list.
    TooMany { field: String, max: usize, actual: usize },
    /// Empty value where one is required.
    Empty(String),
    /// Not a UUID.
    InvalidUuid(String),
    /// Value outside the allowed set.
    InvalidEnum { field: String, value: String },
    /// Upload MIME type not accepted.
    UnsupportedFileType(String),
    /// Upload over the size limit.
    FileTooLarge { max: usize, actual: usize },
}

impl ValidationError {
    /// Name of the offending field.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::TooLong { field, .. }
            | ValidationError::TooMany { field, .. }
            | ValidationError::Empty(field)
            | ValidationError::InvalidUuid(field)
            | ValidationError::InvalidEnum { field, .. } => field,
            ValidationError::UnsupportedFileType(_) | ValidationError::FileTooLarge { .. } => {
                "file"
            }
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::TooLong { field, max, actual } => {
                write!(f, "{} is too long ({} chars, max {})", field, actual, max)
            }
            ValidationError::TooMany { field, max, actual } => {
                write!(f, "{} has too many items ({}, max {})", field, actual, max)
            }
            ValidationError::Empty(field) => write!(f, "{} cannot be empty", field),
            ValidationError::InvalidUuid(field) => write!(f, "{} must be a UUID", field),
            ValidationError::InvalidEnum { field, value } => {
                write!(f, "{} has invalid value '{}'", field, value)
            }
            ValidationError::UnsupportedFileType(mime) => {
                write!(f, "Unsupported file type: {}", mime)
            }
            ValidationError::FileTooLarge { max, actual } => {
                write!(f, "File is too large ({} bytes, max {})", actual, max)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

pub const MAX_TITLE_LENGTH: usize = 200;
pub const MAX_MESSAGE_LENGTH: usize = 100_000;
pub const MAX_DISPLAY_NAME_LENGTH: usize = 100;
pub const MAX_OCCUPATION_LENGTH: usize = 100;
pub const MAX_TRAITS: usize = 10;
pub const MAX_TRAIT_LENGTH: usize = 50;
pub const MAX_ADDITIONAL_CONTEXT_LENGTH: usize = 3_000;
pub const MAX_MEMORY_KEY_LENGTH: usize = 100;
pub const MAX_MEMORY_VALUE_LENGTH: usize = 1_000;

/// Maximum accepted upload size (10 MiB).
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// MIME types accepted for uploads.
pub const ALLOWED_UPLOAD_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/webp",
    "application/pdf",
    "text/plain",
    "text/markdown",
    "text/csv",
    "application/json",
];

/// Check a required string against a maximum character count.
pub fn validate_required(field: &str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty(field.to_string()));
    }
    validate_max_len(field, value, max)
}

/// Check an optional string against a maximum character count.
pub fn validate_max_len(field: &str, value: &str, max: usize) -> Result<(), ValidationError> {
    let actual = value.chars().count();
    if actual > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
            actual,
        });
    }
    Ok(())
}

/// Check that a value looks like a hyphenated UUID (8-4-4-4-12 hex).
pub fn validate_uuid(field: &str, value: &str) -> Result<(), ValidationError> {
    let groups: Vec<&str> = value.split('-').collect();
    let lengths = [8, 4, 4, 4, 12];

    let well_formed = groups.len() == lengths.len()
        && groups
            .iter()
            .zip(lengths.iter())
            .all(|(group, len)| group.len() == *len && group.chars().all(|c| c.is_ascii_hexdigit()));

    if well_formed {
        Ok(())
    } else {
        Err(ValidationError::InvalidUuid(field.to_string()))
    }
}

/// Validate a conversation title.
pub fn validate_title(title: &str) -> Result<(), ValidationError> {
    validate_required("title", title, MAX_TITLE_LENGTH)
}

/// Validate message content.
pub fn validate_message_content(content: &str) -> Result<(), ValidationError> {
    validate_max_len("content", content, MAX_MESSAGE_LENGTH)
}

/// Parse a message role.
pub fn parse_role(value: &str) -> Result<MessageRole, ValidationError> {
    MessageRole::parse(value).ok_or_else(|| ValidationError::InvalidEnum {
        field: "role".to_string(),
        value: value.to_string(),
    })
}

/// Parse a message status.
pub fn parse_status(value: &str) -> Result<MessageStatus, ValidationError> {
    MessageStatus::parse(value).ok_or_else(|| ValidationError::InvalidEnum {
        field: "status".to_string(),
        value: value.to_string(),
    })
}

/// Parse a memory type.
pub fn parse_memory_type(value: &str) -> Result<MemoryType, ValidationError> {
    MemoryType::parse(value).ok_or_else(|| ValidationError::InvalidEnum {
        field: "memory_type".to_string(),
        value: value.to_string(),
    })
}

/// Validate the preference fields.
pub fn validate_preferences(
    display_name: Option<&str>,
    occupation: Option<&str>,
    traits: &[String],
    additional_context: Option<&str>,
) -> Result<(), ValidationError> {
    if let Some(name) = display_name {
        validate_max_len("display_name", name, MAX_DISPLAY_NAME_LENGTH)?;
    }
    if let Some(occupation) = occupation {
        validate_max_len("occupation", occupation, MAX_OCCUPATION_LENGTH)?;
    }
    if traits.len() > MAX_TRAITS {
        return Err(ValidationError::TooMany {
            field: "traits".to_string(),
            max: MAX_TRAITS,
            actual: traits.len(),
        });
    }
    for value in traits {
        validate_required("traits", value, MAX_TRAIT_LENGTH)?;
    }
    if let Some(context) = additional_context {
        validate_max_len("additional_context", context, MAX_ADDITIONAL_CONTEXT_LENGTH)?;
    }
    Ok(())
}

/// Validate a memory key/value pair.
pub fn validate_memory(key: &str, value: &str) -> Result<(), ValidationError> {
    validate_required("key", key, MAX_MEMORY_KEY_LENGTH)?;
    validate_required("value", value, MAX_MEMORY_VALUE_LENGTH)
}

/// Validate an upload's MIME type and size.
pub fn validate_upload(file_type: &str, size: usize) -> Result<(), ValidationError> {
    if !ALLOWED_UPLOAD_TYPES.contains(&file_type) {
        return Err(ValidationError::UnsupportedFileType(file_type.to_string()));
    }
    if size == 0 {
        return Err(ValidationError::Empty("file".to_string()));
    }
    if size > MAX_UPLOAD_BYTES {
        return Err(ValidationError::FileTooLarge {
            max: MAX_UPLOAD_BYTES,
            actual: size,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("id", "c27fb365-0c84-4cf2-8555-814bb065e448").is_ok());
        assert!(validate_uuid("id", "C27FB365-0C84-4CF2-8555-814BB065E448").is_ok());

        assert!(matches!(
            validate_uuid("id", "not-a-uuid"),
            Err(ValidationError::InvalidUuid(_))
        ));
        assert!(matches!(
            validate_uuid("id", "c27fb3650c844cf28555814bb065e448"),
            Err(ValidationError::InvalidUuid(_))
        ));
        assert!(matches!(
            validate_uuid("id", "g27fb365-0c84-4cf2-8555-814bb065e448"),
            Err(ValidationError::InvalidUuid(_))
        ));
    }

    #[test]
    fn test_validate_title() {
        assert!(validate_title("Trip planning").is_ok());
        assert!(matches!(validate_title("   "), Err(ValidationError::Empty(_))));
        assert!(matches!(
            validate_title(&"a".repeat(201)),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!(parse_role("assistant").unwrap(), MessageRole::Assistant);
        assert!(matches!(
            parse_role("narrator"),
            Err(ValidationError::InvalidEnum { .. })
        ));
        assert_eq!(parse_status("failed").unwrap(), MessageStatus::Failed);
        assert_eq!(parse_memory_type("Instruction").unwrap(), MemoryType::Instruction);
        assert!(parse_memory_type("secret").is_err());
    }

    #[test]
    fn test_validate_preferences() {
        let traits = vec!["curious".to_string(), "direct".to_string()];
        assert!(validate_preferences(Some("Sam"), Some("Engineer"), &traits, None).is_ok());

        let too_many: Vec<String> = (0..11).map(|i| format!("trait{}", i)).collect();
        assert!(matches!(
            validate_preferences(None, None, &too_many, None),
            Err(ValidationError::TooMany { .. })
        ));

        assert!(matches!(
            validate_preferences(None, None, &[String::new()], None),
            Err(ValidationError::Empty(_))
        ));

        let long_context = "x".repeat(MAX_ADDITIONAL_CONTEXT_LENGTH + 1);
        assert!(matches!(
            validate_preferences(None, None, &[], Some(&long_context)),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn test_validate_upload() {
        assert!(validate_upload("image/png", 1024).is_ok());
        assert!(matches!(
            validate_upload("application/x-msdownload", 1024),
            Err(ValidationError::UnsupportedFileType(_))
        ));
        assert!(matches!(
            validate_upload("image/png", MAX_UPLOAD_BYTES + 1),
            Err(ValidationError::FileTooLarge { .. })
        ));
        assert!(matches!(validate_upload("text/plain", 0), Err(ValidationError::Empty(_))));
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::TooLong {
            field: "title".to_string(),
            max: 200,
            actual: 300,
        };
        assert_eq!(err.to_string(), "title is too long (300 chars, max 200)");
        assert_eq!(err.field(), "title");

        let err = ValidationError::InvalidEnum {
            field: "role".to_string(),
            value: "narrator".to_string(),
        };
        assert_eq!(err.to_string(), "role has invalid value 'narrator'");
    }
}
