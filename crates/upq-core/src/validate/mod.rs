//! Per-file validation: extension allow-list and size bounds.
//!
//! Checks run in a fixed order (extension, max size, min size) and the last
//! failing check is the one reported.

use std::collections::BTreeSet;

use crate::file::UploadFile;

/// Extension reported for names without a `.`.
pub const NO_EXTENSION: &str = "no-ext";

/// Why a file was rejected. The display text is what ends up on the record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid file extension: {extension}")]
    InvalidExtension { extension: String },
    #[error("This file's size ({size}) is larger than the allowed {max} bytes.")]
    TooLarge { size: u64, max: u64 },
    #[error("This file's size ({size}) is smaller than the allowed {min} bytes.")]
    TooSmall { size: u64, min: u64 },
}

/// Allowed extensions, built from a comma-separated list such as `"jpg, png"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionSet(BTreeSet<String>);

impl ExtensionSet {
    /// Split on commas, trim each entry, drop empty ones. Matching is case-sensitive.
    pub fn parse(list: &str) -> Self {
        Self(
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn contains(&self, extension: &str) -> bool {
        self.0.contains(extension)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Constraints applied to every added file.
#[derive(Debug, Clone, Default)]
pub struct ValidationRules {
    /// `None` allows every extension.
    pub extensions: Option<ExtensionSet>,
    /// Zero is treated as unset.
    pub max_file_size: Option<u64>,
    /// Zero is treated as unset.
    pub min_file_size: Option<u64>,
}

/// Substring after the last `.`, or [`NO_EXTENSION`].
pub fn extension_of(name: &str) -> &str {
    match name.rfind('.') {
        Some(pos) => &name[pos + 1..],
        None => NO_EXTENSION,
    }
}

/// Validate one file against `rules`.
pub fn validate(file: &UploadFile, rules: &ValidationRules) -> Result<(), ValidationError> {
    let mut failure = None;

    if let Some(allowed) = &rules.extensions {
        let extension = extension_of(file.name());
        if !allowed.contains(extension) {
            failure = Some(ValidationError::InvalidExtension {
                extension: extension.to_string(),
            });
        }
    }

    let size = file.size();
    if let Some(max) = rules.max_file_size.filter(|&m| m > 0) {
        if size > max {
            failure = Some(ValidationError::TooLarge { size, max });
        }
    }
    if let Some(min) = rules.min_file_size.filter(|&m| m > 0) {
        if size < min {
            failure = Some(ValidationError::TooSmall { size, min });
        }
    }

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
