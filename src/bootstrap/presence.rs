use std::path::Path;

use regex::Regex;

use crate::error::PrestartError;

/// A compiled pattern matched against bare file names.
#[derive(Debug, Clone)]
pub struct NamePattern(Regex);

impl NamePattern {
    pub fn new(pattern: &str) -> Result<Self, PrestartError> {
        Regex::new(pattern)
            .map(NamePattern)
            .map_err(|source| PrestartError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.0.is_match(name)
    }
}

/// Whether any immediate entry of `dir` has a name matching `pattern`.
///
/// A missing or unreadable directory is an error rather than `false`.
pub fn has_match(dir: &Path, pattern: &NamePattern) -> Result<bool, PrestartError> {
    let entries = std::fs::read_dir(dir).map_err(|e| PrestartError::fs(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| PrestartError::fs(dir, e))?;
        if pattern.is_match(&entry.file_name().to_string_lossy()) {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn has_matching(dir: &Path, pattern: &str) -> Result<bool, PrestartError> {
    has_match(dir, &NamePattern::new(pattern)?)
}
