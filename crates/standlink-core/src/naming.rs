//! Structural peer names.
//!
//! Stands announce themselves with machine names like `stand12`; the trailing
//! digit run is the stand number used to route commands. Extraction sits
//! behind a small trait so the dispatch layer can take a test double.

use crate::errors::NamingError;

// MARK: - StandInfo

/// Normalized peer identity: lowercased name plus its derived stand number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StandInfo {
    pub name: String,
    pub stand_number: u32,
}

impl StandInfo {
    pub fn new(name: &str, stand_number: u32) -> Self {
        Self { name: name.to_lowercase(), stand_number }
    }
}

// MARK: - IdentityExtractor

pub trait IdentityExtractor: Send + Sync {
    /// Derive a [`StandInfo`] from a raw peer name.
    fn extract(&self, raw: &str) -> Result<StandInfo, NamingError>;
}

/// Default extractor: the stand number is the trailing digit run of the name.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrailingDigitsExtractor;

impl IdentityExtractor for TrailingDigitsExtractor {
    fn extract(&self, raw: &str) -> Result<StandInfo, NamingError> {
        if raw.is_empty() {
            return Err(NamingError::Empty);
        }

        let suffix: String = raw
            .chars()
            .rev()
            .take_while(|c| c.is_ascii_digit())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();

        if suffix.is_empty() {
            return Err(NamingError::MissingStandNumber { name: raw.to_owned() });
        }

        let number: u32 = suffix
            .parse()
            .map_err(|_| NamingError::StandNumberOutOfRange { name: raw.to_owned() })?;

        Ok(StandInfo::new(raw, number))
    }
}

// MARK: - StandNameValidator

/// Checks that a discovered peer name is `<prefix><stand number>` before the
/// tablet bothers connecting to it.
#[derive(Debug, Clone)]
pub struct StandNameValidator {
    expected_prefix: String,
}

impl StandNameValidator {
    pub fn new(expected_prefix: &str) -> Self {
        Self { expected_prefix: expected_prefix.to_owned() }
    }

    pub fn is_valid(&self, peer_name: &str) -> bool {
        if peer_name.len() <= self.expected_prefix.len() {
            return false;
        }
        let (prefix, suffix) = peer_name.split_at(self.expected_prefix.len());
        prefix.eq_ignore_ascii_case(&self.expected_prefix) && suffix.parse::<u32>().is_ok()
    }
}
