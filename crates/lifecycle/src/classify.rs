//! Provider error classification
//!
//! Each provider gets a table of error code patterns. The table is the only
//! provider-specific knowledge the harness holds; resource kinds of the same
//! provider share one classifier.

use crate::error::{Error, ErrorClass, ProviderError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Error code patterns for one provider
///
/// A pattern is an exact code or a glob where `*` matches any run of
/// characters (e.g. `*.NotFound`). Codes matching no pattern are fatal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierTable {
    #[serde(default)]
    pub not_found: Vec<String>,
    #[serde(default)]
    pub transient: Vec<String>,
}

impl ClassifierTable {
    /// Built-in table for AWS-style error codes
    pub fn aws() -> Self {
        Self {
            not_found: vec![
                "InvalidLaunchConfiguration.NotFound".to_string(),
                "*.NotFound".to_string(),
            ],
            transient: vec![
                "Throttling".to_string(),
                "RequestLimitExceeded".to_string(),
                "ServiceUnavailable".to_string(),
                "InternalFailure".to_string(),
                "*.Unavailable".to_string(),
            ],
        }
    }

    /// Built-in table for a provider name, if one exists
    pub fn builtin(provider: &str) -> Option<Self> {
        match provider {
            "aws" => Some(Self::aws()),
            _ => None,
        }
    }
}

/// Compiled classifier for one provider
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    not_found: Vec<Regex>,
    transient: Vec<Regex>,
}

impl ErrorClassifier {
    /// Compile a table
    pub fn from_table(table: &ClassifierTable) -> Result<Self> {
        Ok(Self {
            not_found: compile_all(&table.not_found)?,
            transient: compile_all(&table.transient)?,
        })
    }

    /// Classify a provider error by its code
    ///
    /// Not-found patterns take precedence over transient ones.
    pub fn classify(&self, error: &ProviderError) -> ErrorClass {
        self.classify_code(&error.code)
    }

    pub fn classify_code(&self, code: &str) -> ErrorClass {
        if self.not_found.iter().any(|re| re.is_match(code)) {
            ErrorClass::NotFound
        } else if self.transient.iter().any(|re| re.is_match(code)) {
            ErrorClass::Transient
        } else {
            ErrorClass::Fatal
        }
    }
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns.iter().map(|p| compile_pattern(p)).collect()
}

fn compile_pattern(pattern: &str) -> Result<Regex> {
    if pattern.trim().is_empty() {
        return Err(Error::EmptyPattern);
    }

    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");

    Regex::new(&format!("^{body}$")).map_err(|source| Error::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Classifiers keyed by provider name
#[derive(Debug, Clone, Default)]
pub struct Classifiers {
    by_provider: HashMap<String, ErrorClassifier>,
}

impl Classifiers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and register a table for a provider, replacing any previous one
    pub fn insert(&mut self, provider: impl Into<String>, table: &ClassifierTable) -> Result<()> {
        let classifier = ErrorClassifier::from_table(table)?;
        self.by_provider.insert(provider.into(), classifier);
        Ok(())
    }

    /// Builder-style variant of [`Classifiers::insert`]
    pub fn with(mut self, provider: impl Into<String>, table: &ClassifierTable) -> Result<Self> {
        self.insert(provider, table)?;
        Ok(self)
    }

    pub fn get(&self, provider: &str) -> Option<&ErrorClassifier> {
        self.by_provider.get(provider)
    }

    pub fn contains(&self, provider: &str) -> bool {
        self.by_provider.contains_key(provider)
    }

    /// Classify an error raised by a kind of the given provider
    ///
    /// Errors from providers without a table are fatal.
    pub fn classify(&self, provider: &str, error: &ProviderError) -> ErrorClass {
        match self.by_provider.get(provider) {
            Some(classifier) => classifier.classify(error),
            None => {
                log::warn!(
                    "no error classifier for provider {provider}, treating {} as fatal",
                    error.code
                );
                ErrorClass::Fatal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aws() -> ErrorClassifier {
        ErrorClassifier::from_table(&ClassifierTable::aws()).unwrap()
    }

    #[test]
    fn test_exact_not_found_code() {
        let err = ProviderError::new("InvalidLaunchConfiguration.NotFound", "gone");
        assert_eq!(aws().classify(&err), ErrorClass::NotFound);
    }

    #[test]
    fn test_glob_matches_code_family() {
        assert_eq!(
            aws().classify_code("InvalidAutoScalingGroup.NotFound"),
            ErrorClass::NotFound
        );
        assert_eq!(
            aws().classify_code("AutoScaling.Unavailable"),
            ErrorClass::Transient
        );
    }

    #[test]
    fn test_dot_is_literal() {
        // "." in a code must not behave like a regex wildcard
        assert_eq!(
            aws().classify_code("InvalidLaunchConfigurationXNotFound"),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn test_throttling_is_transient() {
        assert_eq!(aws().classify_code("Throttling"), ErrorClass::Transient);
        assert_eq!(
            aws().classify_code("RequestLimitExceeded"),
            ErrorClass::Transient
        );
    }

    #[test]
    fn test_unknown_code_is_fatal() {
        assert_eq!(aws().classify_code("AccessDenied"), ErrorClass::Fatal);
        assert_eq!(
            aws().classify_code("aws_launch_configuration.Unknown"),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn test_not_found_wins_over_transient() {
        let table = ClassifierTable {
            not_found: vec!["Gone".to_string()],
            transient: vec!["*".to_string()],
        };
        let classifier = ErrorClassifier::from_table(&table).unwrap();
        assert_eq!(classifier.classify_code("Gone"), ErrorClass::NotFound);
        assert_eq!(classifier.classify_code("Busy"), ErrorClass::Transient);
    }

    #[test]
    fn test_empty_pattern_rejected() {
        let table = ClassifierTable {
            not_found: vec!["  ".to_string()],
            transient: vec![],
        };
        assert!(matches!(
            ErrorClassifier::from_table(&table),
            Err(Error::EmptyPattern)
        ));
    }

    #[test]
    fn test_classifiers_keyed_by_provider() {
        let classifiers = Classifiers::new()
            .with("aws", &ClassifierTable::aws())
            .unwrap();
        let err = ProviderError::new("InvalidLaunchConfiguration.NotFound", "gone");

        assert_eq!(classifiers.classify("aws", &err), ErrorClass::NotFound);
        assert_eq!(classifiers.classify("gcp", &err), ErrorClass::Fatal);
    }

    #[test]
    fn test_builtin_lookup() {
        assert!(ClassifierTable::builtin("aws").is_some());
        assert!(ClassifierTable::builtin("nope").is_none());
    }
}
