//! Pattern matching for object filters
//!
//! Provides regex-based include/exclude filtering of auditable objects.

use crate::config::ObjectFilterConfig;
use crate::error::ConfigError;
use regex::Regex;
use tracing::trace;

/// Compiled pattern matcher
#[derive(Debug)]
pub struct PatternMatcher {
    patterns: Vec<CompiledPattern>,
}

#[derive(Debug)]
struct CompiledPattern {
    source: String,
    regex: Regex,
}

impl PatternMatcher {
    /// Create a new pattern matcher from a list of regex patterns
    pub fn new(patterns: &[String]) -> Result<Self, ConfigError> {
        let compiled = patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern)
                    .map(|regex| CompiledPattern {
                        source: pattern.clone(),
                        regex,
                    })
                    .map_err(|e| ConfigError::InvalidPattern {
                        pattern: pattern.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { patterns: compiled })
    }

    /// Create an empty pattern matcher (matches nothing)
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.regex.is_match(name))
    }

    /// The first pattern matching `name`, if any
    pub fn find_match(&self, name: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|p| p.regex.is_match(name))
            .map(|p| p.source.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::empty()
    }
}

/// Include/exclude filter over object names
///
/// An object is listed when it matches an include pattern (or no include
/// patterns are configured) and matches no exclude pattern.
#[derive(Debug, Default)]
pub struct ObjectFilter {
    include: PatternMatcher,
    exclude: PatternMatcher,
}

impl ObjectFilter {
    pub fn new(config: &ObjectFilterConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            include: PatternMatcher::new(&config.include)?,
            exclude: PatternMatcher::new(&config.exclude)?,
        })
    }

    /// Filter that lists every object
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn allows(&self, object: &str) -> bool {
        if let Some(pattern) = self.exclude.find_match(object) {
            trace!(object, pattern, "Object excluded");
            return false;
        }
        self.include.is_empty() || self.include.matches(object)
    }

    /// Keep the allowed objects, sorted and de-duplicated
    pub fn apply(&self, objects: Vec<String>) -> Vec<String> {
        let mut allowed: Vec<String> = objects.into_iter().filter(|o| self.allows(o)).collect();
        allowed.sort();
        allowed.dedup();
        allowed
    }
}
