use std::collections::{BTreeSet, HashSet};

use aclgate_error::ConfigError;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

/// Prefix turning a pattern into an exclusion.
pub const NEGATION_PREFIX: char = '~';

/// Matches strings against a set of `*` patterns.
///
/// `*` stands for any run of characters, including none. Everything else is
/// literal. When built with [`WildcardMatcher::with_negations`], patterns
/// starting with `~` exclude whatever they match: a candidate must hit at
/// least one positive pattern and none of the negative ones.
#[derive(Debug, Clone)]
pub struct WildcardMatcher {
    /// Positive patterns in insertion order, without duplicates.
    patterns: Vec<String>,
    positive: GlobSet,
    negative_patterns: Vec<String>,
    negative: GlobSet,
}

////////////////////////////////////////////////////////////////////////////////
// Own methods
////////////////////////////////////////////////////////////////////////////////

impl WildcardMatcher {
    /// Builds a matcher where `~` has no special meaning.
    pub fn new<I, S>(patterns: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = dedup(patterns);
        Self::build(patterns, Vec::new())
    }

    /// Builds a matcher that treats `~pattern` as an exclusion.
    pub fn with_negations<I, S>(patterns: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (negative, positive): (Vec<String>, Vec<String>) = dedup(patterns)
            .into_iter()
            .partition(|p| p.starts_with(NEGATION_PREFIX));
        let negative = negative
            .into_iter()
            .map(|p| p[NEGATION_PREFIX.len_utf8()..].to_string())
            .collect();
        Self::build(positive, negative)
    }

    fn build(
        patterns: Vec<String>,
        negative_patterns: Vec<String>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            positive: compile(&patterns)?,
            negative: compile(&negative_patterns)?,
            patterns,
            negative_patterns,
        })
    }

    /// Returns `true` if `candidate` matches a positive pattern and no
    /// negative one.
    pub fn is_match(
        &self,
        candidate: &str,
    ) -> bool {
        // exclusions are consulted only after a positive hit
        self.positive.is_match(candidate) && !self.negative.is_match(candidate)
    }

    /// Positive patterns that match `candidate`, or none at all if an
    /// exclusion matches it.
    pub fn matching_patterns(
        &self,
        candidate: &str,
    ) -> BTreeSet<String> {
        let hits = self.positive.matches(candidate);
        if hits.is_empty() || self.negative.is_match(candidate) {
            return BTreeSet::new();
        }
        hits.into_iter().map(|i| self.patterns[i].clone()).collect()
    }

    /// Subset of `candidates` accepted by [`Self::is_match`].
    pub fn filter<'a, I>(
        &self,
        candidates: I,
    ) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        candidates
            .into_iter()
            .filter(|c| self.is_match(c))
            .cloned()
            .collect()
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn negative_patterns(&self) -> &[String] {
        &self.negative_patterns
    }

    /// `true` when a lone `*` is among the positive patterns.
    pub fn matches_everything(&self) -> bool {
        self.negative_patterns.is_empty() && self.patterns.iter().any(|p| p == "*")
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Removes duplicates while keeping the first occurrence in place.
fn dedup<I, S>(patterns: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    patterns
        .into_iter()
        .map(|p| p.as_ref().to_string())
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

fn compile(patterns: &[String]) -> Result<GlobSet, ConfigError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(&to_glob(pattern))
            .literal_separator(false)
            .backslash_escape(false)
            .build()
            .map_err(|e| ConfigError::invalid_value("pattern", format!("'{pattern}': {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| ConfigError::invalid_value("pattern", e.to_string()))
}

/// Translates a `*`-only pattern into globset syntax.
///
/// Consecutive stars collapse into one so `**` never turns into a recursive
/// path wildcard, every other glob meta character is put into a one-char
/// class.
fn to_glob(pattern: &str) -> String {
    let mut glob = String::with_capacity(pattern.len() + 8);
    let mut prev_star = false;
    for c in pattern.chars() {
        match c {
            '*' => {
                if !prev_star {
                    glob.push('*');
                }
                prev_star = true;
                continue;
            }
            '?' | '[' | ']' | '{' | '}' | '\\' => {
                glob.push('[');
                glob.push(c);
                glob.push(']');
            }
            _ => glob.push(c),
        }
        prev_star = false;
    }
    glob
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
