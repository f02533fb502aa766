//! Pattern probe for user-defined protocols
//!
//! Holds an ordered list of compiled byte patterns; the first one found
//! anywhere in the prefix wins. A prefix that matches nothing is rejected
//! outright, so protocols whose signature may arrive late should be given
//! a `min_length`.

use super::detector::{ProtocolDetector, Verdict};
use crate::config::ConfigError;

#[cfg(feature = "regex-probe")]
use regex::bytes::Regex;

/// Compiled patterns of one protocol entry
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    #[cfg(feature = "regex-probe")]
    patterns: Vec<Regex>,
}

impl PatternSet {
    /// Compile `sources` in order
    ///
    /// Fails on the first invalid pattern, or unconditionally when the crate
    /// was built without the `regex-probe` feature.
    #[cfg(feature = "regex-probe")]
    pub fn compile<S: AsRef<str>>(sources: &[S]) -> std::result::Result<Self, ConfigError> {
        let patterns = sources
            .iter()
            .map(|source| {
                Regex::new(source.as_ref()).map_err(|e| {
                    ConfigError::InvalidValue("regex_patterns".to_string(), format!("{}: {}", source.as_ref(), e))
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    #[cfg(not(feature = "regex-probe"))]
    pub fn compile<S: AsRef<str>>(_sources: &[S]) -> std::result::Result<Self, ConfigError> {
        Err(ConfigError::ProbeUnavailable("regex".to_string()))
    }

    /// Number of compiled patterns
    pub fn len(&self) -> usize {
        #[cfg(feature = "regex-probe")]
        {
            self.patterns.len()
        }
        #[cfg(not(feature = "regex-probe"))]
        {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ProtocolDetector for PatternSet {
    #[cfg(feature = "regex-probe")]
    fn detect(&self, data: &[u8]) -> Verdict {
        self.patterns.iter().any(|pattern| pattern.is_match(data)).into()
    }

    #[cfg(not(feature = "regex-probe"))]
    fn detect(&self, _data: &[u8]) -> Verdict {
        // compile() refuses to build a PatternSet in this configuration
        Verdict::NotThisOne
    }
}

#[cfg(all(test, feature = "regex-probe"))]
mod tests {
    use super::*;

    #[test]
    fn test_first_match_anywhere() {
        let set = PatternSet::compile(&["^SSH-", "git-upload-pack"]).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.detect(b"SSH-2.0"), Verdict::Match);
        assert_eq!(set.detect(b"0032git-upload-pack /repo"), Verdict::Match);
        assert_eq!(set.detect(b"xxSSH-"), Verdict::NotThisOne);
    }

    #[test]
    fn test_short_prefix_is_rejected_not_deferred() {
        let set = PatternSet::compile(&["hello world"]).unwrap();
        assert_eq!(set.detect(b"hello"), Verdict::NotThisOne);
    }

    #[test]
    fn test_binary_input() {
        let set = PatternSet::compile(&[r"(?-u)^\x16\x03"]).unwrap();
        assert_eq!(set.detect(&[0x16, 0x03, 0xff, 0xfe]), Verdict::Match);
    }

    #[test]
    fn test_empty_set_never_matches() {
        let set = PatternSet::compile::<&str>(&[]).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.detect(b"anything"), Verdict::NotThisOne);
    }

    #[test]
    fn test_invalid_pattern() {
        let err = PatternSet::compile(&["(unclosed"]).unwrap_err();
        assert!(err.to_string().contains("regex_patterns"));
    }
}
