//! Configuration merging functionality
//!
//! This module provides functionality for merging configurations from different sources.

use crate::config::DemuxConfig;

/// Trait for merging configurations
pub trait ConfigMerger {
    /// Merge another configuration into this one
    ///
    /// Values from `other` will override values in `self` if they are not the default values.
    /// This is used to implement the configuration priority system.
    fn merge(&self, other: impl AsRef<Self>) -> Self where Self: Sized;
}

impl ConfigMerger for DemuxConfig {
    fn merge(&self, other: impl AsRef<Self>) -> Self {
        let other = other.as_ref();
        let default = Self::default();

        fn merge_field<T: Clone + PartialEq>(self_val: &T, other_val: &T, default_val: &T) -> T {
            if other_val != default_val {
                other_val.clone()
            } else {
                self_val.clone()
            }
        }

        // A non-empty protocol table replaces the whole table: order matters,
        // so entries are never interleaved across sources
        let protocols = if other.protocols.is_empty() {
            self.protocols.clone()
        } else {
            other.protocols.clone()
        };

        Self {
            listen: merge_field(&self.listen, &other.listen, &default.listen),
            timeout: merge_field(&self.timeout, &other.timeout, &default.timeout),
            on_timeout: merge_field(&self.on_timeout, &other.on_timeout, &default.on_timeout),
            verbose: merge_field(&self.verbose, &other.verbose, &default.verbose),
            log_level: merge_field(&self.log_level, &other.log_level, &default.log_level),
            buffer_size: merge_field(&self.buffer_size, &other.buffer_size, &default.buffer_size),
            connect_timeout: merge_field(&self.connect_timeout, &other.connect_timeout, &default.connect_timeout),
            protocols,
        }
    }
}
