//! Binding Configuration
//!
//! Tunables for the binding engine. Every field has a default, so a config
//! document only needs to name what it changes:
//!
//! ```json
//! { "connect_queue_threshold": 150, "observation_strategy": "setter" }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How plain objects are observed by the locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObservationStrategy {
    /// Batched change records dispatched per object.
    #[default]
    ChangeRecords,
    /// Accessor traps installed on first subscription.
    Setter,
}

/// Configuration for a [`BindingEngine`](crate::binding::BindingEngine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    /// Number of connects run immediately before the connect queue defers
    /// the rest to animation frames.
    pub connect_queue_threshold: usize,

    /// Time budget, in milliseconds, for one animation-frame connect flush.
    pub frame_budget_ms: u64,

    /// Strategy used for plain (non-frozen) objects.
    pub observation_strategy: ObservationStrategy,

    /// DOM events the default element handler listens to.
    pub observed_events: Vec<String>,

    /// Element properties that get an event handler and can be subscribed.
    pub observable_element_properties: Vec<String>,
}

/// Default connect queue threshold.
pub const DEFAULT_CONNECT_QUEUE_THRESHOLD: usize = 100;

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            connect_queue_threshold: DEFAULT_CONNECT_QUEUE_THRESHOLD,
            frame_budget_ms: 15,
            observation_strategy: ObservationStrategy::default(),
            observed_events: vec!["change".to_string(), "input".to_string()],
            observable_element_properties: vec!["value".to_string(), "checked".to_string()],
        }
    }
}

impl BindingConfig {
    /// Parse a configuration from JSON, filling missing fields with defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Whether an element property is observed through DOM events.
    pub fn is_observable_element_property(&self, name: &str) -> bool {
        self.observable_element_properties.iter().any(|p| p == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = BindingConfig::default();
        assert_eq!(config.connect_queue_threshold, 100);
        assert_eq!(config.frame_budget_ms, 15);
        assert_eq!(config.observation_strategy, ObservationStrategy::ChangeRecords);
        assert!(config.is_observable_element_property("value"));
        assert!(!config.is_observable_element_property("title"));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = BindingConfig::from_json(
            r#"{ "connect_queue_threshold": 150, "observation_strategy": "setter" }"#,
        )
        .unwrap();
        assert_eq!(config.connect_queue_threshold, 150);
        assert_eq!(config.observation_strategy, ObservationStrategy::Setter);
        assert_eq!(config.observed_events, vec!["change", "input"]);
    }
}
