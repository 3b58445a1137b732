//! Replica configuration.

use weft_core::ExpandRules;

/// Configuration for a [`Replica`](crate::replica::Replica).
#[derive(Clone, Debug)]
pub struct ReplicaConfig {
    /// Identifies this replica's mutations and bunches. Must be unique.
    pub client_id: String,
    /// Expand rules used to pick the marks inherited by inserted text.
    pub expand_rules: ExpandRules,
    /// Compare outline length with the document after every step.
    pub check_parity: bool,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            client_id: ulid::Ulid::new().to_string(),
            expand_rules: ExpandRules::default(),
            check_parity: true,
        }
    }
}

/// Builder for replica configuration.
pub struct ReplicaConfigBuilder {
    config: ReplicaConfig,
}

impl ReplicaConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ReplicaConfig::default(),
        }
    }

    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.config.client_id = id.into();
        self
    }

    pub fn expand_rules(mut self, rules: ExpandRules) -> Self {
        self.config.expand_rules = rules;
        self
    }

    pub fn check_parity(mut self, enabled: bool) -> Self {
        self.config.check_parity = enabled;
        self
    }

    pub fn build(self) -> ReplicaConfig {
        self.config
    }
}

impl Default for ReplicaConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::Expand;

    #[test]
    fn test_builder() {
        let config = ReplicaConfigBuilder::new()
            .client_id("alice")
            .expand_rules(ExpandRules::new(Expand::None))
            .check_parity(false)
            .build();
        assert_eq!(config.client_id, "alice");
        assert_eq!(config.expand_rules.rule("bold", true), Expand::None);
        assert!(!config.check_parity);
    }

    #[test]
    fn test_default_ids_are_unique() {
        assert_ne!(ReplicaConfig::default().client_id, ReplicaConfig::default().client_id);
    }
}
