use serde::{Deserialize, Serialize};

/// How a variable-based intersection expands a variable into its proxies.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VariablePolicy {
    /// Any of the variable's proxies found counts as the variable present
    /// (OR). The default: proxies within one variable are alternative
    /// indicators of the same concept.
    AnyProxy,
    /// All of the variable's proxies must be found (AND).
    AllProxies,
}

/// Tunables for the expression engine.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Trees deeper than this are rejected before persistence, bounding
    /// evaluation stack depth and persisted-size growth.
    pub max_depth: usize,
    pub variable_policy: VariablePolicy,
}

impl EngineConfig {
    pub const DEFAULT_MAX_DEPTH: usize = 20;
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: Self::DEFAULT_MAX_DEPTH,
            variable_policy: VariablePolicy::AnyProxy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_default_policy_is_any_proxy() {
        let config = EngineConfig::default();

        assert_eq!(VariablePolicy::AnyProxy, config.variable_policy);
        assert_eq!(20, config.max_depth);
    }

    #[test]
    fn can_deserialize_a_partial_configuration() {
        let config: EngineConfig = serde_json::from_str(r#"{"max_depth": 8}"#).unwrap();

        assert_eq!(8, config.max_depth);
        assert_eq!(VariablePolicy::AnyProxy, config.variable_policy);
    }
}
