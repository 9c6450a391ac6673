//! Engine configuration.
//!
//! Everything a run needs besides its data: how to normalize namespaces,
//! which policy each batch gets, and the namespace priority used for output.
//! Loadable from JSON so a deployment can pin it alongside its source plan.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{ConcordanceResult, ValidationError};
use crate::namespace::{Namespace, NamespacePriority, NamespaceRewriter};
use crate::policy::{ConflictPolicy, PolicyTable};

/// Configuration for a concordance run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Primary identifier and label selection order.
    pub namespace_priority: NamespacePriority,

    /// Legacy prefix to canonical namespace.
    pub aliases: BTreeMap<String, Namespace>,

    /// Members in these namespaces are dropped from incoming groups.
    pub ignored_namespaces: BTreeSet<Namespace>,

    /// Namespace hint to policy.
    pub policies: BTreeMap<Namespace, ConflictPolicy>,

    /// Policy for batches without a matching hint.
    pub default_policy: ConflictPolicy,

    /// Maximum batches buffered between collaborator threads and the writer.
    pub channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            namespace_priority: NamespacePriority::default(),
            aliases: BTreeMap::new(),
            ignored_namespaces: BTreeSet::new(),
            policies: BTreeMap::new(),
            default_policy: ConflictPolicy::structure_authority(),
            channel_capacity: 16,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    /// Returns a config error for malformed JSON and a validation error for
    /// out-of-range values.
    pub fn from_json(json: &str) -> ConcordanceResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config.validate()?)
    }

    /// Checks the configuration for values the engine cannot run with.
    ///
    /// # Errors
    /// Returns [`ValidationError::InvalidConfig`] or the first invalid policy.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.channel_capacity == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "channel_capacity must be at least 1".to_string(),
            });
        }
        if let Some((from, to)) = self.aliases.iter().find(|(from, to)| from.as_str() == to.as_str()) {
            return Err(ValidationError::InvalidConfig {
                reason: format!("alias '{from}' rewrites to itself ({to})"),
            });
        }
        if let Some(ns) = self
            .aliases
            .values()
            .find(|target| self.ignored_namespaces.contains(*target))
        {
            return Err(ValidationError::InvalidConfig {
                reason: format!("alias target {ns} is also ignored"),
            });
        }
        self.policy_table().validate()?;
        Ok(self)
    }

    /// Namespace rewriter built from aliases and the ignore list.
    #[must_use]
    pub fn rewriter(&self) -> NamespaceRewriter {
        let with_aliases = self
            .aliases
            .iter()
            .fold(NamespaceRewriter::new(), |r, (from, to)| r.alias(from.clone(), to.clone()));
        self.ignored_namespaces
            .iter()
            .fold(with_aliases, |r, ns| r.ignore(ns.clone()))
    }

    /// Policy table built from the per-hint policies and the default.
    #[must_use]
    pub fn policy_table(&self) -> PolicyTable {
        PolicyTable {
            default: self.default_policy.clone(),
            by_hint: self.policies.clone(),
        }
    }

    /// The alias and ignore rules used when harvesting ontology
    /// cross-references: legacy Reactome/MetaCyc spellings are rewritten and
    /// literature/enzyme references are dropped.
    #[must_use]
    pub fn with_ontology_xref_rules(mut self) -> Self {
        self.aliases.insert("REACTOME".to_string(), Namespace::Reactome);
        self.aliases.insert("Reactome".to_string(), Namespace::Reactome);
        self.aliases.insert("METACYC".to_string(), Namespace::MetaCyc);
        self.ignored_namespaces.insert(Namespace::Pmid);
        self.ignored_namespaces.insert(Namespace::Ec);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::Identifier;

    #[test]
    fn test_default_is_valid() {
        let config = EngineConfig::default().validate().unwrap();
        assert_eq!(config.channel_capacity, 16);
        assert!(config
            .policy_table()
            .resolve(None)
            .unique_namespaces
            .contains(&Namespace::InchiKey));
    }

    #[test]
    fn test_from_json_partial() {
        let json = r#"{
            "namespace_priority": ["GO", "REACT"],
            "aliases": {"REACTOME": "REACT"},
            "ignored_namespaces": ["PMID"],
            "policies": {"MESH": {"low_confidence_namespace": "MESH"}},
            "channel_capacity": 4
        }"#;
        let config = EngineConfig::from_json(json).unwrap();
        assert_eq!(config.namespace_priority.as_slice(), &[Namespace::Go, Namespace::Reactome]);
        assert_eq!(config.channel_capacity, 4);
        assert_eq!(
            config.policy_table().resolve(Some(&Namespace::Mesh)).low_confidence_namespace,
            Some(Namespace::Mesh)
        );

        let rewriter = config.rewriter();
        let id: Identifier = "REACTOME:R-HSA-1".parse().unwrap();
        assert_eq!(rewriter.rewrite(&id).unwrap().to_string(), "REACT:R-HSA-1");
        assert!(rewriter.rewrite(&"PMID:1".parse().unwrap()).is_none());
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let err = EngineConfig::from_json(r#"{"channel_capacity": 0}"#).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_rejects_malformed_json() {
        let err = EngineConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, crate::error::ConcordanceError::Config(_)));
    }

    #[test]
    fn test_rejects_self_alias() {
        let mut config = EngineConfig::default();
        config.aliases.insert("GO".to_string(), Namespace::Go);
        assert!(matches!(config.validate(), Err(ValidationError::InvalidConfig { .. })));
    }

    #[test]
    fn test_rejects_ignored_alias_target() {
        let mut config = EngineConfig::default();
        config.aliases.insert("PUBMED".to_string(), Namespace::Pmid);
        config.ignored_namespaces.insert(Namespace::Pmid);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ontology_xref_rules() {
        let config = EngineConfig::default().with_ontology_xref_rules().validate().unwrap();
        let rewriter = config.rewriter();
        let id: Identifier = "METACYC:PWY-1".parse().unwrap();
        assert_eq!(rewriter.rewrite(&id).unwrap().namespace(), &Namespace::MetaCyc);
        assert!(rewriter.rewrite(&"EC:1.1.1.1".parse().unwrap()).is_none());
    }
}
