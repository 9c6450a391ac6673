//! Namespaced identifiers.
//!
//! An [`Identifier`] is an opaque `NAMESPACE:local_id` key. Identifiers are
//! immutable values: they are cloned freely into classes, reports and output
//! records.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::namespace::Namespace;

static NAMESPACE_SYNTAX: OnceLock<Regex> = OnceLock::new();

fn namespace_syntax() -> &'static Regex {
    NAMESPACE_SYNTAX.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9_.\-]*$").expect("namespace pattern is a valid regex")
    })
}

/// A `NAMESPACE:local_id` key.
///
/// Ordering is by namespace prefix, then local id, which gives a stable
/// total order for deterministic output.
///
/// # Examples
///
/// ```
/// use concordance::{Identifier, Namespace};
///
/// let id: Identifier = "CHEBI:15377".parse().unwrap();
/// assert_eq!(id.namespace(), &Namespace::Chebi);
/// assert_eq!(id.local_id(), "15377");
/// assert_eq!(id.to_string(), "CHEBI:15377");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier {
    namespace: Namespace,
    local_id: String,
}

impl Identifier {
    /// Creates an identifier without validating its parts.
    #[must_use]
    pub fn new(namespace: impl Into<Namespace>, local_id: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local_id: local_id.into(),
        }
    }

    /// Parses `NAMESPACE:local_id`, splitting on the first `:`.
    ///
    /// # Errors
    /// Returns a [`ValidationError`] if the separator is missing, either side
    /// is empty, the namespace has illegal characters, or the local id holds
    /// whitespace.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let Some((prefix, local)) = value.split_once(':') else {
            return Err(ValidationError::InvalidIdentifier {
                value: value.to_string(),
                reason: "missing ':' separator".to_string(),
            });
        };
        if prefix.is_empty() {
            return Err(ValidationError::EmptyNamespace);
        }
        if !namespace_syntax().is_match(prefix) {
            return Err(ValidationError::InvalidIdentifier {
                value: value.to_string(),
                reason: format!("illegal namespace '{prefix}'"),
            });
        }
        if local.is_empty() {
            return Err(ValidationError::EmptyLocalId {
                namespace: prefix.to_string(),
            });
        }
        if local.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidIdentifier {
                value: value.to_string(),
                reason: "local id contains whitespace".to_string(),
            });
        }
        Ok(Self::new(prefix, local))
    }

    /// The vocabulary this identifier belongs to.
    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// The id within the namespace.
    #[must_use]
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Returns true if this identifier is in `ns`.
    #[must_use]
    pub fn in_namespace(&self, ns: &Namespace) -> bool {
        &self.namespace == ns
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.local_id)
    }
}

impl FromStr for Identifier {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Identifier {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_splits_on_first_colon() {
        let id = Identifier::parse("GO:GO:0003674").unwrap();
        assert_eq!(id.namespace(), &Namespace::Go);
        assert_eq!(id.local_id(), "GO:0003674");
    }

    #[test]
    fn test_parse_keeps_unknown_namespace() {
        let id = Identifier::parse("HMDB:HMDB0000001").unwrap();
        assert!(id.namespace().is_other());
        assert_eq!(id.to_string(), "HMDB:HMDB0000001");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(
            Identifier::parse("CHEBI"),
            Err(ValidationError::InvalidIdentifier { .. })
        ));
        assert!(matches!(Identifier::parse(":123"), Err(ValidationError::EmptyNamespace)));
        assert!(matches!(
            Identifier::parse("CHEBI:"),
            Err(ValidationError::EmptyLocalId { .. })
        ));
        assert!(matches!(
            Identifier::parse("1CHEBI:5"),
            Err(ValidationError::InvalidIdentifier { .. })
        ));
        assert!(matches!(
            Identifier::parse("MESH:D 1"),
            Err(ValidationError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn test_sequence_fragment_ids_parse() {
        let id = Identifier::parse("UniProtKB:P01308#PRO_0000015819").unwrap();
        assert_eq!(id.namespace(), &Namespace::UniProtKb);
    }

    #[test]
    fn test_ordering_is_namespace_then_local() {
        let mut ids = vec![
            Identifier::new("MESH", "D1"),
            Identifier::new("CHEBI", "2"),
            Identifier::new("CHEBI", "10"),
        ];
        ids.sort();
        let rendered: Vec<String> = ids.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["CHEBI:10", "CHEBI:2", "MESH:D1"]);
    }

    #[test]
    fn test_serde_as_curie_string() {
        let id = Identifier::new(Namespace::Unii, "059QF0KO0R");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"UNII:059QF0KO0R\"");
        let back: Identifier = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<Identifier>("\"nocolon\"").is_err());
    }
}
