//! Attribute-match queries over container metadata
//!
//! A query is an immutable signature: an optional kind filter, a
//! case-sensitivity flag and a set of attribute constraints. A `*` inside a
//! constraint value is a wildcard matching any substring; the pattern is
//! anchored at both ends otherwise. Identical signatures are semantically
//! idempotent, which is what makes query results cacheable.

use crate::container::{ContainerKind, ContainerMetadata};
use std::collections::{BTreeMap, HashMap};

/// How a single attribute constraint matches a metadata value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Matcher {
    /// Full-string equality
    Exact(String),
    /// Anchored glob, `*` matches any substring
    Wildcard(String),
}

impl Matcher {
    /// Pick the discriminator from the presence of `*` in the value
    pub fn from_value(value: &str) -> Self {
        if value.contains('*') {
            Matcher::Wildcard(value.to_string())
        } else {
            Matcher::Exact(value.to_string())
        }
    }

    pub fn matches(&self, value: &str, ignore_case: bool) -> bool {
        match self {
            Matcher::Exact(expected) => {
                if ignore_case {
                    expected.to_lowercase() == value.to_lowercase()
                } else {
                    expected == value
                }
            }
            Matcher::Wildcard(pattern) => {
                if ignore_case {
                    glob_match(&pattern.to_lowercase(), &value.to_lowercase())
                } else {
                    glob_match(pattern, value)
                }
            }
        }
    }

    fn is_wildcard(&self) -> bool {
        matches!(self, Matcher::Wildcard(_))
    }
}

/// Anchored glob match where `*` matches any substring
fn glob_match(pattern: &str, value: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == value;
    }

    let (first, rest) = parts.split_first().unwrap();
    let (last, middle) = rest.split_last().unwrap();

    if !value.starts_with(first) || !value.ends_with(last) {
        return false;
    }
    let mut pos = first.len();
    let end = value.len() - last.len();
    if pos > end {
        // The anchors overlap, e.g. pattern "a*a" against value "a"
        return false;
    }

    for part in middle {
        if part.is_empty() {
            continue;
        }
        match value[pos..end].find(part) {
            Some(found) => pos += found + part.len(),
            None => return false,
        }
    }
    true
}

/// Immutable query signature
///
/// Two queries are cache-equivalent iff their kind filter, case flag and
/// constraint map are equal; constraint insertion order is irrelevant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerQuery {
    kind: Option<ContainerKind>,
    ignore_case: bool,
    constraints: BTreeMap<String, Matcher>,
}

impl ContainerQuery {
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }

    pub fn kind(&self) -> Option<ContainerKind> {
        self.kind
    }

    pub fn ignore_case(&self) -> bool {
        self.ignore_case
    }

    /// True iff the only constraint is a single case-sensitive exact `id`
    /// match with no kind filter. Such queries bypass the cache and resolve
    /// with a direct table lookup.
    pub fn is_id_only(&self) -> bool {
        self.kind.is_none()
            && !self.ignore_case
            && self.constraints.len() == 1
            && matches!(self.constraints.get("id"), Some(matcher) if !matcher.is_wildcard())
    }

    /// The exact id this query looks up, when [`is_id_only`](Self::is_id_only)
    pub fn id_constraint(&self) -> Option<&str> {
        match self.constraints.get("id") {
            Some(Matcher::Exact(id)) => Some(id),
            _ => None,
        }
    }

    fn matches(&self, metadata: &ContainerMetadata) -> bool {
        if let Some(kind) = self.kind {
            if metadata.kind != kind {
                return false;
            }
        }
        self.constraints.iter().all(|(key, matcher)| {
            metadata
                .get(key)
                .is_some_and(|value| matcher.matches(value, self.ignore_case))
        })
    }

    /// Scan the metadata table and collect all matching ids
    ///
    /// Result order is sorted lexicographically so repeated executions over
    /// the same table state are deterministic, keeping cache semantics
    /// well-defined.
    pub fn execute(&self, table: &HashMap<String, ContainerMetadata>) -> Vec<String> {
        let mut ids: Vec<String> = table
            .iter()
            .filter(|(_, metadata)| self.matches(metadata))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort_unstable();
        ids
    }
}

/// Typed builder for [`ContainerQuery`]
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    kind: Option<ContainerKind>,
    ignore_case: bool,
    constraints: BTreeMap<String, Matcher>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: ContainerKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn ignore_case(mut self, ignore_case: bool) -> Self {
        self.ignore_case = ignore_case;
        self
    }

    /// Constrain an attribute; `*` in the value selects wildcard matching
    pub fn constraint(mut self, key: &str, value: &str) -> Self {
        self.constraints
            .insert(key.to_string(), Matcher::from_value(value));
        self
    }

    pub fn build(self) -> ContainerQuery {
        ContainerQuery {
            kind: self.kind,
            ignore_case: self.ignore_case,
            constraints: self.constraints,
        }
    }
}
