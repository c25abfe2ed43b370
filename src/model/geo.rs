// Geolocation of nodes and the inclusion/exclusion rules carried by v5 specifications.
//
// A node location is `CONTINENT[_COUNTRY[_REGION]]`, e.g. `EU_CZ_PRG`.
// A rule is `ac<location>` (allow) or `a!c<location>` (deny).

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeLocation {
    pub continent: String,
    pub country: Option<String>,
    pub region: Option<String>,
}

impl NodeLocation {
    pub fn parse(s: &str) -> Option<NodeLocation> {
        let mut parts = s.trim().split('_').filter(|p| !p.is_empty());
        let continent = parts.next()?.to_ascii_uppercase();
        let country = parts.next().map(|p| p.to_ascii_uppercase());
        let region = parts.next().map(|p| p.to_ascii_uppercase());
        Some(NodeLocation {
            continent,
            country,
            region,
        })
    }

    /// True when `self`, read as a rule target, covers the concrete `node` location.
    fn covers(&self, node: &NodeLocation) -> bool {
        if self.continent != node.continent {
            return false;
        }
        if let Some(country) = &self.country {
            if node.country.as_ref() != Some(country) {
                return false;
            }
        }
        if let Some(region) = &self.region {
            if node.region.as_ref() != Some(region) {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for NodeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.continent)?;
        if let Some(c) = &self.country {
            write!(f, "_{c}")?;
        }
        if let Some(r) = &self.region {
            write!(f, "_{r}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoRule {
    pub allow: bool,
    pub target: NodeLocation,
}

impl GeoRule {
    pub fn parse(raw: &str) -> Result<GeoRule, ValidationError> {
        let (allow, rest) = if let Some(rest) = raw.strip_prefix("a!c") {
            (false, rest)
        } else if let Some(rest) = raw.strip_prefix("ac") {
            (true, rest)
        } else {
            return Err(ValidationError::new(
                "geolocation",
                format!("rule {raw:?} must start with 'ac' or 'a!c'"),
            ));
        };
        let target = NodeLocation::parse(rest).ok_or_else(|| {
            ValidationError::new("geolocation", format!("rule {raw:?} names no continent"))
        })?;
        if target.continent.len() != 2 || !target.continent.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValidationError::new(
                "geolocation",
                format!("rule {raw:?} has an invalid continent code"),
            ));
        }
        Ok(GeoRule { allow, target })
    }
}

/// Applies inclusion/exclusion rules to a node location.
///
/// Any matching deny rule rejects. When at least one allow rule is present the
/// node must match one of them. No rules means the app may run anywhere.
pub fn is_allowed(rules: &[GeoRule], node: &NodeLocation) -> bool {
    if rules.iter().any(|r| !r.allow && r.target.covers(node)) {
        return false;
    }
    let mut allows = rules.iter().filter(|r| r.allow).peekable();
    if allows.peek().is_none() {
        return true;
    }
    allows.any(|r| r.target.covers(node))
}

/// Parses every raw rule, dropping nothing: one bad rule rejects the set.
pub fn parse_rules(raw: &[String]) -> Result<Vec<GeoRule>, ValidationError> {
    raw.iter().map(|r| GeoRule::parse(r)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(raw: &[&str]) -> Vec<GeoRule> {
        raw.iter().map(|r| GeoRule::parse(r).unwrap()).collect()
    }

    #[test]
    fn empty_rules_allow_everywhere() {
        let node = NodeLocation::parse("NA_US_CA").unwrap();
        assert!(is_allowed(&[], &node));
    }

    #[test]
    fn allow_rule_restricts_to_region() {
        let set = rules(&["acEU_CZ"]);
        assert!(is_allowed(&set, &NodeLocation::parse("EU_CZ_PRG").unwrap()));
        assert!(!is_allowed(&set, &NodeLocation::parse("EU_DE").unwrap()));
    }

    #[test]
    fn deny_wins_over_allow() {
        let set = rules(&["acEU", "a!cEU_DE"]);
        assert!(is_allowed(&set, &NodeLocation::parse("EU_FR").unwrap()));
        assert!(!is_allowed(&set, &NodeLocation::parse("EU_DE_BE").unwrap()));
    }

    #[test]
    fn deny_only_allows_the_rest() {
        let set = rules(&["a!cAS"]);
        assert!(is_allowed(&set, &NodeLocation::parse("EU").unwrap()));
        assert!(!is_allowed(&set, &NodeLocation::parse("AS_JP").unwrap()));
    }

    #[test]
    fn rejects_malformed_rules() {
        assert!(GeoRule::parse("xEU").is_err());
        assert!(GeoRule::parse("ac").is_err());
        assert!(GeoRule::parse("acEUROPE").is_err());
    }
}
