//! Data-driven superset rules between actions.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use warden_core::{AppError, AppResult};

use crate::permission::{ActionName, PermissionKey, ResourceName};

/// States that holding `action` also grants each action in `implies`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionImplication {
    resource: Option<ResourceName>,
    action: ActionName,
    implies: BTreeSet<ActionName>,
}

impl ActionImplication {
    /// Creates a rule; `resource = None` applies the rule to every resource.
    pub fn new(
        resource: Option<ResourceName>,
        action: ActionName,
        implies: impl IntoIterator<Item = ActionName>,
    ) -> AppResult<Self> {
        let implies: BTreeSet<ActionName> = implies
            .into_iter()
            .filter(|implied| implied != &action)
            .collect();

        if implies.is_empty() {
            return Err(AppError::Validation(format!(
                "implication rule for action '{action}' must imply at least one other action"
            )));
        }

        Ok(Self {
            resource,
            action,
            implies,
        })
    }

    /// Returns the resource this rule is limited to, if any.
    #[must_use]
    pub fn resource(&self) -> Option<&ResourceName> {
        self.resource.as_ref()
    }

    /// Returns the implying action.
    #[must_use]
    pub fn action(&self) -> &ActionName {
        &self.action
    }

    /// Returns the implied actions.
    #[must_use]
    pub fn implies(&self) -> &BTreeSet<ActionName> {
        &self.implies
    }

    fn applies_to(&self, key: &PermissionKey) -> bool {
        key.action() == &self.action
            && self
                .resource
                .as_ref()
                .is_none_or(|resource| resource == key.resource())
    }
}

/// The full set of implication rules configured for an organization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplicationRules {
    rules: Vec<ActionImplication>,
}

impl ImplicationRules {
    /// Wraps a list of rules.
    #[must_use]
    pub fn new(rules: Vec<ActionImplication>) -> Self {
        Self { rules }
    }

    /// Returns the configured rules.
    #[must_use]
    pub fn rules(&self) -> &[ActionImplication] {
        &self.rules
    }

    /// Expands a granted key into every key it transitively implies, itself included.
    ///
    /// Rule cycles terminate because expansion only ever grows a set.
    #[must_use]
    pub fn closure_of(&self, key: &PermissionKey) -> BTreeSet<PermissionKey> {
        let mut granted = BTreeSet::from([key.clone()]);
        let mut pending = vec![key.clone()];

        while let Some(current) = pending.pop() {
            for rule in self.rules.iter().filter(|rule| rule.applies_to(&current)) {
                for implied in rule.implies() {
                    let implied_key = current.with_action(implied.clone());
                    if granted.insert(implied_key.clone()) {
                        pending.push(implied_key);
                    }
                }
            }
        }

        granted
    }

    /// Expands a whole set of granted keys.
    #[must_use]
    pub fn expand<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a PermissionKey>,
    ) -> BTreeSet<PermissionKey> {
        keys.into_iter()
            .flat_map(|key| self.closure_of(key))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{ActionImplication, ImplicationRules};
    use crate::permission::{ActionName, PermissionKey, ResourceName};

    fn action(value: &str) -> ActionName {
        match ActionName::new(value) {
            Ok(action) => action,
            Err(error) => panic!("invalid action: {error}"),
        }
    }

    fn key(value: &str) -> PermissionKey {
        match value.parse() {
            Ok(key) => key,
            Err(error) => panic!("invalid key: {error}"),
        }
    }

    fn rule(resource: Option<&str>, from: &str, to: &[&str]) -> ActionImplication {
        let resource = resource.map(|value| match ResourceName::new(value) {
            Ok(resource) => resource,
            Err(error) => panic!("invalid resource: {error}"),
        });
        match ActionImplication::new(resource, action(from), to.iter().map(|value| action(value)))
        {
            Ok(rule) => rule,
            Err(error) => panic!("invalid rule: {error}"),
        }
    }

    #[test]
    fn implication_is_transitive() {
        let rules = ImplicationRules::new(vec![
            rule(None, "ADMIN", &["WRITE"]),
            rule(None, "WRITE", &["READ"]),
        ]);

        let granted = rules.closure_of(&key("USERS:ADMIN"));
        assert!(granted.contains(&key("USERS:WRITE")));
        assert!(granted.contains(&key("USERS:READ")));
        assert!(!granted.contains(&key("BILLING:READ")));
    }

    #[test]
    fn resource_scoped_rule_does_not_leak() {
        let rules = ImplicationRules::new(vec![rule(Some("PAYMENTS"), "ADMIN", &["REFUND"])]);

        assert!(rules.closure_of(&key("PAYMENTS:ADMIN")).contains(&key("PAYMENTS:REFUND")));
        assert_eq!(rules.closure_of(&key("USERS:ADMIN")).len(), 1);
    }

    #[test]
    fn cyclic_rules_terminate() {
        let rules = ImplicationRules::new(vec![
            rule(None, "A", &["B"]),
            rule(None, "B", &["A"]),
        ]);

        assert_eq!(rules.closure_of(&key("X:A")).len(), 2);
    }

    #[test]
    fn self_only_rule_is_rejected() {
        let result = ActionImplication::new(None, action("READ"), [action("READ")]);
        assert!(result.is_err());
    }
}
