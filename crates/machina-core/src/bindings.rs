// Variable bindings produced as a side effect of unification.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::feature::FeatureValue;

/// Map from pattern variable name to the concrete value it was bound to.
///
/// Bindings are part of a derivation's identity: two branches that reached
/// the same automaton state with different bindings are different branches.
/// The map is ordered so equality and hashing do not depend on the order
/// variables were bound in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariableBindings {
    values: BTreeMap<String, FeatureValue>,
}

impl VariableBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Bind `name` to `value`. A variable that is already bound keeps its
    /// value; the call returns `false` in that case.
    pub fn bind(&mut self, name: impl Into<String>, value: FeatureValue) -> bool {
        match self.values.entry(name.into()) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<FeatureValue> {
        self.values.remove(name)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_variable_is_not_rebound() {
        let mut b = VariableBindings::new();
        assert!(b.bind("a", FeatureValue::symbol("+")));
        assert!(!b.bind("a", FeatureValue::symbol("-")));
        assert_eq!(b.get("a"), Some(&FeatureValue::symbol("+")));
    }

    #[test]
    fn equality_ignores_binding_order() {
        let mut x = VariableBindings::new();
        x.bind("a", FeatureValue::symbol("+"));
        x.bind("b", FeatureValue::symbol("-"));
        let mut y = VariableBindings::new();
        y.bind("b", FeatureValue::symbol("-"));
        y.bind("a", FeatureValue::symbol("+"));
        assert_eq!(x, y);
    }

    #[test]
    fn clone_is_independent() {
        let mut a = VariableBindings::new();
        a.bind("v", FeatureValue::symbol("x"));
        let mut b = a.clone();
        b.clear();
        assert_eq!(a.len(), 1);
        assert!(b.is_empty());
    }
}
