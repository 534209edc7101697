// Feature values, feature structures and matching.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;
use crate::bindings::VariableBindings;

/// The value of a single feature.
///
/// Symbolic values are sets: a requirement `place=lab|cor` accepts either
/// symbol, and a candidate carrying several symbols is underspecified.
/// Variables only make sense in requirements; they are bound to the
/// candidate's value on first use and must agree (or, when negated,
/// disagree) with that binding afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureValue {
    Symbols(BTreeSet<String>),
    Str(String),
    Variable { name: String, agree: bool },
}

impl FeatureValue {
    pub fn symbol(symbol: impl Into<String>) -> Self {
        FeatureValue::Symbols(BTreeSet::from([symbol.into()]))
    }

    pub fn symbols<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FeatureValue::Symbols(symbols.into_iter().map(Into::into).collect())
    }

    pub fn string(value: impl Into<String>) -> Self {
        FeatureValue::Str(value.into())
    }

    pub fn variable(name: impl Into<String>) -> Self {
        FeatureValue::Variable {
            name: name.into(),
            agree: true,
        }
    }

    pub fn negated_variable(name: impl Into<String>) -> Self {
        FeatureValue::Variable {
            name: name.into(),
            agree: false,
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, FeatureValue::Variable { .. })
    }

    /// Check a requirement value against a concrete candidate value,
    /// binding variables into `bindings` as needed.
    fn matches_value(
        &self,
        candidate: &FeatureValue,
        use_unification: bool,
        bindings: &mut VariableBindings,
    ) -> bool {
        match self {
            FeatureValue::Variable { name, agree } => match bindings.get(name) {
                Some(bound) => {
                    let same = bound.compatible(candidate, use_unification);
                    same == *agree
                }
                None => {
                    if *agree && !candidate.is_variable() {
                        bindings.bind(name.clone(), candidate.clone());
                    }
                    true
                }
            },
            _ => self.compatible(candidate, use_unification),
        }
    }

    /// Whether two concrete values match. Under unification symbol sets
    /// only need to intersect; otherwise the candidate's symbols must all
    /// be allowed by `self`.
    fn compatible(&self, candidate: &FeatureValue, use_unification: bool) -> bool {
        match (self, candidate) {
            (FeatureValue::Symbols(req), FeatureValue::Symbols(cand)) => {
                if use_unification {
                    !req.is_disjoint(cand)
                } else {
                    !cand.is_empty() && cand.is_subset(req)
                }
            }
            (FeatureValue::Str(a), FeatureValue::Str(b)) => a == b,
            (_, FeatureValue::Variable { .. }) => use_unification,
            _ => false,
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Symbols(symbols) => {
                let joined: Vec<&str> = symbols.iter().map(String::as_str).collect();
                write!(f, "{}", joined.join("|"))
            }
            FeatureValue::Str(s) => write!(f, "{s:?}"),
            FeatureValue::Variable { name, agree: true } => write!(f, "${name}"),
            FeatureValue::Variable { name, agree: false } => write!(f, "!${name}"),
        }
    }
}

/// An attribute-value structure.
///
/// `defaults` holds values that stand in for features a candidate does not
/// specify, consulted only when matching with `use_defaults`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureStruct {
    features: BTreeMap<String, FeatureValue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    defaults: BTreeMap<String, FeatureValue>,
}

impl FeatureStruct {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, feature: impl Into<String>, value: FeatureValue) -> Self {
        self.set(feature, value);
        self
    }

    /// Builder-style setter for a single symbol.
    pub fn with_symbol(self, feature: impl Into<String>, symbol: impl Into<String>) -> Self {
        self.with(feature, FeatureValue::symbol(symbol))
    }

    /// Builder-style setter for a default value.
    pub fn with_default(mut self, feature: impl Into<String>, value: FeatureValue) -> Self {
        self.defaults.insert(feature.into(), value);
        self
    }

    pub fn set(&mut self, feature: impl Into<String>, value: FeatureValue) {
        self.features.insert(feature.into(), value);
    }

    pub fn get(&self, feature: &str) -> Option<&FeatureValue> {
        self.features.get(feature)
    }

    pub fn remove(&mut self, feature: &str) -> Option<FeatureValue> {
        self.features.remove(feature)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.features.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn has_variables(&self) -> bool {
        self.features.values().any(FeatureValue::is_variable)
    }

    /// Match this structure, read as a requirement, against `candidate`.
    ///
    /// With `use_unification` a feature the candidate leaves unspecified is
    /// compatible; without it every required feature must be present and
    /// subsumed. With `use_defaults` an unspecified feature is first read
    /// from this structure's defaults.
    ///
    /// Bindings are only updated when the whole match succeeds; variables
    /// already bound keep their values.
    pub fn matches(
        &self,
        candidate: &FeatureStruct,
        use_unification: bool,
        use_defaults: bool,
        bindings: &mut VariableBindings,
    ) -> bool {
        let mut scratch: Option<VariableBindings> = None;
        for (name, required) in &self.features {
            let value = candidate.features.get(name).or_else(|| {
                if use_defaults {
                    self.defaults.get(name)
                } else {
                    None
                }
            });
            let Some(value) = value else {
                if use_unification {
                    continue;
                }
                return false;
            };
            let ok = if required.is_variable() {
                let scratch = scratch.get_or_insert_with(|| bindings.clone());
                required.matches_value(value, use_unification, scratch)
            } else {
                required.compatible(value, use_unification)
            };
            if !ok {
                return false;
            }
        }
        if let Some(scratch) = scratch {
            *bindings = scratch;
        }
        true
    }

    /// Overwrite features of `self` with every feature of `other`.
    pub fn priority_union(&mut self, other: &FeatureStruct) {
        for (name, value) in &other.features {
            self.features.insert(name.clone(), value.clone());
        }
    }
}

impl FromStr for FeatureStruct {
    type Err = CoreError;

    /// Parse the whitespace- or comma-separated notation
    /// `type=segment place=lab|cor gloss="dog" voice=$v nasal=!$n`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fs = FeatureStruct::new();
        let items = s
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|item| !item.is_empty());
        for item in items {
            let (name, raw) = item
                .split_once('=')
                .ok_or_else(|| CoreError::MissingEquals(item.to_string()))?;
            if name.is_empty() {
                return Err(CoreError::EmptyFeature(item.to_string()));
            }
            if raw.is_empty() {
                return Err(CoreError::EmptyValue(name.to_string()));
            }
            let value = if let Some(var) = raw.strip_prefix("!$") {
                FeatureValue::negated_variable(var)
            } else if let Some(var) = raw.strip_prefix('$') {
                FeatureValue::variable(var)
            } else if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
                FeatureValue::string(&raw[1..raw.len() - 1])
            } else {
                FeatureValue::symbols(raw.split('|').filter(|s| !s.is_empty()))
            };
            if fs.features.insert(name.to_string(), value).is_some() {
                return Err(CoreError::DuplicateFeature(name.to_string()));
            }
        }
        Ok(fs)
    }
}

impl fmt::Display for FeatureStruct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, (name, value)) in self.features.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{name}={value}")?;
        }
        write!(f, "]")
    }
}
