use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::error::ConfigError;

/// String parameters of a module, in a stable order.
///
/// [`Module::parameters`](super::Module::parameters) returns the recognized parameters with
/// their default values (an empty string when there is no default), and
/// [`Module::configure`](super::Module::configure) receives the values chosen by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterMap(IndexMap<String, String>);

impl ParameterMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Returns the value of a parameter that must be set.
    ///
    /// # Errors
    /// An absent parameter and a parameter set to the empty string are both
    /// reported as [`ConfigError::MissingParameter`].
    pub fn required(&self, name: &str) -> Result<&str, ConfigError> {
        match self.get(name) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(ConfigError::MissingParameter(name.to_owned())),
        }
    }

    /// Returns the value of a parameter, or `default` if it is absent or empty.
    pub fn optional_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        match self.get(name) {
            Some(value) if !value.is_empty() => value,
            _ => default,
        }
    }

    /// Names of the parameters that are not in `recognized`.
    pub fn unknown<'a>(&'a self, recognized: &ParameterMap) -> Vec<&'a str> {
        self.0
            .keys()
            .filter(|k| recognized.get(k).is_none())
            .map(String::as_str)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ParameterMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for ParameterMap {
    fn from(value: [(K, V); N]) -> Self {
        Self::from_iter(value)
    }
}
