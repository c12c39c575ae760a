//! Named, late-bound configuration of the behaviours.
//!
//! A [`ParameterStore`] is owned by the caller and handed by reference to
//! every integration. Mutation requires `&mut`, so sharing a store between
//! threads that modify it has to be serialised by the host.
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterStore {
    reals: BTreeMap<String, f64>,
    integers: BTreeMap<String, i32>,
    unsigned_integers: BTreeMap<String, u16>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn set_parameter(&mut self, name: &str, value: f64) {
        tracing::debug!(parameter = name, value, "setting real parameter");
        self.reals.insert(name.to_string(), value);
    }

    pub fn set_integer_parameter(&mut self, name: &str, value: i32) {
        tracing::debug!(parameter = name, value, "setting integer parameter");
        self.integers.insert(name.to_string(), value);
    }

    pub fn set_unsigned_integer_parameter(&mut self, name: &str, value: u16) {
        tracing::debug!(parameter = name, value, "setting unsigned integer parameter");
        self.unsigned_integers.insert(name.to_string(), value);
    }

    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.reals.get(name).copied()
    }

    pub fn integer_parameter(&self, name: &str) -> Option<i32> {
        self.integers.get(name).copied()
    }

    pub fn unsigned_integer_parameter(&self, name: &str) -> Option<u16> {
        self.unsigned_integers.get(name).copied()
    }

    /// Value of a real parameter, `default` being the value declared by the
    /// behaviour.
    pub fn real_or(&self, name: &str, default: f64) -> f64 {
        self.parameter(name).unwrap_or(default)
    }

    pub fn unsigned_integer_or(&self, name: &str, default: u16) -> u16 {
        self.unsigned_integer_parameter(name).unwrap_or(default)
    }
}
