//! Node and device name mapping for subcircuit instances.

use indexmap::IndexMap;

/// Separator between instance path segments in qualified names.
pub const SEPARATOR: char = '.';

/// Maps names used inside a subcircuit body to circuit-wide names.
///
/// Pins map to the nodes the instance is connected to, ground stays ground,
/// and every other node or device name is prefixed with the instance path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeNames {
    prefix: String,
    /// Lower-cased pin name to outer node name.
    pins: IndexMap<String, String>,
}

impl ScopeNames {
    /// Names at the top level of a netlist: everything maps to itself.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn new<I, K, V>(prefix: &str, pins: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            prefix: prefix.to_string(),
            pins: pins
                .into_iter()
                .map(|(pin, node)| (pin.as_ref().to_lowercase(), node.into()))
                .collect(),
        }
    }

    /// Instance path, empty at the top level.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn pins(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pins.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_ground(node: &str) -> bool {
        node == "0" || node.eq_ignore_ascii_case("gnd")
    }

    /// Circuit-wide name of a node referenced inside this scope.
    pub fn node(&self, local: &str) -> String {
        if Self::is_ground(local) {
            return "0".to_string();
        }
        if let Some(outer) = self.pins.get(&local.to_lowercase()) {
            return outer.clone();
        }
        self.qualify(local)
    }

    /// Circuit-wide name of a device or model referenced inside this scope.
    pub fn object(&self, local: &str) -> String {
        self.qualify(local)
    }

    fn qualify(&self, local: &str) -> String {
        if self.prefix.is_empty() {
            local.to_string()
        } else {
            format!("{}{SEPARATOR}{local}", self.prefix)
        }
    }

    /// Names for an instance `instance` placed in this scope, connecting
    /// `pins` of its definition to `connections` (named as in this scope).
    pub fn nested(&self, instance: &str, pins: &[String], connections: &[String]) -> ScopeNames {
        ScopeNames::new(
            &self.qualify(instance),
            pins.iter()
                .zip(connections)
                .map(|(pin, node)| (pin.as_str(), self.node(node))),
        )
    }
}
