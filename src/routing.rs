use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix that virtual account numbers (CVU) share.
const CVU_PREFIX: &str = "000000";

/// Identification method of a bank account reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoutingScheme {
    /// Clave Bancaria Uniforme, 22-digit bank account number.
    Cbu,
    /// Clave Virtual Uniforme, 22-digit virtual account number.
    Cvu,
    /// Human-readable alias.
    Alias,
    /// Any scheme the API reports that this crate does not know.
    #[serde(other, skip_serializing)]
    Unknown,
}

impl fmt::Display for RoutingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = match self {
            RoutingScheme::Cbu => "CBU",
            RoutingScheme::Cvu => "CVU",
            RoutingScheme::Alias => "ALIAS",
            RoutingScheme::Unknown => "UNKNOWN",
        };
        f.write_str(v)
    }
}

/// Guess the routing scheme of a numeric account address.
///
/// Addresses starting with `000000` are treated as CVU and everything else
/// as CBU. This is a heuristic on the numbering plan, not a validation: the
/// remote API remains the authority. Aliases are never inferred.
pub fn detect_scheme(address: &str) -> RoutingScheme {
    if address.trim().starts_with(CVU_PREFIX) {
        RoutingScheme::Cvu
    } else {
        RoutingScheme::Cbu
    }
}
