use serde::{Deserialize, Serialize};

/// "ip hosts name at hash", as last broadcast by that node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppLocation {
    pub name: String,
    pub hash: String,
    pub ip: String,
    pub broadcasted_at: i64,
}

impl AppLocation {
    /// Store key: a node reports each app once.
    pub fn key(&self) -> (String, String) {
        (self.name.clone(), self.ip.clone())
    }

    /// Host part of `ip`, which may carry an api port suffix.
    pub fn host(&self) -> &str {
        host_of(&self.ip)
    }
}

/// Strips a `:port` suffix.
pub fn host_of(endpoint: &str) -> &str {
    endpoint.split(':').next().unwrap_or(endpoint)
}
