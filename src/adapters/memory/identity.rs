//! Static Identity Provider - Voter Keys from a JSON File
//!
//! The key file maps voter ids to base64-encoded HMAC keys:
//!
//! ```json
//! { "alice": "c2VjcmV0LWE=", "bob": "c2VjcmV0LWI=" }
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use base64::Engine;
use tracing::info;

use crate::domain::trade::TraderId;
use crate::ports::IdentityProvider;

#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    keys: HashMap<TraderId, Vec<u8>>,
}

impl StaticIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a voter's key.
    #[must_use]
    pub fn with_key(mut self, voter: &str, key: &[u8]) -> Self {
        self.keys.insert(voter.to_string(), key.to_vec());
        self
    }

    /// Load keys from a JSON object of `voter -> base64 key`.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read voter keys: {}", path.display()))?;
        let identity = Self::from_json(&content)?;
        info!(path = %path.display(), voters = identity.len(), "Voter keys loaded");
        Ok(identity)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let encoded: HashMap<TraderId, String> =
            serde_json::from_str(content).context("Failed to parse voter keys JSON")?;
        let mut keys = HashMap::with_capacity(encoded.len());
        for (voter, key) in encoded {
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(key.trim())
                .with_context(|| format!("Invalid base64 key for voter {voter}"))?;
            anyhow::ensure!(!decoded.is_empty(), "Empty key for voter {voter}");
            keys.insert(voter, decoded);
        }
        Ok(Self { keys })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl IdentityProvider for StaticIdentity {
    fn attribution_key(&self, voter: &str) -> Option<Vec<u8>> {
        self.keys.get(voter).cloned()
    }
}
