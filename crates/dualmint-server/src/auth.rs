use std::collections::HashMap;

use eyre::{bail, Result};

/// Resolves a bearer token to the operator identity it belongs to.
pub trait OperatorAuth: Send + Sync {
    fn identify(&self, token: &str) -> Option<String>;
}

/// Fixed token table loaded at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuth {
    tokens: HashMap<String, String>,
}

impl StaticTokenAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, identity: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), identity.into());
        self
    }

    /// Parses `token=identity` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut auth = Self::new();
        for pair in pairs {
            let pair = pair.as_ref().trim();
            if pair.is_empty() {
                continue;
            }
            let Some((token, identity)) = pair.split_once('=') else {
                bail!("operator token must look like token=identity");
            };
            let (token, identity) = (token.trim(), identity.trim());
            if token.is_empty() || identity.is_empty() {
                bail!("operator token and identity must both be non-empty");
            }
            auth = auth.with_token(token, identity);
        }
        Ok(auth)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl OperatorAuth for StaticTokenAuth {
    fn identify(&self, token: &str) -> Option<String> {
        self.tokens.get(token).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_are_parsed_and_trimmed() {
        let auth = StaticTokenAuth::from_pairs([" abc = ops@example.com ", "", "def=treasury"])
            .expect("parse");
        assert_eq!(auth.len(), 2);
        assert_eq!(auth.identify("abc").as_deref(), Some("ops@example.com"));
        assert_eq!(auth.identify("def").as_deref(), Some("treasury"));
        assert_eq!(auth.identify("ghi"), None);
    }

    #[test]
    fn malformed_pairs_are_rejected() {
        assert!(StaticTokenAuth::from_pairs(["no-separator"]).is_err());
        assert!(StaticTokenAuth::from_pairs(["=ops"]).is_err());
        assert!(StaticTokenAuth::from_pairs(["abc="]).is_err());
    }
}
