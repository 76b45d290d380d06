//! Credential resolution.
//!
//! Server configs reference secrets symbolically; the broker only
//! understands `token_ref = "keychain:<key>"` under `type = "oauth"`, which
//! it turns into an `Authorization: Bearer <token>` header by asking the
//! configured resolver for `<key>`.

use crate::broker::config::AuthConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;

/// Produces bearer tokens from symbolic keys.
#[async_trait]
pub trait CredentialResolver: Send + Sync + std::fmt::Debug {
    /// Resolve `key` to a token.
    async fn get(&self, key: &str) -> Result<String>;
}

/// Resolve a server's auth config to a bearer token.
///
/// Rejects unknown auth types, non-`keychain:` token refs, and blank
/// tokens.
pub async fn resolve_bearer(
    resolver: &dyn CredentialResolver,
    auth: &AuthConfig,
) -> Result<String> {
    if auth.auth_type != "oauth" {
        return Err(Error::Credential(format!(
            "unsupported auth type: {}",
            auth.auth_type
        )));
    }
    let key = auth
        .token_ref
        .strip_prefix("keychain:")
        .ok_or_else(|| Error::Credential(format!("unsupported token_ref: {}", auth.token_ref)))?;
    if key.trim().is_empty() {
        return Err(Error::Credential(format!(
            "unsupported token_ref: {}",
            auth.token_ref
        )));
    }

    let token = resolver.get(key).await?;
    if token.trim().is_empty() {
        return Err(Error::Credential("empty token".to_string()));
    }
    Ok(token)
}

/// In-memory resolver, primarily for embedding and tests.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    tokens: HashMap<String, String>,
}

impl StaticCredentials {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a token under `key`.
    pub fn with_token(mut self, key: impl Into<String>, token: impl Into<String>) -> Self {
        self.tokens.insert(key.into(), token.into());
        self
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentials {
    async fn get(&self, key: &str) -> Result<String> {
        self.tokens
            .get(key)
            .cloned()
            .ok_or_else(|| Error::Credential(format!("no credential for key '{key}'")))
    }
}

/// Resolver reading tokens from environment variables. The key is
/// uppercased, dashes become underscores, and the prefix is prepended:
/// key `github` with prefix `PRYX_TOKEN_` reads `PRYX_TOKEN_GITHUB`.
#[derive(Debug)]
pub struct EnvCredentials {
    prefix: String,
}

impl Default for EnvCredentials {
    fn default() -> Self {
        Self {
            prefix: "PRYX_TOKEN_".to_string(),
        }
    }
}

impl EnvCredentials {
    /// Resolver with the default `PRYX_TOKEN_` prefix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver with a custom prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn var_name(&self, key: &str) -> String {
        let suffix: String = key
            .chars()
            .map(|c| match c {
                '-' => '_',
                other => other.to_ascii_uppercase(),
            })
            .collect();
        format!("{}{}", self.prefix, suffix)
    }
}

#[async_trait]
impl CredentialResolver for EnvCredentials {
    async fn get(&self, key: &str) -> Result<String> {
        let name = self.var_name(key);
        std::env::var(&name).map_err(|_| Error::Credential(format!("{name} is not set")))
    }
}
