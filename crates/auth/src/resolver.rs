//! Token resolution port and the built-in resolvers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::capability::{NodeCapability, NodePolicy};
use crate::error::AuthError;

/// A resolved capability shared with the request that asked for it.
pub type Capability = Arc<dyn NodeCapability>;

/// Resolves a bearer token to a capability.
///
/// `Ok(None)` means authorization is disabled and every request is
/// allowed. `Err` means the token could not be evaluated at all.
#[async_trait]
pub trait TokenResolver: Send + Sync {
    /// Resolve `token`.
    async fn resolve(&self, token: &str) -> Result<Option<Capability>, AuthError>;
}

/// Resolver used when ACLs are turned off.
#[derive(Debug, Clone, Copy, Default)]
pub struct AclDisabled;

#[async_trait]
impl TokenResolver for AclDisabled {
    async fn resolve(&self, _token: &str) -> Result<Option<Capability>, AuthError> {
        Ok(None)
    }
}

/// Resolver backed by a fixed token table.
///
/// The empty token resolves to the anonymous policy. Unknown tokens fail
/// with [`AuthError::TokenNotFound`].
///
/// ```
/// use stratus_auth::{NodePolicy, StaticTokenResolver, TokenResolver};
///
/// # tokio_test_block_on(async {
/// let resolver = StaticTokenResolver::new(NodePolicy::Deny)
///     .with_token("ops-token", NodePolicy::Write);
///
/// let cap = resolver.resolve("ops-token").await.unwrap().unwrap();
/// assert!(cap.allow_node_write());
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Clone)]
pub struct StaticTokenResolver {
    anonymous: NodePolicy,
    tokens: HashMap<String, NodePolicy>,
}

impl StaticTokenResolver {
    /// Create a resolver with the given anonymous policy and no tokens.
    pub fn new(anonymous: NodePolicy) -> Self {
        Self {
            anonymous,
            tokens: HashMap::new(),
        }
    }

    /// Register a token.
    pub fn with_token(mut self, token: impl Into<String>, policy: NodePolicy) -> Self {
        self.tokens.insert(token.into(), policy);
        self
    }

    /// Register every `(token, policy)` pair.
    pub fn with_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = (S, NodePolicy)>,
        S: Into<String>,
    {
        self.tokens.extend(tokens.into_iter().map(|(t, p)| (t.into(), p)));
        self
    }

    /// Number of registered tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether no tokens are registered.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn lookup(&self, token: &str) -> Result<NodePolicy, AuthError> {
        if token.is_empty() {
            return Ok(self.anonymous);
        }
        if token.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(AuthError::malformed(
                "token contains whitespace or control characters",
            ));
        }
        self.tokens.get(token).copied().ok_or(AuthError::TokenNotFound)
    }
}

#[async_trait]
impl TokenResolver for StaticTokenResolver {
    async fn resolve(&self, token: &str) -> Result<Option<Capability>, AuthError> {
        let policy = self.lookup(token)?;
        tracing::trace!(%policy, "resolved ACL token");
        Ok(Some(Arc::new(policy)))
    }
}

impl std::fmt::Debug for StaticTokenResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenResolver")
            .field("anonymous", &self.anonymous)
            .field("tokens", &self.tokens.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> StaticTokenResolver {
        StaticTokenResolver::new(NodePolicy::Read)
            .with_token("writer", NodePolicy::Write)
            .with_token("nobody", NodePolicy::Deny)
    }

    #[tokio::test]
    async fn acl_disabled_resolves_to_none() {
        assert!(AclDisabled.resolve("anything").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn known_token_resolves_to_its_policy() {
        let cap = resolver().resolve("writer").await.unwrap().unwrap();
        assert!(cap.allow_node_write());

        let cap = resolver().resolve("nobody").await.unwrap().unwrap();
        assert!(!cap.allow_node_read());
    }

    #[tokio::test]
    async fn empty_token_uses_anonymous_policy() {
        let cap = resolver().resolve("").await.unwrap().unwrap();
        assert!(cap.allow_node_read());
        assert!(!cap.allow_node_write());
    }

    #[tokio::test]
    async fn unknown_token_is_not_found() {
        let err = resolver().resolve("stranger").await.unwrap_err();
        assert!(matches!(err, AuthError::TokenNotFound));
    }

    #[tokio::test]
    async fn token_with_whitespace_is_malformed() {
        let err = resolver().resolve("bad token").await.unwrap_err();
        assert!(matches!(err, AuthError::MalformedToken { .. }));
    }

    #[test]
    fn with_tokens_extends_table() {
        let r = StaticTokenResolver::new(NodePolicy::Deny)
            .with_tokens([("a", NodePolicy::Read), ("b", NodePolicy::Write)]);
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn debug_hides_token_values() {
        let rendered = format!("{:?}", resolver());
        assert!(!rendered.contains("writer"));
    }

    #[test]
    fn resolver_is_object_safe() {
        fn _takes(_: Arc<dyn TokenResolver>) {}
    }
}
