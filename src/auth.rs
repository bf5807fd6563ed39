// src/auth.rs
use std::sync::Arc;

/// Token supplier for streaming endpoints. Each call fetches a current token,
/// so the stream loader's single auth retry simply calls again.
#[async_trait::async_trait]
pub trait AuthTokenProvider: Send + Sync {
    async fn fetch_token(&self) -> Option<String>;
}

/// Fixed token (or none) — used for tests and for anonymous deployments.
pub struct StaticTokenProvider(Option<String>);

impl StaticTokenProvider {
    pub fn new(token: Option<String>) -> Arc<Self> {
        Arc::new(Self(token))
    }
}

#[async_trait::async_trait]
impl AuthTokenProvider for StaticTokenProvider {
    async fn fetch_token(&self) -> Option<String> {
        self.0.clone()
    }
}
