use async_trait::async_trait;
use reqwest::{Request, Response};

/// Executes prepared requests. Wrappers such as [`super::auth::UrlParam`]
/// decorate an inner client to add credentials.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
