use crate::fetch::client::HttpClient;
use async_trait::async_trait;

/// An [`HttpClient`] wrapper that appends a secret as a URL query parameter.
///
/// The daily export authenticates with `?token=<token>`, see [`UrlParam::token`].
/// Errors are stripped of their URL so the key never reaches logs.
pub struct UrlParam<C> {
    pub inner: C,
    pub param_name: String,
    pub key: String,
}

impl<C> UrlParam<C> {
    pub fn token(inner: C, key: String) -> Self {
        Self {
            inner,
            param_name: "token".to_string(),
            key,
        }
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for UrlParam<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.url_mut()
            .query_pairs_mut()
            .append_pair(&self.param_name, &self.key);
        self.inner
            .execute(req)
            .await
            .map_err(reqwest::Error::without_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records the URL of the last request and fails it, so no network is touched.
    #[derive(Default)]
    struct Recorder(Mutex<Option<String>>);

    #[async_trait]
    impl HttpClient for Recorder {
        async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            *self.0.lock().unwrap() = Some(req.url().to_string());
            reqwest::Client::new().get("not a url").send().await
        }
    }

    #[tokio::test]
    async fn test_token_is_appended() {
        let client = UrlParam::token(Recorder::default(), "s3cret".to_string());
        let req = reqwest::Request::new(
            reqwest::Method::GET,
            "https://example.org/export?date=2020-03-20".parse().unwrap(),
        );

        let _ = client.execute(req).await;

        assert_eq!(
            client.inner.0.lock().unwrap().as_deref(),
            Some("https://example.org/export?date=2020-03-20&token=s3cret")
        );
    }

    #[tokio::test]
    async fn test_error_does_not_expose_key() {
        use crate::fetch::BasicClient;

        let client = UrlParam::token(BasicClient::new(), "SUPERSECRET".to_string());
        let req = reqwest::Request::new(
            reqwest::Method::GET,
            "ftp://example.org/export?date=2020-03-20".parse().unwrap(),
        );

        let err = client.execute(req).await.unwrap_err();

        assert!(err.url().is_none());
        assert!(!err.to_string().contains("SUPERSECRET"));
        assert!(!format!("{err:?}").contains("SUPERSECRET"));
    }
}
