use crate::fetch::client::HttpClient;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

/// An [`HttpClient`] wrapper that appends an API key as a URL query parameter.
///
/// `param_name` is the query parameter name (e.g. `"key"` for the Google
/// geocoding API) and `key` is its value. The key is only exposed while the
/// outgoing request is built.
pub struct UrlParam<C> {
    pub inner: C,
    pub param_name: String,
    pub key: SecretString,
}

impl<C> UrlParam<C> {
    pub fn new(inner: C, param_name: impl Into<String>, key: SecretString) -> Self {
        Self {
            inner,
            param_name: param_name.into(),
            key,
        }
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for UrlParam<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.url_mut()
            .query_pairs_mut()
            .append_pair(&self.param_name, self.key.expose_secret());
        self.inner.execute(req).await
    }
}
