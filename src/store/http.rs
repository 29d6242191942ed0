//! Thin JSON client shared by the HTTP-backed stores.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::{Result, StoreError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
enum Auth {
    Bearer(String),
    Header(&'static str, String),
}

/// Authenticated client bound to one API base address.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    auth: Auth,
}

impl ApiClient {
    pub fn with_bearer(base_url: &str, token: &str) -> Result<Self> {
        Self::build(base_url, Auth::Bearer(token.to_string()))
    }

    pub fn with_header(base_url: &str, header: &'static str, value: &str) -> Result<Self> {
        Self::build(base_url, Auth::Header(header, value.to_string()))
    }

    fn build(base_url: &str, auth: Auth) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            auth,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let builder = self.client.request(method, url);
        match &self.auth {
            Auth::Bearer(token) => builder.bearer_auth(token),
            Auth::Header(name, value) => builder.header(*name, value),
        }
    }

    /// Sends the request; `Ok(None)` when the API answers 404.
    pub async fn json<T: DeserializeOwned>(&self, method: Method, path: &str) -> Result<Option<T>> {
        let response = self.request(method, path).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => Err(StoreError::Api {
                url: response.url().to_string(),
                status: status.as_u16(),
            }),
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        self.json(Method::GET, path).await
    }

    /// Plain-text body; `Ok(None)` on 404.
    pub async fn get_text(&self, path: &str) -> Result<Option<String>> {
        let response = self.request(Method::GET, path).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.text().await?)),
            status => Err(StoreError::Api {
                url: response.url().to_string(),
                status: status.as_u16(),
            }),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use super::fake::FakeApi;

    #[test]
    fn base_url_loses_trailing_slash() {
        let client = ApiClient::with_bearer("https://api.example.com/", "t").unwrap();
        assert_eq!(client.base_url(), "https://api.example.com");
    }

    #[tokio::test]
    async fn status_codes_map_to_results() {
        let api = FakeApi::serve(vec![
            ("GET /v1/ok", 200, r#"{"n": 1}"#.to_string()),
            ("GET /v1/down", 503, "{}".to_string()),
        ])
        .await;
        let client = ApiClient::with_bearer(&api.url("/v1"), "t").unwrap();

        let ok: Option<serde_json::Value> = client.get_json("ok").await.unwrap();
        assert_eq!(ok.unwrap()["n"], 1);

        let missing: Option<serde_json::Value> = client.get_json("missing").await.unwrap();
        assert!(missing.is_none());
        assert!(client.get_text("missing").await.unwrap().is_none());

        match client.get_json::<serde_json::Value>("down").await {
            Err(StoreError::Api { status, url }) => {
                assert_eq!(status, 503);
                assert!(url.ends_with("/v1/down"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(api.hits().len(), 4);
    }
}
