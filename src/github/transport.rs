use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use std::collections::HashMap;
use tracing::debug;

use super::GitHubError;

/// Status, headers and body of one API call. Header names are lowercase.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    headers: HashMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, headers: &[(&str, &str)], body: &str) -> Self {
        Self {
            status,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
                .collect(),
            body: body.to_string(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The one HTTP operation the search client needs. Implementations return
/// every status as a response; only failures to get a response at all are errors.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str, query: &[(String, String)]) -> Result<HttpResponse, GitHubError>;
}

/// reqwest-backed transport carrying the token and GitHub headers.
pub struct ReqwestTransport {
    client: reqwest::Client,
    token: String,
}

impl ReqwestTransport {
    pub fn new(token: &str) -> Result<Self, GitHubError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("gh-analytics"));
        headers.insert("x-github-api-version", HeaderValue::from_static("2022-11-28"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(GitHubError::Client)?;

        Ok(Self {
            client,
            token: token.to_string(),
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str, query: &[(String, String)]) -> Result<HttpResponse, GitHubError> {
        let network = |source| GitHubError::Network {
            url: url.to_string(),
            source,
        };

        let response = self
            .client
            .get(url)
            .query(query)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(network)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(network)?;
        debug!(status, bytes = body.len(), "received response");

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive_on_insert() {
        let response = HttpResponse::new(200, &[("X-RateLimit-Remaining", "5")], "");
        assert_eq!(response.header("x-ratelimit-remaining"), Some("5"));
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn test_mock_serves_longest_prefix_in_order() {
        let transport = mock::MockTransport::new();
        transport.push("https://api/repos", HttpResponse::new(200, &[], "short"));
        transport.push("https://api/repos/a/b/pulls/1/reviews", HttpResponse::new(200, &[], "first"));
        transport.push("https://api/repos/a/b/pulls/1/reviews", HttpResponse::new(200, &[], "second"));

        let url = "https://api/repos/a/b/pulls/1/reviews";
        assert_eq!(transport.get(url, &[]).await.unwrap().body, "first");
        assert_eq!(transport.get(url, &[]).await.unwrap().body, "second");
        assert_eq!(transport.get(url, &[]).await.unwrap().status, 404);
        assert_eq!(transport.get("https://api/repos/x", &[]).await.unwrap().body, "short");
        assert_eq!(transport.requests().len(), 4);
    }
}
