use reqwest::{RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::codec::{Codec, JsonCodec};
use crate::error::{Error, Result};

/// Stateless JSON document transport
///
/// Every call is a single HTTP round trip: no retries, no caching.
#[derive(Debug, Clone)]
pub struct DocumentClient {
    http: reqwest::Client,
    base: Url,
}

impl DocumentClient {
    pub fn new(base: &str) -> Result<Self> {
        Self::with_client(reqwest::Client::new(), base)
    }

    pub fn with_client(http: reqwest::Client, base: &str) -> Result<Self> {
        let base = Url::parse(base).map_err(|e| Error::InvalidUrl(format!("{base}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(Error::InvalidUrl(format!("{base} cannot be a base URL")));
        }
        Ok(Self { http, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// `base` extended with percent-encoded path segments.
    pub fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(format!("{} cannot be a base URL", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET a JSON document
    pub async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let url = self.url(segments)?;
        debug!(%url, "GET");
        self.execute(self.http.get(url.clone()), &url).await
    }

    /// POST a JSON body and decode the JSON answer
    pub async fn post_json<B, T>(&self, segments: &[&str], body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(segments)?;
        debug!(%url, "POST");
        let request = self
            .http
            .post(url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(JsonCodec.encode(body)?);
        self.execute(request, &url).await
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder, url: &Url) -> Result<T> {
        let response = request.send().await.map_err(|e| Error::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            let detail = error_detail(&body);
            warn!(%url, %status, detail = detail.as_deref(), "document request failed");
            return Err(Error::Http {
                status: status.as_u16(),
                detail,
            });
        }

        let body = response.bytes().await.map_err(|e| Error::network(url, e))?;
        JsonCodec.decode(&body)
    }
}

/// The `detail` field of a JSON error body, if there is one.
pub fn error_detail(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    match value.get("detail")? {
        Value::Null => None,
        Value::String(detail) => Some(detail.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_encodes_segments() {
        let client = DocumentClient::new("http://localhost:3000").unwrap();
        assert_eq!(
            client.url(&["universe", "milky way"]).unwrap().as_str(),
            "http://localhost:3000/universe/milky%20way"
        );
    }

    #[test]
    fn url_keeps_base_path() {
        let client = DocumentClient::new("http://localhost:3000/api/").unwrap();
        assert_eq!(
            client.url(&["speech", "languages"]).unwrap().as_str(),
            "http://localhost:3000/api/speech/languages"
        );
    }

    #[test]
    fn detail_extraction() {
        assert_eq!(
            error_detail(br#"{"detail":"not found"}"#),
            Some("not found".to_string())
        );
        assert_eq!(
            error_detail(br#"{"detail":[{"loc":["body"]}]}"#),
            Some(r#"[{"loc":["body"]}]"#.to_string())
        );
        assert_eq!(error_detail(br#"{"detail":null}"#), None);
        assert_eq!(error_detail(b"<html>oops</html>"), None);
        assert_eq!(error_detail(b""), None);
    }
}
