use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::blocking::{Client, Response};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;

use crate::catalog::{Answer, Answerer, AskReply, AskRequest, Catalog, DistancesEnvelope, HierarchyEnvelope};
use crate::distance::DistanceTable;
use crate::error::{Result, VerbumError};
use crate::hierarchy::HierarchyNode;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Catalog and answerer backed by the document server's JSON API.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base: Url,
}

impl HttpBackend {
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base)
            .map_err(|err| VerbumError::invalid(format!("server URL '{}': {}", base, err)))?;
        if base.cannot_be_a_base() {
            return Err(VerbumError::invalid(format!("server URL '{}' cannot hold paths", base)));
        }
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// `base` plus one percent-encoded path segment per item.
    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| VerbumError::invalid(format!("server URL '{}' cannot hold paths", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub fn hierarchy_url(&self) -> Result<Url> {
        self.endpoint(["api", "hierarchy"])
    }

    /// Level 0 is the root; deeper levels name their folder with `?path=a/b`.
    pub fn distances_url(&self, path: &[String]) -> Result<Url> {
        let level = format!("level-{}", path.len());
        let mut url = self.endpoint(["api", "semantic-distances", level.as_str()])?;
        if !path.is_empty() {
            url.query_pairs_mut().append_pair("path", &path.join("/"));
        }
        Ok(url)
    }

    pub fn document_url(&self, path: &str, token: u128) -> Result<Url> {
        let segments = std::iter::once("api")
            .chain(std::iter::once("document"))
            .chain(path.split('/').filter(|s| !s.is_empty()));
        let mut url = self.endpoint(segments)?;
        url.query_pairs_mut().append_pair("t", &token.to_string());
        Ok(url)
    }

    pub fn ask_url(&self) -> Result<Url> {
        self.endpoint(["api", "ask"])
    }

    fn get(&self, url: Url) -> Result<Response> {
        tracing::debug!("GET {}", url);
        Ok(self.client.get(url).send()?)
    }

    fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = ensure_success(self.get(url)?)?;
        let body = response.text()?;
        Ok(serde_json::from_str(&body)?)
    }
}

fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(VerbumError::Status {
            status: status.as_u16(),
            url: response.url().to_string(),
        })
    }
}

fn cache_bust_token() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default()
}

impl Catalog for HttpBackend {
    fn hierarchy(&self) -> Result<HierarchyNode> {
        let envelope: HierarchyEnvelope = self.get_json(self.hierarchy_url()?)?;
        tracing::info!(
            "Fetched hierarchy with {} nodes from {}",
            envelope.hierarchy.len(),
            self.base
        );
        Ok(envelope.hierarchy)
    }

    fn level_distances(&self, path: &[String]) -> Result<DistanceTable> {
        let url = self.distances_url(path)?;
        let response = self.get(url)?;
        if response.status() == StatusCode::NOT_FOUND && !path.is_empty() {
            tracing::debug!("No distances served for /{}", path.join("/"));
            return Ok(DistanceTable::new());
        }
        let body = ensure_success(response)?.text()?;
        let envelope: DistancesEnvelope = serde_json::from_str(&body)?;
        envelope.into_table()
    }

    fn document(&self, path: &str) -> Result<Vec<u8>> {
        let response = ensure_success(self.get(self.document_url(path, cache_bust_token())?)?)?;
        Ok(response.bytes()?.to_vec())
    }

    fn describe(&self) -> String {
        self.base.to_string()
    }
}

impl Answerer for HttpBackend {
    fn ask(&self, request: &AskRequest) -> Result<Answer> {
        let url = self.ask_url()?;
        tracing::info!("Asking about {}", request.document);
        let response = self.client.post(url).json(request).send()?;
        let status = response.status();
        let final_url = response.url().to_string();
        let body = response.text()?;

        match serde_json::from_str::<AskReply>(&body) {
            Ok(reply) => reply.into_answer(),
            Err(_) if !status.is_success() => Err(VerbumError::Status {
                status: status.as_u16(),
                url: final_url,
            }),
            Err(err) => Err(VerbumError::malformed(format!("ask reply: {}", err))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(base: &str) -> HttpBackend {
        HttpBackend::new(base, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_urls_follow_api_layout() {
        let http = backend("http://127.0.0.1:5000");
        assert_eq!(http.hierarchy_url().unwrap().as_str(), "http://127.0.0.1:5000/api/hierarchy");
        assert_eq!(
            http.distances_url(&[]).unwrap().as_str(),
            "http://127.0.0.1:5000/api/semantic-distances/level-0"
        );
        assert_eq!(http.ask_url().unwrap().as_str(), "http://127.0.0.1:5000/api/ask");
    }

    #[test]
    fn test_deeper_levels_carry_their_path() {
        let http = backend("http://localhost:5000/");
        let path = vec!["Physics".to_string(), "Quantum Fields".to_string()];
        assert_eq!(
            http.distances_url(&path).unwrap().as_str(),
            "http://localhost:5000/api/semantic-distances/level-2?path=Physics%2FQuantum+Fields"
        );
    }

    #[test]
    fn test_document_segments_are_encoded() {
        let http = backend("http://localhost:5000/viewer/");
        let url = http.document_url("Math/Linear Algebra #2.pdf", 17).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:5000/viewer/api/document/Math/Linear%20Algebra%20%232.pdf?t=17"
        );
    }

    #[test]
    fn test_rejects_unusable_base() {
        assert!(HttpBackend::new("not a url", Duration::from_secs(1)).is_err());
        assert!(HttpBackend::new("mailto:someone@example.com", Duration::from_secs(1)).is_err());
    }
}
