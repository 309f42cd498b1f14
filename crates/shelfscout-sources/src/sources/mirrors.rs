use shelfscout_core::SourceKind;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Result, SourceError};
use crate::http::RateLimitedClient;

/// Interchangeable base URLs for one site. The last mirror that answered is
/// tried first on the next request.
pub struct MirrorSet {
    source: SourceKind,
    mirrors: Vec<String>,
    active: RwLock<String>,
}

impl MirrorSet {
    pub fn new(source: SourceKind, mirrors: Vec<String>) -> Self {
        let mirrors: Vec<String> = mirrors
            .into_iter()
            .map(|m| m.trim().trim_end_matches('/').to_string())
            .filter(|m| !m.is_empty())
            .collect();
        let active = mirrors.first().cloned().unwrap_or_default();
        Self {
            source,
            mirrors,
            active: RwLock::new(active),
        }
    }

    pub async fn active(&self) -> String {
        self.active.read().await.clone()
    }

    async fn order(&self) -> Vec<String> {
        let active = self.active().await;
        let mut order = Vec::with_capacity(self.mirrors.len());
        if !active.is_empty() {
            order.push(active);
        }
        for mirror in &self.mirrors {
            if !order.contains(mirror) {
                order.push(mirror.clone());
            }
        }
        order
    }

    /// GET `path_and_query` from the first mirror that answers. Returns the
    /// body and the mirror it came from.
    pub async fn fetch(
        &self,
        client: &RateLimitedClient,
        path_and_query: &str,
    ) -> Result<(String, String)> {
        let path = if path_and_query.starts_with('/') {
            path_and_query.to_string()
        } else {
            format!("/{path_and_query}")
        };

        let mut last_error: Option<SourceError> = None;
        for mirror in self.order().await {
            let url = format!("{mirror}{path}");
            match client.get(&url).await {
                Ok(body) => {
                    *self.active.write().await = mirror.clone();
                    return Ok((body, mirror));
                }
                Err(err) => {
                    debug!(source = %self.source, mirror = %mirror, error = %err, "mirror failed");
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| SourceError::NoMirror(self.source.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[tokio::test]
    async fn rotates_to_working_mirror_and_remembers_it() {
        let mut down = Server::new_async().await;
        let mut up = Server::new_async().await;
        let _d = down.mock("GET", "/ping").with_status(500).create_async().await;
        let ok = up
            .mock("GET", "/ping")
            .with_status(200)
            .with_body("pong")
            .expect(2)
            .create_async()
            .await;

        let mirrors = MirrorSet::new(SourceKind::LibGen, vec![down.url(), up.url()]);
        let client = RateLimitedClient::new_for_tests(0);

        let (body, mirror) = mirrors.fetch(&client, "ping").await.unwrap();
        assert_eq!(body, "pong");
        assert_eq!(mirror, up.url());
        assert_eq!(mirrors.active().await, up.url());

        mirrors.fetch(&client, "/ping").await.unwrap();
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn no_mirrors_is_an_error() {
        let mirrors = MirrorSet::new(SourceKind::AnnasArchive, vec!["  ".into()]);
        let client = RateLimitedClient::new_for_tests(0);
        let err = mirrors.fetch(&client, "/search").await.unwrap_err();
        assert!(matches!(err, SourceError::NoMirror(ref s) if s == "annas-archive"));
    }
}
