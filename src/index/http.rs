use super::{IndexDocument, IndexSyncError, IndexSyncPort};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Retrieval index reached over HTTP.
///
/// `POST {base}/documents` with the document as JSON;
/// `DELETE {base}/documents/{id}`. Removing an unknown document (404)
/// counts as success.
#[derive(Clone)]
pub struct HttpIndexSync {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpIndexSync {
    pub fn new(base_url: impl Into<String>) -> Result<Self, IndexSyncError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, IndexSyncError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IndexSyncError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: None,
        })
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn documents_url(&self) -> String {
        format!("{}/documents", self.base_url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn transport_error(err: reqwest::Error) -> IndexSyncError {
    if err.is_connect() || err.is_timeout() {
        IndexSyncError::Unavailable(err.to_string())
    } else {
        IndexSyncError::Transport(err.to_string())
    }
}

async fn rejection(response: reqwest::Response) -> IndexSyncError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    IndexSyncError::Rejected { status, message }
}

#[async_trait]
impl IndexSyncPort for HttpIndexSync {
    async fn index(&self, document: IndexDocument) -> Result<(), IndexSyncError> {
        let request = self.client.post(self.documents_url()).json(&document);
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(transport_error)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(rejection(response).await)
        }
    }

    async fn remove(&self, document_id: &str) -> Result<(), IndexSyncError> {
        let url = format!("{}/{}", self.documents_url(), document_id);
        let response = self
            .authorize(self.client.delete(url))
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(rejection(response).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let port = HttpIndexSync::new("http://localhost:8900/rag/").unwrap();
        assert_eq!(port.base_url(), "http://localhost:8900/rag");
        assert_eq!(port.documents_url(), "http://localhost:8900/rag/documents");
    }

    #[tokio::test]
    async fn test_unreachable_index_is_retryable() {
        let port = HttpIndexSync::with_timeout("http://127.0.0.1:9", Duration::from_millis(200))
            .unwrap();
        let err = port.remove("doc-1").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
