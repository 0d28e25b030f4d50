//! REST adapter for the novella server.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde_json::Value;
use tracing::debug;

use novella_shared::codec::{encode_patch, Entity};
use novella_shared::models::{
    NewStory, ProfilePatch, ProfileUpsert, Story, StoryPatch, UserProfile,
};
use novella_shared::query::SearchQuery;
use novella_shared::SearchFilters;

use super::{RemoteError, RemoteResult, RemoteStore};
use crate::error::SyncError;

pub struct HttpRemote {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpRemote {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SyncError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| SyncError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::InvalidUrl(base_url.to_string()));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            token: None,
        })
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Append `segments` to the base path, percent-encoding each one so an
    /// id can never spill into another path segment or the query.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let resp = request.send().await.map_err(transport_error)?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        debug!(%status, body = %body, "Remote request rejected");
        Err(status_error(status, &body))
    }

    async fn entity<E: Entity>(&self, request: RequestBuilder) -> RemoteResult<E> {
        let resp = self.send(request).await?;
        let value: Value = resp.json().await.map_err(transport_error)?;
        E::decode(value).map_err(|e| RemoteError::Other(format!("Invalid response: {e}")))
    }

    async fn entities<E: Entity>(&self, request: RequestBuilder) -> RemoteResult<Vec<E>> {
        let resp = self.send(request).await?;
        let values: Vec<Value> = resp.json().await.map_err(transport_error)?;
        values
            .into_iter()
            .map(E::decode)
            .collect::<Result<_, _>>()
            .map_err(|e| RemoteError::Other(format!("Invalid response: {e}")))
    }
}

/// Map a transport-level failure. Anything that never produced a response
/// counts as unreachable.
fn transport_error(err: reqwest::Error) -> RemoteError {
    if err.is_decode() {
        RemoteError::Other(format!("Invalid response: {err}"))
    } else {
        RemoteError::Unreachable(err.to_string())
    }
}

/// Map a non-success HTTP status to the remote error taxonomy.
pub(crate) fn status_error(status: StatusCode, body: &str) -> RemoteError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(String::from))
        .unwrap_or_else(|| body.to_string());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::PermissionDenied(message),
        StatusCode::NOT_FOUND => RemoteError::NotFound,
        StatusCode::CONFLICT => RemoteError::AlreadyExists,
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            RemoteError::Unreachable(format!("{status}"))
        }
        s if s.is_server_error() => RemoteError::Unreachable(format!("{status}: {message}")),
        _ => RemoteError::Other(format!("{status}: {message}")),
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn list_stories(&self) -> RemoteResult<Vec<Story>> {
        self.entities(self.client.get(self.url(&["stories"]))).await
    }

    async fn get_story(&self, id: &str) -> RemoteResult<Story> {
        self.entity(self.client.get(self.url(&["stories", id])))
            .await
    }

    async fn create_story(&self, new: &NewStory) -> RemoteResult<Story> {
        self.entity(self.client.post(self.url(&["stories"])).json(new))
            .await
    }

    async fn import_story(&self, story: &Story) -> RemoteResult<Story> {
        self.entity(
            self.client
                .post(self.url(&["stories", "import"]))
                .json(&story.encode()),
        )
        .await
    }

    async fn update_story(&self, id: &str, patch: &StoryPatch) -> RemoteResult<Story> {
        self.entity(
            self.client
                .patch(self.url(&["stories", id]))
                .json(&encode_patch(patch)),
        )
        .await
    }

    async fn delete_story(&self, id: &str) -> RemoteResult<()> {
        self.send(self.client.delete(self.url(&["stories", id])))
            .await?;
        Ok(())
    }

    async fn search_stories(
        &self,
        text: &str,
        filters: &SearchFilters,
    ) -> RemoteResult<Vec<Story>> {
        let query = SearchQuery::from_parts(text, filters);
        self.entities(self.client.get(self.url(&["stories", "search"])).query(&query))
            .await
    }

    async fn popular_stories(&self, limit: usize) -> RemoteResult<Vec<Story>> {
        self.entities(
            self.client
                .get(self.url(&["stories", "popular"]))
                .query(&[("limit", limit)]),
        )
        .await
    }

    async fn recent_stories(&self, limit: usize) -> RemoteResult<Vec<Story>> {
        self.entities(
            self.client
                .get(self.url(&["stories", "recent"]))
                .query(&[("limit", limit)]),
        )
        .await
    }

    async fn stories_by_owner(&self, user_id: &str) -> RemoteResult<Vec<Story>> {
        self.entities(
            self.client
                .get(self.url(&["stories"]))
                .query(&[("userId", user_id)]),
        )
        .await
    }

    async fn list_profiles(&self) -> RemoteResult<Vec<UserProfile>> {
        self.entities(self.client.get(self.url(&["profiles"]))).await
    }

    async fn get_profile(&self, uid: &str) -> RemoteResult<UserProfile> {
        self.entity(self.client.get(self.url(&["profiles", uid])))
            .await
    }

    async fn upsert_profile(
        &self,
        uid: &str,
        upsert: &ProfileUpsert,
    ) -> RemoteResult<UserProfile> {
        self.entity(
            self.client
                .put(self.url(&["profiles", uid]))
                .json(upsert),
        )
        .await
    }

    async fn update_profile(
        &self,
        uid: &str,
        patch: &ProfilePatch,
    ) -> RemoteResult<UserProfile> {
        self.entity(
            self.client
                .patch(self.url(&["profiles", uid]))
                .json(patch),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_error(StatusCode::FORBIDDEN, r#"{"error":"Forbidden: bad token"}"#),
            RemoteError::PermissionDenied("Forbidden: bad token".into())
        );
        assert_eq!(status_error(StatusCode::NOT_FOUND, ""), RemoteError::NotFound);
        assert_eq!(status_error(StatusCode::CONFLICT, ""), RemoteError::AlreadyExists);
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, "upstream down"),
            RemoteError::Unreachable(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, "nope"),
            RemoteError::Other(msg) if msg.contains("nope")
        ));
    }

    #[test]
    fn test_base_url_is_normalised() {
        let remote = HttpRemote::new("http://localhost:3001/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            remote.url(&["stories"]).as_str(),
            "http://localhost:3001/api/stories"
        );
    }

    #[test]
    fn test_ids_are_percent_encoded_in_paths() {
        let remote = HttpRemote::new("http://localhost:3001/api", Duration::from_secs(1)).unwrap();
        assert_eq!(
            remote.url(&["stories", "2024/01?x#y"]).as_str(),
            "http://localhost:3001/api/stories/2024%2F01%3Fx%23y"
        );
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        assert!(matches!(
            HttpRemote::new("not a url", Duration::from_secs(1)),
            Err(SyncError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let remote =
            HttpRemote::new(&format!("http://127.0.0.1:{port}/api"), Duration::from_secs(2))
                .unwrap();

        let err = remote.list_stories().await.unwrap_err();
        assert!(matches!(err, RemoteError::Unreachable(_)));
    }
}
