//! Gmail REST client

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::models::{ListMessagesResponse, Message, MessageRef};
use crate::oauth::{bearer_or_stale, CredentialProvider};

/// Read access to a mailbox
#[async_trait]
pub trait MailClient: Send + Sync {
    /// IDs of messages matching `query`, at most `limit` of them
    async fn list_message_ids(&self, query: &str, limit: u32) -> Result<Vec<MessageRef>>;

    /// Full payload of one message
    async fn get_message(&self, id: &MessageRef) -> Result<Message>;
}

/// [`MailClient`] backed by the Gmail API for the authenticated user
pub struct GmailClient {
    client: Client,
    api_base: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl GmailClient {
    pub fn new(api_base: impl Into<String>, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            credentials,
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/users/me/messages", self.api_base)
    }

    /// Attach the bearer credential if one is available
    async fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match bearer_or_stale(self.credentials.as_ref()).await {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<reqwest::Response> {
        let response = self
            .authorize(request)
            .await
            .send()
            .await
            .map_err(|e| Error::Provider {
                status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            debug!("{} not found: {}", what, body);
            return Err(Error::NotFound(what.to_string()));
        }

        error!("Gmail request for {} failed: {} - {}", what, status, body);
        Err(Error::Provider {
            status: status.as_u16(),
            reason: body,
        })
    }
}

#[async_trait]
impl MailClient for GmailClient {
    async fn list_message_ids(&self, query: &str, limit: u32) -> Result<Vec<MessageRef>> {
        let request = self
            .client
            .get(self.messages_url())
            .query(&[("q", query.to_string()), ("maxResults", limit.to_string())]);

        let response = self.send(request, "message list").await?;
        let listing: ListMessagesResponse = response.json().await?;

        let ids: Vec<MessageRef> = listing
            .messages
            .unwrap_or_default()
            .iter()
            .map(|stub| MessageRef::from_provider(&stub.id))
            .collect();

        info!("Listed {} messages for query {:?}", ids.len(), query);
        Ok(ids)
    }

    async fn get_message(&self, id: &MessageRef) -> Result<Message> {
        let url = format!(
            "{}/{}",
            self.messages_url(),
            urlencoding::encode(id.as_str())
        );
        let request = self.client.get(url).query(&[("format", "full")]);

        let response = self.send(request, id.as_str()).await?;
        let message: Message = response.json().await?;
        debug!("Fetched message {}", message.id);
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    struct NoCredentials;

    #[async_trait]
    impl CredentialProvider for NoCredentials {
        async fn refresh(&self) -> Result<String> {
            Err(Error::TokenRefreshFailed {
                reason: "offline".to_string(),
            })
        }

        fn cached(&self) -> Option<String> {
            None
        }
    }

    struct StaticToken(&'static str);

    #[async_trait]
    impl CredentialProvider for StaticToken {
        async fn refresh(&self) -> Result<String> {
            Ok(self.0.to_string())
        }

        fn cached(&self) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    fn client_for(server: &mockito::ServerGuard) -> GmailClient {
        GmailClient::new(
            format!("{}/gmail/v1", server.url()),
            Arc::new(StaticToken("tok")),
        )
    }

    #[test]
    fn test_api_base_trailing_slash() {
        let client = GmailClient::new("https://example.test/gmail/v1/", Arc::new(NoCredentials));
        assert_eq!(
            client.messages_url(),
            "https://example.test/gmail/v1/users/me/messages"
        );
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_provider_error() {
        // Nothing listens on the discard port
        let client = GmailClient::new("http://127.0.0.1:9/gmail/v1", Arc::new(NoCredentials));

        let err = client.list_message_ids("is:unread", 5).await.unwrap_err();
        assert!(matches!(err, Error::Provider { .. }));
        assert!(!err.is_not_found());

        let err = client
            .get_message(&MessageRef::from_provider("<abc>"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "PROVIDER_ERROR");
    }

    #[tokio::test]
    async fn test_list_sends_query_and_limit() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/gmail/v1/users/me/messages")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "is:unread".into()),
                Matcher::UrlEncoded("maxResults".into(), "5".into()),
            ]))
            .match_header("authorization", "Bearer tok")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"messages":[{"id":"<x1>","threadId":"t"},{"id":"x2","threadId":"t"}]}"#)
            .create_async()
            .await;

        let ids = client_for(&server)
            .list_message_ids("is:unread", 5)
            .await
            .unwrap();
        let ids: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["x1", "x2"]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_without_messages_is_empty() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/gmail/v1/users/me/messages")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"resultSizeEstimate":0}"#)
            .create_async()
            .await;

        let ids = client_for(&server)
            .list_message_ids("is:unread", 5)
            .await
            .unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn test_missing_message_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/gmail/v1/users/me/messages/abc")
            .match_query(Matcher::UrlEncoded("format".into(), "full".into()))
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"code":404,"message":"Requested entity was not found."}}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .get_message(&MessageRef::from_provider("<abc>"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.error_code(), "NOT_FOUND");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unauthorized_is_provider_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/gmail/v1/users/me/messages/abc")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body("Invalid Credentials")
            .create_async()
            .await;

        let err = client_for(&server)
            .get_message(&MessageRef::from_provider("abc"))
            .await
            .unwrap_err();
        match &err {
            Error::Provider { status, reason } => {
                assert_eq!(*status, 401);
                assert_eq!(reason, "Invalid Credentials");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(err.requires_reauth());
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn test_fetch_full_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/gmail/v1/users/me/messages/abc")
            .match_query(Matcher::UrlEncoded("format".into(), "full".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"id":"abc","threadId":"abc","payload":{"mimeType":"text/plain","body":{"size":5,"data":"aGVsbG8="}}}"#,
            )
            .create_async()
            .await;

        let message = client_for(&server)
            .get_message(&MessageRef::from_provider("abc"))
            .await
            .unwrap();
        assert_eq!(message.id, "abc");
        assert_eq!(message.payload.data(), Some("aGVsbG8="));
    }
}
