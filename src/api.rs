use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures_util::Stream;
use reqwest::multipart::Form;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct Organization {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: Uuid,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub id: i64,
    pub name: String,
    pub is_embeddings_complete: bool,
    pub organization: i64,
}

/// A message as the server serializes it.
#[derive(Debug, Clone, Deserialize)]
pub struct WireMessage {
    pub id: i64,
    pub role: String,
    pub role_name: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Serialize)]
struct CreateOrganization<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct CreateChat {
    organization: i64,
}

#[derive(Serialize)]
struct OutgoingMessage<'a> {
    text: &'a str,
}

/// Client for the knowledge-base HTTP API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn organizations(&self) -> Result<Vec<Organization>> {
        let url = format!("{}/organization/", self.base_url);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to list organizations: {}", response.status()));
        }

        Ok(response.json().await?)
    }

    pub async fn create_organization(&self, name: &str) -> Result<Organization> {
        let url = format!("{}/organization/", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&CreateOrganization { name })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to create organization: {}", response.status()));
        }

        Ok(response.json().await?)
    }

    pub async fn chats(&self, organization: i64) -> Result<Vec<Chat>> {
        let url = format!("{}/organization/{}/chats/", self.base_url, organization);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to list chats: {}", response.status()));
        }

        Ok(response.json().await?)
    }

    pub async fn create_chat(&self, organization: i64) -> Result<Chat> {
        let url = format!("{}/chat/", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&CreateChat { organization })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to create chat: {}", response.status()));
        }

        Ok(response.json().await?)
    }

    pub async fn messages(&self, chat: Uuid) -> Result<Vec<WireMessage>> {
        let url = format!("{}/chat/{}/messages/", self.base_url, chat);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to fetch messages: {}", response.status()));
        }

        Ok(response.json().await?)
    }

    /// Send a message and return the raw reply byte stream. The body uses
    /// the `data: {...}\n\n` framing decoded by [`crate::stream`].
    pub async fn send_message(
        &self,
        chat: Uuid,
        text: &str,
    ) -> Result<impl Stream<Item = reqwest::Result<bytes::Bytes>>> {
        let url = format!("{}/chat/{}/message/", self.base_url, chat);
        let response = self
            .client
            .post(&url)
            .json(&OutgoingMessage { text })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to send message: {}", response.status()));
        }

        Ok(response.bytes_stream())
    }

    pub async fn documents(&self, organization: i64) -> Result<Vec<Document>> {
        let url = format!("{}/organization/{}/documents/", self.base_url, organization);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to list documents: {}", response.status()));
        }

        Ok(response.json().await?)
    }

    pub async fn upload_document(
        &self,
        organization: i64,
        name: &str,
        mime: &str,
        bytes: &[u8],
    ) -> Result<Document> {
        let url = format!("{}/document/", self.base_url);
        let form = Form::new()
            .text("organization", organization.to_string())
            .text("name", name.to_string())
            .text("mime", mime.to_string())
            .text("b64", document_payload(mime, bytes));

        let response = self.client.post(&url).multipart(form).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to upload document: {}", response.status()));
        }

        Ok(response.json().await?)
    }

    pub async fn delete_document(&self, id: i64) -> Result<()> {
        let url = format!("{}/document/{}/", self.base_url, id);
        let response = self.client.delete(&url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to delete document: {}", response.status()));
        }

        Ok(())
    }

    pub async fn download_document(&self, id: i64) -> Result<bytes::Bytes> {
        let url = format!("{}/document/{}/download", self.base_url, id);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to download document: {}", response.status()));
        }

        Ok(response.bytes().await?)
    }
}

/// The document endpoint stores the file as a data URI and splits it on
/// `";base64,"` server-side, so the prefix is part of the contract.
fn document_payload(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, BASE64.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_payload_is_a_data_uri() {
        let payload = document_payload("text/plain", b"hi");
        assert_eq!(payload, "data:text/plain;base64,aGk=");
        assert!(payload.contains(";base64,"));
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let api = ApiClient::new("http://localhost:8000/api/");
        assert_eq!(api.base_url, "http://localhost:8000/api");
    }

    #[test]
    fn test_wire_message_deserializes_server_shape() {
        let json = r#"{
            "id": 42,
            "created_at": "2025-01-01T00:00:00Z",
            "chat": "0c9a2b4e-0000-0000-0000-000000000000",
            "role": "assistant",
            "role_name": "Model",
            "text": "hello"
        }"#;

        let msg: WireMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.id, 42);
        assert_eq!(msg.role, "assistant");
        assert_eq!(msg.text.as_deref(), Some("hello"));
    }

    #[test]
    fn test_wire_message_text_may_be_null() {
        let msg: WireMessage = serde_json::from_str(
            r#"{"id": 1, "role": "user", "role_name": "User", "text": null}"#,
        )
        .unwrap();
        assert!(msg.text.is_none());
    }

    #[test]
    fn test_document_tolerates_extra_server_fields() {
        let doc: Document = serde_json::from_str(
            r#"{"id": 7, "name": "notes.txt", "mime": "text/plain", "text": null,
                "is_embeddings_complete": false, "organization": 3}"#,
        )
        .unwrap();
        assert_eq!(doc.name, "notes.txt");
        assert!(!doc.is_embeddings_complete);
    }
}
