use std::path::PathBuf;

use anyhow::{anyhow, Result};
use ratatui::widgets::ListState;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::api::{ApiClient, Chat, Document, Organization, WireMessage};
use crate::config::Config;
use crate::session::Conversation;
use crate::stream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Chat,
    Organizations,
    Documents,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// Results of background network work, applied on the main loop. Events
/// that belong to a selection carry its id so anything that arrives after
/// the user moved on is dropped instead of mutating the wrong buffer.
#[derive(Debug)]
pub enum NetEvent {
    Organizations(Result<Vec<Organization>>),
    OrganizationCreated(Result<Organization>),
    Chats {
        organization: i64,
        select_first: bool,
        result: Result<Vec<Chat>>,
    },
    ChatCreated(Result<Chat>),
    Messages {
        chat: Uuid,
        result: Result<Vec<WireMessage>>,
    },
    ReplyDelta {
        chat: Uuid,
        text: String,
    },
    ReplyClosed {
        chat: Uuid,
        result: Result<()>,
    },
    Documents {
        organization: i64,
        result: Result<Vec<Document>>,
    },
    DocumentUploaded(Result<Document>),
    DocumentDeleted {
        organization: i64,
        result: Result<()>,
    },
    DocumentDownloaded(Result<PathBuf>),
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub screen: Screen,
    pub input_mode: InputMode,
    pub status: Option<String>,

    // Organization picker
    pub organizations: Vec<Organization>,
    pub organization_state: ListState,
    pub organization: Option<Organization>,
    pub org_name_input: String,
    pub org_name_cursor: usize,

    // Chat screen
    pub chats: Vec<Chat>,
    pub chat_state: ListState,
    pub chat: Option<Chat>,
    pub show_chat_picker: bool,
    pub conversation: Conversation,
    pub message_input: String,
    pub message_cursor: usize,
    /// A reply stream is open; the send action is disabled until it closes.
    pub reply_open: bool,
    /// Scroll offset in lines from the bottom of the message log.
    pub chat_scroll: u16,
    pub chat_total_lines: u16,
    pub chat_height: u16,
    pub chat_width: u16,
    pub animation_frame: u8,

    // Documents screen
    pub documents: Vec<Document>,
    pub document_state: ListState,
    pub show_upload_input: bool,
    pub upload_path_input: String,
    pub upload_cursor: usize,

    api: ApiClient,
    net_tx: mpsc::UnboundedSender<NetEvent>,
    /// Organization remembered from the last session, applied once the
    /// first organization list arrives.
    remembered_organization: Option<i64>,
}

impl App {
    pub fn new(api: ApiClient, config: &Config) -> (Self, mpsc::UnboundedReceiver<NetEvent>) {
        let (net_tx, net_rx) = mpsc::unbounded_channel();

        let app = Self {
            should_quit: false,
            screen: Screen::Organizations,
            input_mode: InputMode::Normal,
            status: None,

            organizations: Vec::new(),
            organization_state: ListState::default(),
            organization: None,
            org_name_input: String::new(),
            org_name_cursor: 0,

            chats: Vec::new(),
            chat_state: ListState::default(),
            chat: None,
            show_chat_picker: false,
            conversation: Conversation::default(),
            message_input: String::new(),
            message_cursor: 0,
            reply_open: false,
            chat_scroll: 0,
            chat_total_lines: 0,
            chat_height: 0,
            chat_width: 0,
            animation_frame: 0,

            documents: Vec::new(),
            document_state: ListState::default(),
            show_upload_input: false,
            upload_path_input: String::new(),
            upload_cursor: 0,

            api,
            net_tx,
            remembered_organization: config.organization,
        };

        (app, net_rx)
    }

    // Selection helpers

    pub fn selected_organization(&self) -> Option<&Organization> {
        self.organization_state
            .selected()
            .and_then(|i| self.organizations.get(i))
    }

    pub fn selected_chat(&self) -> Option<&Chat> {
        self.chat_state.selected().and_then(|i| self.chats.get(i))
    }

    pub fn selected_document(&self) -> Option<&Document> {
        self.document_state
            .selected()
            .and_then(|i| self.documents.get(i))
    }

    pub fn organization_nav_down(&mut self) {
        nav_down(&mut self.organization_state, self.organizations.len());
    }

    pub fn organization_nav_up(&mut self) {
        nav_up(&mut self.organization_state);
    }

    pub fn chat_nav_down(&mut self) {
        nav_down(&mut self.chat_state, self.chats.len());
    }

    pub fn chat_nav_up(&mut self) {
        nav_up(&mut self.chat_state);
    }

    pub fn document_nav_down(&mut self) {
        nav_down(&mut self.document_state, self.documents.len());
    }

    pub fn document_nav_up(&mut self) {
        nav_up(&mut self.document_state);
    }

    /// Tick the "assistant is thinking" ellipsis while a reply is open.
    pub fn tick_animation(&mut self) {
        if self.reply_open {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_chat_up(&mut self) {
        let max = self.chat_total_lines.saturating_sub(self.chat_height);
        self.chat_scroll = self.chat_scroll.saturating_add(1).min(max);
    }

    pub fn scroll_chat_down(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    // Selection changes

    /// Make `organization` current: its chats and documents are refetched
    /// and the chat screen becomes active, mirroring the picker flow.
    pub fn select_organization(&mut self, organization: Organization) {
        let id = organization.id;
        self.organization = Some(organization);
        self.chats.clear();
        self.chat_state.select(None);
        self.chat = None;
        self.conversation.clear();
        self.reply_open = false;
        self.documents.clear();
        self.document_state.select(None);

        self.fetch_chats(id, true);
        self.fetch_documents(id);

        if let Err(e) = Config::save_organization(id) {
            tracing::warn!(error = %e, "failed to persist organization selection");
        }

        self.screen = Screen::Chat;
    }

    /// Switch the active chat. The conversation buffer is replaced
    /// wholesale; deltas from a previous chat's stream no longer match and
    /// get dropped.
    pub fn select_chat(&mut self, chat: Chat) {
        let id = chat.id;
        self.chat = Some(chat);
        self.conversation.clear();
        self.reply_open = false;
        self.chat_scroll = 0;
        self.show_chat_picker = false;

        self.fetch_messages(id);
    }

    // Background fetches

    pub fn fetch_organizations(&self) {
        let api = self.api.clone();
        let tx = self.net_tx.clone();
        tokio::spawn(async move {
            let result = api.organizations().await;
            let _ = tx.send(NetEvent::Organizations(result));
        });
    }

    pub fn create_organization(&self, name: String) {
        let api = self.api.clone();
        let tx = self.net_tx.clone();
        tokio::spawn(async move {
            let result = api.create_organization(&name).await;
            let _ = tx.send(NetEvent::OrganizationCreated(result));
        });
    }

    pub fn fetch_chats(&self, organization: i64, select_first: bool) {
        let api = self.api.clone();
        let tx = self.net_tx.clone();
        tokio::spawn(async move {
            let result = api.chats(organization).await;
            let _ = tx.send(NetEvent::Chats {
                organization,
                select_first,
                result,
            });
        });
    }

    pub fn create_chat(&self, organization: i64) {
        let api = self.api.clone();
        let tx = self.net_tx.clone();
        tokio::spawn(async move {
            let result = api.create_chat(organization).await;
            let _ = tx.send(NetEvent::ChatCreated(result));
        });
    }

    pub fn fetch_messages(&self, chat: Uuid) {
        let api = self.api.clone();
        let tx = self.net_tx.clone();
        tokio::spawn(async move {
            let result = api.messages(chat).await;
            let _ = tx.send(NetEvent::Messages { chat, result });
        });
    }

    pub fn fetch_documents(&self, organization: i64) {
        let api = self.api.clone();
        let tx = self.net_tx.clone();
        tokio::spawn(async move {
            let result = api.documents(organization).await;
            let _ = tx.send(NetEvent::Documents {
                organization,
                result,
            });
        });
    }

    pub fn upload_document(&self, organization: i64, path: PathBuf) {
        let api = self.api.clone();
        let tx = self.net_tx.clone();
        tokio::spawn(async move {
            let result = read_and_upload(&api, organization, &path).await;
            let _ = tx.send(NetEvent::DocumentUploaded(result));
        });
    }

    pub fn delete_document(&self, organization: i64, id: i64) {
        let api = self.api.clone();
        let tx = self.net_tx.clone();
        tokio::spawn(async move {
            let result = api.delete_document(id).await;
            let _ = tx.send(NetEvent::DocumentDeleted {
                organization,
                result,
            });
        });
    }

    pub fn download_document(&self, id: i64, name: String) {
        let api = self.api.clone();
        let tx = self.net_tx.clone();
        tokio::spawn(async move {
            let result = download_to_disk(&api, id, &name).await;
            let _ = tx.send(NetEvent::DocumentDownloaded(result));
        });
    }

    // Streaming submission

    /// Send the typed message to the active chat.
    ///
    /// Before any network activity the conversation gains the reply
    /// placeholder and the outgoing message, and the input clears. A
    /// background task then streams the reply; deltas come back as
    /// [`NetEvent::ReplyDelta`] so only this loop ever touches the buffer.
    /// Submissions are serialized per chat: nothing happens while a reply
    /// stream is still open.
    pub fn submit_message(&mut self) {
        // One reply stream, and therefore one placeholder, at a time.
        if self.reply_open || self.conversation.has_pending_reply() {
            return;
        }
        let text = self.message_input.trim().to_string();
        if text.is_empty() {
            return;
        }
        let Some(chat) = self.chat.as_ref() else {
            return;
        };
        let chat_id = chat.id;

        self.conversation.begin_exchange(&text);
        self.message_input.clear();
        self.message_cursor = 0;
        self.chat_scroll = 0;
        self.reply_open = true;

        let api = self.api.clone();
        let tx = self.net_tx.clone();
        tokio::spawn(async move {
            let result = stream_reply(&api, &tx, chat_id, &text).await;
            let _ = tx.send(NetEvent::ReplyClosed {
                chat: chat_id,
                result,
            });
        });
    }

    // Applying network results

    pub fn apply_net_event(&mut self, event: NetEvent) {
        match event {
            NetEvent::Organizations(Ok(organizations)) => {
                self.organizations = organizations;
                if self.organization_state.selected().is_none() && !self.organizations.is_empty() {
                    self.organization_state.select(Some(0));
                }
                if self.organization.is_none() {
                    if let Some(remembered) = self.remembered_organization.take() {
                        if let Some(org) =
                            self.organizations.iter().find(|o| o.id == remembered).cloned()
                        {
                            self.select_organization(org);
                        }
                    }
                }
            }
            NetEvent::Organizations(Err(e)) => self.fail("Failed to load organizations", &e),

            NetEvent::OrganizationCreated(Ok(organization)) => {
                self.org_name_input.clear();
                self.org_name_cursor = 0;
                self.fetch_organizations();
                self.select_organization(organization);
            }
            NetEvent::OrganizationCreated(Err(e)) => self.fail("Failed to create organization", &e),

            NetEvent::Chats {
                organization,
                select_first,
                result,
            } => {
                if self.organization.as_ref().map(|o| o.id) != Some(organization) {
                    return;
                }
                match result {
                    Ok(chats) => {
                        self.chats = chats;
                        if select_first {
                            if let Some(first) = self.chats.first().cloned() {
                                self.select_chat(first);
                            }
                        }
                        if self.chat_state.selected().is_none() && !self.chats.is_empty() {
                            self.chat_state.select(Some(0));
                        }
                    }
                    Err(e) => self.fail("Failed to load chats", &e),
                }
            }

            NetEvent::ChatCreated(Ok(chat)) => {
                self.chats.push(chat.clone());
                self.select_chat(chat);
            }
            NetEvent::ChatCreated(Err(e)) => self.fail("Failed to create chat", &e),

            NetEvent::Messages { chat, result } => {
                if self.chat.as_ref().map(|c| c.id) != Some(chat) {
                    return;
                }
                match result {
                    Ok(messages) => self.conversation.reconcile(messages),
                    Err(e) => self.fail("Failed to load messages", &e),
                }
            }

            NetEvent::ReplyDelta { chat, text } => {
                if self.chat.as_ref().map(|c| c.id) != Some(chat) {
                    return;
                }
                self.conversation.append_reply_delta(&text);
                self.chat_scroll = 0;
            }

            NetEvent::ReplyClosed { chat, result } => {
                if self.chat.as_ref().map(|c| c.id) != Some(chat) {
                    return;
                }
                self.reply_open = false;
                match result {
                    // Reconcile the optimistic buffer with the server record.
                    Ok(()) => self.fetch_messages(chat),
                    Err(e) => {
                        self.conversation.drop_pending_reply();
                        self.fail("Message failed", &e);
                    }
                }
            }

            NetEvent::Documents {
                organization,
                result,
            } => {
                if self.organization.as_ref().map(|o| o.id) != Some(organization) {
                    return;
                }
                match result {
                    Ok(documents) => {
                        self.documents = documents;
                        if self.document_state.selected().is_none() && !self.documents.is_empty() {
                            self.document_state.select(Some(0));
                        }
                    }
                    Err(e) => self.fail("Failed to load documents", &e),
                }
            }

            NetEvent::DocumentUploaded(Ok(document)) => {
                if self.organization.as_ref().map(|o| o.id) == Some(document.organization) {
                    self.documents.push(document);
                }
                self.status = Some("Document uploaded".to_string());
            }
            NetEvent::DocumentUploaded(Err(e)) => self.fail("Failed to upload document", &e),

            NetEvent::DocumentDeleted {
                organization,
                result,
            } => match result {
                Ok(()) => self.fetch_documents(organization),
                Err(e) => self.fail("Failed to delete document", &e),
            },

            NetEvent::DocumentDownloaded(Ok(path)) => {
                self.status = Some(format!("Saved to {}", path.display()));
            }
            NetEvent::DocumentDownloaded(Err(e)) => self.fail("Failed to download document", &e),
        }
    }

    fn fail(&mut self, what: &str, error: &anyhow::Error) {
        tracing::warn!(error = %error, "{what}");
        self.status = Some(format!("{what}: {error}"));
    }
}

async fn stream_reply(
    api: &ApiClient,
    tx: &mpsc::UnboundedSender<NetEvent>,
    chat: Uuid,
    text: &str,
) -> Result<()> {
    let body = api.send_message(chat, text).await?;
    stream::pump_reply(body, |delta| {
        let _ = tx.send(NetEvent::ReplyDelta {
            chat,
            text: delta.to_string(),
        });
    })
    .await
}

async fn read_and_upload(api: &ApiClient, organization: i64, path: &std::path::Path) -> Result<Document> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("Not a file path: {}", path.display()))?
        .to_string();
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let bytes = tokio::fs::read(path).await?;

    api.upload_document(organization, &name, mime.essence_str(), &bytes)
        .await
}

async fn download_to_disk(api: &ApiClient, id: i64, name: &str) -> Result<PathBuf> {
    let bytes = api.download_document(id).await?;

    let dir = dirs::download_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow!("Could not determine a download directory"))?;
    let path = dir.join(name);
    tokio::fs::write(&path, &bytes).await?;

    Ok(path)
}

fn nav_down(state: &mut ListState, len: usize) {
    if len > 0 {
        let i = state.selected().unwrap_or(0);
        state.select(Some((i + 1).min(len - 1)));
    }
}

fn nav_up(state: &mut ListState) {
    let i = state.selected().unwrap_or(0);
    state.select(Some(i.saturating_sub(1)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;

    fn test_app() -> App {
        let api = ApiClient::new("http://localhost:0/api");
        let (mut app, _rx) = App::new(api, &Config::default());
        app.chat = Some(Chat {
            id: Uuid::new_v4(),
            created_at: String::new(),
        });
        app
    }

    #[tokio::test]
    async fn test_submit_prepends_placeholder_and_clears_input() {
        let mut app = test_app();
        app.message_input = "Hello".to_string();

        app.submit_message();

        assert!(app.reply_open);
        assert!(app.message_input.is_empty());
        let msgs = app.conversation.messages();
        assert!(msgs[0].is_pending_reply());
        assert_eq!(msgs[1].text, "Hello");
    }

    #[tokio::test]
    async fn test_submit_is_blocked_while_reply_open() {
        let mut app = test_app();
        app.message_input = "first".to_string();
        app.submit_message();

        app.message_input = "second".to_string();
        app.submit_message();

        assert_eq!(app.message_input, "second");
        assert_eq!(app.conversation.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_reply_failure_rolls_back_placeholder_only() {
        let mut app = test_app();
        app.message_input = "Hello".to_string();
        app.submit_message();
        let chat = app.chat.as_ref().unwrap().id;

        app.apply_net_event(NetEvent::ReplyDelta {
            chat,
            text: "par".to_string(),
        });
        app.apply_net_event(NetEvent::ReplyClosed {
            chat,
            result: Err(anyhow!("connection reset")),
        });

        assert!(!app.reply_open);
        assert!(!app.conversation.has_pending_reply());
        assert_eq!(app.conversation.messages().len(), 1);
        assert_eq!(app.conversation.messages()[0].role, Role::User);
        assert!(app.status.as_deref().unwrap().contains("Message failed"));
    }

    #[tokio::test]
    async fn test_deltas_for_another_chat_are_dropped() {
        let mut app = test_app();
        app.message_input = "Hello".to_string();
        app.submit_message();

        app.apply_net_event(NetEvent::ReplyDelta {
            chat: Uuid::new_v4(),
            text: "stray".to_string(),
        });

        assert_eq!(app.conversation.messages()[0].text, "");
    }

    #[tokio::test]
    async fn test_deltas_accumulate_in_arrival_order() {
        let mut app = test_app();
        app.message_input = "Hello".to_string();
        app.submit_message();
        let chat = app.chat.as_ref().unwrap().id;

        for delta in ["Hi", " there"] {
            app.apply_net_event(NetEvent::ReplyDelta {
                chat,
                text: delta.to_string(),
            });
        }

        assert_eq!(app.conversation.messages()[0].text, "Hi there");
    }
}
