//! The persisted conversation store.
//!
//! [`ChatStore`] owns every session and message.  Sessions own their messages; the "current
//! messages" are the messages of the current session and are never stored separately.  Every
//! mutation of sessions, messages or the current-session pointer writes the projection
//! `{messages, sessions, currentSessionId}` to [`Storage`] under [`STORAGE_KEY`].  The one
//! exception is [`ChatStore::stage_message`], which patches in memory and leaves the write to the
//! next persisted mutation.  The loading and error flags are transient and never written.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::observability::{STORE_WRITE_ERRORS, STORE_WRITES};
use crate::storage::Storage;
use crate::types::{
    ApiMessage, Message, MessageDraft, MessageId, MessagePatch, Role, Session, SessionId,
};

/// Name of the record holding the persisted projection.
pub const STORAGE_KEY: &str = "chat-storage";

/// Title given to sessions that were not explicitly named.
pub const DEFAULT_SESSION_TITLE: &str = "New Chat";

const TITLE_CHARS: usize = 30;

/// Derive a session title from the first characters of `content`.
pub fn session_title_from(content: &str) -> String {
    content.trim().chars().take(TITLE_CHARS).collect()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PersistedStateRef<'a> {
    messages: &'a [Message],
    sessions: &'a [Session],
    current_session_id: Option<&'a SessionId>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct PersistedState {
    messages: Vec<Message>,
    sessions: Vec<Session>,
    current_session_id: Option<SessionId>,
}

/// State container for sessions, messages and the loading/error flags.
#[derive(Debug)]
pub struct ChatStore<S: Storage> {
    storage: S,
    sessions: Vec<Session>,
    current: Option<SessionId>,
    loading: bool,
    error: Option<String>,
}

impl<S: Storage> ChatStore<S> {
    /// Rehydrate a store from `storage`.
    ///
    /// An absent record yields an empty store.  A current-session pointer naming a session
    /// that does not exist is dropped.  Messages recorded without any current session are
    /// adopted into a new session so they stay reachable.
    pub fn load(storage: S) -> Result<Self> {
        let state = match storage.read(STORAGE_KEY)? {
            Some(text) => serde_json::from_str::<PersistedState>(&text).map_err(|err| {
                Error::serialization(
                    format!("failed to parse {STORAGE_KEY}: {err}"),
                    Some(Box::new(err)),
                )
            })?,
            None => PersistedState::default(),
        };

        let PersistedState {
            messages,
            mut sessions,
            current_session_id,
        } = state;
        let mut current =
            current_session_id.filter(|id| sessions.iter().any(|session| &session.id == id));
        if current.is_none() && !messages.is_empty() {
            let title = messages
                .iter()
                .find(|message| message.role == Role::User)
                .map(|message| session_title_from(&message.content))
                .filter(|title| !title.is_empty())
                .unwrap_or_else(|| DEFAULT_SESSION_TITLE.to_string());
            let mut session = Session::new(title);
            session.messages = messages;
            current = Some(session.id.clone());
            sessions.insert(0, session);
        }

        Ok(Self {
            storage,
            sessions,
            current,
            loading: false,
            error: None,
        })
    }

    /// Messages of the current session, or nothing when no session is current.
    pub fn messages(&self) -> &[Message] {
        self.current_session()
            .map(|session| session.messages.as_slice())
            .unwrap_or(&[])
    }

    /// All sessions, newest first.
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// Look up a session by id.
    pub fn session(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.iter().find(|session| &session.id == id)
    }

    /// The current session.
    pub fn current_session(&self) -> Option<&Session> {
        self.current.as_ref().and_then(|id| self.session(id))
    }

    /// Id of the current session.
    pub fn current_session_id(&self) -> Option<&SessionId> {
        self.current.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// The backing storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Give up the store and return its storage.
    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Append a message to the current session.
    ///
    /// When no session is current a [`DEFAULT_SESSION_TITLE`] session is created first.  A
    /// user message retitles a session that still carries the default title.  Clears the error.
    pub fn add_message(&mut self, draft: MessageDraft) -> Result<MessageId> {
        let message = Message::from_draft(draft);
        let id = message.id.clone();
        let index = match self.current_index() {
            Some(index) => index,
            None => {
                let session = Session::new(DEFAULT_SESSION_TITLE);
                self.current = Some(session.id.clone());
                self.sessions.insert(0, session);
                0
            }
        };

        let session = &mut self.sessions[index];
        if session.title == DEFAULT_SESSION_TITLE && message.role == Role::User {
            let title = session_title_from(&message.content);
            if !title.is_empty() {
                session.title = title;
            }
        }
        session.messages.push(message);
        session.touch();
        self.error = None;
        self.persist()?;
        Ok(id)
    }

    /// Patch a message of the current session in place.  Returns false if there is no such
    /// message.
    pub fn update_message(&mut self, id: &MessageId, patch: MessagePatch) -> Result<bool> {
        let Some(session) = self.current_session_mut() else {
            return Ok(false);
        };
        let Some(message) = session.messages.iter_mut().find(|m| &m.id == id) else {
            return Ok(false);
        };
        message.apply(patch);
        session.touch();
        self.persist()?;
        Ok(true)
    }

    /// Patch a message of the current session without writing to storage.  Returns false if
    /// there is no such message.
    ///
    /// The change reaches storage with the next persisted mutation.
    pub(crate) fn stage_message(&mut self, id: &MessageId, patch: MessagePatch) -> bool {
        let Some(session) = self.current_session_mut() else {
            return false;
        };
        let Some(message) = session.messages.iter_mut().find(|m| &m.id == id) else {
            return false;
        };
        message.apply(patch);
        true
    }

    /// Remove a message from the current session.  Returns false if there is no such message.
    pub fn remove_message(&mut self, id: &MessageId) -> Result<bool> {
        let Some(session) = self.current_session_mut() else {
            return Ok(false);
        };
        let before = session.messages.len();
        session.messages.retain(|m| &m.id != id);
        if session.messages.len() == before {
            return Ok(false);
        }
        session.touch();
        self.persist()?;
        Ok(true)
    }

    /// Empty the current session and clear the error.
    pub fn clear_history(&mut self) -> Result<()> {
        self.error = None;
        if let Some(session) = self.current_session_mut() {
            session.messages.clear();
            session.touch();
        }
        self.persist()
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    /// Record or clear the error.  Always clears the loading flag.
    pub fn set_error(&mut self, error: Option<String>) {
        self.error = error;
        self.loading = false;
    }

    /// Create an empty session at the front of the list and make it current.
    pub fn create_session(&mut self, title: impl Into<String>) -> Result<SessionId> {
        let session = Session::new(title);
        let id = session.id.clone();
        self.sessions.insert(0, session);
        self.current = Some(id.clone());
        self.error = None;
        self.persist()?;
        Ok(id)
    }

    /// Make `id` the current session.  Returns false, changing nothing, if it does not exist.
    pub fn load_session(&mut self, id: &SessionId) -> Result<bool> {
        if self.session(id).is_none() {
            return Ok(false);
        }
        self.current = Some(id.clone());
        self.error = None;
        self.persist()?;
        Ok(true)
    }

    /// Delete a session.  Deleting the current session promotes the first remaining one.
    pub fn delete_session(&mut self, id: &SessionId) -> Result<bool> {
        let before = self.sessions.len();
        self.sessions.retain(|session| &session.id != id);
        if self.sessions.len() == before {
            return Ok(false);
        }
        if self.current.as_ref() == Some(id) {
            self.current = self.sessions.first().map(|session| session.id.clone());
        }
        self.persist()?;
        Ok(true)
    }

    /// Rename a session.  Returns false if it does not exist.
    pub fn update_session_title(&mut self, id: &SessionId, title: impl Into<String>) -> Result<bool> {
        let Some(session) = self.sessions.iter_mut().find(|session| &session.id == id) else {
            return Ok(false);
        };
        session.title = title.into();
        session.touch();
        self.persist()?;
        Ok(true)
    }

    /// Sessions whose title or messages contain `query`, ignoring case, each with its
    /// position in [`sessions`](Self::sessions).  An empty query matches every session.
    pub fn search_sessions(&self, query: &str) -> Vec<(usize, &Session)> {
        self.sessions
            .iter()
            .enumerate()
            .filter(|(_, session)| session.matches(query))
            .collect()
    }

    /// The most recent user message of the current session.
    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages().iter().rev().find(|m| m.role == Role::User)
    }

    /// Id of the most recent assistant message answering the last user message.
    pub fn last_reply_id(&self) -> Option<MessageId> {
        let messages = self.messages();
        let start = messages.iter().rposition(|m| m.role == Role::User)?;
        messages[start..]
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.id.clone())
    }

    /// The history to send for the current session.
    ///
    /// Ends at the last user message.  Stopped messages and empty assistant messages are left
    /// out.  Empty when the session has no user message.
    pub fn request_history(&self) -> Vec<ApiMessage> {
        let messages = self.messages();
        let Some(end) = messages.iter().rposition(|m| m.role == Role::User) else {
            return Vec::new();
        };
        messages[..=end]
            .iter()
            .filter(|m| !m.is_stopped())
            .filter(|m| !(m.role == Role::Assistant && m.content.is_empty()))
            .map(Message::to_api_message)
            .collect()
    }

    fn current_index(&self) -> Option<usize> {
        let id = self.current.as_ref()?;
        self.sessions.iter().position(|session| &session.id == id)
    }

    fn current_session_mut(&mut self) -> Option<&mut Session> {
        let index = self.current_index()?;
        self.sessions.get_mut(index)
    }

    fn persist(&mut self) -> Result<()> {
        let state = PersistedStateRef {
            messages: self.messages(),
            sessions: &self.sessions,
            current_session_id: self.current.as_ref(),
        };
        let text = serde_json::to_string(&state).map_err(|err| {
            Error::serialization(
                format!("failed to serialize {STORAGE_KEY}: {err}"),
                Some(Box::new(err)),
            )
        })?;
        match self.storage.write(STORAGE_KEY, &text) {
            Ok(()) => {
                STORE_WRITES.click();
                Ok(())
            }
            Err(err) => {
                STORE_WRITE_ERRORS.click();
                Err(err)
            }
        }
    }
}
