//! Mailbox client: collect unread messages and acknowledge them.
//!
//! `collect_unread` is the failure boundary for the whole IMAP exchange.
//! Connection, login, folder and transport failures abort the sequence
//! and produce an empty batch. A failed unseen search is treated as "no
//! mail". A message that cannot be decoded is skipped and left unseen so
//! the rest of the batch still goes through.

pub mod imap;

pub use imap::{ImapMailbox, ImapSession};

use secrecy::ExposeSecret;
use tracing::{debug, error, info, warn};

use crate::config::MailboxConfig;
use crate::error::{ExtractError, MailboxError};
use crate::extract::extract;
use crate::message::{MailMessage, MessageId};

/// An open mailbox connection.
pub trait MailboxSession: Send {
    fn authenticate(&mut self, username: &str, password: &str) -> Result<(), MailboxError>;

    fn select_folder(&mut self, folder: &str) -> Result<(), MailboxError>;

    /// Server-side search for messages without the `\Seen` flag.
    fn search_unseen(&mut self) -> Result<Vec<MessageId>, MailboxError>;

    /// Full message (headers + body). Must not set `\Seen`.
    fn fetch_raw(&mut self, id: MessageId) -> Result<Vec<u8>, MailboxError>;

    fn mark_seen(&mut self, id: MessageId) -> Result<(), MailboxError>;

    /// Release the connection. Safe to call more than once and after errors.
    fn close(&mut self);
}

/// Opens mailbox sessions.
pub trait Mailbox: Send + Sync {
    fn connect(&self, config: &MailboxConfig) -> Result<Box<dyn MailboxSession>, MailboxError>;
}

/// Result of one collection pass.
#[derive(Debug, Default)]
pub struct UnreadBatch {
    /// Messages fetched and flagged, in mailbox search order.
    pub messages: Vec<MailMessage>,
    /// Messages left unseen because their content could not be decoded.
    pub skipped: Vec<MessageId>,
    /// Failure that aborted the pass. `messages` is empty when set.
    pub failure: Option<MailboxError>,
}

impl UnreadBatch {
    fn aborted(failure: MailboxError) -> Self {
        Self {
            messages: Vec::new(),
            skipped: Vec::new(),
            failure: Some(failure),
        }
    }
}

/// Unseen message ids, or none if the search fails.
pub fn list_unseen(session: &mut dyn MailboxSession) -> Vec<MessageId> {
    match session.search_unseen() {
        Ok(ids) => ids,
        Err(e) => {
            warn!(error = %e, "Unseen search failed, treating mailbox as empty");
            Vec::new()
        }
    }
}

/// Connect, log in, select the folder, then fetch, extract and flag every
/// unseen message. The session is always closed once opened.
pub fn collect_unread(mailbox: &dyn Mailbox, config: &MailboxConfig) -> UnreadBatch {
    let mut session = match mailbox.connect(config) {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, "Could not connect to mailbox");
            return UnreadBatch::aborted(e);
        }
    };

    let result = collect_from_session(session.as_mut(), config);
    session.close();

    match result {
        Ok(batch) => {
            info!(
                fetched = batch.messages.len(),
                skipped = batch.skipped.len(),
                "Collected unread mail"
            );
            batch
        }
        Err(e) => {
            error!(error = %e, "Mailbox collection aborted, no messages processed this run");
            UnreadBatch::aborted(e)
        }
    }
}

fn collect_from_session(
    session: &mut dyn MailboxSession,
    config: &MailboxConfig,
) -> Result<UnreadBatch, MailboxError> {
    session.authenticate(&config.username, config.password.expose_secret())?;
    session.select_folder(&config.folder)?;

    let ids = list_unseen(session);
    debug!(count = ids.len(), folder = %config.folder, "Unseen messages");

    let mut batch = UnreadBatch::default();
    for id in ids {
        let raw = session.fetch_raw(id)?;
        let content = match extract(&raw) {
            Ok(content) => content,
            Err(e) => {
                log_skip(id, &e);
                batch.skipped.push(id);
                continue;
            }
        };
        batch.messages.push(content.into_message(id));

        if let Err(e) = session.mark_seen(id) {
            match e {
                MailboxError::Store { .. } => {
                    warn!(id = %id, error = %e, "Could not flag message as seen, it may be filed again next run");
                }
                other => return Err(other),
            }
        }
    }
    Ok(batch)
}

fn log_skip(id: MessageId, e: &ExtractError) {
    warn!(id = %id, error = %e, "Skipping undecodable message, leaving it unseen");
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scriptable in-memory mailbox.

    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Debug, Clone, Default)]
    pub struct FakeMailbox {
        pub messages: Vec<(u32, Vec<u8>)>,
        pub fail_connect: bool,
        pub fail_auth: bool,
        pub fail_select: bool,
        pub fail_search: bool,
        pub fail_fetch: Option<u32>,
        pub reject_store: Option<u32>,
        pub calls: Arc<Mutex<Vec<String>>>,
    }

    impl FakeMailbox {
        pub fn with_messages(messages: Vec<(u32, Vec<u8>)>) -> Self {
            Self {
                messages,
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn seen(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter(|c| c.starts_with("seen "))
                .collect()
        }
    }

    pub fn plain_message(subject: &str, body: &str) -> Vec<u8> {
        format!(
            "From: sender@example.com\r\nSubject: {subject}\r\nContent-Type: text/plain\r\n\r\n{body}"
        )
        .into_bytes()
    }

    struct FakeSession {
        mailbox: FakeMailbox,
    }

    impl FakeSession {
        fn record(&self, call: String) {
            self.mailbox.calls.lock().unwrap().push(call);
        }
    }

    impl Mailbox for FakeMailbox {
        fn connect(
            &self,
            config: &MailboxConfig,
        ) -> Result<Box<dyn MailboxSession>, MailboxError> {
            self.calls.lock().unwrap().push("connect".into());
            if self.fail_connect {
                return Err(MailboxError::Connection {
                    host: config.server.clone(),
                    reason: "refused".into(),
                });
            }
            Ok(Box::new(FakeSession {
                mailbox: self.clone(),
            }))
        }
    }

    impl MailboxSession for FakeSession {
        fn authenticate(&mut self, username: &str, _password: &str) -> Result<(), MailboxError> {
            self.record("login".into());
            if self.mailbox.fail_auth {
                return Err(MailboxError::Auth {
                    username: username.into(),
                    reason: "NO invalid credentials".into(),
                });
            }
            Ok(())
        }

        fn select_folder(&mut self, folder: &str) -> Result<(), MailboxError> {
            self.record(format!("select {folder}"));
            if self.mailbox.fail_select {
                return Err(MailboxError::Folder {
                    folder: folder.into(),
                    reason: "NO no such mailbox".into(),
                });
            }
            Ok(())
        }

        fn search_unseen(&mut self) -> Result<Vec<MessageId>, MailboxError> {
            self.record("search".into());
            if self.mailbox.fail_search {
                return Err(MailboxError::Search("BAD".into()));
            }
            Ok(self
                .mailbox
                .messages
                .iter()
                .map(|(id, _)| MessageId(*id))
                .collect())
        }

        fn fetch_raw(&mut self, id: MessageId) -> Result<Vec<u8>, MailboxError> {
            self.record(format!("fetch {id}"));
            if self.mailbox.fail_fetch == Some(id.0) {
                return Err(MailboxError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "reset",
                )));
            }
            self.mailbox
                .messages
                .iter()
                .find(|(n, _)| *n == id.0)
                .map(|(_, raw)| raw.clone())
                .ok_or_else(|| MailboxError::Fetch {
                    id,
                    reason: "no such message".into(),
                })
        }

        fn mark_seen(&mut self, id: MessageId) -> Result<(), MailboxError> {
            if self.mailbox.reject_store == Some(id.0) {
                self.record(format!("store-rejected {id}"));
                return Err(MailboxError::Store {
                    id,
                    reason: "NO read-only".into(),
                });
            }
            self.record(format!("seen {id}"));
            Ok(())
        }

        fn close(&mut self) {
            self.record("close".into());
        }
    }
}
