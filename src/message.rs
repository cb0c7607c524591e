//! Mail message types shared by the mailbox, extractor and publisher.

use std::fmt;

/// Mailbox-assigned identifier (IMAP sequence number) used to flag a message seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub u32);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sender, subject and plain-text body pulled out of a raw MIME message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageContent {
    /// Raw `From` header value, empty if absent.
    pub sender: String,
    /// Raw `Subject` header value, empty if absent.
    pub subject: String,
    /// Decoded body of the last `text/plain` part, empty if none.
    pub body: String,
}

impl MessageContent {
    /// Attach the mailbox identifier the content was fetched under.
    pub fn into_message(self, id: MessageId) -> MailMessage {
        MailMessage {
            id,
            sender: self.sender,
            subject: self.subject,
            body: self.body,
        }
    }
}

/// One fetched mailbox entry, ready to be filed as an issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub id: MessageId,
    pub sender: String,
    pub subject: String,
    pub body: String,
}
