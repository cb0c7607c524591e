//! Minimal IMAP4rev1 client over implicit TLS (rustls).
//!
//! Only the commands the bot needs: LOGIN, SELECT, SEARCH UNSEEN,
//! FETCH BODY.PEEK[], STORE +FLAGS (\Seen) and LOGOUT. The session is
//! generic over the byte stream so the protocol handling can be driven by
//! an in-memory transcript in tests.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use rustls_pki_types::ServerName;
use tracing::debug;

use crate::config::{IMAP_TIMEOUT, MailboxConfig};
use crate::error::MailboxError;
use crate::mailbox::{Mailbox, MailboxSession};
use crate::message::MessageId;

/// TLS-wrapped TCP stream used for real servers.
pub type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

// ── Responses ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Ok,
    No,
    Bad,
}

/// Everything the server sent for one tagged command.
#[derive(Debug, Default)]
struct Response {
    /// Untagged lines, literal data removed.
    untagged: Vec<String>,
    /// Literal payloads in the order received.
    literals: Vec<Vec<u8>>,
    status: Option<Status>,
    /// Text after the status word of the tagged line.
    text: String,
}

impl Response {
    fn is_ok(&self) -> bool {
        self.status == Some(Status::Ok)
    }

    fn describe(&self) -> String {
        match self.status {
            Some(Status::No) => format!("NO {}", self.text),
            Some(Status::Bad) => format!("BAD {}", self.text),
            _ => self.text.clone(),
        }
    }
}

// ── Session ─────────────────────────────────────────────────────────

/// One authenticated-or-not IMAP connection.
pub struct ImapSession<S: Read + Write> {
    stream: BufReader<S>,
    next_tag: u32,
    closed: bool,
}

impl<S: Read + Write> ImapSession<S> {
    /// Wrap a connected stream and consume the server greeting.
    pub fn new(stream: S) -> Result<Self, MailboxError> {
        let mut session = Self {
            stream: BufReader::new(stream),
            next_tag: 1,
            closed: false,
        };
        let greeting = session.read_line()?;
        let greeting = String::from_utf8_lossy(&greeting);
        if !(greeting.starts_with("* OK") || greeting.starts_with("* PREAUTH")) {
            return Err(MailboxError::Protocol(format!(
                "unexpected greeting: {}",
                greeting.trim_end()
            )));
        }
        Ok(session)
    }

    fn read_line(&mut self) -> Result<Vec<u8>, MailboxError> {
        let mut buf = Vec::new();
        let n = self.stream.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Err(MailboxError::Protocol("IMAP connection closed".into()));
        }
        Ok(buf)
    }

    fn next_tag(&mut self) -> String {
        let tag = format!("A{}", self.next_tag);
        self.next_tag += 1;
        tag
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), MailboxError> {
        let stream = self.stream.get_mut();
        stream.write_all(bytes)?;
        stream.flush()?;
        Ok(())
    }

    /// Send one tagged command and read until its tagged completion.
    fn command(&mut self, cmd: &str) -> Result<Response, MailboxError> {
        self.command_with_args(cmd, &[])
    }

    /// Like [`command`](Self::command), with string arguments appended.
    ///
    /// Arguments that fit an IMAP quoted string are sent quoted. Anything
    /// else (non-ASCII, CR or LF) goes as a synchronizing literal, which
    /// waits for the server's `+` continuation before the data is sent.
    fn command_with_args(&mut self, verb: &str, args: &[&str]) -> Result<Response, MailboxError> {
        let tag = self.next_tag();
        let mut pending = format!("{tag} {verb}");
        for arg in args {
            pending.push(' ');
            if let Some(quoted) = quote(arg) {
                pending.push_str(&quoted);
                continue;
            }
            pending.push_str(&format!("{{{}}}\r\n", arg.len()));
            self.send(pending.as_bytes())?;
            if let Some(done) = self.await_continuation(&tag)? {
                return Ok(done);
            }
            pending = arg.to_string();
        }
        pending.push_str("\r\n");
        self.send(pending.as_bytes())?;
        self.read_response(&tag)
    }

    /// Wait for `+` after a literal marker. A tagged completion here means
    /// the server refused the command early; it is returned as-is.
    fn await_continuation(&mut self, tag: &str) -> Result<Option<Response>, MailboxError> {
        let prefix = format!("{tag} ");
        loop {
            let line = self.read_line()?;
            let text = String::from_utf8_lossy(&line);
            let text = text.trim_end();
            if text.starts_with('+') {
                return Ok(None);
            }
            if let Some(rest) = text.strip_prefix(&prefix) {
                return completion(tag, rest, Response::default()).map(Some);
            }
        }
    }

    fn read_response(&mut self, tag: &str) -> Result<Response, MailboxError> {
        let prefix = format!("{tag} ");
        let mut response = Response::default();
        loop {
            let mut line = self.read_line()?;
            let mut text = String::new();

            while let Some(len) = literal_len(&line) {
                let head = String::from_utf8_lossy(&line);
                text.push_str(head.trim_end());
                response.literals.push(self.read_literal(len)?);
                line = self.read_line()?;
            }
            text.push_str(String::from_utf8_lossy(&line).trim_end());

            if let Some(rest) = text.strip_prefix(&prefix) {
                return completion(tag, rest, response);
            }

            response.untagged.push(text);
        }
    }

    /// Read a `{len}` literal. The buffer grows with the bytes actually
    /// received, never with the announced length alone.
    fn read_literal(&mut self, len: usize) -> Result<Vec<u8>, MailboxError> {
        let mut data = Vec::new();
        (&mut self.stream).take(len as u64).read_to_end(&mut data)?;
        if data.len() != len {
            return Err(MailboxError::Protocol(format!(
                "literal truncated: announced {len} bytes, received {}",
                data.len()
            )));
        }
        Ok(data)
    }
}

/// Fill in the status of a tagged completion line (`rest` follows the tag).
fn completion(tag: &str, rest: &str, mut response: Response) -> Result<Response, MailboxError> {
    let (word, tail) = rest.split_once(' ').unwrap_or((rest, ""));
    response.status = Some(match word.to_ascii_uppercase().as_str() {
        "OK" => Status::Ok,
        "NO" => Status::No,
        "BAD" => Status::Bad,
        other => {
            return Err(MailboxError::Protocol(format!(
                "unknown completion status {other:?} for {tag}"
            )));
        }
    });
    response.text = tail.to_string();
    Ok(response)
}

impl<S: Read + Write + Send> MailboxSession for ImapSession<S> {
    fn authenticate(&mut self, username: &str, password: &str) -> Result<(), MailboxError> {
        let auth_err = |reason: String| MailboxError::Auth {
            username: username.to_string(),
            reason,
        };
        if username.contains('\0') || password.contains('\0') {
            return Err(auth_err("credentials contain NUL".into()));
        }

        let resp = self.command_with_args("LOGIN", &[username, password])?;
        if !resp.is_ok() {
            return Err(auth_err(resp.describe()));
        }
        debug!(username, "IMAP login accepted");
        Ok(())
    }

    fn select_folder(&mut self, folder: &str) -> Result<(), MailboxError> {
        if folder.contains('\0') {
            return Err(MailboxError::Folder {
                folder: folder.to_string(),
                reason: "folder name contains NUL".into(),
            });
        }
        let resp = self.command_with_args("SELECT", &[folder])?;
        if !resp.is_ok() {
            return Err(MailboxError::Folder {
                folder: folder.to_string(),
                reason: resp.describe(),
            });
        }
        Ok(())
    }

    fn search_unseen(&mut self) -> Result<Vec<MessageId>, MailboxError> {
        let resp = self.command("SEARCH UNSEEN")?;
        if !resp.is_ok() {
            return Err(MailboxError::Search(resp.describe()));
        }

        let mut ids = Vec::new();
        for line in &resp.untagged {
            let Some(rest) = line.strip_prefix("* SEARCH") else {
                continue;
            };
            for token in rest.split_whitespace() {
                let n = token.parse().map_err(|_| {
                    MailboxError::Search(format!("non-numeric id {token:?} in SEARCH response"))
                })?;
                ids.push(MessageId(n));
            }
        }
        Ok(ids)
    }

    fn fetch_raw(&mut self, id: MessageId) -> Result<Vec<u8>, MailboxError> {
        let resp = self.command(&format!("FETCH {id} BODY.PEEK[]"))?;
        if !resp.is_ok() {
            return Err(MailboxError::Fetch {
                id,
                reason: resp.describe(),
            });
        }
        resp.literals
            .into_iter()
            .next()
            .ok_or_else(|| MailboxError::Fetch {
                id,
                reason: "no message literal in FETCH response".into(),
            })
    }

    fn mark_seen(&mut self, id: MessageId) -> Result<(), MailboxError> {
        let resp = self.command(&format!("STORE {id} +FLAGS (\\Seen)"))?;
        if !resp.is_ok() {
            return Err(MailboxError::Store {
                id,
                reason: resp.describe(),
            });
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.command("LOGOUT") {
            debug!("IMAP logout failed: {e}");
        }
    }
}

/// Length of a trailing `{N}` literal marker, if the line ends with one.
fn literal_len(line: &[u8]) -> Option<usize> {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let inner = line.strip_suffix(b"}")?;
    let open = inner.iter().rposition(|&b| b == b'{')?;
    std::str::from_utf8(&inner[open + 1..]).ok()?.parse().ok()
}

/// IMAP quoted string. `None` if the value needs a literal instead
/// (quoted strings carry 7-bit text without CR or LF).
fn quote(value: &str) -> Option<String> {
    if !value.is_ascii() || value.contains(['\r', '\n']) {
        return None;
    }
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    Some(format!("\"{escaped}\""))
}

// ── Connector ───────────────────────────────────────────────────────

/// Opens TLS IMAP sessions against the configured server.
#[derive(Clone)]
pub struct ImapMailbox {
    timeout: Duration,
    tls: Arc<rustls::ClientConfig>,
}

impl ImapMailbox {
    pub fn new() -> Self {
        Self::with_timeout(IMAP_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        Self { timeout, tls }
    }

    fn open(&self, host: &str, port: u16) -> Result<ImapSession<TlsStream>, MailboxError> {
        let mut last_err = None;
        let mut tcp = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => {
                    tcp = Some(stream);
                    break;
                }
                Err(e) => last_err = Some(e),
            }
        }
        let tcp = match (tcp, last_err) {
            (Some(stream), _) => stream,
            (None, Some(e)) => return Err(e.into()),
            (None, None) => {
                return Err(MailboxError::Protocol(format!("{host} resolved to no addresses")));
            }
        };
        tcp.set_read_timeout(Some(self.timeout))?;
        tcp.set_write_timeout(Some(self.timeout))?;

        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| MailboxError::Protocol(format!("invalid server name: {e}")))?;
        let conn = rustls::ClientConnection::new(Arc::clone(&self.tls), server_name)
            .map_err(|e| MailboxError::Protocol(format!("TLS setup failed: {e}")))?;

        ImapSession::new(rustls::StreamOwned::new(conn, tcp))
    }
}

impl Default for ImapMailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Mailbox for ImapMailbox {
    fn connect(&self, config: &MailboxConfig) -> Result<Box<dyn MailboxSession>, MailboxError> {
        let session = self
            .open(&config.server, config.port)
            .map_err(|e| MailboxError::Connection {
                host: format!("{}:{}", config.server, config.port),
                reason: e.to_string(),
            })?;
        debug!(host = %config.server, port = config.port, "IMAP connection established");
        Ok(Box::new(session))
    }
}
