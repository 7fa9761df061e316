//! IMAP over TLS, for Gmail-style app-password mailboxes.
//!
//! The `imap` crate is blocking. Each operation moves the session onto the
//! blocking pool and back, so a slow server only stalls this user's check.

use std::net::TcpStream;

use async_trait::async_trait;
use native_tls::{TlsConnector, TlsStream};
use tracing::{debug, info, warn};

use super::message::parse_message;
use super::{MailAccount, MailMessage, Mailbox, MailboxConnector, MailboxError};

type ImapSession = imap::Session<TlsStream<TcpStream>>;

/// IMAP server location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImapServer {
    /// Host name, also used for TLS verification.
    pub host: String,
    /// TLS port (993).
    pub port: u16,
}

/// Builds [`ImapMailbox`] instances for one server.
#[derive(Debug, Clone)]
pub struct ImapConnector {
    server: ImapServer,
}

impl ImapConnector {
    /// Create a connector for `server`.
    pub fn new(server: ImapServer) -> Self {
        Self { server }
    }
}

impl MailboxConnector for ImapConnector {
    fn open(&self, account: MailAccount) -> Box<dyn Mailbox> {
        Box::new(ImapMailbox::new(self.server.clone(), account))
    }
}

/// One user's IMAP mailbox.
pub struct ImapMailbox {
    server: ImapServer,
    account: MailAccount,
    session: Option<ImapSession>,
}

impl ImapMailbox {
    /// Create an unconnected mailbox.
    pub fn new(server: ImapServer, account: MailAccount) -> Self {
        Self {
            server,
            account,
            session: None,
        }
    }

    async fn with_session<T, F>(&mut self, op: F) -> Result<T, MailboxError>
    where
        T: Send + 'static,
        F: FnOnce(&mut ImapSession) -> Result<T, MailboxError> + Send + 'static,
    {
        let mut session = self.session.take().ok_or(MailboxError::NotConnected)?;
        let joined = tokio::task::spawn_blocking(move || {
            let result = op(&mut session);
            (session, result)
        })
        .await;

        match joined {
            Ok((session, result)) => {
                self.session = Some(session);
                result
            }
            Err(e) => Err(MailboxError::Command(format!("imap task aborted: {e}"))),
        }
    }
}

fn open_session(server: &ImapServer, account: &MailAccount) -> Result<ImapSession, MailboxError> {
    let tls = TlsConnector::builder()
        .build()
        .map_err(|e| MailboxError::Connect(e.to_string()))?;
    let client = imap::connect((server.host.as_str(), server.port), &server.host, &tls)
        .map_err(|e| MailboxError::Connect(e.to_string()))?;
    let mut session = client
        .login(&account.address, &account.password)
        .map_err(|(e, _)| MailboxError::Login(e.to_string()))?;
    session
        .select("INBOX")
        .map_err(|e| MailboxError::Command(e.to_string()))?;
    Ok(session)
}

fn fetch_unread(session: &mut ImapSession, limit: usize) -> Result<Vec<MailMessage>, MailboxError> {
    let mut uids: Vec<u32> = session
        .uid_search("UNSEEN")
        .map_err(|e| MailboxError::Command(e.to_string()))?
        .into_iter()
        .collect();
    uids.sort_unstable_by(|a, b| b.cmp(a));
    uids.truncate(limit);
    if uids.is_empty() {
        return Ok(Vec::new());
    }

    let set = uids
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",");
    let fetches = session
        .uid_fetch(&set, "(UID BODY.PEEK[])")
        .map_err(|e| MailboxError::Command(e.to_string()))?;

    let mut messages = Vec::new();
    for fetch in fetches.iter() {
        let (Some(uid), Some(body)) = (fetch.uid, fetch.body()) else {
            continue;
        };
        match parse_message(&uid.to_string(), body) {
            Ok(message) => messages.push(message),
            Err(e) => warn!(uid, error = %e, "skipping undecodable message"),
        }
    }
    messages.sort_by(|a, b| b.date.cmp(&a.date));
    Ok(messages)
}

#[async_trait]
impl Mailbox for ImapMailbox {
    async fn connect(&mut self) -> bool {
        if self.session.is_some() {
            return true;
        }
        let server = self.server.clone();
        let account = self.account.clone();
        let opened =
            tokio::task::spawn_blocking(move || open_session(&server, &account)).await;

        match opened {
            Ok(Ok(session)) => {
                info!(address = %self.account.address, "mailbox connected");
                self.session = Some(session);
                true
            }
            Ok(Err(e)) => {
                warn!(address = %self.account.address, error = %e, "mailbox connection failed");
                false
            }
            Err(e) => {
                warn!(address = %self.account.address, error = %e, "mailbox connect task aborted");
                false
            }
        }
    }

    async fn list_unread(&mut self, limit: usize) -> Vec<MailMessage> {
        match self
            .with_session(move |session| fetch_unread(session, limit))
            .await
        {
            Ok(messages) => {
                debug!(count = messages.len(), "unread messages fetched");
                messages
            }
            Err(e) => {
                warn!(error = %e, "listing unread messages failed");
                Vec::new()
            }
        }
    }

    async fn mark_read(&mut self, id: &str) -> bool {
        let uid = id.to_owned();
        let stored = self
            .with_session(move |session| {
                session
                    .uid_store(&uid, "+FLAGS (\\Seen)")
                    .map(|_| ())
                    .map_err(|e| MailboxError::Command(e.to_string()))
            })
            .await;
        match stored {
            Ok(()) => true,
            Err(e) => {
                warn!(id, error = %e, "marking message read failed");
                false
            }
        }
    }

    async fn disconnect(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        let logged_out = tokio::task::spawn_blocking(move || session.logout()).await;
        if let Ok(Err(e)) = logged_out {
            debug!(error = %e, "imap logout failed");
        }
    }
}
