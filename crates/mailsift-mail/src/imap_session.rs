use std::collections::HashSet;
use std::net::{TcpStream, ToSocketAddrs};

use log::debug;
use mailsift_core::{ConnectionParams, MailError, MailResult, MessageId};
use native_tls::{TlsConnector, TlsStream};
use secrecy::ExposeSecret;

use crate::{Connector, FetchError, MailSession};

type ImapStream = TlsStream<TcpStream>;

/// Opens [`ImapSession`]s over implicit TLS.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImapConnector;

impl Connector for ImapConnector {
    type Session = ImapSession;

    fn open(&self, params: &ConnectionParams) -> MailResult<ImapSession> {
        ImapSession::open(params)
    }
}

/// Logged-in IMAP session. Dropping it without [`MailSession::close`] still sends LOGOUT.
pub struct ImapSession {
    session: Option<imap::Session<ImapStream>>,
}

impl ImapSession {
    pub fn open(params: &ConnectionParams) -> MailResult<Self> {
        debug!(
            "imap_connect start host={} port={} timeout={:?}",
            params.host, params.port, params.timeout
        );
        let stream = tcp_connect(params)?;
        stream
            .set_read_timeout(Some(params.timeout))
            .and_then(|()| stream.set_write_timeout(Some(params.timeout)))
            .map_err(|e| MailError::Connection(e.to_string()))?;
        debug!("imap_connect tcp connected");

        let tls = TlsConnector::builder()
            .danger_accept_invalid_certs(params.skip_tls_verify)
            .danger_accept_invalid_hostnames(params.skip_tls_verify)
            .build()
            .map_err(|e| MailError::Connection(e.to_string()))?;
        let tls_stream = tls
            .connect(&params.host, stream)
            .map_err(|e| MailError::Connection(format!("TLS handshake failed: {}", e)))?;

        let mut client = imap::Client::new(tls_stream);
        client
            .read_greeting()
            .map_err(|e| MailError::Connection(format!("no server greeting: {}", e)))?;
        let session = client
            .login(&params.username, params.password.expose_secret())
            .map_err(|(err, _client)| login_error(err))?;
        debug!("imap_connect login ok");
        Ok(Self {
            session: Some(session),
        })
    }

    fn session(&mut self) -> MailResult<&mut imap::Session<ImapStream>> {
        self.session
            .as_mut()
            .ok_or_else(|| MailError::Connection("session already closed".to_string()))
    }
}

impl MailSession for ImapSession {
    fn select_mailbox(&mut self, name: &str) -> MailResult<()> {
        debug!("imap_select mailbox={}", name);
        let mailbox = self.session()?.select(name).map_err(|err| match &err {
            imap::Error::No(_) | imap::Error::Bad(_) => MailError::MailboxNotFound(name.to_string()),
            _ => MailError::Connection(err.to_string()),
        })?;
        debug!("imap_select mailbox={} exists={}", name, mailbox.exists);
        Ok(())
    }

    fn list_all_ids(&mut self) -> MailResult<Vec<MessageId>> {
        let uids = self
            .session()?
            .uid_search("ALL")
            .map_err(|e| MailError::Protocol(format!("UID SEARCH ALL: {}", e)))?;
        let mut ids: Vec<MessageId> = uids.into_iter().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn list_unread_ids(&mut self) -> MailResult<HashSet<MessageId>> {
        let uids = self
            .session()?
            .uid_search("UNSEEN")
            .map_err(|e| MailError::Protocol(format!("UID SEARCH UNSEEN: {}", e)))?;
        debug!("imap_unseen count={}", uids.len());
        Ok(uids.into_iter().collect())
    }

    fn fetch_raw(&mut self, id: MessageId) -> Result<Vec<u8>, FetchError> {
        let session = self.session.as_mut().ok_or_else(|| FetchError::Protocol {
            id,
            reason: "session already closed".to_string(),
        })?;
        // PEEK keeps the \Seen flag untouched.
        let fetches = session
            .uid_fetch(id.to_string(), "BODY.PEEK[]")
            .map_err(|e| FetchError::Protocol {
                id,
                reason: e.to_string(),
            })?;
        fetches
            .iter()
            .find_map(|f| f.body().map(|b| b.to_vec()))
            .ok_or(FetchError::Vanished(id))
    }

    fn close(&mut self) -> MailResult<()> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        session
            .logout()
            .map_err(|e| MailError::Connection(e.to_string()))?;
        debug!("imap_logout ok");
        Ok(())
    }
}

impl Drop for ImapSession {
    fn drop(&mut self) {
        if self.session.is_some() {
            debug!("imap_session dropped while open, logging out");
            let _ = self.close();
        }
    }
}

fn tcp_connect(params: &ConnectionParams) -> MailResult<TcpStream> {
    let addrs = (params.host.as_str(), params.port)
        .to_socket_addrs()
        .map_err(|e| MailError::Connection(format!("cannot resolve {}: {}", params.host, e)))?;
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, params.timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                debug!("imap_connect attempt addr={} failed: {}", addr, err);
                last_err = Some(err);
            }
        }
    }
    Err(MailError::Connection(match last_err {
        Some(err) => format!("{}:{}: {}", params.host, params.port, err),
        None => format!("no address found for {}", params.host),
    }))
}

fn login_error(err: imap::Error) -> MailError {
    match &err {
        imap::Error::No(_) | imap::Error::Bad(_) => MailError::Authentication(err.to_string()),
        _ => MailError::Connection(err.to_string()),
    }
}
