//! Mailbox sessions and the filter & aggregate engine.
//!
//! [`MailEngine`] drives one [`MailSession`] per invocation: select the mailbox, list UIDs,
//! optionally snapshot the unread set, then fetch, decode and filter a bounded prefix of the
//! listing one message at a time. The session is closed on every exit path.

use std::collections::HashSet;

use log::{debug, info, warn};
use mailsift_content::{DecodedMessage, decode, extract_phone_numbers, summarize};
use mailsift_core::{
    ConnectionParams, FetchResult, FilterSpec, MailResult, MessageId, MessageRecord, ReadStatus,
};

mod imap_session;

pub use imap_session::{ImapConnector, ImapSession};

/// Per-message fetch failure. The engine logs it and skips the message.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("message {0} no longer exists")]
    Vanished(MessageId),

    #[error("fetching message {id} failed: {reason}")]
    Protocol { id: MessageId, reason: String },
}

/// An authenticated connection to one server.
pub trait MailSession {
    /// Fails with `MailboxNotFound` when the server rejects the name.
    fn select_mailbox(&mut self, name: &str) -> MailResult<()>;

    /// Every message in the selected mailbox, ascending.
    fn list_all_ids(&mut self) -> MailResult<Vec<MessageId>>;

    fn list_unread_ids(&mut self) -> MailResult<HashSet<MessageId>>;

    fn fetch_raw(&mut self, id: MessageId) -> Result<Vec<u8>, FetchError>;

    /// Logs out. Calling it twice is a no-op.
    fn close(&mut self) -> MailResult<()>;
}

pub trait Connector {
    type Session: MailSession;

    fn open(&self, params: &ConnectionParams) -> MailResult<Self::Session>;
}

pub struct MailEngine<C> {
    connector: C,
}

impl<C: Connector> MailEngine<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }

    /// Runs one full fetch. Any fatal error aborts with no partial result.
    pub fn fetch(&self, params: &ConnectionParams, filter: &FilterSpec) -> MailResult<FetchResult> {
        info!(
            "fetch start host={} port={} mailbox={} status={:?} limit={:?}",
            params.host, params.port, params.mailbox, filter.status, filter.max_results
        );
        let mut session = self.connector.open(params)?;
        debug!("fetch connected");
        let outcome = collect(&mut session, &params.mailbox, filter);
        close_quietly(&mut session);
        let result = outcome?;
        info!(
            "fetch done mailbox={} total={} matched={} unread={} read={}",
            params.mailbox,
            result.total_count,
            result.matched_count,
            result.unread_count,
            result.read_count
        );
        Ok(result)
    }

    /// Opens a session, selects the mailbox and reports how many messages it holds.
    pub fn check(&self, params: &ConnectionParams) -> MailResult<usize> {
        let mut session = self.connector.open(params)?;
        let outcome = session
            .select_mailbox(&params.mailbox)
            .and_then(|()| session.list_all_ids())
            .map(|ids| ids.len());
        close_quietly(&mut session);
        outcome
    }
}

/// Fetches with a real IMAP connection.
pub fn fetch_messages(params: &ConnectionParams, filter: &FilterSpec) -> MailResult<FetchResult> {
    MailEngine::new(ImapConnector).fetch(params, filter)
}

/// Connection check with a real IMAP connection.
pub fn check_connection(params: &ConnectionParams) -> MailResult<usize> {
    MailEngine::new(ImapConnector).check(params)
}

fn close_quietly<S: MailSession>(session: &mut S) {
    if let Err(err) = session.close() {
        warn!("logout failed: {}", err);
    }
}

fn collect<S: MailSession>(
    session: &mut S,
    mailbox: &str,
    filter: &FilterSpec,
) -> MailResult<FetchResult> {
    session.select_mailbox(mailbox)?;
    let ids = session.list_all_ids()?;
    let total = ids.len();
    debug!("fetch listed mailbox={} total={}", mailbox, total);

    // Point-in-time snapshot; later mailbox changes are not tracked.
    let unread = if filter.status.needs_unread_snapshot() && !ids.is_empty() {
        Some(session.list_unread_ids()?)
    } else {
        None
    };
    let (unread_count, read_count) = match &unread {
        Some(set) => {
            let unread_count = ids.iter().filter(|id| set.contains(id)).count();
            (unread_count, total - unread_count)
        }
        None => (0, 0),
    };

    let needle = filter.keyword_needle();
    let mut records = Vec::new();
    for &id in &ids[..filter.prefix_len(total)] {
        let raw = match session.fetch_raw(id) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("skipping message: {}", err);
                continue;
            }
        };
        let message = match decode(&raw) {
            Ok(message) => message,
            Err(err) => {
                warn!("skipping message {}: {}", id, err);
                continue;
            }
        };
        let status = ReadStatus::from_unread(unread.as_ref().is_some_and(|set| set.contains(&id)));
        if !filter.status.accepts(status) {
            continue;
        }
        if let Some(needle) = needle.as_deref() {
            if !message.contains_keyword(needle) {
                continue;
            }
        }
        records.push(to_record(&message, status));
    }

    Ok(FetchResult::new(records, total, unread_count, read_count))
}

fn to_record(message: &DecodedMessage, read_status: ReadStatus) -> MessageRecord {
    let body = message.body_text();
    MessageRecord {
        sender_name: message.sender_name().to_string(),
        sender_email: message.sender_email().to_string(),
        subject: message.subject().to_string(),
        received_date: message.received_date(),
        summary: summarize(body),
        phone_numbers: extract_phone_numbers(body),
        read_status,
    }
}
