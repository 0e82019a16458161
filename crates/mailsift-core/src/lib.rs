//! Shared data model for the mailsift pipeline: connection parameters, filters, result rows
//! and the fatal error taxonomy.

use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDate;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

pub const DEFAULT_IMAP_HOST: &str = "imap.gmail.com";
pub const DEFAULT_IMAP_PORT: u16 = 993;
pub const DEFAULT_MAILBOX: &str = "inbox";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// IMAP UID of a message, stable for the duration of one session.
pub type MessageId = u32;

/// Everything needed to open one authenticated session against one mailbox.
///
/// The password is a [`SecretString`], so the derived `Debug` output never shows it.
#[derive(Debug)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub mailbox: String,
    /// Applied to the TCP connect and to every socket read/write.
    pub timeout: Duration,
    pub skip_tls_verify: bool,
}

impl ConnectionParams {
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            host: DEFAULT_IMAP_HOST.to_string(),
            port: DEFAULT_IMAP_PORT,
            username: username.into(),
            password,
            mailbox: DEFAULT_MAILBOX.to_string(),
            timeout: DEFAULT_TIMEOUT,
            skip_tls_verify: false,
        }
    }

    pub fn with_mailbox(mut self, mailbox: impl Into<String>) -> Self {
        self.mailbox = mailbox.into();
        self
    }
}

/// Read-status predicate requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusFilter {
    #[default]
    All,
    Read,
    Unread,
}

impl StatusFilter {
    /// Whether the engine has to take an unread snapshot for this filter.
    pub fn needs_unread_snapshot(self) -> bool {
        self != StatusFilter::All
    }

    pub fn accepts(self, status: ReadStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Read => status == ReadStatus::Read,
            StatusFilter::Unread => status == ReadStatus::Unread,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown read status '{0}' (expected all, read or unread)")]
pub struct UnknownStatusError(String);

impl FromStr for StatusFilter {
    type Err = UnknownStatusError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(StatusFilter::All),
            "read" => Ok(StatusFilter::Read),
            "unread" => Ok(StatusFilter::Unread),
            _ => Err(UnknownStatusError(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadStatus {
    Read,
    Unread,
}

impl ReadStatus {
    pub fn from_unread(unread: bool) -> Self {
        if unread {
            ReadStatus::Unread
        } else {
            ReadStatus::Read
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReadStatus::Read => "Read",
            ReadStatus::Unread => "Unread",
        }
    }
}

impl fmt::Display for ReadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    pub keyword: Option<String>,
    pub status: StatusFilter,
    /// `None` means no limit.
    pub max_results: Option<NonZeroUsize>,
}

impl FilterSpec {
    /// Lowercased keyword, or `None` when the keyword is absent or empty.
    pub fn keyword_needle(&self) -> Option<String> {
        self.keyword
            .as_deref()
            .filter(|k| !k.is_empty())
            .map(str::to_lowercase)
    }

    /// Length of the ID prefix the engine walks for a listing of `total` IDs.
    pub fn prefix_len(&self, total: usize) -> usize {
        match self.max_results {
            Some(max) => total.min(max.get()),
            None => total,
        }
    }
}

/// One output row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub sender_name: String,
    pub sender_email: String,
    pub subject: String,
    pub received_date: NaiveDate,
    pub summary: String,
    pub phone_numbers: Vec<String>,
    pub read_status: ReadStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResult {
    pub records: Vec<MessageRecord>,
    /// Messages in the selected mailbox before any filtering.
    pub total_count: usize,
    /// Zero unless a read-status filter was requested.
    pub unread_count: usize,
    /// Zero unless a read-status filter was requested.
    pub read_count: usize,
    pub matched_count: usize,
}

impl FetchResult {
    pub fn new(
        records: Vec<MessageRecord>,
        total_count: usize,
        unread_count: usize,
        read_count: usize,
    ) -> Self {
        let matched_count = records.len();
        Self {
            records,
            total_count,
            unread_count,
            read_count,
            matched_count,
        }
    }
}

/// Errors that abort a whole fetch. Per-message problems never surface as a `MailError`.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("mailbox not found: {0}")]
    MailboxNotFound(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

pub type MailResult<T> = Result<T, MailError>;
