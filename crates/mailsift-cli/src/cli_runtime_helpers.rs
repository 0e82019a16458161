use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::Path;

use anyhow::Result;
use mailsift_core::{FetchResult, MessageRecord, ReadStatus};
use serde::Serialize;
use serde_json::{Value as JsonValue, json};

use crate::CLI_SCHEMA_VERSION;

const UNKNOWN_SENDER: &str = "(unknown)";

pub(crate) fn output_ok(value: JsonValue) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string(&json!({
            "schema": CLI_SCHEMA_VERSION,
            "ok": true,
            "result": value
        }))?
    );
    Ok(())
}

pub(crate) fn output_error(message: &str) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string(&json!({
            "schema": CLI_SCHEMA_VERSION,
            "ok": false,
            "error": message
        }))?
    );
    Ok(())
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct SenderCount {
    pub(crate) sender: String,
    pub(crate) count: usize,
}

/// What `fetch` prints: the engine result plus the per-sender and per-status tallies.
#[derive(Debug, Serialize)]
pub(crate) struct FetchReport<'a> {
    pub(crate) account: &'a str,
    pub(crate) mailbox: &'a str,
    #[serde(flatten)]
    pub(crate) result: &'a FetchResult,
    pub(crate) by_sender: Vec<SenderCount>,
    pub(crate) by_read_status: BTreeMap<&'static str, usize>,
}

impl<'a> FetchReport<'a> {
    pub(crate) fn new(account: &'a str, mailbox: &'a str, result: &'a FetchResult) -> Self {
        Self {
            account,
            mailbox,
            result,
            by_sender: sender_counts(&result.records),
            by_read_status: read_status_counts(&result.records),
        }
    }
}

fn sender_label(record: &MessageRecord) -> &str {
    if !record.sender_name.trim().is_empty() {
        record.sender_name.trim()
    } else if !record.sender_email.trim().is_empty() {
        record.sender_email.trim()
    } else {
        UNKNOWN_SENDER
    }
}

/// Records per sender, most frequent first, ties by name.
pub(crate) fn sender_counts(records: &[MessageRecord]) -> Vec<SenderCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in records {
        *counts.entry(sender_label(record)).or_default() += 1;
    }
    let mut out: Vec<SenderCount> = counts
        .into_iter()
        .map(|(sender, count)| SenderCount {
            sender: sender.to_string(),
            count,
        })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.sender.cmp(&b.sender)));
    out
}

pub(crate) fn read_status_counts(records: &[MessageRecord]) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::from([
        (ReadStatus::Read.as_str(), 0),
        (ReadStatus::Unread.as_str(), 0),
    ]);
    for record in records {
        *counts.entry(record.read_status.as_str()).or_default() += 1;
    }
    counts
}

pub(crate) fn write_text_atomic(path: &Path, content: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;
    if path.exists() {
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(path)?;
        file.write_all(content.as_bytes())?;
        return Ok(());
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, content.as_bytes())?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use mailsift_core::{FetchResult, MessageRecord, ReadStatus};

    use super::{FetchReport, read_status_counts, sender_counts, write_text_atomic};

    fn record(name: &str, email: &str, status: ReadStatus) -> MessageRecord {
        MessageRecord {
            sender_name: name.to_string(),
            sender_email: email.to_string(),
            subject: "Hello".to_string(),
            received_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            summary: "Hi there.".to_string(),
            phone_numbers: Vec::new(),
            read_status: status,
        }
    }

    #[test]
    fn senders_sorted_by_count_then_name() {
        let records = vec![
            record("Zed", "zed@example.com", ReadStatus::Read),
            record("Amy", "amy@example.com", ReadStatus::Read),
            record("Zed", "zed@example.com", ReadStatus::Unread),
            record("", "noname@example.com", ReadStatus::Read),
            record("", "", ReadStatus::Read),
            record("Bob", "bob@example.com", ReadStatus::Read),
        ];
        let counts: Vec<(String, usize)> = sender_counts(&records)
            .into_iter()
            .map(|c| (c.sender, c.count))
            .collect();
        assert_eq!(
            counts,
            vec![
                ("Zed".to_string(), 2),
                ("(unknown)".to_string(), 1),
                ("Amy".to_string(), 1),
                ("Bob".to_string(), 1),
                ("noname@example.com".to_string(), 1),
            ]
        );
    }

    #[test]
    fn read_status_counts_always_have_both_keys() {
        let empty = read_status_counts(&[]);
        assert_eq!(empty.get("Read"), Some(&0));
        assert_eq!(empty.get("Unread"), Some(&0));

        let records = vec![
            record("A", "a@example.com", ReadStatus::Unread),
            record("B", "b@example.com", ReadStatus::Unread),
            record("C", "c@example.com", ReadStatus::Read),
        ];
        let counts = read_status_counts(&records);
        assert_eq!(counts.get("Read"), Some(&1));
        assert_eq!(counts.get("Unread"), Some(&2));
    }

    #[test]
    fn report_flattens_result_fields() {
        let result = FetchResult::new(
            vec![record("Amy", "amy@example.com", ReadStatus::Unread)],
            4,
            1,
            3,
        );
        let report = FetchReport::new("Personal", "inbox", &result);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["account"], "Personal");
        assert_eq!(value["mailbox"], "inbox");
        assert_eq!(value["total_count"], 4);
        assert_eq!(value["unread_count"], 1);
        assert_eq!(value["read_count"], 3);
        assert_eq!(value["matched_count"], 1);
        assert_eq!(value["records"][0]["sender_email"], "amy@example.com");
        assert_eq!(value["records"][0]["received_date"], "2024-03-01");
        assert_eq!(value["records"][0]["read_status"], "Unread");
        assert_eq!(value["by_sender"][0]["sender"], "Amy");
        assert_eq!(value["by_read_status"]["Unread"], 1);
    }

    #[test]
    fn write_text_atomic_creates_and_overwrites() {
        let dir = std::env::temp_dir().join(format!("mailsift-out-{}", std::process::id()));
        let path = dir.join("result.json");
        write_text_atomic(&path, "{\"a\":1}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"a\":1}");
        write_text_atomic(&path, "{}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
