//! Message decoding and field extraction over raw RFC 822 bytes.

use chrono::{DateTime, FixedOffset, NaiveDate};
use log::debug;
use mailparse::{MailAddr, MailHeader, MailHeaderMap, ParsedMail};

mod extract;

pub use extract::{extract_phone_numbers, summarize};

/// Body text used when no part contributed any text.
pub const NO_TEXT_CONTENT: &str = "No text content available.";

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("message could not be parsed: {0}")]
    Parse(#[from] mailparse::MailParseError),

    #[error("message has no Date header")]
    MissingDate,

    #[error("message Date header is not a valid date: '{0}'")]
    InvalidDate(String),
}

/// A message reduced to the fields the pipeline cares about. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    sender_name: String,
    sender_email: String,
    subject: String,
    received_date: NaiveDate,
    body_text: String,
}

impl DecodedMessage {
    pub fn sender_name(&self) -> &str {
        &self.sender_name
    }

    pub fn sender_email(&self) -> &str {
        &self.sender_email
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn received_date(&self) -> NaiveDate {
        self.received_date
    }

    pub fn body_text(&self) -> &str {
        &self.body_text
    }

    /// Case-insensitive substring test against subject and body. `needle` must already be
    /// lowercased.
    pub fn contains_keyword(&self, needle: &str) -> bool {
        self.subject.to_lowercase().contains(needle)
            || self.body_text.to_lowercase().contains(needle)
    }
}

/// Decodes a raw message. Only an unparseable message or a missing/invalid Date header fails;
/// header encoding problems degrade to empty or lossy strings.
pub fn decode(raw: &[u8]) -> Result<DecodedMessage, DecodeError> {
    let parsed = mailparse::parse_mail(raw)?;
    let received_date = received_date(&parsed)?;
    let (sender_name, sender_email) = sender(&parsed);
    let subject = parsed
        .headers
        .get_first_header("Subject")
        .map(header_text)
        .unwrap_or_default();
    let body_text = body_text(&parsed);
    Ok(DecodedMessage {
        sender_name,
        sender_email,
        subject,
        received_date,
        body_text,
    })
}

/// Calendar date of an RFC 2822 date string, in the sender's own offset.
pub fn parse_received_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.date_naive());
    }
    let ts = mailparse::dateparse(trimmed).ok()?;
    let utc = DateTime::from_timestamp(ts, 0)?;
    match trimmed.split_whitespace().rev().find_map(parse_offset) {
        Some(offset) => Some(utc.with_timezone(&offset).date_naive()),
        None => Some(utc.date_naive()),
    }
}

/// `+hhmm` / `-hhmm` zone token.
fn parse_offset(token: &str) -> Option<FixedOffset> {
    let (sign, digits) = match token.as_bytes().first()? {
        b'+' => (1, &token[1..]),
        b'-' => (-1, &token[1..]),
        _ => return None,
    };
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn received_date(parsed: &ParsedMail) -> Result<NaiveDate, DecodeError> {
    let raw = parsed
        .headers
        .get_first_value("Date")
        .ok_or(DecodeError::MissingDate)?;
    parse_received_date(&raw).ok_or_else(|| DecodeError::InvalidDate(raw.trim().to_string()))
}

fn sender(parsed: &ParsedMail) -> (String, String) {
    let Some(header) = parsed.headers.get_first_header("From") else {
        return (String::new(), String::new());
    };
    match mailparse::addrparse_header(header) {
        Ok(list) => list.iter().find_map(first_mailbox).unwrap_or_default(),
        Err(err) => {
            debug!("decode from header unparseable: {}", err);
            (String::new(), String::new())
        }
    }
}

fn first_mailbox(addr: &MailAddr) -> Option<(String, String)> {
    let info = match addr {
        MailAddr::Single(info) => info,
        MailAddr::Group(group) => group.addrs.first()?,
    };
    Some((
        info.display_name.clone().unwrap_or_default(),
        info.addr.clone(),
    ))
}

fn header_text(header: &MailHeader) -> String {
    let raw = header.get_value_raw();
    if std::str::from_utf8(raw).is_ok() {
        header.get_value().trim().to_string()
    } else {
        String::from_utf8_lossy(raw).trim().to_string()
    }
}

fn body_text(parsed: &ParsedMail) -> String {
    let mut parts: Vec<String> = Vec::new();
    walk_parts(parsed, &mut |part| {
        let ctype = part.ctype.mimetype.to_lowercase();
        if ctype == "text/plain" {
            match plain_text(part) {
                Ok(text) => parts.push(text),
                Err(err) => debug!("decode skipping undecodable text part: {}", err),
            }
        } else if ctype.starts_with("image/") {
            let line = match part.headers.get_first_value("Content-Description") {
                Some(alt) if !alt.trim().is_empty() => format!("Image Alt Text: {}", alt.trim()),
                _ => "Image (No Alt Text)".to_string(),
            };
            parts.push(line);
        }
    });
    if parts.is_empty() {
        NO_TEXT_CONTENT.to_string()
    } else {
        parts.join("\n")
    }
}

fn plain_text(part: &ParsedMail) -> Result<String, mailparse::MailParseError> {
    if declares_charset(part) {
        return part.get_body();
    }
    // Undeclared charset is read as UTF-8 rather than mailparse's us-ascii default.
    let raw = part.get_body_raw()?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

fn declares_charset(part: &ParsedMail) -> bool {
    part.ctype.params.contains_key("charset")
}

fn walk_parts<F>(parsed: &ParsedMail, cb: &mut F)
where
    F: FnMut(&ParsedMail),
{
    cb(parsed);
    for part in &parsed.subparts {
        walk_parts(part, cb);
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{DecodeError, NO_TEXT_CONTENT, decode, parse_received_date};

    fn plain(headers: &str, body: &str) -> Vec<u8> {
        format!("{}\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{}", headers, body)
            .into_bytes()
    }

    #[test]
    fn decodes_headers_and_plain_body() {
        let raw = plain(
            "From: Alice Example <alice@example.com>\r\nSubject: Quarterly report\r\nDate: Tue, 05 Mar 2024 09:15:00 +0000",
            "Numbers attached. Call me.",
        );
        let msg = decode(&raw).unwrap();
        assert_eq!(msg.sender_name(), "Alice Example");
        assert_eq!(msg.sender_email(), "alice@example.com");
        assert_eq!(msg.subject(), "Quarterly report");
        assert_eq!(
            msg.received_date(),
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
        );
        assert_eq!(msg.body_text(), "Numbers attached. Call me.");
    }

    #[test]
    fn bare_address_has_empty_display_name() {
        let raw = plain(
            "From: bob@example.com\r\nSubject: hi\r\nDate: Tue, 05 Mar 2024 09:15:00 +0000",
            "x",
        );
        let msg = decode(&raw).unwrap();
        assert_eq!(msg.sender_name(), "");
        assert_eq!(msg.sender_email(), "bob@example.com");
    }

    #[test]
    fn missing_from_and_subject_degrade_to_empty() {
        let raw = plain("Date: Tue, 05 Mar 2024 09:15:00 +0000", "body");
        let msg = decode(&raw).unwrap();
        assert_eq!(msg.sender_name(), "");
        assert_eq!(msg.sender_email(), "");
        assert_eq!(msg.subject(), "");
    }

    #[test]
    fn encoded_subject_is_decoded() {
        let raw = plain(
            "From: a@example.com\r\nSubject: =?UTF-8?B?SGVsbG8gV8O2cmxk?=\r\nDate: Tue, 05 Mar 2024 09:15:00 +0000",
            "x",
        );
        assert_eq!(decode(&raw).unwrap().subject(), "Hello Wörld");
    }

    #[test]
    fn invalid_utf8_subject_is_replaced_not_fatal() {
        let mut raw = b"From: a@example.com\r\nSubject: caf".to_vec();
        raw.push(0xff);
        raw.extend_from_slice(
            b"\r\nDate: Tue, 05 Mar 2024 09:15:00 +0000\r\nContent-Type: text/plain\r\n\r\nbody",
        );
        let msg = decode(&raw).unwrap();
        assert_eq!(msg.subject(), "caf\u{fffd}");
    }

    #[test]
    fn missing_date_is_an_error() {
        let raw = plain("From: a@example.com\r\nSubject: no date", "body");
        assert!(matches!(decode(&raw), Err(DecodeError::MissingDate)));
    }

    #[test]
    fn blank_date_is_an_error() {
        let raw = plain("From: a@example.com\r\nSubject: x\r\nDate: ", "body");
        assert!(matches!(decode(&raw), Err(DecodeError::InvalidDate(_))));
    }

    #[test]
    fn date_keeps_sender_offset() {
        // 23:30 at -0500 is already the next day in UTC.
        assert_eq!(
            parse_received_date("Mon, 01 Jan 2024 23:30:00 -0500"),
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
        assert_eq!(parse_received_date("  "), None);
    }

    #[test]
    fn lenient_dates_keep_sender_offset() {
        // Full weekday names are not RFC 2822, so these take the lenient parser.
        assert_eq!(
            parse_received_date("Monday, 01 Jan 2024 23:30:00 -0500"),
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
        assert_eq!(
            parse_received_date("Tuesday, 02 Jan 2024 01:00:00 +0530"),
            NaiveDate::from_ymd_opt(2024, 1, 2)
        );
    }

    #[test]
    fn html_only_message_has_sentinel_body() {
        let raw = b"From: a@example.com\r\nSubject: html\r\nDate: Tue, 05 Mar 2024 09:15:00 +0000\r\nContent-Type: text/html; charset=utf-8\r\n\r\n<p>Hello</p>";
        let msg = decode(raw).unwrap();
        assert_eq!(msg.body_text(), NO_TEXT_CONTENT);
    }

    #[test]
    fn multipart_prefers_plain_and_describes_images() {
        let raw = concat!(
            "From: a@example.com\r\n",
            "Subject: mixed\r\n",
            "Date: Tue, 05 Mar 2024 09:15:00 +0000\r\n",
            "MIME-Version: 1.0\r\n",
            "Content-Type: multipart/mixed; boundary=\"outer\"\r\n",
            "\r\n",
            "--outer\r\n",
            "Content-Type: multipart/alternative; boundary=\"inner\"\r\n",
            "\r\n",
            "--inner\r\n",
            "Content-Type: text/plain; charset=utf-8\r\n",
            "\r\n",
            "Plain body.\r\n",
            "--inner\r\n",
            "Content-Type: text/html; charset=utf-8\r\n",
            "\r\n",
            "<p>Html body.</p>\r\n",
            "--inner--\r\n",
            "--outer\r\n",
            "Content-Type: image/png\r\n",
            "Content-Description: Company logo\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "iVBORw0KGgo=\r\n",
            "--outer\r\n",
            "Content-Type: image/jpeg\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "/9j/4AAQ\r\n",
            "--outer\r\n",
            "Content-Type: application/pdf\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "JVBERi0=\r\n",
            "--outer--\r\n",
        );
        let msg = decode(raw.as_bytes()).unwrap();
        let body = msg.body_text();
        assert!(body.starts_with("Plain body."));
        assert!(!body.contains("Html body"));
        assert!(body.contains("Image Alt Text: Company logo"));
        assert!(body.ends_with("Image (No Alt Text)"));
        assert!(!body.contains("JVBERi0"));
    }

    #[test]
    fn declared_latin1_charset_is_honoured() {
        let mut raw = b"From: a@example.com\r\nSubject: x\r\nDate: Tue, 05 Mar 2024 09:15:00 +0000\r\nContent-Type: text/plain; charset=iso-8859-1\r\n\r\ncaf".to_vec();
        raw.push(0xe9);
        let msg = decode(&raw).unwrap();
        assert_eq!(msg.body_text(), "caf\u{e9}");
    }

    #[test]
    fn undeclared_charset_reads_utf8() {
        let raw = "From: a@example.com\r\nSubject: x\r\nDate: Tue, 05 Mar 2024 09:15:00 +0000\r\n\r\nna\u{ef}ve";
        let msg = decode(raw.as_bytes()).unwrap();
        assert_eq!(msg.body_text(), "na\u{ef}ve");
    }

    #[test]
    fn charset_lookalike_parameter_is_not_a_charset() {
        let raw = "From: a@example.com\r\nSubject: x\r\nDate: Tue, 05 Mar 2024 09:15:00 +0000\r\nContent-Type: text/plain; name=\"charset.txt\"\r\n\r\nna\u{ef}ve";
        let msg = decode(raw.as_bytes()).unwrap();
        assert_eq!(msg.body_text(), "na\u{ef}ve");
    }

    #[test]
    fn keyword_matches_subject_or_body_case_insensitively() {
        let raw = plain(
            "From: a@example.com\r\nSubject: Invoice March\r\nDate: Tue, 05 Mar 2024 09:15:00 +0000",
            "Please find the PAYMENT details.",
        );
        let msg = decode(&raw).unwrap();
        assert!(msg.contains_keyword("invoice"));
        assert!(msg.contains_keyword("payment"));
        assert!(msg.contains_keyword("voice mar"));
        assert!(!msg.contains_keyword("refund"));
    }
}
