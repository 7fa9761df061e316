//! RFC 822 decoding: headers, readable body, attachments, PDF text.

use std::sync::OnceLock;

use chrono::DateTime;
use mailparse::{DispositionType, MailHeaderMap, ParsedMail};
use regex::Regex;
use tracing::{debug, warn};

use super::{Attachment, MailMessage, MailboxError};

/// Body characters kept for the interpreter.
pub const MAX_BODY_CHARS: usize = 3000;
/// PDF characters kept for the interpreter.
pub const MAX_PDF_CHARS: usize = 4000;
/// PDF pages read.
pub const MAX_PDF_PAGES: usize = 5;

/// Decode a raw message fetched under `id`.
///
/// # Errors
///
/// Returns [`MailboxError::Parse`] when the MIME structure is invalid.
pub fn parse_message(id: &str, raw: &[u8]) -> Result<MailMessage, MailboxError> {
    let parsed = mailparse::parse_mail(raw)?;

    let subject = parsed
        .headers
        .get_first_value("Subject")
        .unwrap_or_default();
    let sender = parsed.headers.get_first_value("From").unwrap_or_default();
    let message_id = parsed
        .headers
        .get_first_value("Message-ID")
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty());
    let date = parsed
        .headers
        .get_first_value("Date")
        .and_then(|value| mailparse::dateparse(&value).ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0));

    let mut plain: Option<String> = None;
    let mut html: Option<String> = None;
    let mut attachments = Vec::new();
    collect_parts(&parsed, &mut plain, &mut html, &mut attachments)?;

    let body = match (plain, html) {
        (Some(text), _) if !text.trim().is_empty() => text,
        (_, Some(markup)) => strip_html(&markup),
        (Some(text), None) => text,
        (None, None) => String::new(),
    };

    Ok(MailMessage {
        id: id.to_owned(),
        message_id,
        subject: subject.trim().to_owned(),
        sender: sender.trim().to_owned(),
        date,
        body: cap_chars(&collapse_whitespace(&body), MAX_BODY_CHARS),
        attachments,
    })
}

fn collect_parts(
    part: &ParsedMail<'_>,
    plain: &mut Option<String>,
    html: &mut Option<String>,
    attachments: &mut Vec<Attachment>,
) -> Result<(), MailboxError> {
    if !part.subparts.is_empty() {
        for sub in &part.subparts {
            collect_parts(sub, plain, html, attachments)?;
        }
        return Ok(());
    }

    let mimetype = part.ctype.mimetype.to_lowercase();
    let disposition = part.get_content_disposition();
    let filename = disposition
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .cloned();
    let is_attachment =
        disposition.disposition == DispositionType::Attachment || filename.is_some();

    if is_attachment {
        attachments.push(Attachment {
            filename,
            content_type: mimetype,
            data: part.get_body_raw()?,
        });
        return Ok(());
    }

    match mimetype.as_str() {
        "text/plain" if plain.is_none() => *plain = Some(part.get_body()?),
        "text/html" if html.is_none() => *html = Some(part.get_body()?),
        _ => {}
    }
    Ok(())
}

fn tag_patterns() -> &'static (Option<Regex>, Option<Regex>) {
    static PATTERNS: OnceLock<(Option<Regex>, Option<Regex>)> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        (
            Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").ok(),
            Regex::new(r"(?s)<[^>]+>").ok(),
        )
    })
}

/// Reduce HTML to readable text.
pub fn strip_html(markup: &str) -> String {
    let (blocks, tags) = tag_patterns();
    let mut text = markup.to_owned();
    if let Some(blocks) = blocks {
        text = blocks.replace_all(&text, " ").into_owned();
    }
    if let Some(tags) = tags {
        text = tags.replace_all(&text, " ").into_owned();
    }
    let decoded = text
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    collapse_whitespace(&decoded)
}

/// Collapse whitespace runs into single spaces.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn cap_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Text of the first PDF attachment: first pages only, capped.
///
/// Extraction is CPU-bound and runs on the blocking pool. Malformed PDFs
/// (including ones that make the extractor panic) yield `None`.
pub async fn pdf_text(message: &MailMessage) -> Option<String> {
    let pdf = message.first_pdf()?;
    let data = pdf.data.clone();
    let name = pdf.filename.clone().unwrap_or_default();

    let extracted = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&data))
        .await;

    match extracted {
        Ok(Ok(text)) => {
            let pages: Vec<&str> = text.split('\u{c}').take(MAX_PDF_PAGES).collect();
            let joined = collapse_whitespace(&pages.join("\n"));
            debug!(file = %name, chars = joined.len(), "pdf attachment extracted");
            if joined.is_empty() {
                None
            } else {
                Some(cap_chars(&joined, MAX_PDF_CHARS))
            }
        }
        Ok(Err(e)) => {
            warn!(file = %name, error = %e, "pdf text extraction failed");
            None
        }
        Err(e) => {
            warn!(file = %name, error = %e, "pdf text extraction aborted");
            None
        }
    }
}
