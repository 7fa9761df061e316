//! MIME decoding and the invoice prefilter.

use gastos::mailbox::message::{
    collapse_whitespace, parse_message, pdf_text, strip_html, MAX_BODY_CHARS,
};
use gastos::mailbox::{Attachment, MailAccount, MailMessage};

const PLAIN: &str = "From: Banco <alertas@banco.mx>\r\n\
To: ana@example.com\r\n\
Subject: =?UTF-8?Q?Notificaci=C3=B3n_de_cargo?=\r\n\
Message-ID: <abc123@banco.mx>\r\n\
Date: Thu, 02 May 2024 09:15:00 -0600\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Se realizo un cargo   por $500.00\r\n\
en   OXXO.\r\n";

const ALTERNATIVE: &str = "From: tienda@example.com\r\n\
Subject: Tu pedido\r\n\
Content-Type: multipart/alternative; boundary=\"XYZ\"\r\n\
\r\n\
--XYZ\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<html><style>p {color: red}</style><body><p>Total:&nbsp;<b>$1,299</b></p><script>x()</script></body></html>\r\n\
--XYZ--\r\n";

const WITH_ATTACHMENT: &str = "From: facturas@proveedor.mx\r\n\
Subject: Factura A-102\r\n\
Content-Type: multipart/mixed; boundary=\"B1\"\r\n\
\r\n\
--B1\r\n\
Content-Type: text/plain\r\n\
\r\n\
Adjuntamos su factura.\r\n\
--B1\r\n\
Content-Type: application/octet-stream; name=\"A-102.PDF\"\r\n\
Content-Disposition: attachment; filename=\"A-102.PDF\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0=\r\n\
--B1--\r\n";

#[test]
fn plain_message_headers_and_body() {
    let message = parse_message("41", PLAIN.as_bytes()).expect("message should parse");
    assert_eq!(message.id, "41");
    assert_eq!(message.subject, "Notificación de cargo");
    assert!(message.sender.contains("alertas@banco.mx"));
    assert_eq!(message.message_id.as_deref(), Some("<abc123@banco.mx>"));
    assert_eq!(message.source_ref(), "<abc123@banco.mx>");
    assert_eq!(message.body, "Se realizo un cargo por $500.00 en OXXO.");
    let date = message.date.expect("date should parse");
    assert_eq!(date.to_rfc3339(), "2024-05-02T15:15:00+00:00");
    assert!(message.attachments.is_empty());
}

#[test]
fn html_only_message_is_stripped() {
    let message = parse_message("7", ALTERNATIVE.as_bytes()).expect("message should parse");
    assert_eq!(message.body, "Total: $1,299");
    assert_eq!(message.message_id, None);
    assert_eq!(message.source_ref(), "uid:7");
}

#[test]
fn attachments_are_collected() {
    let message = parse_message("8", WITH_ATTACHMENT.as_bytes()).expect("message should parse");
    assert_eq!(message.body, "Adjuntamos su factura.");
    assert_eq!(message.attachments.len(), 1);
    let pdf = message.first_pdf().expect("pdf detected by extension");
    assert_eq!(pdf.filename.as_deref(), Some("A-102.PDF"));
    assert_eq!(pdf.data, b"%PDF-".to_vec());
}

#[tokio::test]
async fn truncated_pdf_yields_no_text() {
    let message = parse_message("8", WITH_ATTACHMENT.as_bytes()).expect("message should parse");
    assert_eq!(pdf_text(&message).await, None);
}

#[test]
fn body_is_capped() {
    let raw = format!(
        "From: a@b.c\r\nSubject: x\r\nContent-Type: text/plain\r\n\r\n{}\r\n",
        "a".repeat(MAX_BODY_CHARS + 500)
    );
    let message = parse_message("1", raw.as_bytes()).expect("message should parse");
    assert_eq!(message.body.chars().count(), MAX_BODY_CHARS);
}

#[test]
fn strip_html_decodes_entities() {
    assert_eq!(
        strip_html("<p>Tom &amp; Jerry&#39;s</p>\n<p>&lt;total&gt;</p>"),
        "Tom & Jerry's <total>"
    );
    assert_eq!(collapse_whitespace("  a \t b\n\nc "), "a b c");
}

fn message(subject: &str, sender: &str) -> MailMessage {
    MailMessage {
        id: "1".to_owned(),
        message_id: None,
        subject: subject.to_owned(),
        sender: sender.to_owned(),
        date: None,
        body: String::new(),
        attachments: Vec::new(),
    }
}

#[test]
fn prefilter_checks_subject_and_sender() {
    assert!(message("Tu FACTURA de mayo", "x@y.z").looks_like_invoice());
    assert!(message("Hola", "notificaciones@banco.mx").looks_like_invoice());
    assert!(message("Confirmación de tu orden", "shop@example.com").looks_like_invoice());
    assert!(!message("Fotos del fin de semana", "mama@example.com").looks_like_invoice());
}

#[test]
fn pdf_detection_by_content_type() {
    let attachment = Attachment {
        filename: None,
        content_type: "application/pdf".to_owned(),
        data: Vec::new(),
    };
    assert!(attachment.is_pdf());
    let image = Attachment {
        filename: Some("logo.png".to_owned()),
        content_type: "image/png".to_owned(),
        data: Vec::new(),
    };
    assert!(!image.is_pdf());
}

#[test]
fn account_debug_hides_password() {
    let account = MailAccount {
        address: "ana@example.com".to_owned(),
        password: "abcd efgh ijkl mnop".to_owned(),
    };
    let debug = format!("{account:?}");
    assert!(debug.contains("ana@example.com"));
    assert!(!debug.contains("abcd"));
}
