//! RFC 2822 message assembly for the Gmail `messages.send` endpoint.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use rand::Rng as _;

use crate::api::{Mailbox, OutgoingMessage};

const LINE_WIDTH: usize = 76;
/// 45 bytes encode to 60 base64 characters, 72 with the `=?UTF-8?B?` and
/// `?=` delimiters.
const ENCODED_WORD_BYTES: usize = 45;

/// Renders `message` as a `multipart/mixed` document with CRLF line endings.
pub fn render(message: &OutgoingMessage, boundary: &str) -> String {
    let mut out = String::new();
    if let Some(ref from) = message.from {
        push_line(&mut out, &format!("From: {}", format_mailbox(from)));
    }
    push_line(&mut out, &format!("To: {}", format_mailbox(&message.to)));
    push_line(&mut out, &format!("Subject: {}", encode_header(&message.subject)));
    push_line(&mut out, "MIME-Version: 1.0");
    push_line(
        &mut out,
        &format!("Content-Type: multipart/mixed; boundary=\"{}\"", boundary),
    );
    push_line(&mut out, "");

    push_line(&mut out, &format!("--{}", boundary));
    push_line(&mut out, "Content-Type: text/plain; charset=\"UTF-8\"");
    push_line(&mut out, "Content-Transfer-Encoding: base64");
    push_line(&mut out, "");
    out.push_str(&wrap_base64(message.body.as_bytes()));

    for attachment in &message.attachments {
        let filename = single_line(&attachment.filename).replace(['"', '\\'], "");
        push_line(&mut out, &format!("--{}", boundary));
        push_line(
            &mut out,
            &format!("Content-Type: {}; name=\"{}\"", attachment.mime_type, filename),
        );
        push_line(
            &mut out,
            &format!("Content-Disposition: attachment; filename=\"{}\"", filename),
        );
        push_line(&mut out, "Content-Transfer-Encoding: base64");
        push_line(&mut out, "");
        out.push_str(&wrap_base64(&attachment.content));
    }

    push_line(&mut out, &format!("--{}--", boundary));
    out
}

/// Renders `message` with a random boundary and encodes it for the `raw` field.
pub fn encode_raw(message: &OutgoingMessage) -> String {
    URL_SAFE_NO_PAD.encode(render(message, &random_boundary()))
}

fn random_boundary() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 12] = rng.random();
    format!("certflow-{}", URL_SAFE_NO_PAD.encode(bytes))
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push_str("\r\n");
}

fn format_mailbox(mailbox: &Mailbox) -> String {
    let address: String = mailbox
        .address
        .chars()
        .filter(|c| !c.is_control() && !c.is_whitespace() && !matches!(c, '<' | '>' | ',' | ';' | '"'))
        .collect();
    match mailbox.display_name.as_deref().map(single_line) {
        Some(name) if !name.is_ascii() => format!("{} <{}>", encode_header(&name), address),
        Some(name) => format!("\"{}\" <{}>", name.replace(['"', '\\'], ""), address),
        None => address,
    }
}

/// Header value on one line: CR and LF become spaces, other control
/// characters are dropped.
fn single_line(value: &str) -> String {
    value
        .chars()
        .filter_map(|c| match c {
            '\r' | '\n' => Some(' '),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect()
}

/// RFC 2047 encoded words for non-ASCII header values, folded so that no
/// word exceeds 75 characters.
fn encode_header(value: &str) -> String {
    let value = single_line(value);
    if value.is_ascii() {
        return value;
    }
    let mut words = Vec::new();
    let mut chunk = String::new();
    for c in value.chars() {
        if chunk.len() + c.len_utf8() > ENCODED_WORD_BYTES {
            words.push(encoded_word(&chunk));
            chunk.clear();
        }
        chunk.push(c);
    }
    if !chunk.is_empty() {
        words.push(encoded_word(&chunk));
    }
    words.join("\r\n ")
}

fn encoded_word(text: &str) -> String {
    format!("=?UTF-8?B?{}?=", STANDARD.encode(text))
}

fn wrap_base64(bytes: &[u8]) -> String {
    let encoded = STANDARD.encode(bytes);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / LINE_WIDTH * 2 + 2);
    // base64 output is ASCII, so byte chunks are valid str slices
    for chunk in encoded.as_bytes().chunks(LINE_WIDTH) {
        out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        out.push_str("\r\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Attachment, PDF_MIME_TYPE};

    fn message() -> OutgoingMessage {
        OutgoingMessage {
            from: Some(Mailbox::new("events@example.com").with_display_name("CSI PCE")),
            to: Mailbox::new("ada@example.com"),
            subject: "Certificate of Participation – RustConf".into(),
            body: "Dear Ada,".into(),
            attachments: vec![Attachment {
                filename: "certificate.pdf".into(),
                mime_type: PDF_MIME_TYPE.into(),
                content: b"%PDF-1.4".to_vec(),
            }],
        }
    }

    #[test]
    fn renders_multipart_message() {
        let rendered = render(&message(), "BOUNDARY");
        let expected = concat!(
            "From: \"CSI PCE\" <events@example.com>\r\n",
            "To: ada@example.com\r\n",
            "Subject: =?UTF-8?B?Q2VydGlmaWNhdGUgb2YgUGFydGljaXBhdGlvbiDigJMgUnVzdENvbmY=?=\r\n",
            "MIME-Version: 1.0\r\n",
            "Content-Type: multipart/mixed; boundary=\"BOUNDARY\"\r\n",
            "\r\n",
            "--BOUNDARY\r\n",
            "Content-Type: text/plain; charset=\"UTF-8\"\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "RGVhciBBZGEs\r\n",
            "--BOUNDARY\r\n",
            "Content-Type: application/pdf; name=\"certificate.pdf\"\r\n",
            "Content-Disposition: attachment; filename=\"certificate.pdf\"\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "JVBERi0xLjQ=\r\n",
            "--BOUNDARY--\r\n",
        );
        assert_eq!(rendered, expected);
    }

    #[test]
    fn from_header_omitted_without_sender() {
        let mut message = message();
        message.from = None;
        let rendered = render(&message, "B");
        assert!(rendered.starts_with("To: ada@example.com\r\n"));
    }

    #[test]
    fn ascii_headers_pass_through() {
        assert_eq!(encode_header("Hello"), "Hello");
        assert!(encode_header("Café").starts_with("=?UTF-8?B?"));
    }

    fn header_lines(rendered: &str) -> Vec<&str> {
        rendered
            .split("\r\n\r\n")
            .next()
            .unwrap_or_default()
            .split("\r\n")
            .collect()
    }

    #[test]
    fn line_breaks_cannot_add_headers() {
        let mut message = message();
        message.subject = "Hack Night\r\nBcc: other@evil.test".into();
        message.to = Mailbox::new("ada@example.com\r\nBcc: leak@evil.test");
        message.from = Some(Mailbox::new("events@example.com").with_display_name("CSI\nBcc: x@evil.test"));

        let rendered = render(&message, "B");
        let headers = header_lines(&rendered);

        assert!(!headers.iter().any(|h| h.starts_with("Bcc")));
        assert!(headers.contains(&"Subject: Hack Night  Bcc: other@evil.test"));
        assert!(headers.contains(&"To: ada@example.comBcc:leak@evil.test"));
        assert!(headers.contains(&"From: \"CSI Bcc: x@evil.test\" <events@example.com>"));
    }

    #[test]
    fn control_characters_are_dropped_from_headers() {
        assert_eq!(single_line("Rust\u{0}Conf\t2024"), "RustConf2024");
        assert_eq!(encode_header("a\rb"), "a b");
    }

    #[test]
    fn long_non_ascii_subject_is_split_into_short_words() {
        let subject = "Certificat de participation – Journée Rust à Montréal, édition 2024";
        let encoded = encode_header(subject);
        let words: Vec<&str> = encoded.split("\r\n ").collect();

        assert!(words.len() > 1);
        assert!(words.iter().all(|w| w.len() <= 75));
        assert!(words.iter().all(|w| w.starts_with("=?UTF-8?B?") && w.ends_with("?=")));
        let decoded: String = words
            .iter()
            .map(|w| {
                let payload = &w["=?UTF-8?B?".len()..w.len() - 2];
                String::from_utf8(STANDARD.decode(payload).unwrap()).unwrap()
            })
            .collect();
        assert_eq!(decoded, subject);
    }

    #[test]
    fn long_content_wraps_at_76() {
        let wrapped = wrap_base64(&[0u8; 120]);
        let lines: Vec<&str> = wrapped.split("\r\n").filter(|l| !l.is_empty()).collect();
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|l| l.len() <= LINE_WIDTH));
    }

    #[test]
    fn raw_is_url_safe() {
        let raw = encode_raw(&message());
        assert!(!raw.contains('+'));
        assert!(!raw.contains('/'));
        assert!(!raw.contains('='));
        let decoded = URL_SAFE_NO_PAD.decode(raw).unwrap();
        let text = String::from_utf8(decoded).unwrap();
        assert!(text.contains("boundary=\"certflow-"));
    }
}
