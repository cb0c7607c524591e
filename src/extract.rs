//! Message extractor: raw RFC 822 bytes → sender, subject, plain-text body.

use mailparse::{MailHeaderMap, ParsedMail};

use crate::error::ExtractError;
use crate::message::MessageContent;

/// Extract sender, subject and plain-text body from a raw message.
///
/// `From` and `Subject` are returned as they appear on the wire; encoded
/// words are not decoded. Every part is visited depth-first, starting at
/// the top level and descending into attached `message/rfc822` messages.
/// Each `text/plain` part overwrites the body, so the last one visited
/// wins. A message without a plain-text part yields an empty body.
pub fn extract(raw: &[u8]) -> Result<MessageContent, ExtractError> {
    let parsed = parse(raw)?;

    let sender = raw_header(&parsed, "From");
    let subject = raw_header(&parsed, "Subject");

    let mut body = String::new();
    visit_plain_text(&parsed, &mut body)?;

    Ok(MessageContent {
        sender,
        subject,
        body,
    })
}

fn parse(raw: &[u8]) -> Result<ParsedMail<'_>, ExtractError> {
    mailparse::parse_mail(raw).map_err(|e| ExtractError::Parse(e.to_string()))
}

fn raw_header(parsed: &ParsedMail<'_>, name: &str) -> String {
    parsed
        .headers
        .get_first_header(name)
        .map(|h| String::from_utf8_lossy(h.get_value_raw()).into_owned())
        .unwrap_or_default()
}

fn decoded_payload(part: &ParsedMail<'_>) -> Result<Vec<u8>, ExtractError> {
    part.get_body_raw()
        .map_err(|e| ExtractError::Decode(e.to_string()))
}

fn visit_plain_text(part: &ParsedMail<'_>, body: &mut String) -> Result<(), ExtractError> {
    let mimetype = &part.ctype.mimetype;
    if mimetype.eq_ignore_ascii_case("text/plain") {
        let bytes = decoded_payload(part)?;
        *body = String::from_utf8(bytes).map_err(|e| ExtractError::Decode(e.to_string()))?;
    } else if mimetype.eq_ignore_ascii_case("message/rfc822") {
        // mailparse leaves attached messages unparsed.
        let inner = decoded_payload(part)?;
        visit_plain_text(&parse(&inner)?, body)?;
    }
    for sub in &part.subparts {
        visit_plain_text(sub, body)?;
    }
    Ok(())
}
