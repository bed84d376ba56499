//! Email-family channels.
//!
//! Both channels run the same preflight before touching a backend: an
//! account without a sender answers 501, an oversize message 413, and a
//! malformed address 400.

pub mod ses;
pub mod smtp;

pub use ses::SesChannel;
pub use smtp::SmtpChannel;

use crate::channels::TransportResponse;
use crate::models::{Attachment, ChannelMessage};
use base64ct::{Base64, Encoding};
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MimeAttachment, Mailbox, MultiPart, SinglePart};
use lettre::Message;
use reqwest::StatusCode;

/// Bytes added to the message parts when estimating wire size
pub const HEADER_OVERHEAD_BYTES: usize = 160;

pub(crate) struct Envelope {
    pub from: Mailbox,
    pub to: Mailbox,
}

/// Checks shared by every email channel, in order: sender configured,
/// size within limit, addresses well formed
pub(crate) fn preflight(
    from_address: &str,
    recipient: &str,
    message: &ChannelMessage,
    size_limit: usize,
) -> std::result::Result<Envelope, TransportResponse> {
    if from_address.trim().is_empty() {
        return Err(TransportResponse::new(
            StatusCode::NOT_IMPLEMENTED,
            "Email account has no from address configured",
        ));
    }

    let size = message.approximate_email_size(HEADER_OVERHEAD_BYTES);
    if size > size_limit {
        return Err(TransportResponse::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("Email size {} exceeds limit {}", size, size_limit),
        ));
    }

    let from = from_address.parse::<Mailbox>().map_err(|e| {
        TransportResponse::bad_request(format!("Invalid from address '{}': {}", from_address, e))
    })?;
    let to = recipient.parse::<Mailbox>().map_err(|e| {
        TransportResponse::bad_request(format!("Invalid recipient address '{}': {}", recipient, e))
    })?;

    Ok(Envelope { from, to })
}

fn attachment_part(attachment: &Attachment) -> std::result::Result<SinglePart, TransportResponse> {
    let data = if attachment.file_encoding.eq_ignore_ascii_case("base64") {
        Base64::decode_vec(attachment.file_data.trim()).map_err(|_| {
            TransportResponse::bad_request(format!(
                "Attachment '{}' is not valid base64",
                attachment.file_name
            ))
        })?
    } else {
        attachment.file_data.clone().into_bytes()
    };

    let content_type = attachment
        .file_content_type
        .as_deref()
        .and_then(|ct| ContentType::parse(ct).ok())
        .unwrap_or_else(|| ContentType::parse("application/octet-stream").unwrap_or(ContentType::TEXT_PLAIN));

    Ok(MimeAttachment::new(attachment.file_name.clone()).body(data, content_type))
}

/// Render the MIME message: plain text, optional HTML alternative and attachment
pub(crate) fn build_message(
    envelope: Envelope,
    message: &ChannelMessage,
) -> std::result::Result<Message, TransportResponse> {
    let body = match &message.html_body {
        Some(html) => MultiPart::alternative_plain_html(message.text_body.clone(), html.clone()),
        None => MultiPart::mixed().singlepart(SinglePart::plain(message.text_body.clone())),
    };

    let body = match &message.attachment {
        Some(attachment) => MultiPart::mixed()
            .multipart(body)
            .singlepart(attachment_part(attachment)?),
        None => body,
    };

    Message::builder()
        .from(envelope.from)
        .to(envelope.to)
        .subject(message.title.clone())
        .multipart(body)
        .map_err(|e| TransportResponse::bad_request(format!("Failed to build email: {}", e)))
}
