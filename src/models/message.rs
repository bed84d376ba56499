use serde::{Deserialize, Serialize};

/// Message rendered to every recipient of a dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub title: String,
    pub text_body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
}

/// File attached to email-family messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_name: String,
    /// Encoding of `file_data`, e.g. "base64"
    pub file_encoding: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_content_type: Option<String>,
    pub file_data: String,
}

impl ChannelMessage {
    pub fn new(title: impl Into<String>, text_body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text_body: text_body.into(),
            html_body: None,
            attachment: None,
        }
    }

    pub fn with_html(mut self, html_body: impl Into<String>) -> Self {
        self.html_body = Some(html_body.into());
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    /// Title and body joined the way chat webhooks display them
    pub fn chat_text(&self) -> String {
        if self.title.is_empty() {
            self.text_body.clone()
        } else {
            format!("{}\n\n{}", self.title, self.text_body)
        }
    }

    /// Approximate on-the-wire size of the message as an email
    pub fn approximate_email_size(&self, header_overhead: usize) -> usize {
        header_overhead
            + self.title.len()
            + self.text_body.len()
            + self.html_body.as_ref().map_or(0, String::len)
            + self.attachment.as_ref().map_or(0, |a| a.file_data.len())
    }
}
