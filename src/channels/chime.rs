use crate::channels::{mismatched, Channel, HttpTransport};
use crate::error::Result;
use crate::models::{ChannelKind, ChannelMessage, Destination, RecipientResult};
use async_trait::async_trait;
use serde::Serialize;

/// Amazon Chime room webhook channel
#[derive(Clone)]
pub struct ChimeChannel {
    http: HttpTransport,
}

#[derive(Debug, Serialize)]
struct ChimePayload {
    #[serde(rename = "Content")]
    content: String,
}

impl ChimeChannel {
    pub fn new(http: HttpTransport) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Channel for ChimeChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Chime
    }

    async fn send(
        &self,
        ref_tag: &str,
        destination: &Destination,
        message: &ChannelMessage,
    ) -> Result<RecipientResult> {
        let Destination::Chime { url } = destination else {
            return Err(mismatched(self.kind(), destination));
        };

        let target = match self.http.check_url(url) {
            Ok(target) => target,
            Err(rejected) => return Ok(rejected.into_result(url)),
        };

        tracing::debug!(ref_tag, channel = "chime", "Posting to Chime webhook");
        let payload = ChimePayload {
            content: message.chat_text(),
        };
        let request = self.http.client().post(target).json(&payload);

        Ok(self.http.execute(request).await.into_result(url))
    }
}
