use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

/// The closed set of channel kinds a message can be delivered through
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChannelKind {
    Slack,
    Chime,
    Webhook,
    Sns,
    SmtpEmail,
    SesEmail,
}

impl ChannelKind {
    pub fn all() -> Vec<ChannelKind> {
        ChannelKind::iter().collect()
    }

    /// Parse a destination type tag, rejecting unknown tags
    pub fn parse(tag: &str) -> Result<Self> {
        ChannelKind::from_str(tag.trim())
            .map_err(|_| AppError::Validation(format!("Unknown destination type '{}'", tag)))
    }

    pub fn is_email(&self) -> bool {
        matches!(self, ChannelKind::SmtpEmail | ChannelKind::SesEmail)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Post,
    Put,
    Patch,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SmtpMethod {
    None,
    Ssl,
    #[default]
    StartTls,
}

/// SMTP account used by email destinations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmtpAccount {
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub method: SmtpMethod,
    /// Empty when the account has no sender configured
    #[serde(default)]
    pub from_address: String,
}

/// SES account used by email destinations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SesAccount {
    pub name: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
    #[serde(default)]
    pub from_address: String,
}

/// A fully resolved recipient: channel kind plus its target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Destination {
    Slack {
        url: String,
    },
    Chime {
        url: String,
    },
    Webhook {
        url: String,
        #[serde(default)]
        method: HttpMethod,
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
    Sns {
        topic_arn: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role_arn: Option<String>,
    },
    SmtpEmail {
        account: SmtpAccount,
        recipient: String,
    },
    SesEmail {
        account: SesAccount,
        recipient: String,
    },
}

impl Destination {
    pub fn kind(&self) -> ChannelKind {
        match self {
            Destination::Slack { .. } => ChannelKind::Slack,
            Destination::Chime { .. } => ChannelKind::Chime,
            Destination::Webhook { .. } => ChannelKind::Webhook,
            Destination::Sns { .. } => ChannelKind::Sns,
            Destination::SmtpEmail { .. } => ChannelKind::SmtpEmail,
            Destination::SesEmail { .. } => ChannelKind::SesEmail,
        }
    }

    /// The target identifier reported back in results
    pub fn address(&self) -> &str {
        match self {
            Destination::Slack { url }
            | Destination::Chime { url }
            | Destination::Webhook { url, .. } => url,
            Destination::Sns { topic_arn, .. } => topic_arn,
            Destination::SmtpEmail { recipient, .. } | Destination::SesEmail { recipient, .. } => {
                recipient
            }
        }
    }

    /// Parse a `kind:target` descriptor. Email kinds take their account from
    /// the supplied defaults.
    pub fn parse_descriptor(
        descriptor: &str,
        smtp: Option<&SmtpAccount>,
        ses: Option<&SesAccount>,
    ) -> Result<Self> {
        let (tag, target) = descriptor.split_once(':').ok_or_else(|| {
            AppError::Validation(format!(
                "Destination '{}' must have the form <type>:<target>",
                descriptor
            ))
        })?;
        let target = target.trim();
        if target.is_empty() {
            return Err(AppError::Validation(format!(
                "Destination '{}' has an empty target",
                descriptor
            )));
        }

        let kind = match tag.trim() {
            "smtp" => ChannelKind::SmtpEmail,
            "ses" => ChannelKind::SesEmail,
            other => ChannelKind::parse(other)?,
        };

        match kind {
            ChannelKind::Slack => Ok(Destination::Slack {
                url: target.to_string(),
            }),
            ChannelKind::Chime => Ok(Destination::Chime {
                url: target.to_string(),
            }),
            ChannelKind::Webhook => Ok(Destination::Webhook {
                url: target.to_string(),
                method: HttpMethod::default(),
                headers: BTreeMap::new(),
            }),
            ChannelKind::Sns => Ok(Destination::Sns {
                topic_arn: target.to_string(),
                role_arn: None,
            }),
            ChannelKind::SmtpEmail => {
                let account = smtp.ok_or_else(|| {
                    AppError::Validation("No default SMTP account configured".to_string())
                })?;
                Ok(Destination::SmtpEmail {
                    account: account.clone(),
                    recipient: target.to_string(),
                })
            }
            ChannelKind::SesEmail => {
                let account = ses.ok_or_else(|| {
                    AppError::Validation("No default SES account configured".to_string())
                })?;
                Ok(Destination::SesEmail {
                    account: account.clone(),
                    recipient: target.to_string(),
                })
            }
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.address())
    }
}

impl FromStr for Destination {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        Destination::parse_descriptor(s, None, None)
    }
}
