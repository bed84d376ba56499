use crate::error::{AppError, Result};
use crate::models::{HttpMethod, SmtpMethod};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::{Validate, ValidateEmail};

/// Stored channel configuration with its ownership metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    pub metadata: ConfigMetadata,
    pub config: NotificationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigMetadata {
    #[serde(rename = "created_time_ms", with = "chrono::serde::ts_milliseconds")]
    pub created_time: DateTime<Utc>,
    #[serde(rename = "last_update_time_ms", with = "chrono::serde::ts_milliseconds")]
    pub last_update_time: DateTime<Utc>,
    #[serde(default)]
    pub tenant: String,
    /// Backend roles allowed to see the document
    #[serde(default)]
    pub access: Vec<String>,
}

/// A named channel or account configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct NotificationConfig {
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
    #[serde(flatten)]
    pub config_data: ConfigData,
}

fn default_enabled() -> bool {
    true
}

/// Type-specific configuration payload, tagged by `config_type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "config_type", rename_all = "snake_case")]
pub enum ConfigData {
    Slack(SlackConfig),
    Chime(ChimeConfig),
    Webhook(WebhookConfig),
    Sns(SnsConfig),
    SmtpAccount(SmtpAccountConfig),
    SesAccount(SesAccountConfig),
    EmailGroup(EmailGroupConfig),
    Email(EmailConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SlackConfig {
    #[validate(url)]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ChimeConfig {
    #[validate(url)]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct WebhookConfig {
    #[validate(url)]
    pub url: String,
    #[serde(default)]
    pub header_params: BTreeMap<String, String>,
    #[serde(default)]
    pub method: HttpMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SnsConfig {
    #[validate(length(min = 1))]
    pub topic_arn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SmtpAccountConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
    #[serde(default)]
    pub method: SmtpMethod,
    #[validate(email)]
    pub from_address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SesAccountConfig {
    #[validate(length(min = 1))]
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
    #[validate(email)]
    pub from_address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct EmailGroupConfig {
    #[validate(length(min = 1))]
    pub recipients: Vec<String>,
}

/// Email channel: an account plus direct recipients and/or email groups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct EmailConfig {
    #[validate(length(min = 1))]
    pub email_account_id: String,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub email_group_ids: Vec<String>,
}

impl ConfigData {
    pub fn type_name(&self) -> &'static str {
        match self {
            ConfigData::Slack(_) => "slack",
            ConfigData::Chime(_) => "chime",
            ConfigData::Webhook(_) => "webhook",
            ConfigData::Sns(_) => "sns",
            ConfigData::SmtpAccount(_) => "smtp_account",
            ConfigData::SesAccount(_) => "ses_account",
            ConfigData::EmailGroup(_) => "email_group",
            ConfigData::Email(_) => "email",
        }
    }

    /// Validate the type-specific payload
    pub fn validate_data(&self) -> Result<()> {
        match self {
            ConfigData::Slack(c) => c.validate()?,
            ConfigData::Chime(c) => c.validate()?,
            ConfigData::Webhook(c) => c.validate()?,
            ConfigData::Sns(c) => {
                c.validate()?;
                validate_arn(&c.topic_arn, "topic_arn")?;
                if let Some(role) = &c.role_arn {
                    validate_arn(role, "role_arn")?;
                }
            }
            ConfigData::SmtpAccount(c) => c.validate()?,
            ConfigData::SesAccount(c) => {
                c.validate()?;
                if let Some(role) = &c.role_arn {
                    validate_arn(role, "role_arn")?;
                }
            }
            ConfigData::EmailGroup(c) => {
                c.validate()?;
                validate_addresses(&c.recipients)?;
            }
            ConfigData::Email(c) => {
                c.validate()?;
                if c.recipients.is_empty() && c.email_group_ids.is_empty() {
                    return Err(AppError::Validation(
                        "Email config needs at least one recipient or email group".to_string(),
                    ));
                }
                validate_addresses(&c.recipients)?;
            }
        }
        Ok(())
    }
}

impl NotificationConfig {
    /// Validate the common fields and the type-specific payload
    pub fn validate_all(&self) -> Result<()> {
        self.validate()?;
        self.config_data.validate_data()
    }
}

impl ConfigDocument {
    pub fn new(
        config: NotificationConfig,
        tenant: impl Into<String>,
        access: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            metadata: ConfigMetadata {
                created_time: now,
                last_update_time: now,
                tenant: tenant.into(),
                access,
            },
            config,
        }
    }
}

fn validate_arn(value: &str, field: &str) -> Result<()> {
    if value.starts_with("arn:") && value.split(':').count() >= 6 {
        Ok(())
    } else {
        Err(AppError::Validation(format!("Invalid {}: '{}'", field, value)))
    }
}

fn validate_addresses(addresses: &[String]) -> Result<()> {
    match addresses.iter().find(|a| !a.validate_email()) {
        Some(bad) => Err(AppError::Validation(format!(
            "Invalid email address '{}'",
            bad
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slack(url: &str) -> NotificationConfig {
        NotificationConfig {
            name: "ops-slack".to_string(),
            description: String::new(),
            is_enabled: true,
            config_data: ConfigData::Slack(SlackConfig {
                url: url.to_string(),
            }),
        }
    }

    #[test]
    fn test_config_serializes_flat_with_type_tag() {
        let json = serde_json::to_value(slack("https://hooks.slack.com/x")).unwrap();
        assert_eq!(json["config_type"], "slack");
        assert_eq!(json["url"], "https://hooks.slack.com/x");
        assert_eq!(json["name"], "ops-slack");

        let back: NotificationConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back.config_data.type_name(), "slack");
    }

    #[test]
    fn test_metadata_times_are_millis() {
        let now = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let doc = ConfigDocument::new(slack("https://hooks.slack.com/x"), "global", vec![], now);
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["metadata"]["created_time_ms"], 1_700_000_000_123i64);
    }

    #[test]
    fn test_invalid_url_rejected() {
        let err = slack("not a url").validate_all().unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_email_config_requires_recipients() {
        let config = NotificationConfig {
            name: "email".to_string(),
            description: String::new(),
            is_enabled: true,
            config_data: ConfigData::Email(EmailConfig {
                email_account_id: "acct".to_string(),
                recipients: vec![],
                email_group_ids: vec![],
            }),
        };
        assert!(config.validate_all().is_err());
    }

    #[test]
    fn test_sns_arn_validation() {
        let data = ConfigData::Sns(SnsConfig {
            topic_arn: "arn:aws:sns:us-east-1:123456789012:alerts".to_string(),
            role_arn: None,
        });
        assert!(data.validate_data().is_ok());

        let data = ConfigData::Sns(SnsConfig {
            topic_arn: "alerts".to_string(),
            role_arn: None,
        });
        assert!(data.validate_data().is_err());
    }

    #[test]
    fn test_email_group_rejects_bad_address() {
        let data = ConfigData::EmailGroup(EmailGroupConfig {
            recipients: vec!["ok@example.com".to_string(), "nope".to_string()],
        });
        assert!(data.validate_data().is_err());
    }
}
