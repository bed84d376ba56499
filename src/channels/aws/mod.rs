//! Shared plumbing for the AWS-backed channels (SNS, SES).

pub mod sigv4;

use crate::channels::{HttpTransport, TransportResponse};
use crate::clock::SharedClock;
use crate::config::AwsConfig;
use crate::error::{AppError, Result};
use reqwest::Request;

#[derive(Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Where request credentials come from
#[derive(Debug, Clone)]
pub enum CredentialSource {
    /// Read the named environment variables on every call
    Env {
        access_key_env: String,
        secret_key_env: String,
        session_token_env: String,
    },
    Static(AwsCredentials),
}

impl CredentialSource {
    pub fn resolve(&self) -> Result<AwsCredentials> {
        match self {
            CredentialSource::Static(credentials) => Ok(credentials.clone()),
            CredentialSource::Env {
                access_key_env,
                secret_key_env,
                session_token_env,
            } => {
                let read = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
                let access_key_id = read(access_key_env).ok_or_else(|| {
                    AppError::Configuration(format!("AWS access key not set in {}", access_key_env))
                })?;
                let secret_access_key = read(secret_key_env).ok_or_else(|| {
                    AppError::Configuration(format!("AWS secret key not set in {}", secret_key_env))
                })?;
                Ok(AwsCredentials {
                    access_key_id,
                    secret_access_key,
                    session_token: read(session_token_env),
                })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwsService {
    Sns,
    Ses,
}

impl AwsService {
    /// Service name used in the signing scope
    fn signing_name(&self) -> &'static str {
        match self {
            AwsService::Sns => "sns",
            AwsService::Ses => "ses",
        }
    }

    fn host_prefix(&self) -> &'static str {
        match self {
            AwsService::Sns => "sns",
            AwsService::Ses => "email",
        }
    }
}

/// Signs and sends requests to AWS service endpoints
#[derive(Clone)]
pub struct AwsClient {
    http: HttpTransport,
    credentials: CredentialSource,
    default_region: String,
    sns_endpoint: Option<String>,
    ses_endpoint: Option<String>,
    clock: SharedClock,
}

impl AwsClient {
    pub fn new(http: HttpTransport, config: &AwsConfig, clock: SharedClock) -> Self {
        Self {
            http,
            credentials: CredentialSource::Env {
                access_key_env: config.access_key_env.clone(),
                secret_key_env: config.secret_key_env.clone(),
                session_token_env: config.session_token_env.clone(),
            },
            default_region: config.region.clone(),
            sns_endpoint: config.sns_endpoint.clone(),
            ses_endpoint: config.ses_endpoint.clone(),
            clock,
        }
    }

    pub fn with_credentials(mut self, credentials: AwsCredentials) -> Self {
        self.credentials = CredentialSource::Static(credentials);
        self
    }

    pub fn http(&self) -> &HttpTransport {
        &self.http
    }

    pub fn default_region(&self) -> &str {
        &self.default_region
    }

    /// Base URL for a service in a region, honoring endpoint overrides
    pub fn endpoint(&self, service: AwsService, region: &str) -> String {
        let configured = match service {
            AwsService::Sns => self.sns_endpoint.as_deref(),
            AwsService::Ses => self.ses_endpoint.as_deref(),
        };
        match configured {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://{}.{}.amazonaws.com", service.host_prefix(), region),
        }
    }

    /// Sign and send; configuration faults are errors, delivery faults are responses
    pub async fn send_signed(
        &self,
        mut request: Request,
        service: AwsService,
        region: &str,
    ) -> Result<TransportResponse> {
        let credentials = self.credentials.resolve()?;
        sigv4::sign(
            &mut request,
            &credentials,
            region,
            service.signing_name(),
            self.clock.now(),
        )?;
        Ok(self.http.execute_request(request).await)
    }
}

/// Region component of an ARN (`arn:partition:service:region:account:resource`)
pub fn region_from_arn(arn: &str) -> Option<&str> {
    arn.split(':').nth(3).filter(|region| !region.is_empty())
}
