use crate::clock::SharedClock;
use crate::config_store::ListField;
use crate::error::{AppError, Result};
use crate::metrics::{Metric, MetricsRegistry};
use crate::models::{
    ConfigData, ConfigDocument, Destination, SesAccount, SmtpAccount,
};
use crate::state::{
    ensure_collection, ConcurrencyToken, DocumentStore, Filter, SearchQuery, SortOrder,
    VersionedDocument,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Stored body: the document plus its id so listings can filter on it
#[derive(Serialize)]
struct ConfigBody<'a> {
    config_id: &'a str,
    #[serde(flatten)]
    document: &'a ConfigDocument,
}

/// A config as read back from the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredConfig {
    pub config_id: String,
    pub token: ConcurrencyToken,
    pub document: ConfigDocument,
}

/// Listing parameters, scoped to one tenant
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigListRequest {
    pub tenant: String,
    /// Caller's backend roles; empty means unrestricted
    pub access: Vec<String>,
    pub from_index: usize,
    pub max_items: usize,
    pub sort_field: Option<String>,
    pub sort_order: SortOrder,
    /// Logical field name -> filter value
    pub filters: BTreeMap<String, String>,
}

impl Default for ConfigListRequest {
    fn default() -> Self {
        Self {
            tenant: String::new(),
            access: Vec::new(),
            from_index: 0,
            max_items: 100,
            sort_field: None,
            sort_order: SortOrder::Ascending,
            filters: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigListResult {
    pub start_index: usize,
    pub total_hits: usize,
    pub configs: Vec<StoredConfig>,
}

/// Channel configuration documents with conditioned updates
pub struct ConfigStore {
    store: Arc<dyn DocumentStore>,
    collection: String,
    clock: SharedClock,
    metrics: Option<Arc<MetricsRegistry>>,
    ready: AtomicBool,
}

impl ConfigStore {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>, clock: SharedClock) -> Self {
        Self {
            store,
            collection: collection.into(),
            clock,
            metrics: None,
            ready: AtomicBool::new(false),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn count(&self, metric: Metric) {
        if let Some(metrics) = &self.metrics {
            metrics.increment(metric);
        }
    }

    pub async fn ensure_collection(&self) -> Result<()> {
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }
        ensure_collection(self.store.as_ref(), &self.collection).await?;
        self.ready.store(true, Ordering::Release);
        Ok(())
    }

    async fn collection_ready(&self) -> Result<bool> {
        if self.ready.load(Ordering::Acquire) {
            return Ok(true);
        }
        let exists = self.store.collection_exists(&self.collection).await?;
        if exists {
            self.ready.store(true, Ordering::Release);
        }
        Ok(exists)
    }

    fn encode(config_id: &str, document: &ConfigDocument) -> Result<Value> {
        Ok(serde_json::to_value(ConfigBody {
            config_id,
            document,
        })?)
    }

    fn decode(doc: VersionedDocument) -> Result<StoredConfig> {
        Ok(StoredConfig {
            document: serde_json::from_value(doc.body)?,
            config_id: doc.id,
            token: doc.token,
        })
    }

    /// Store a new config; a random id is assigned when none is given
    #[instrument(skip(self, document), fields(collection = %self.collection))]
    pub async fn create(&self, document: ConfigDocument, id: Option<String>) -> Result<String> {
        document.config.validate_all()?;
        self.ensure_collection().await?;

        let config_id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let body = Self::encode(&config_id, &document)?;
        self.store.create(&self.collection, &config_id, body).await?;

        self.count(Metric::ConfigCreate);
        tracing::info!(
            config_id = %config_id,
            config_type = document.config.config_data.type_name(),
            "Config created"
        );
        Ok(config_id)
    }

    pub async fn get(&self, id: &str) -> Result<StoredConfig> {
        let missing = || AppError::NotFound(format!("Config {} not found", id));
        if !self.collection_ready().await? {
            return Err(missing());
        }
        match self.store.get(&self.collection, id).await? {
            Some(doc) => Self::decode(doc),
            None => Err(missing()),
        }
    }

    /// Fetch every id or fail listing the ones that are missing
    pub async fn get_many(&self, ids: &[String]) -> Result<Vec<StoredConfig>> {
        let found = if self.collection_ready().await? {
            self.store.get_many(&self.collection, ids).await?
        } else {
            Vec::new()
        };

        if found.len() != ids.len() {
            let present: HashSet<&str> = found.iter().map(|doc| doc.id.as_str()).collect();
            let missing: Vec<&str> = ids
                .iter()
                .map(String::as_str)
                .filter(|id| !present.contains(id))
                .collect();
            if !missing.is_empty() {
                return Err(AppError::NotFound(format!(
                    "Configs not found: {}",
                    missing.join(", ")
                )));
            }
        }

        found.into_iter().map(Self::decode).collect()
    }

    /// Tenant-scoped listing with access filtering, sorting and paging
    #[instrument(skip(self, request), fields(tenant = %request.tenant))]
    pub async fn get_all(&self, request: &ConfigListRequest) -> Result<ConfigListResult> {
        let mut filters = vec![Filter::Terms {
            path: "metadata.tenant".to_string(),
            values: vec![Value::from(request.tenant.as_str())],
        }];
        if !request.access.is_empty() {
            filters.push(Filter::Terms {
                path: "metadata.access".to_string(),
                values: request.access.iter().map(|role| Value::from(role.as_str())).collect(),
            });
        }
        for (name, raw) in &request.filters {
            filters.push(ListField::lookup(name)?.filter(raw)?);
        }
        let sort = match &request.sort_field {
            Some(name) => Some(ListField::lookup(name)?.sort(request.sort_order)),
            None => None,
        };

        if !self.collection_ready().await? {
            return Ok(ConfigListResult {
                start_index: request.from_index,
                total_hits: 0,
                configs: Vec::new(),
            });
        }

        let query = SearchQuery {
            filters,
            sort,
            from: request.from_index,
            size: request.max_items,
        };
        let hits = self.store.search(&self.collection, &query).await?;

        Ok(ConfigListResult {
            start_index: request.from_index,
            total_hits: hits.total,
            configs: hits
                .hits
                .into_iter()
                .map(Self::decode)
                .collect::<Result<_>>()?,
        })
    }

    /// Replace a config if `token` is current.
    ///
    /// `Ok(false)` when the config does not exist; a stale token is a
    /// `ConcurrencyConflict`.
    #[instrument(skip(self, document, token), fields(collection = %self.collection))]
    pub async fn update(
        &self,
        id: &str,
        mut document: ConfigDocument,
        token: ConcurrencyToken,
    ) -> Result<bool> {
        document.config.validate_all()?;
        if !self.collection_ready().await? {
            return Ok(false);
        }

        document.metadata.last_update_time = self.clock.now();
        let body = Self::encode(id, &document)?;

        match self.store.update(&self.collection, id, body, token).await {
            Ok(_) => {
                self.count(Metric::ConfigUpdate);
                tracing::info!(config_id = id, "Config updated");
                Ok(true)
            }
            Err(AppError::NotFound(_)) => Ok(false),
            Err(e @ AppError::ConcurrencyConflict(_)) => {
                self.count(Metric::ConfigConflict);
                tracing::warn!(config_id = id, "Config update rejected, stale token");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        if !self.collection_ready().await? {
            return Ok(false);
        }
        let removed = self.store.delete(&self.collection, id).await?;
        if removed {
            self.count(Metric::ConfigDelete);
            tracing::info!(config_id = id, "Config deleted");
        }
        Ok(removed)
    }

    /// Delete each id, reporting whether it existed
    pub async fn delete_many(&self, ids: &[String]) -> Result<BTreeMap<String, bool>> {
        let mut outcomes = BTreeMap::new();
        for id in ids {
            outcomes.insert(id.clone(), self.delete(id).await?);
        }
        Ok(outcomes)
    }

    /// Dispatchable destinations for a stored channel config.
    ///
    /// Email configs expand to one destination per distinct address across
    /// their direct recipients and email groups.
    pub async fn destinations_for(&self, id: &str) -> Result<Vec<Destination>> {
        let stored = self.get(id).await?;
        let config = stored.document.config;
        if !config.is_enabled {
            return Err(AppError::Validation(format!("Channel {} is muted", id)));
        }

        let destination = match config.config_data {
            ConfigData::Slack(c) => Destination::Slack { url: c.url },
            ConfigData::Chime(c) => Destination::Chime { url: c.url },
            ConfigData::Webhook(c) => Destination::Webhook {
                url: c.url,
                method: c.method,
                headers: c.header_params,
            },
            ConfigData::Sns(c) => Destination::Sns {
                topic_arn: c.topic_arn,
                role_arn: c.role_arn,
            },
            ConfigData::Email(email) => {
                let mut recipients = email.recipients;
                for group_id in &email.email_group_ids {
                    match self.get(group_id).await?.document.config.config_data {
                        ConfigData::EmailGroup(group) => recipients.extend(group.recipients),
                        other => {
                            return Err(AppError::Validation(format!(
                                "Config {} is a {}, not an email group",
                                group_id,
                                other.type_name()
                            )))
                        }
                    }
                }
                let mut seen = HashSet::new();
                recipients.retain(|address| seen.insert(address.to_lowercase()));

                let account = self.get(&email.email_account_id).await?.document.config;
                return match account.config_data {
                    ConfigData::SmtpAccount(smtp) => {
                        let account = SmtpAccount {
                            name: account.name,
                            host: smtp.host,
                            port: smtp.port,
                            method: smtp.method,
                            from_address: smtp.from_address,
                        };
                        Ok(recipients
                            .into_iter()
                            .map(|recipient| Destination::SmtpEmail {
                                account: account.clone(),
                                recipient,
                            })
                            .collect())
                    }
                    ConfigData::SesAccount(ses) => {
                        let account = SesAccount {
                            name: account.name,
                            region: ses.region,
                            role_arn: ses.role_arn,
                            from_address: ses.from_address,
                        };
                        Ok(recipients
                            .into_iter()
                            .map(|recipient| Destination::SesEmail {
                                account: account.clone(),
                                recipient,
                            })
                            .collect())
                    }
                    other => Err(AppError::Validation(format!(
                        "Config {} is a {}, not an email account",
                        email.email_account_id,
                        other.type_name()
                    ))),
                };
            }
            other @ (ConfigData::SmtpAccount(_)
            | ConfigData::SesAccount(_)
            | ConfigData::EmailGroup(_)) => {
                return Err(AppError::Validation(format!(
                    "Config {} is a {} and cannot receive messages",
                    id,
                    other.type_name()
                )))
            }
        };

        Ok(vec![destination])
    }
}
