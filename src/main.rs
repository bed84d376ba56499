use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use notification_dispatcher::{
    channels::ChannelRegistry,
    clock::system_clock,
    config::Config,
    config_store::{ConfigListRequest, ConfigStore},
    dispatch::DispatchCoordinator,
    metrics::{gather_metrics, init_metrics, MetricsRegistry},
    models::{
        ChannelMessage, ConfigDocument, Destination, DispatchRequest, NotificationConfig,
        SesAccount, SmtpAccount,
    },
    quota::{CounterStore, QuotaAccountant},
    settings::SettingsHandle,
    state::{create_store, SortOrder},
};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "notification-dispatcher")]
#[command(about = "Quota-gated notification dispatch", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a message to one or more destinations
    Send {
        /// Correlation id echoed in the response
        #[arg(short, long, default_value = "cli")]
        ref_tag: String,

        #[arg(short, long)]
        title: String,

        #[arg(short, long)]
        body: String,

        #[arg(long)]
        html: Option<String>,

        /// Destination descriptor, e.g. slack:https://hooks.slack.com/...
        #[arg(long = "to")]
        to: Vec<String>,

        /// Stored channel config to deliver through
        #[arg(long = "config-id")]
        config_ids: Vec<String>,
    },

    /// Show month-to-date usage against the monthly limit
    Quota,

    /// Manage stored channel configurations
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Print Prometheus metrics and the in-process counter snapshot
    Metrics,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Create a config from a JSON file
    Create {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(long)]
        id: Option<String>,

        #[arg(long, default_value = "")]
        tenant: String,

        /// Backend role allowed to see the config
        #[arg(long = "access")]
        access: Vec<String>,
    },

    /// Show one config
    Get {
        #[arg(value_name = "CONFIG_ID")]
        id: String,
    },

    /// List configs
    List {
        #[arg(long, default_value = "")]
        tenant: String,

        #[arg(long = "access")]
        access: Vec<String>,

        #[arg(long, default_value = "0")]
        from: usize,

        #[arg(long, default_value = "100")]
        size: usize,

        #[arg(long)]
        sort: Option<String>,

        #[arg(long)]
        desc: bool,

        /// Field filter as name=value
        #[arg(long = "filter")]
        filters: Vec<String>,
    },

    /// Delete configs
    Delete {
        #[arg(value_name = "CONFIG_ID", required = true)]
        ids: Vec<String>,
    },
}

struct Services {
    config: Config,
    coordinator: DispatchCoordinator,
    accountant: Arc<QuotaAccountant>,
    config_store: ConfigStore,
    metrics: Arc<MetricsRegistry>,
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("notification_dispatcher={}", config.observability.log_level).into()
    });
    let registry = tracing_subscriber::registry().with(filter);

    if config.observability.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn build_services(config: Config) -> anyhow::Result<Services> {
    let clock = system_clock();
    let settings = SettingsHandle::from_config(&config);
    let store = create_store(&config.state, settings.clone())
        .context("Failed to initialize document store")?;

    let metrics = Arc::new(MetricsRegistry::new(
        clock.clone(),
        settings.clone(),
        config.metrics.trim_factor as usize,
    ));

    let counters = CounterStore::new(
        store.clone(),
        config.state.counters_collection.clone(),
        clock.clone(),
        settings.clone(),
    )
    .with_metrics(metrics.clone());
    let accountant = Arc::new(QuotaAccountant::new(Arc::new(counters), settings.clone()));

    let registry = ChannelRegistry::new(&config, settings, metrics.clone(), clock.clone())
        .context("Failed to initialize channels")?;
    let coordinator =
        DispatchCoordinator::new(accountant.clone(), Arc::new(registry), metrics.clone());

    let config_store = ConfigStore::new(store, config.state.configs_collection.clone(), clock)
        .with_metrics(metrics.clone());

    Ok(Services {
        config,
        coordinator,
        accountant,
        config_store,
        metrics,
    })
}

fn default_accounts(config: &Config) -> (Option<SmtpAccount>, Option<SesAccount>) {
    let smtp = config.channels.smtp.as_ref().map(|d| SmtpAccount {
        name: d.name.clone(),
        host: d.host.clone(),
        port: d.port,
        method: d.method,
        from_address: d.from_address.clone(),
    });
    let ses = config.channels.ses.as_ref().map(|d| SesAccount {
        name: d.name.clone(),
        region: d.region.clone(),
        role_arn: d.role_arn.clone(),
        from_address: d.from_address.clone(),
    });
    (smtp, ses)
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            eprintln!("Using default configuration");
            Config::from_defaults()?
        }
    };
    init_tracing(&config);

    if let Err(e) = init_metrics() {
        tracing::warn!("Failed to initialize metrics: {}", e);
    }

    tracing::debug!(
        "Starting {} v{}",
        config.observability.service_name,
        env!("CARGO_PKG_VERSION")
    );

    let services = build_services(config)?;

    match cli.command {
        Commands::Send {
            ref_tag,
            title,
            body,
            html,
            to,
            config_ids,
        } => {
            let (smtp, ses) = default_accounts(&services.config);
            let mut recipients = to
                .iter()
                .map(|descriptor| {
                    Destination::parse_descriptor(descriptor, smtp.as_ref(), ses.as_ref())
                })
                .collect::<Result<Vec<_>, _>>()?;
            for id in &config_ids {
                recipients.extend(services.config_store.destinations_for(id).await?);
            }
            if recipients.is_empty() {
                bail!("No destinations given; use --to or --config-id");
            }

            let mut message = ChannelMessage::new(title, body);
            if let Some(html) = html {
                message = message.with_html(html);
            }

            let response = services
                .coordinator
                .dispatch(DispatchRequest::new(ref_tag, recipients, message))
                .await?;

            print_json(&json!({
                "status": response.overall_status().as_u16(),
                "ref_tag": response.ref_tag,
                "results": response.results,
            }))?;
        }

        Commands::Quota => {
            let usage = services.accountant.monthly_usage().await?;
            print_json(&json!({
                "monthly_limit": services.accountant.monthly_limit(),
                "month_to_date": usage,
            }))?;
        }

        Commands::Config { action } => run_config(&services, action).await?,

        Commands::Metrics => {
            println!("{}", gather_metrics());
            print_json(&services.metrics.collect_nested())?;
        }
    }

    Ok(())
}

async fn run_config(services: &Services, action: ConfigAction) -> anyhow::Result<()> {
    let store = &services.config_store;

    match action {
        ConfigAction::Create {
            file,
            id,
            tenant,
            access,
        } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let config: NotificationConfig =
                serde_json::from_str(&raw).context("Invalid config document")?;
            let document = ConfigDocument::new(config, tenant, access, chrono::Utc::now());

            let config_id = store.create(document, id).await?;
            print_json(&json!({ "config_id": config_id }))?;
        }

        ConfigAction::Get { id } => {
            let stored = store.get(&id).await?;
            print_json(&json!({
                "config_id": stored.config_id,
                "token": stored.token.to_string(),
                "document": stored.document,
            }))?;
        }

        ConfigAction::List {
            tenant,
            access,
            from,
            size,
            sort,
            desc,
            filters,
        } => {
            let filters = filters
                .iter()
                .map(|f| match f.split_once('=') {
                    Some((name, value)) => Ok((name.to_string(), value.to_string())),
                    None => bail!("Filter '{}' must have the form name=value", f),
                })
                .collect::<anyhow::Result<BTreeMap<_, _>>>()?;

            let result = store
                .get_all(&ConfigListRequest {
                    tenant,
                    access,
                    from_index: from,
                    max_items: size,
                    sort_field: sort,
                    sort_order: if desc {
                        SortOrder::Descending
                    } else {
                        SortOrder::Ascending
                    },
                    filters,
                })
                .await?;

            let configs: Vec<_> = result
                .configs
                .iter()
                .map(|c| json!({ "config_id": c.config_id, "document": c.document }))
                .collect();
            print_json(&json!({
                "start_index": result.start_index,
                "total_hits": result.total_hits,
                "configs": configs,
            }))?;
        }

        ConfigAction::Delete { ids } => {
            let outcomes = store.delete_many(&ids).await?;
            print_json(&json!({ "deleted": outcomes }))?;
        }
    }

    Ok(())
}
