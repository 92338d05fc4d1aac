//! Command-line access to Casbin models and policy rules in Postgres.
//!
//! Connection settings come from `DOCSTORE_POSTGRES_*` / `DATABASE_URL` and the
//! collection/namespace from `CASBIN_DOCSTORE_*`; flags override both.
mod policy_file;

use anyhow::{Context, Result, anyhow};
use casbin::Adapter;
use casbin_docstore::{Config, DocStoreAdapter, load_model_text, save_model};
use clap::{Parser, Subcommand};
use docstore::postgres::PostgresStore;
use docstore::{DocumentStore, PostgresConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "policyctl")]
#[command(about = "Manage Casbin models and policy rules stored in Postgres")]
struct Args {
    /// Collection holding the model document and rule rows
    #[arg(long, global = true)]
    collection: Option<String>,

    /// Namespace partition
    #[arg(long, global = true)]
    namespace: Option<String>,

    /// Postgres connection URL
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a model file and store it
    SaveModel {
        #[arg(long)]
        path: PathBuf,
    },
    /// Print the stored model text
    LoadModel,
    /// Print stored rules as CSV policy lines
    ListPolicy,
    /// Add rules from a CSV policy file
    ImportPolicy {
        #[arg(long)]
        path: PathBuf,

        /// Remove existing rules first
        #[arg(long)]
        replace: bool,
    },
}

impl Args {
    fn policy_config(&self) -> Result<Config> {
        let mut config = Config::from_env_or_yaml()?;
        if let Some(collection) = &self.collection {
            config.collection = collection.clone();
        }
        if let Some(namespace) = &self.namespace {
            config.namespace = namespace.clone();
        }
        Ok(config)
    }

    fn postgres_config(&self) -> Result<PostgresConfig> {
        match &self.database_url {
            Some(url) => Ok(PostgresConfig::new(url.clone())),
            None => PostgresConfig::from_env(),
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();
    let config = args.policy_config()?;
    let pg = args.postgres_config()?;
    let store = Arc::new(
        PostgresStore::connect(&pg)
            .await
            .context("connect to postgres")?,
    );
    info!(
        collection = config.collection(),
        namespace = %config.namespace,
        "connected to document store"
    );

    let result = run(args.command, store.clone(), config).await;
    store.close().await.context("close document store")?;
    result
}

async fn run(command: Command, store: Arc<PostgresStore>, config: Config) -> Result<()> {
    match command {
        Command::SaveModel { path } => {
            save_model(store.as_ref(), &path, &config)
                .await
                .with_context(|| format!("save model from {}", path.display()))?;
            info!(path = %path.display(), "model saved");
        }
        Command::LoadModel => {
            let text = load_model_text(store.as_ref(), &config)
                .await
                .context("load model")?;
            print!("{text}");
        }
        Command::ListPolicy => {
            let adapter = DocStoreAdapter::with_config(store, config);
            let rows = adapter.load_rules().await.context("load policy rules")?;
            for row in rows {
                println!("{}", row.to_csv_line());
            }
        }
        Command::ImportPolicy { path, replace } => {
            let text = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("read policy file {}", path.display()))?;
            let grouped = policy_file::parse_policy(&text)
                .with_context(|| format!("parse policy file {}", path.display()))?;

            let mut adapter = DocStoreAdapter::with_config(store, config);
            if replace {
                adapter
                    .clear_policy()
                    .await
                    .map_err(|err| anyhow!("clear policy: {err}"))?;
            }
            let mut imported = 0;
            for (ptype, rules) in grouped {
                let count = rules.len();
                let section: String = ptype.chars().take(1).collect();
                adapter
                    .add_policies(&section, &ptype, rules)
                    .await
                    .map_err(|err| anyhow!("import `{ptype}` rules: {err}"))?;
                imported += count;
            }
            info!(imported, replace, "policy imported");
        }
    }
    Ok(())
}
