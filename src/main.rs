//! Strata - layered cluster configuration state
//!
//! This is the CLI entry point for Strata.

use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strata::cluster::{Cluster, ClusterCore, ClusterSettings};
use strata::configs::ConfigObject;
use strata::error::{ClusterError, Result};
use strata::persistence::JsonFileStore;
use tracing_subscriber::EnvFilter;

/// Strata - cluster configuration state
#[derive(Parser)]
#[command(name = "strata")]
#[command(author = "Evoker Industries")]
#[command(version)]
#[command(about = "Layered, versioned cluster configuration state", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Cluster state file
    #[arg(short, long, global = true)]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new cluster state file
    Init {
        /// Cluster name
        #[arg(long)]
        name: Option<String>,
        /// Cluster ID
        #[arg(long)]
        id: Option<u64>,
        /// Settings file (YAML or JSON)
        #[arg(long)]
        settings: Option<PathBuf>,
    },

    /// Store a config version
    AddConfig {
        /// Config type
        #[arg(short = 't', long = "type")]
        config_type: String,
        /// Version tag
        #[arg(long)]
        tag: String,
        /// Property (key=value)
        #[arg(short, long)]
        property: Vec<String>,
        /// Owning service
        #[arg(long)]
        service: Option<String>,
        /// Also select it as desired
        #[arg(long)]
        select: bool,
    },

    /// Select a stored config version as desired
    Select {
        /// Config type
        #[arg(short = 't', long = "type")]
        config_type: String,
        /// Version tag
        #[arg(long)]
        tag: String,
        /// User making the selection
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Record the config versions a host has applied
    Report {
        /// Host name
        #[arg(long)]
        host: String,
        /// Applied version (type=tag)
        #[arg(short, long, required = true)]
        config: Vec<String>,
    },

    /// Drop a host's reports
    ForgetHost {
        /// Host name
        host: String,
    },

    /// Add a service
    AddService {
        /// Service name
        name: String,
    },

    /// Remove a service
    RemoveService {
        /// Service name
        name: String,
    },

    /// Show desired configs
    Desired,

    /// Show superseded desired configs for a type
    History {
        /// Config type
        #[arg(short = 't', long = "type")]
        config_type: String,
    },

    /// Show applied configs across hosts
    Actual,

    /// Compare desired and applied configs
    Drift,

    /// Print a human-readable dump of the cluster
    Dump,

    /// Print the cluster response as JSON
    Response,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    let state_path = cli.state.unwrap_or_else(|| {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("/var/lib"))
            .join("strata")
            .join("cluster.json")
    });
    let store = Arc::new(JsonFileStore::new(state_path));

    let command = match cli.command {
        Commands::Init { name, id, settings } => {
            return init(&store, name.as_deref(), id, settings.as_deref());
        }
        command => command,
    };

    let cluster = open(&store)?;
    cluster.add_listener(store.clone())?;

    match command {
        Commands::Init { .. } => {}

        Commands::AddConfig {
            config_type,
            tag,
            property,
            service,
            select,
        } => {
            let mut config = ConfigObject::new(&config_type, &tag);
            for (key, value) in parse_pairs(&property)? {
                config = config.property(&key, &value);
            }
            if let Some(service) = service {
                config = config.service(&service);
            }

            if cluster.add_config(config.clone())? {
                println!("Stored {} {}", config_type, tag);
            } else {
                println!("{} {} already stored", config_type, tag);
            }
            if select {
                cluster.add_desired_config(&config)?;
                println!("Selected {} {}", config_type, tag);
            }
        }

        Commands::Select {
            config_type,
            tag,
            user,
        } => {
            let config = cluster
                .get_config(&config_type, &tag)?
                .ok_or_else(|| ClusterError::ConfigNotFound {
                    config_type: config_type.clone(),
                    tag: tag.clone(),
                })?;
            let previous = cluster.add_desired_config_by(&config, user.as_deref())?;
            match previous {
                Some(p) => println!("Selected {} {} (was {})", config_type, tag, p.tag),
                None => println!("Selected {} {}", config_type, tag),
            }
        }

        Commands::Report { host, config } => {
            let tags: HashMap<String, String> = parse_pairs(&config)?.into_iter().collect();
            cluster.update_actual_configs(&host, &tags)?;
            println!("Recorded {} configs for {}", tags.len(), host);
        }

        Commands::ForgetHost { host } => {
            if cluster.forget_host(&host)? {
                println!("Forgot {}", host);
            } else {
                println!("{} has not reported", host);
            }
        }

        Commands::AddService { name } => {
            cluster.add_service(&name)?;
            println!("{}", name);
        }

        Commands::RemoveService { name } => {
            cluster.delete_service(&name)?;
            println!("{}", name);
        }

        Commands::Desired => {
            println!("{:<24} {:<16} {:<12} {:<20}", "TYPE", "TAG", "USER", "SELECTED");
            for desired in cluster.get_desired_configs()?.values() {
                println!(
                    "{:<24} {:<16} {:<12} {:<20}",
                    desired.config_type,
                    desired.tag,
                    desired.user.as_deref().unwrap_or("-"),
                    desired.selected_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }

        Commands::History { config_type } => {
            for desired in cluster.desired_config_history(&config_type)? {
                println!(
                    "{:<16} {:<12} {:<20}",
                    desired.tag,
                    desired.user.as_deref().unwrap_or("-"),
                    desired.selected_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }

        Commands::Actual => {
            println!("{:<24} {}", "TYPE", "STATUS");
            for (config_type, view) in cluster.get_actual_configs()? {
                println!("{:<24} {}", config_type, view);
            }
        }

        Commands::Drift => {
            let drift = cluster.config_drift()?;
            println!("{}", serde_json::to_string_pretty(&drift)?);
        }

        Commands::Dump => {
            let mut out = String::new();
            cluster.debug_dump(&mut out)?;
            print!("{}", out);
        }

        Commands::Response => {
            let response = cluster.convert_to_response()?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    if store.dirty() > 0 {
        store.save_cluster(&cluster)?;
    }

    Ok(())
}

fn init(
    store: &JsonFileStore,
    name: Option<&str>,
    id: Option<u64>,
    settings: Option<&Path>,
) -> Result<()> {
    let mut settings = match settings {
        Some(path) => ClusterSettings::from_file(path)?,
        None => ClusterSettings::default(),
    };
    if let Some(name) = name {
        settings.name = name.to_string();
    }
    if let Some(id) = id {
        settings.cluster_id = id;
    }

    let cluster = ClusterCore::from_settings(&settings)?;
    store.save(&cluster.snapshot()?)?;
    println!(
        "Cluster {} ({}) written to {}",
        settings.name,
        settings.cluster_id,
        store.path().display()
    );
    Ok(())
}

fn open(store: &JsonFileStore) -> Result<ClusterCore> {
    match store.load()? {
        Some(state) => ClusterCore::load(state, &ClusterSettings::default()),
        None => {
            tracing::warn!(
                path = %store.path().display(),
                "no cluster state found, starting empty"
            );
            ClusterCore::from_settings(&ClusterSettings::default())
        }
    }
}

fn parse_pairs(pairs: &[String]) -> Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| ClusterError::InvalidSettings(format!("expected key=value, got '{}'", pair)))
        })
        .collect()
}
