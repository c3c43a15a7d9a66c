use clap::{Parser, Subcommand};

use skiff_common::InputType;

#[derive(Debug, Parser)]
#[command(name = "skiff")]
#[command(about = "Skiff CLI for applications, models and replicas", long_about = None)]
pub struct Args {
    /// Server URL
    #[arg(long, env = "SKIFF_URL", default_value = "http://127.0.0.1:1337")]
    pub url: String,

    /// Admin API token (Authorization: Bearer)
    #[arg(long, env = "SKIFF_TOKEN")]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Application management
    App {
        #[command(subcommand)]
        subcommand: AppCommand,
    },
    /// Model and version management
    Model {
        #[command(subcommand)]
        subcommand: ModelCommand,
    },
    /// Show applications, links and version health
    Status,
    /// List running replicas
    Replicas,
    /// Send one query to an application
    Predict {
        app: String,
        /// JSON value for the `input` field, e.g. '[1.0, 2.5]'
        input: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum AppCommand {
    /// Register a new application
    Register {
        name: String,
        #[arg(long)]
        input_type: InputType,
        /// Returned when a query cannot be served in time
        #[arg(long, allow_hyphen_values = true)]
        default_output: String,
        /// Latency objective in microseconds
        #[arg(long, default_value_t = 100_000)]
        slo_micros: i64,
    },
    List,
    Get {
        name: String,
    },
    /// Deregister an application and drop its link
    Remove {
        name: String,
    },
    /// Route an application to a model (replaces any existing link)
    Link {
        app: String,
        model: String,
    },
    Unlink {
        app: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum ModelCommand {
    /// Deploy a new version of a model
    Deploy {
        name: String,
        #[arg(long)]
        version: String,
        #[arg(long)]
        input_type: InputType,
        /// Container image or executable serving the version
        #[arg(long)]
        image: String,
        /// Extra arguments for the image (repeatable)
        #[arg(long = "arg", allow_hyphen_values = true)]
        args: Vec<String>,
        #[arg(long, default_value_t = 1)]
        replicas: i64,
    },
    List,
    Get {
        name: String,
    },
    /// Remove a model that no application links to
    Remove {
        name: String,
    },
    /// Route a model's traffic to one of its versions (rollback / roll forward)
    Activate {
        name: String,
        version: String,
    },
    /// Set a version's replica count
    Scale {
        name: String,
        version: String,
        replicas: i64,
    },
}
