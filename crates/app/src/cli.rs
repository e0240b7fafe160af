use clap::{Parser, Subcommand};
use shared::request::ContentType;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "xandai",
    about = "Send text to a local Ollama model and manage its models",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Ollama server URL for this invocation, e.g. "http://localhost:11434"
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Model for this invocation, e.g. "llama3.2:3b"
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Debug logging on stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send each input (or stdin) to the model, one request at a time
    Send {
        /// What the input is: text, html or page
        #[arg(long = "type", default_value = "text")]
        content_type: ContentType,

        /// Instruction for these requests; the stored template is used otherwise
        #[arg(long, short = 'p')]
        prompt: Option<String>,

        /// Files to send; each becomes its own request
        #[arg(value_name = "INPUT")]
        inputs: Vec<PathBuf>,
    },

    /// Interactive chat on stdin. Ctrl-C stops the current reply.
    Chat {
        /// File whose contents are given to the model as page context
        #[arg(long, value_name = "FILE")]
        page: Option<PathBuf>,
    },

    /// Download a model, showing progress
    Pull { name: String },

    /// Remove a local model
    Delete { name: String },

    /// List local models
    Models,

    /// Show or change stored settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the settings file location and its contents
    Show,
    SetUrl { url: String },
    SetModel { model: String },
    /// Default instruction; pass "" to clear it
    SetPrompt { prompt: String },
}
