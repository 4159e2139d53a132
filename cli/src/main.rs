//! Aurora command-line client.

mod client;
mod config;

use std::io::Write;

use aurora_common::{
    ChatMessage, ChatRequest, GenerateRequest, InferenceOptions, ModelRegistry, PullRequest,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;

use client::ApiClient;
use crate::config::CliConfig;

#[derive(Parser, Debug)]
#[command(name = "aurora", version, about = "Aurora CLI (pull, run, chat, generate)")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Queue a model download from the model hub.
    Pull {
        name: String,
        repo_id: String,
        filename: String,
        /// Subfolder inside the repository.
        #[arg(long)]
        subfolder: Option<String>,
        #[arg(long)]
        revision: Option<String>,
    },
    /// Load a model into llama-server.
    Run { name: String },
    /// One-shot completion.
    Generate {
        prompt: String,
        #[command(flatten)]
        sampling: Sampling,
    },
    /// Single-turn chat.
    Chat {
        message: String,
        #[command(flatten)]
        sampling: Sampling,
    },
    /// List models (config + registry).
    Models,
    /// Show the local configuration and registry.
    Info,
}

#[derive(Args, Debug)]
struct Sampling {
    /// Model name; the gateway default when omitted.
    #[arg(long)]
    model: Option<String>,
    #[arg(long, default_value_t = 256)]
    max_tokens: u32,
    #[arg(long, default_value_t = 0.7)]
    temperature: f64,
    /// Print output as it is generated.
    #[arg(long)]
    stream: bool,
}

impl Sampling {
    fn options(&self) -> Option<InferenceOptions> {
        Some(InferenceOptions {
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
            ..Default::default()
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = CliConfig::load()?;
    let client = ApiClient::from_config(&config);

    match cli.command {
        Command::Pull {
            name,
            repo_id,
            filename,
            subfolder,
            revision,
        } => {
            let request = PullRequest {
                name,
                repo_id,
                filename,
                revision,
                subfolder,
            };
            print_json(&client.pull(&request).await?)?;
        }
        Command::Run { name } => {
            // An empty user turn is enough to make the gateway load the model.
            let request = ChatRequest {
                model: Some(name.clone()),
                messages: vec![ChatMessage::user("")],
                ..Default::default()
            };
            client.chat(&request).await?;
            print_json(&json!({ "status": "ok", "model": name }))?;
        }
        Command::Generate { prompt, sampling } => {
            let request = GenerateRequest {
                model: sampling.model.clone(),
                prompt,
                stream: sampling.stream,
                options: sampling.options(),
            };
            if sampling.stream {
                client.generate_stream(&request, print_piece).await?;
                println!();
            } else {
                println!("{}", client.generate(&request).await?.response);
            }
        }
        Command::Chat { message, sampling } => {
            let request = ChatRequest {
                model: sampling.model.clone(),
                messages: vec![ChatMessage::user(message)],
                stream: sampling.stream,
                options: sampling.options(),
                attachments: None,
            };
            if sampling.stream {
                client.chat_stream(&request, print_piece).await?;
                println!();
            } else {
                let response = client.chat(&request).await?;
                println!(
                    "{}",
                    response.message["content"].as_str().unwrap_or_default()
                );
            }
        }
        Command::Models => print_json(&client.models().await?)?,
        Command::Info => {
            let registry = ModelRegistry::new(config.registry_path()).load()?;
            print_json(&json!({ "config": config, "registry_models": registry }))?;
        }
    }

    Ok(())
}

fn print_piece(text: &str) {
    print!("{}", text);
    let _ = std::io::stdout().flush();
}

fn print_json<T: Serialize>(value: &T) -> serde_json::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
