use anyhow::{anyhow, Context, Result};
use bat::PrettyPrinter;
use clap::{Args, Parser, Subcommand};
use cliclack::{input, spinner};
use console::style;
use std::io::Write;
use std::path::PathBuf;

use oi_provider::configuration::Settings;
use oi_provider::providers::base::{GenerateRequest, Generation, Provider, Usage};
use oi_provider::providers::interpreter::InterpreterProvider;
use oi_provider::providers::types::message::PromptMessage;
use oi_provider::tools::code_runner::{CodeRunParams, CodeRunnerTool};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML settings file, overridden by OI_* environment variables
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chat with the interpreter backend
    Chat(ChatArgs),
    /// Run a snippet on the code runner
    Run(RunArgs),
}

#[derive(Args)]
struct ChatArgs {
    /// Interpreter base URL (can also be set via OI_PROVIDER__SERVER_URL)
    #[arg(long)]
    server_url: Option<String>,

    /// API key (can also be set via OI_PROVIDER__API_KEY)
    #[arg(short, long)]
    api_key: Option<String>,

    /// Model to use
    #[arg(short, long)]
    model: Option<String>,

    /// Wait for the whole reply instead of streaming it
    #[arg(long)]
    no_stream: bool,

    /// Conversation id kept by the backend
    #[arg(long)]
    conversation_id: Option<String>,

    /// System prompt sent with every request
    #[arg(long)]
    system: Option<String>,
}

#[derive(Args)]
struct RunArgs {
    #[arg(short, long, default_value = "python")]
    language: String,

    /// Code to run
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    code: Option<String>,

    /// Read the code from this file
    #[arg(long)]
    file: Option<PathBuf>,

    #[arg(short, long, default_value = "cli_user")]
    user: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Command::Chat(args) => chat(settings, args),
        Command::Run(args) => run(settings, args),
    }
}

fn chat(settings: Settings, args: ChatArgs) -> Result<()> {
    let mut provider_settings = settings.provider;
    if let Some(server_url) = args.server_url {
        provider_settings.server_url = server_url;
    }
    if let Some(api_key) = args.api_key {
        provider_settings.api_key = api_key;
    }
    let model = args.model.unwrap_or_else(|| provider_settings.model.clone());
    let stream = provider_settings.stream && !args.no_stream;
    let provider = InterpreterProvider::new(provider_settings.into_config())?;

    println!(
        "Interpreter chat {}",
        style("- type \"exit\" to end the session").dim()
    );
    println!("\n");

    let mut history: Vec<PromptMessage> =
        args.system.into_iter().map(PromptMessage::system).collect();
    loop {
        let message_text: String = input("Message:").placeholder("").multiline().interact()?;

        if message_text.trim().eq_ignore_ascii_case("exit") {
            break;
        }

        history.push(PromptMessage::user(message_text));
        let mut request =
            GenerateRequest::new(model.as_str(), history.clone()).with_stream(stream);
        if let Some(conversation_id) = &args.conversation_id {
            request = request.with_conversation_id(conversation_id.as_str());
        }

        let spin = (!stream).then(spinner);
        if let Some(spin) = &spin {
            spin.start("awaiting reply");
        }
        let generation = provider.generate(&request);
        if let Some(spin) = &spin {
            spin.stop("");
        }

        let (reply, usage) = match generation? {
            Generation::Stream(messages) => {
                let mut reply = String::new();
                let mut usage = Usage::new(messages.prompt_tokens(), 0);
                let mut stdout = std::io::stdout();
                for message in messages {
                    let message = message?;
                    print!("{}", message.content);
                    stdout.flush()?;
                    reply.push_str(&message.content);
                    usage = Usage::new(
                        usage.prompt_tokens,
                        usage.completion_tokens + message.usage.completion_tokens,
                    );
                }
                (reply, usage)
            }
            Generation::Complete(message) => {
                render(&message.content)?;
                (message.content, message.usage)
            }
        };

        println!(
            "\n\n{}",
            style(format!(
                "tokens: {} prompt, {} completion, {} total",
                usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
            ))
            .dim()
        );
        history.push(PromptMessage::assistant(reply));
    }
    Ok(())
}

fn run(settings: Settings, args: RunArgs) -> Result<()> {
    let tool = CodeRunnerTool::new(settings.tool.require_api_server()?)?;
    let code = match (args.code, args.file) {
        (Some(code), _) => code,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, None) => return Err(anyhow!("either --code or --file is required")),
    };

    let spin = spinner();
    spin.start("running code");
    let outputs = tool.run(&args.user, &CodeRunParams::new(args.language, code));
    spin.stop("");

    for output in outputs? {
        render(&output.to_string())?;
        println!();
    }
    Ok(())
}

fn render(content: &str) -> Result<()> {
    PrettyPrinter::new()
        .input_from_bytes(content.as_bytes())
        .language("markdown")
        .print()
        .map_err(|e| anyhow!("Failed to render output: {}", e))?;
    Ok(())
}
