//! senti - classify text with a cache-first or local sentiment model
//!
//! Without a query the CLI enters interactive mode; the model is loaded once
//! and reused for every line.

#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "senti")]
#[command(about = "Sentiment classification with cache-first model loading", long_about = None)]
#[command(version)]
struct Cli {
    /// Text to classify (if not provided, enters interactive mode)
    query: Option<String>,

    /// Additional query arguments (combined with the first query)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    extra_args: Vec<String>,

    /// Use the local classification model instead of the cached sentiment model
    #[arg(long)]
    local: bool,

    /// Configuration file (defaults to ~/.config/senti/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format (json or text)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// List configured models and where they are available
    #[arg(long)]
    list_models: bool,
}

#[cfg(feature = "cli")]
fn print_outcome(outcome: &senti::Outcome, format: &str) {
    use senti::render::{render_error, render_outcome, render_status};

    if format == "json" {
        let value = match &outcome.result {
            Ok(prediction) => serde_json::json!({
                "events": outcome.events,
                "prediction": prediction,
            }),
            Err(e) => serde_json::json!({
                "events": outcome.events,
                "error": render_error(e),
            }),
        };
        println!("{}", value);
        return;
    }

    for event in &outcome.events {
        eprintln!("[*] {}", render_status(*event));
    }
    match &outcome.result {
        Ok(prediction) if prediction.from_cache => {
            println!("{}", render_outcome(outcome));
            println!("[CACHE] (from result cache)");
        }
        Ok(_) => println!("{}", render_outcome(outcome)),
        Err(_) => eprintln!("[!] {}", render_outcome(outcome)),
    }
}

#[cfg(feature = "cli")]
fn list_models(config: &senti::Config) -> Result<(), Box<dyn std::error::Error>> {
    use senti::{Action, ModelStore};

    let store = ModelStore::from_config(config)?;
    println!("[*] Configured models:\n");
    for action in [Action::CachedSentiment, Action::LocalClassification] {
        let request = action.request(&config.models);
        println!("{} ({})", request.model_name, request.task);
        println!("   Source: {}", request.source_preference);
        let cached = if store.is_cached(&request.model_name) {
            "[+] cached"
        } else {
            "[-] not cached"
        };
        let local = if store.is_local(&config.paths.local_models, &request.model_name) {
            "[+] present"
        } else {
            "[-] missing"
        };
        println!("   Cache: {} {}", store.cache_dir().display(), cached);
        println!(
            "   Local: {} {}",
            config.paths.local_models.display(),
            local
        );
        println!(
            "   Server: {}",
            config.server.served(&request.model_name).endpoint
        );
        println!();
    }
    Ok(())
}

#[cfg(feature = "cli")]
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use senti::{Action, Config, HubPipelineFactory, Session};
    use std::io::{self, Write};
    use std::sync::Arc;

    env_logger::init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if cli.list_models {
        return list_models(&config);
    }

    let factory = Arc::new(HubPipelineFactory::from_config(&config)?);
    let session = Session::new(factory, &config);
    let default_action = if cli.local {
        Action::LocalClassification
    } else {
        Action::CachedSentiment
    };

    // Combine query and extra args into one input
    let query = cli.query.map(|first| {
        let mut full_query = first;
        if !cli.extra_args.is_empty() {
            full_query.push(' ');
            full_query.push_str(&cli.extra_args.join(" "));
        }
        full_query
    });

    if let Some(text) = query {
        let outcome = session.run(default_action, &text).await;
        print_outcome(&outcome, &cli.format);
        if outcome.result.is_err() {
            std::process::exit(1);
        }
        return Ok(());
    }

    println!("[senti - Interactive Mode]");
    println!("Type text to classify. Prefix with /local or /cache to pick a model.");
    println!("Type 'quit' or 'exit' to leave.\n");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.eq_ignore_ascii_case("quit") || input.eq_ignore_ascii_case("exit") {
            println!("Goodbye!");
            break;
        }

        let (action, text) = if let Some(rest) = input.strip_prefix("/local") {
            (Action::LocalClassification, rest.trim())
        } else if let Some(rest) = input.strip_prefix("/cache") {
            (Action::CachedSentiment, rest.trim())
        } else {
            (default_action, input)
        };

        let outcome = session.run(action, text).await;
        print_outcome(&outcome, &cli.format);
        println!();
    }

    Ok(())
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI features not enabled. Please compile with --features cli");
    std::process::exit(1);
}
