//! Tutorloop CLI - interactive tutoring session over stdin

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::info;

use tutorloop::agent::{AgentController, Interaction, ReasoningLoop};
use tutorloop::llm::OllamaClient;
use tutorloop::policy::{LearnerFeedback, PolicyUpdater};
use tutorloop::profile::{JsonFileBackend, ProfileBackend, ProfileStore};
use tutorloop::safety::SafetyValidator;
use tutorloop::tools::{BraveSearch, CodeSandbox, ProcessSandbox, SearchBackend, StubSearch, ToolExecutor};
use tutorloop::tracing::{init_tracing, shutdown_tracing};
use tutorloop::{metrics, TutorConfig};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser)]
#[command(name = "tutorloop")]
#[command(about = "Adaptive programming tutor backed by a local LLM", long_about = None)]
struct Cli {
    /// Learner id (profile key)
    #[arg(short, long, default_value = "default")]
    learner: String,

    /// Ask for correctness and a 1-5 rating after each answer
    #[arg(short, long)]
    feedback: bool,

    /// Use the offline search stub even if a Brave API key is configured
    #[arg(long)]
    stub_search: bool,

    /// JSON config file
    #[arg(short, long, env = "TUTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Print Prometheus metrics on exit
    #[arg(long)]
    metrics: bool,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();
    let config = TutorConfig::load(cli.config.as_deref())?;

    init_tracing("tutorloop", config.otlp_endpoint.as_deref(), config.json_logs)?;

    let controller = build_controller(&config, cli.stub_search)?;
    run_repl(&controller, &cli.learner, cli.feedback).await?;

    if cli.metrics {
        println!("{}", metrics::gather_text());
    }
    shutdown_tracing();
    Ok(())
}

fn build_controller(config: &TutorConfig, stub_search: bool) -> Result<AgentController, BoxError> {
    let validator = SafetyValidator::new(config.safety.clone());

    let sandbox = ProcessSandbox::new(config.python.clone(), vec!["-I".to_string(), "-c".to_string()])
        .with_confinement(config.confinement);
    let confinement = sandbox.confinement();
    info!(
        filesystem = confinement.filesystem,
        network = confinement.network,
        spawn = confinement.spawn,
        "Code sandbox confinement"
    );
    let sandbox: Arc<dyn CodeSandbox> = Arc::new(sandbox);

    let search: Arc<dyn SearchBackend> = match (&config.search.brave_api_key, stub_search) {
        (Some(key), false) => Arc::new(BraveSearch::new(key.clone(), &config.search)?),
        _ => Arc::new(StubSearch),
    };

    let executor = Arc::new(ToolExecutor::new(
        validator.clone(),
        sandbox,
        search,
        config.sandbox.clone(),
        config.search.clone(),
    ));

    let backend = Arc::new(OllamaClient::new(
        config.ollama_url.clone(),
        config.model.clone(),
        Duration::from_secs(config.generation_timeout_secs),
    )?);

    let profiles: Arc<dyn ProfileBackend> = match &config.profile_dir {
        Some(dir) => Arc::new(JsonFileBackend::new(dir)?),
        None => Arc::new(JsonFileBackend::default_store()?),
    };
    let store = Arc::new(ProfileStore::new(profiles, config.policy.profile_defaults()));

    Ok(AgentController::new(
        store,
        ReasoningLoop::new(backend, executor, config.reasoning.clone()),
        PolicyUpdater::new(config.policy.clone()),
        validator,
    ))
}

async fn run_repl(controller: &AgentController, learner: &str, ask_feedback: bool) -> Result<(), BoxError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("🎓 Tutorloop - ask a programming question ('quit' to exit)");
    println!("   learner: {}", learner);

    loop {
        let Some(question) = prompt(&mut lines, "\n> ").await? else {
            break;
        };
        let question = question.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question.to_ascii_lowercase().as_str(), "quit" | "exit") {
            break;
        }

        let interaction = match controller.begin(learner, question).await {
            Ok(interaction) => interaction,
            Err(e) => {
                eprintln!("❌ {} (trace_id={})", e, e.trace_id());
                continue;
            }
        };

        println!("\n{}", interaction.answer());

        let feedback = match (&interaction, ask_feedback) {
            (Interaction::Pending(_), true) => read_feedback(&mut lines).await?,
            _ => None,
        };

        match interaction.complete(feedback).await {
            Ok(response) => {
                if let Some(level) = response.skill_level {
                    println!(
                        "   [{} | steps={} tools={} | level={}]",
                        response.termination_reason, response.steps, response.tool_calls, level
                    );
                }
            }
            Err(e) => eprintln!("⚠️  {} (trace_id={})", e, e.trace_id()),
        }
    }

    println!("👋 Bye");
    Ok(())
}

async fn prompt(lines: &mut Lines<BufReader<Stdin>>, text: &str) -> std::io::Result<Option<String>> {
    print!("{}", text);
    std::io::stdout().flush()?;
    lines.next_line().await
}

async fn read_feedback(lines: &mut Lines<BufReader<Stdin>>) -> std::io::Result<Option<LearnerFeedback>> {
    let correct = prompt(lines, "Did that answer your question? [y/n, enter to skip] ")
        .await?
        .and_then(|answer| parse_yes_no(&answer));
    let rating = prompt(lines, "Rate the explanation 1-5 [enter to skip] ")
        .await?
        .and_then(|answer| answer.trim().parse::<u8>().ok())
        .filter(|r| (1..=5).contains(r));

    let feedback = LearnerFeedback { correct, rating };
    Ok(feedback.signal().map(|_| feedback))
}

fn parse_yes_no(answer: &str) -> Option<bool> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}
