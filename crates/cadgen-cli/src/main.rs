//! cadgen - describe a part, get a build123d model

mod commands;
mod config;
mod samples;
mod utils;

use cadgen_ai::{Provider, RequestOptions};
use cadgen_pipeline::{
    ClientFactory, Convention, HttpClientFactory, Pipeline, PipelineConfig, PipelineError,
    PipelineEvent, PipelineHandle, PythonExecutor, RunKind, RunOutcome, Session,
};
use clap::Parser;
use commands::CommandResult;
use std::future::Future;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;

/// cadgen - turn plain-language part descriptions into build123d models
#[derive(Parser, Debug)]
#[command(name = "cadgen")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Provider (anthropic, openai, google)
    #[arg(short, long)]
    provider: Option<String>,

    /// Model to use with the selected provider
    #[arg(short, long)]
    model: Option<String>,

    /// Generate a single part non-interactively
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// With --command: repair a failing program up to N times
    #[arg(long, value_name = "N", requires = "command")]
    retry: Option<u32>,

    /// Run a chat reply saved to a file ('-' reads stdin)
    #[arg(long, value_name = "FILE")]
    paste: Option<String>,

    /// Print a prompt to paste into an external chat and exit
    #[arg(long, value_name = "REQUEST")]
    prompt: Option<String>,

    /// Check the provider's credentials and exit
    #[arg(long)]
    test_connection: bool,

    /// Run a bundled sample
    #[arg(long, value_name = "ID")]
    sample: Option<String>,

    /// List bundled samples
    #[arg(long)]
    samples: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,

    /// Working directory
    #[arg(short, long)]
    working_dir: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("cadgen=debug,cadgen_ai=debug,cadgen_pipeline=debug")
            .with_writer(io::stderr)
            .init();
    }

    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    if args.samples {
        println!("{}", samples::listing());
        return Ok(());
    }

    let cfg = config::Config::load();

    if let Some(ref dir) = args.working_dir {
        std::env::set_current_dir(dir)?;
    }
    let working_dir = std::env::current_dir()?;

    // CLI flags take precedence over the config file
    let provider: Provider = match args.provider {
        Some(ref name) => name.parse()?,
        None => cfg.provider()?,
    };
    let mut session = cfg.session(provider);
    if let Some(model) = args.model {
        session.set_model(provider, model);
    }

    let output_dir = working_dir.join(&cfg.output_dir);
    std::fs::create_dir_all(&output_dir)?;

    let factory = Arc::new(HttpClientFactory::new(cfg.retry_policy()));
    let pipeline = build_pipeline(&cfg, factory.clone(), &working_dir, &output_dir);

    if let Some(request) = args.prompt {
        println!("{}", pipeline.manual_prompt(&request)?);
        return Ok(());
    }

    spawn_interrupt_handler(pipeline.handle());
    let mut events = pipeline.subscribe();

    let succeeded = if args.test_connection {
        test_connection(factory.as_ref(), &session).await
    } else if let Some(id) = args.sample {
        run_sample(&pipeline, &mut events, &id).await
    } else if let Some(source) = args.paste {
        let response = read_paste_source(&source)?;
        with_events(&mut events, pipeline.run_pasted(&mut session, &response))
            .await
            .is_ok()
    } else if let Some(request) = args.command {
        run_command(&pipeline, &mut events, &mut session, &request, args.retry).await
    } else {
        return run_interactive(&pipeline, &mut events, factory.as_ref(), &mut session, &cfg).await;
    };

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}

fn build_pipeline(
    cfg: &config::Config,
    factory: Arc<HttpClientFactory>,
    working_dir: &Path,
    output_dir: &Path,
) -> Pipeline {
    let convention = Convention::build123d();
    let executor = PythonExecutor::new(
        cfg.python.clone(),
        working_dir.to_path_buf(),
        cfg.exec_timeout(),
        &convention,
    );
    let config = PipelineConfig {
        convention,
        request: RequestOptions {
            max_tokens: cfg.max_tokens,
            temperature: None,
        },
        validate_repairs: cfg.validate_repairs,
        working_dir: working_dir.to_path_buf(),
        output_dir: output_dir.to_path_buf(),
    };
    Pipeline::new(config, factory, Arc::new(executor))
}

/// Abort the in-flight run on Ctrl-C; exit when nothing is running
fn spawn_interrupt_handler(handle: PipelineHandle) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if handle.is_running() {
                eprintln!("\n[Aborting...]");
                handle.abort();
            } else {
                std::process::exit(130);
            }
        }
    });
}

/// Drive `run` while printing the events it emits, in order
async fn with_events<T>(
    events: &mut broadcast::Receiver<PipelineEvent>,
    run: impl Future<Output = T>,
) -> T {
    tokio::pin!(run);
    loop {
        tokio::select! {
            biased;
            Ok(event) = events.recv() => print_event(&event),
            result = &mut run => {
                while let Ok(event) = events.try_recv() {
                    print_event(&event);
                }
                return result;
            }
        }
    }
}

fn print_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::Failed { message, .. } => eprintln!("Error: {}", message),
        other => println!("{}", render_event(other)),
    }
}

fn kind_str(kind: RunKind) -> &'static str {
    match kind {
        RunKind::Generate => "generate",
        RunKind::Repair => "repair",
        RunKind::Pasted => "paste",
        RunKind::Program => "program",
    }
}

/// One log line (or block) for an event
fn render_event(event: &PipelineEvent) -> String {
    match event {
        PipelineEvent::RunStart { kind, label } => format!(
            "[{} {}] {}",
            chrono::Local::now().format("%H:%M:%S"),
            kind_str(*kind),
            utils::truncate_chars(label, 80)
        ),
        PipelineEvent::Requesting { provider, model } => {
            format!("[Requesting {} ({})...]", provider, model)
        }
        PipelineEvent::ResponseReceived { chars } => format!("[Received {} chars]", chars),
        PipelineEvent::CorrectivePrompt { reason } => format!(
            "[No usable code ({}), asking for code only]",
            reason.lines().next().unwrap_or_default()
        ),
        PipelineEvent::Extracted { lines } => format!("[Extracted {} lines of code]", lines),
        PipelineEvent::Patched { changes } => {
            let mut text = String::from("[Auto-patched]");
            for change in changes {
                text.push_str(&format!("\n  - {}", change));
            }
            text
        }
        PipelineEvent::Executing => "[Executing...]".to_string(),
        PipelineEvent::RepairAttempt {
            attempt,
            max_attempts,
        } => format!("[Repair attempt {}/{}]", attempt, max_attempts),
        PipelineEvent::AttemptFailed { attempt, error } => format!(
            "[Attempt {} failed: {}]",
            attempt,
            utils::truncate_chars(error.lines().last().unwrap_or_default(), 200)
        ),
        PipelineEvent::Succeeded {
            result_type,
            mesh,
            output,
            attempt,
        } => {
            let mut text = String::new();
            if !output.trim().is_empty() {
                text.push_str(&utils::indent(output.trim_end(), "  "));
                text.push('\n');
            }
            text.push_str(&format!("[Done: {}", result_type));
            if let Some(n) = attempt {
                text.push_str(&format!(" after {} repair attempt(s)", n));
            }
            match mesh {
                Some(path) => text.push_str(&format!(", mesh: {}]", path.display())),
                None => text.push(']'),
            }
            text
        }
        PipelineEvent::Failed { kind, message } => format!("[Failed ({})] {}", kind, message),
    }
}

async fn run_command(
    pipeline: &Pipeline,
    events: &mut broadcast::Receiver<PipelineEvent>,
    session: &mut Session,
    request: &str,
    retry: Option<u32>,
) -> bool {
    println!("cadgen> {}", request);
    println!();

    let generated = with_events(events, pipeline.generate(session, request)).await;
    if generated.is_ok() {
        return true;
    }
    match retry {
        Some(attempts) if offers_repair(&generated) => {
            with_events(events, pipeline.repair(session, attempts))
                .await
                .is_ok()
        }
        _ => false,
    }
}

/// Whether `result` left a failed program the repair loop can work on
fn offers_repair(result: &Result<RunOutcome, PipelineError>) -> bool {
    matches!(result, Err(e) if e.is_repairable())
}

async fn run_sample(
    pipeline: &Pipeline,
    events: &mut broadcast::Receiver<PipelineEvent>,
    id: &str,
) -> bool {
    match samples::find(id) {
        Some(sample) => with_events(events, pipeline.run_program(sample.label, sample.code))
            .await
            .is_ok(),
        None => {
            eprintln!("No sample named '{}'\n{}", id, samples::listing());
            false
        }
    }
}

async fn test_connection(factory: &dyn ClientFactory, session: &Session) -> bool {
    let provider = session.provider;
    println!("[Testing {} ({})...]", provider, session.active().model);
    let result = match factory.create(provider, session.active()) {
        Ok(client) => client.test_connection().await.map_err(anyhow::Error::from),
        Err(e) => Err(e.into()),
    };
    match result {
        Ok(()) => {
            println!("[{} connection OK]", provider);
            true
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            false
        }
    }
}

/// Read a pasted reply from a file, or stdin for `-`
fn read_paste_source(source: &str) -> anyhow::Result<String> {
    if source == "-" {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text)?;
        Ok(text)
    } else {
        Ok(std::fs::read_to_string(PathBuf::from(source))?)
    }
}

/// Collect lines until one containing only '.'
fn read_pasted_lines(input: &mut impl BufRead) -> io::Result<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    loop {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed == "." {
            break;
        }
        lines.push(trimmed.to_string());
    }
    Ok(lines.join("\n"))
}

async fn run_interactive(
    pipeline: &Pipeline,
    events: &mut broadcast::Receiver<PipelineEvent>,
    factory: &dyn ClientFactory,
    session: &mut Session,
    cfg: &config::Config,
) -> anyhow::Result<()> {
    if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        eprintln!(
            "cadgen ({} / {}) session: {}",
            session.provider,
            session.active().model,
            &session.id[..8]
        );
        if !session.active().has_credentials() {
            eprintln!(
                "No API key for {}. Set {} or add it to the config file (cadgen --init-config).",
                session.provider,
                session.provider.api_key_env_var()
            );
        }
        eprintln!("Type /help for commands.");
        eprintln!();
    }

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            // EOF
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        let Some(result) = commands::execute_command(input, session) else {
            let generated = with_events(events, pipeline.generate(session, input)).await;
            if offers_repair(&generated) {
                println!("Type /retry to let the model fix it.");
            }
            continue;
        };

        match result {
            CommandResult::Message(msg) => println!("{}", msg),
            CommandResult::Retry(attempts) => {
                let attempts = attempts.unwrap_or(cfg.max_retries());
                let _ = with_events(events, pipeline.repair(session, attempts)).await;
            }
            CommandResult::Clear => {
                session.clear();
                println!("Cleared conversation.");
            }
            CommandResult::ChangeProvider(provider) => {
                session.provider = provider;
                println!("Switched to: {} ({})", provider, session.active().model);
                if !session.active().has_credentials() {
                    println!("No API key for {}; set {}", provider, provider.api_key_env_var());
                }
            }
            CommandResult::ChangeModel(model) => {
                session.set_model(session.provider, model);
                println!("Model set to: {}", session.active().model);
            }
            CommandResult::TestConnection => {
                test_connection(factory, session).await;
            }
            CommandResult::Prompt(request) => match pipeline.manual_prompt(&request) {
                Ok(prompt) => println!("{}", prompt),
                Err(e) => eprintln!("Error: {}", e),
            },
            CommandResult::Paste => {
                println!("Paste the reply, then a line containing only '.':");
                let response = read_pasted_lines(&mut io::stdin().lock())?;
                let _ = with_events(events, pipeline.run_pasted(session, &response)).await;
            }
            CommandResult::RunSample(sample) => {
                let _ = with_events(events, pipeline.run_program(sample.label, sample.code)).await;
            }
            CommandResult::Exit => break,
            CommandResult::Unknown(cmd) => {
                println!("Unknown command: /{}", cmd);
                println!("Type /help for available commands.");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from(["cadgen", "-p", "google", "-c", "a cube", "--retry", "4"]).unwrap();
        assert_eq!(args.provider.as_deref(), Some("google"));
        assert_eq!(args.command.as_deref(), Some("a cube"));
        assert_eq!(args.retry, Some(4));

        // --retry only applies to a one-shot command
        assert!(Args::try_parse_from(["cadgen", "--retry", "2"]).is_err());
    }

    #[test]
    fn test_repair_offered_only_for_repairable_failures() {
        assert!(offers_repair(&Err(PipelineError::Runtime("Traceback".into()))));
        assert!(offers_repair(&Err(PipelineError::Timeout { secs: 120 })));
        assert!(!offers_repair(&Err(PipelineError::Provider(cadgen_ai::Error::InvalidApiKey))));
        assert!(!offers_repair(&Err(PipelineError::Cancelled)));
        assert!(!offers_repair(&Err(PipelineError::UnsafeCodeRejected {
            matches: vec!["eval(".into()]
        })));
    }

    #[test]
    fn test_read_pasted_lines_stops_at_dot() {
        let mut input = io::Cursor::new("```python\nfrom build123d import *\n```\n.\nignored\n");
        let text = read_pasted_lines(&mut input).unwrap();
        assert_eq!(text, "```python\nfrom build123d import *\n```");

        let mut eof = io::Cursor::new("no terminator\r\n");
        assert_eq!(read_pasted_lines(&mut eof).unwrap(), "no terminator");
    }

    #[test]
    fn test_render_patched_lists_changes() {
        let text = render_event(&PipelineEvent::Patched {
            changes: vec!["a → b".into(), "removed .filter_by_axis(Axis.Z)".into()],
        });
        assert_eq!(text, "[Auto-patched]\n  - a → b\n  - removed .filter_by_axis(Axis.Z)");
    }

    #[test]
    fn test_render_success_with_mesh_and_output() {
        let text = render_event(&PipelineEvent::Succeeded {
            result_type: "Part".into(),
            mesh: Some(PathBuf::from("output/llm_output.stl")),
            output: "volume=1000.0\n".into(),
            attempt: Some(2),
        });
        assert_eq!(
            text,
            "  volume=1000.0\n[Done: Part after 2 repair attempt(s), mesh: output/llm_output.stl]"
        );
    }

    #[test]
    fn test_render_attempt_failure_shows_last_line() {
        let text = render_event(&PipelineEvent::AttemptFailed {
            attempt: 1,
            error: "Traceback (most recent call last):\n  File \"<llm>\"\nNameError: name 'Bx' is not defined".into(),
        });
        assert_eq!(text, "[Attempt 1 failed: NameError: name 'Bx' is not defined]");
    }

    #[test]
    fn test_render_run_start_labels_kind() {
        let text = render_event(&PipelineEvent::RunStart {
            kind: RunKind::Repair,
            label: "up to 3 attempt(s)".into(),
        });
        assert!(text.contains(" repair] up to 3 attempt(s)"));
    }

    #[tokio::test]
    async fn test_with_events_returns_run_result() {
        let (tx, mut rx) = broadcast::channel(8);
        let run = async move {
            let _ = tx.send(PipelineEvent::Executing);
            42
        };
        assert_eq!(with_events(&mut rx, run).await, 42);
    }
}
