use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use deep_research::{
    config::{Config, LogFormat},
    error::StorageError,
    llm::OpenAiClient,
    memory,
    research::{
        collect_feedback, collect_report, generate_feedback, write_final_report, ChannelSink,
        DeepResearch, FanoutSink, ProgressSink, ReportRequest, ResearchParams, ResearchStep,
        TracingSink,
    },
    search,
    storage::{ResearchRun, RunStore, SqliteStorage, StepRecord},
};

/// Recursive web research driven by a streaming LLM.
#[derive(Parser, Debug)]
#[command(name = "deep-research", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Research a query, printing progress as JSON lines
    Research {
        /// The research query
        query: String,

        /// Sub-queries per level (halved at each recursion)
        #[arg(long)]
        breadth: Option<usize>,

        /// Maximum recursion depth
        #[arg(long)]
        depth: Option<usize>,

        /// Response language
        #[arg(long)]
        language: Option<String>,

        /// Language for generated search queries
        #[arg(long)]
        search_language: Option<String>,

        /// Concurrent search branches
        #[arg(long)]
        concurrency: Option<usize>,

        /// Write a final Markdown report
        #[arg(long)]
        report: bool,

        /// Do not journal the run to the database
        #[arg(long)]
        no_journal: bool,
    },

    /// Ask clarifying questions about a query
    Feedback {
        /// The research query
        query: String,

        /// Maximum number of questions
        #[arg(long, default_value = "3")]
        questions: usize,
    },

    /// List recent journaled runs
    History {
        /// Maximum number of runs to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Show a journaled run and its events
    Show {
        /// Run identifier
        run_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(version = env!("CARGO_PKG_VERSION"), "deep-research starting");

    match cli.command {
        Command::Research {
            query,
            breadth,
            depth,
            language,
            search_language,
            concurrency,
            report,
            no_journal,
        } => {
            let mut settings = config.research.clone();
            settings.breadth = breadth.unwrap_or(settings.breadth);
            settings.depth = depth.unwrap_or(settings.depth);
            settings.language = language.unwrap_or(settings.language);
            settings.search_language = search_language.or(settings.search_language);
            settings.concurrency = concurrency.unwrap_or(settings.concurrency);
            settings.validate()?;

            let journal = if no_journal {
                None
            } else {
                Some(open_storage(&config).await?)
            };
            run_research(&config, settings, query, report, journal).await
        }
        Command::Feedback { query, questions } => {
            let llm = OpenAiClient::new(config.require_llm()?, config.request.clone())?;
            let chunks =
                generate_feedback(&llm, &query, &config.research.language, questions).await;
            let questions = collect_feedback(chunks)
                .await
                .context("the model did not return clarifying questions")?;

            for (i, question) in questions.iter().enumerate() {
                println!("{}. {}", i + 1, question);
            }
            Ok(())
        }
        Command::History { limit } => {
            let storage = open_storage(&config).await?;
            for run in storage.list_runs(limit).await? {
                println!(
                    "{}  {:<9}  {}  {}",
                    run.id,
                    run.status,
                    run.created_at.format("%Y-%m-%d %H:%M:%S"),
                    run.query
                );
            }
            Ok(())
        }
        Command::Show { run_id } => {
            let storage = open_storage(&config).await?;
            let run = storage
                .get_run(&run_id)
                .await?
                .ok_or(StorageError::RunNotFound {
                    run_id: run_id.clone(),
                })?;
            let steps = storage.get_steps(&run_id).await?;

            println!("{}", serde_json::to_string_pretty(&run)?);
            for step in steps {
                println!("{}", serde_json::to_string(&step.payload)?);
            }
            Ok(())
        }
    }
}

async fn open_storage(config: &Config) -> anyhow::Result<Arc<SqliteStorage>> {
    let storage = SqliteStorage::new(&config.database)
        .await
        .with_context(|| format!("opening {}", config.database.path.display()))?;
    info!(path = %config.database.path.display(), "Database initialized");
    Ok(Arc::new(storage))
}

async fn run_research(
    config: &Config,
    settings: deep_research::config::ResearchSettings,
    query: String,
    with_report: bool,
    journal: Option<Arc<SqliteStorage>>,
) -> anyhow::Result<()> {
    let llm = Arc::new(OpenAiClient::new(config.require_llm()?, config.request.clone())?);
    let provider = search::from_config(config.require_search()?, config.request.clone())?;
    let preferences = memory::from_config(&config.memory, config.request.clone())?;
    let params = ResearchParams::from_settings(query, &settings);

    let printer: Arc<dyn ProgressSink> = Arc::new(|step: &ResearchStep| {
        match serde_json::to_string(step) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!(error = %e, "Failed to encode progress step"),
        }
    });
    let mut sink = FanoutSink::new()
        .with(printer)
        .with(Arc::new(TracingSink));

    let mut journal_task = None;
    if let Some(storage) = &journal {
        let run = ResearchRun::new(&params);
        storage.create_run(&run).await?;
        info!(run_id = %run.id, "Journaling research run");

        let (channel, receiver) = ChannelSink::new();
        sink = sink.with(Arc::new(channel));
        journal_task = Some((
            run.id.clone(),
            spawn_journal(Arc::clone(storage), run.id, receiver),
        ));
    }

    let engine = DeepResearch::new(llm.clone(), provider)
        .with_preferences(Arc::clone(&preferences))
        .with_sink(Arc::new(sink))
        .with_settings(settings.clone());

    let outcome = engine.run(params.clone()).await;
    // Closes the journal channel.
    drop(engine);

    let outcome = match outcome {
        Ok(result) => {
            let report = if with_report {
                let request = ReportRequest {
                    prompt: params.query.clone(),
                    learnings: result.learnings.clone(),
                    language: settings.language.clone(),
                };
                let stream =
                    write_final_report(llm.as_ref(), preferences.as_ref(), &request).await;
                Some(collect_report(stream).await)
            } else {
                None
            };
            report.transpose().map(|report| (result, report))
        }
        Err(e) => Err(e),
    };

    if let (Some(storage), Some((run_id, task))) = (&journal, journal_task) {
        if let Err(e) = task.await {
            warn!(error = %e, "Journal task ended abnormally");
        }
        let recorded = match &outcome {
            Ok((result, report)) => {
                storage
                    .complete_run(&run_id, result, report.as_deref())
                    .await
            }
            Err(e) => storage.fail_run(&run_id, &e.to_string()).await,
        };
        if let Err(e) = recorded {
            error!(run_id = %run_id, error = %e, "Failed to record run outcome");
        }
    }

    let (result, report) = outcome?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    if let Some(report) = report {
        println!("\n{}", report);
    }
    Ok(())
}

/// Persist every progress event of `run_id` in arrival order.
fn spawn_journal(
    storage: Arc<SqliteStorage>,
    run_id: String,
    mut receiver: mpsc::UnboundedReceiver<ResearchStep>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut seq = 0i64;
        while let Some(step) = receiver.recv().await {
            let record = StepRecord::new(&run_id, seq, &step);
            if let Err(e) = storage.append_step(&record).await {
                warn!(run_id = %run_id, seq, error = %e, "Failed to journal step");
            }
            seq += 1;
        }
    })
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
