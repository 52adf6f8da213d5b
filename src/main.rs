use actix_web::{web, App, HttpServer};
use clap::{Parser, Subcommand};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer};

use narrator::api::{
    self,
    job::{JobService, UploadLimits},
    validation,
};
use narrator::client::{ApiClient, PollOutcome, PollerConfig, StatusPoller};
use narrator::collaborators::{
    CollaboratorError, EspeakSpeech, FallbackSpeech, FfmpegMuxer, LocalFileStore, OpenAiSpeech,
    ScriptNormalizer, SpeechSynthesizer, TextPreparer, TranslatingPreparer,
};
use narrator::config::{Config, TtsProvider};
use narrator::db::{self, JobStore, MemoryJobStore, PgJobStore};
use narrator::shutdown::ShutdownCoordinator;
use narrator::worker::{fail_interrupted_jobs, JobQueue, JobWorker, RetentionTask};
use narrator::workflow::{Collaborators, Workflow};

#[derive(Parser, Debug)]
#[command(author, version, about = "Narrated video generation service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server and the worker pool (default)
    Serve,

    /// Apply database migrations and exit
    Migrate,

    /// Upload a video for narration
    Submit {
        /// Video file to narrate
        #[arg(long)]
        video: PathBuf,

        /// Text the narration is written from
        #[arg(long)]
        description: String,

        /// Target language code
        #[arg(long, default_value = "en")]
        language: String,

        /// Poll until the job finishes
        #[arg(long)]
        wait: bool,

        #[arg(long, default_value = "http://127.0.0.1:8080")]
        server: String,
    },

    /// Poll a job until it finishes
    Poll {
        id: i64,

        #[arg(long, default_value_t = 2)]
        interval_secs: u64,

        #[arg(long, default_value = "http://127.0.0.1:8080")]
        server: String,
    },
}

fn startup_error(e: impl std::fmt::Display) -> io::Error {
    io::Error::other(e.to_string())
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let config = Config::from_env().map_err(startup_error)?;
            init_file_logging(&config.log_dir)?;
            serve(config).await
        }
        Command::Migrate => {
            let config = Config::from_env().map_err(startup_error)?;
            init_console_logging();
            let database_url = config
                .database_url
                .ok_or_else(|| startup_error("DATABASE_URL must be set to run migrations"))?;
            let pool = db::connection::get_connection(&database_url, 1)
                .await
                .map_err(startup_error)?;
            db::migrations::run_migrations(&pool)
                .await
                .map_err(startup_error)?;
            pool.close().await;
            Ok(())
        }
        Command::Submit {
            video,
            description,
            language,
            wait,
            server,
        } => {
            dotenv::dotenv().ok();
            init_console_logging();
            let client = ApiClient::new(&server).map_err(startup_error)?;
            let accepted = client
                .submit(&video, &description, &language)
                .await
                .map_err(startup_error)?;
            info!("Submitted job {} ({})", accepted.id, accepted.status);
            println!("{}", serde_json::to_string_pretty(&accepted)?);

            if wait {
                watch_job(client, accepted.id, Duration::from_secs(2)).await?;
            }
            Ok(())
        }
        Command::Poll {
            id,
            interval_secs,
            server,
        } => {
            dotenv::dotenv().ok();
            init_console_logging();
            let client = ApiClient::new(&server).map_err(startup_error)?;
            watch_job(client, id, Duration::from_secs(interval_secs.max(1))).await
        }
    }
}

/// Console plus daily rotating per-level files
/// (`logs/info.2024-12-22.log`, `logs/error.2024-12-22.log`, ...).
fn init_file_logging(log_dir: &str) -> io::Result<()> {
    std::fs::create_dir_all(log_dir)?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    // Create daily rotating file appenders for each log level
    let info_file = tracing_appender::rolling::daily(log_dir, "info.log");
    let warn_file = tracing_appender::rolling::daily(log_dir, "warn.log");
    let error_file = tracing_appender::rolling::daily(log_dir, "error.log");
    let debug_file = tracing_appender::rolling::daily(log_dir, "debug.log");

    let info_layer = tracing_subscriber::fmt::layer()
        .with_writer(info_file)
        .with_ansi(false)
        .with_filter(LevelFilter::INFO);

    let warn_layer = tracing_subscriber::fmt::layer()
        .with_writer(warn_file)
        .with_ansi(false)
        .with_filter(LevelFilter::WARN);

    let error_layer = tracing_subscriber::fmt::layer()
        .with_writer(error_file)
        .with_ansi(false)
        .with_filter(LevelFilter::ERROR);

    let debug_layer = tracing_subscriber::fmt::layer()
        .with_writer(debug_file)
        .with_ansi(false)
        .with_filter(LevelFilter::DEBUG);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_ansi(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(info_layer)
        .with(warn_layer)
        .with(error_layer)
        .with(debug_layer)
        .init();
    Ok(())
}

fn init_console_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stdout))
        .init();
}

fn build_collaborators(config: &Config) -> Result<Collaborators, CollaboratorError> {
    let espeak: Arc<dyn SpeechSynthesizer> = Arc::new(EspeakSpeech::new(&config.espeak_path));

    let speech: Arc<dyn SpeechSynthesizer> = match (config.tts_provider, &config.openai_api_key) {
        (TtsProvider::OpenAi, Some(api_key)) => {
            let openai: Arc<dyn SpeechSynthesizer> = Arc::new(OpenAiSpeech::new(
                &config.openai_base_url,
                api_key,
                &config.openai_tts_model,
            )?);
            if config.tts_fallback {
                Arc::new(FallbackSpeech::new(openai, espeak))
            } else {
                openai
            }
        }
        _ => espeak,
    };

    let text: Arc<dyn TextPreparer> = match &config.openai_api_key {
        Some(api_key) => Arc::new(TranslatingPreparer::new(
            &config.openai_base_url,
            api_key,
            &config.openai_text_model,
        )?),
        None => {
            warn!("OPENAI_API_KEY is not set; narration is not translated");
            Arc::new(ScriptNormalizer)
        }
    };

    Ok(Collaborators {
        text,
        speech,
        muxer: Arc::new(FfmpegMuxer::new(&config.ffmpeg_path, &config.ffprobe_path)),
    })
}

async fn serve(config: Config) -> io::Result<()> {
    info!("Starting narrator application");
    info!("Configuration loaded successfully:");
    info!("  - Max payload size: {} bytes", config.max_payload_size);
    info!("  - Max video size: {} bytes", config.max_video_size);
    info!("  - Max database connections: {}", config.max_db_connections);
    info!("  - Max concurrent jobs: {}", config.max_concurrent_jobs);
    info!("  - Number of workers: {}", config.num_workers);
    info!("  - Languages: {}", config.languages.codes().join(", "));

    let store: Arc<dyn JobStore> = match &config.database_url {
        Some(database_url) => {
            let pool = db::connection::get_connection(database_url, config.max_db_connections)
                .await
                .map_err(startup_error)?;
            info!("Database connection pool established");

            // Auto-migrate when starting the server
            db::migrations::run_migrations(&pool)
                .await
                .map_err(startup_error)?;
            Arc::new(PgJobStore::new(pool))
        }
        None => {
            warn!("DATABASE_URL is not set; jobs are kept in memory and lost on restart");
            Arc::new(MemoryJobStore::new())
        }
    };

    let files = LocalFileStore::new(&config.upload_dir);
    files.ensure_root().await?;

    fail_interrupted_jobs(store.as_ref())
        .await
        .map_err(startup_error)?;

    let collaborators = build_collaborators(&config).map_err(startup_error)?;
    let workflow = Arc::new(Workflow::new(
        store.clone(),
        files.clone(),
        config.languages.clone(),
        collaborators,
    ));
    let queue = JobQueue::new();

    // watch channel allows multiple receivers to get the same value
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Spawn background workers with semaphore-based bounded concurrency
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
    let mut worker_handles = Vec::new();

    for worker_id in 1..=config.num_workers {
        let job_worker = JobWorker::new(
            store.clone(),
            workflow.clone(),
            queue.clone(),
            config.queue_poll_interval,
        );
        let worker_semaphore = semaphore.clone();
        let worker_shutdown_rx = shutdown_rx.clone();

        let handle = tokio::spawn(async move {
            job_worker
                .run(worker_id, worker_semaphore, worker_shutdown_rx)
                .await;
        });

        worker_handles.push(handle);
        info!("Spawned worker {}", worker_id);
    }

    let background = CancellationToken::new();
    match config.job_retention_days {
        Some(days) => {
            let retention = RetentionTask::new(store.clone(), files.clone(), days);
            tokio::spawn(retention.run(background.clone()));
        }
        None => info!("Job retention disabled"),
    }

    let limits = UploadLimits::from_config(&config);
    let upload_config = validation::multipart_config(&limits, config.max_payload_size);
    let job_service = web::Data::new(JobService::new(
        store.clone(),
        files,
        config.languages.clone(),
        limits,
        queue,
    ));
    let store_data: web::Data<dyn JobStore> = web::Data::from(store.clone());
    let max_payload_size = config.max_payload_size;

    let server = HttpServer::new(move || {
        App::new()
            .app_data(store_data.clone())
            .app_data(job_service.clone())
            .app_data(web::PayloadConfig::default().limit(max_payload_size))
            .app_data(upload_config.clone())
            .app_data(validation::query_config())
            .configure(api::routes)
    });

    info!("Server starting on http://{}:{}", config.host, config.port);

    let server = server.bind((config.host.as_str(), config.port))?.run();
    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    let coordinator = ShutdownCoordinator::new(
        server_handle,
        server_task,
        worker_handles,
        shutdown_tx,
        background,
        store,
    );

    coordinator.wait_for_shutdown().await
}

async fn watch_job(client: ApiClient, id: i64, interval: Duration) -> io::Result<()> {
    let token = CancellationToken::new();
    let on_ctrl_c = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let poller = StatusPoller::new(
        Arc::new(client),
        PollerConfig {
            interval,
            ..PollerConfig::default()
        },
    );
    let outcome = poller
        .poll(id, &token, |update| {
            info!("Job {}: {} ({}%)", update.job_id, update.phase, update.progress)
        })
        .await
        .map_err(startup_error)?;

    match outcome {
        PollOutcome::Completed { output_reference } => {
            info!("Job {} completed", id);
            println!("{}", output_reference);
            Ok(())
        }
        PollOutcome::Failed { error_message } => {
            error!("Job {} failed: {}", id, error_message);
            Err(startup_error(format!("job {id} failed: {error_message}")))
        }
        PollOutcome::Cancelled => {
            warn!("Stopped polling job {}; it keeps running on the server", id);
            Ok(())
        }
        PollOutcome::TimedOut { polls } => {
            Err(startup_error(format!("job {id} still running after {polls} polls")))
        }
    }
}
