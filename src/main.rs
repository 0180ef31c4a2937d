mod audio;
mod config;
mod error;
mod input;
mod lyrics;
mod pipeline;
mod songwriter;
mod storage;
mod synth;
mod themes;
mod voice;

use anyhow::Context;
use clap::{Parser, Subcommand};
use input::{Gender, Scope, TrackRequest};
use pipeline::Pipeline;
use std::io::Write;
use synth::Mode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "remixer", version, about = "Turn a song or album into a freshly written remix")]
struct Cli {
    /// Override config file path.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Remix one request, e.g. "Hello by Adele (acoustic, female)".
    Remix {
        input: String,
        /// Synthesis mode (defaults to the configured one).
        #[arg(long, value_enum)]
        mode: Option<Mode>,
        /// Force the vocal gender.
        #[arg(long, value_enum)]
        gender: Option<Gender>,
        /// Treat the title as an album.
        #[arg(long)]
        album: bool,
        /// Ignore cached lyrics and remixes.
        #[arg(long)]
        no_cache: bool,
        /// Fail instead of retrying in a cheaper mode.
        #[arg(long)]
        no_fallback: bool,
    },
    /// Print the lyrics a remix would start from (headless).
    Lyrics {
        input: String,
        #[arg(long)]
        album: bool,
    },
    /// List recent remixes.
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Delete remixes older than the given age, files included.
    Prune {
        #[arg(long)]
        days: u64,
    },
    /// Persist pipeline settings.
    Set {
        #[command(subcommand)]
        setting: SetCommand,
    },
}

#[derive(Debug, Subcommand)]
enum SetCommand {
    /// Default synthesis mode.
    Mode {
        #[arg(value_enum)]
        mode: Mode,
    },
    /// Always use this vocal gender.
    Gender {
        #[arg(value_enum)]
        gender: Gender,
    },
    /// Go back to guessing the vocal gender.
    ClearGender,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref()).context("load config")?;

    match cli.command {
        None => {
            let pipeline =
                Pipeline::from_config(&cfg, cfg.pipeline.mode).context("build pipeline")?;
            interactive(&pipeline).await?;
        }
        Some(Command::Remix {
            input,
            mode,
            gender,
            album,
            no_cache,
            no_fallback,
        }) => {
            let mut cfg = cfg;
            if gender.is_some() {
                cfg.pipeline.gender_override = gender;
            }
            cfg.pipeline.use_cache &= !no_cache;
            cfg.pipeline.fallback &= !no_fallback;
            let mode = mode.unwrap_or(cfg.pipeline.mode);

            let request = request_from(&input, album)?;
            let pipeline = Pipeline::from_config(&cfg, mode).context("build pipeline")?;
            if !remix_once(&pipeline, &request).await {
                std::process::exit(1);
            }
        }
        Some(Command::Lyrics { input, album }) => {
            let request = request_from(&input, album)?;
            let pipeline =
                Pipeline::from_config(&cfg, cfg.pipeline.mode).context("build pipeline")?;
            match pipeline.lyrics(&request).await {
                Ok(bundle) => {
                    println!("{} by {} ({})", bundle.title, bundle.artist, bundle.source.as_str());
                    if bundle.track_titles.len() > 1 {
                        println!("tracks: {}", bundle.track_titles.join(", "));
                    }
                    println!();
                    println!("{}", bundle.raw_lyrics);
                }
                Err(e) => {
                    eprintln!("{}", e.user_message());
                    std::process::exit(1);
                }
            }
        }
        Some(Command::History { limit }) => {
            let handle = storage::StorageHandle::new(cfg.cache_db_path());
            let rows = tokio::task::spawn_blocking(move || handle.history(limit))
                .await
                .context("history task")??;
            if rows.is_empty() {
                println!("No remixes yet.");
            }
            let now = storage::now_unix();
            for (i, r) in rows.iter().enumerate() {
                println!(
                    "{:02}. {} - {}  [{} / {}]  {} ago\n    {}",
                    i + 1,
                    r.title,
                    r.artist,
                    r.mode,
                    r.mood,
                    age(now - r.created_at),
                    r.path.display()
                );
            }
        }
        Some(Command::Prune { days }) => {
            let handle = storage::StorageHandle::new(cfg.cache_db_path());
            let cutoff = prune_cutoff(storage::now_unix(), days);
            let paths = tokio::task::spawn_blocking(move || handle.prune_before(cutoff))
                .await
                .context("prune task")??;
            let mut removed = 0;
            for path in &paths {
                match tokio::fs::remove_file(path).await {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => tracing::warn!(path = %path.display(), "remove remix: {e}"),
                }
            }
            println!("Pruned {} remixes ({} files deleted).", paths.len(), removed);
        }
        Some(Command::Set { setting }) => {
            // Re-read without env overrides so secrets from the environment
            // never land in the file.
            let mut cfg = config::load_file(cli.config.as_deref()).context("load config")?;
            match setting {
                SetCommand::Mode { mode } => {
                    cfg.pipeline.mode = mode;
                    println!("Default mode set to {mode}.");
                }
                SetCommand::Gender { gender } => {
                    cfg.pipeline.gender_override = Some(gender);
                    println!("Vocal gender fixed to {}.", gender.as_str());
                }
                SetCommand::ClearGender => {
                    cfg.pipeline.gender_override = None;
                    println!("Vocal gender override cleared.");
                }
            }
            config::save(&cfg, cli.config.as_deref()).context("save config")?;
        }
    }

    Ok(())
}

fn request_from(input: &str, album: bool) -> anyhow::Result<TrackRequest> {
    let request = input::parse_request(input)?;
    Ok(if album {
        request.with_scope(Scope::Album)
    } else {
        request
    })
}

/// Run one remix and report it. Returns false on failure.
async fn remix_once(pipeline: &Pipeline, request: &TrackRequest) -> bool {
    match pipeline.remix(request).await {
        Ok(result) => {
            println!("{}", result.final_audio_path.display());
            println!(
                "  \"{}\" after {}  (mood: {}{})",
                result.metadata.title,
                result.metadata.artist,
                result.metadata.mood,
                if result.cached { ", cached" } else { "" }
            );
            true
        }
        Err(e) => {
            eprintln!("{}", e.user_message());
            if e.is_retryable() {
                eprintln!("The lyrics provider is throttling requests; try again in a minute.");
            }
            false
        }
    }
}

async fn interactive(pipeline: &Pipeline) -> anyhow::Result<()> {
    println!(
        "remixer ({} mode). Enter \"Song by Artist (style hints)\", or q to quit.",
        pipeline.mode()
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().context("flush stdout")?;
        let Some(line) = lines.next_line().await.context("read stdin")? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line.to_ascii_lowercase().as_str(), "quit" | "exit" | "q") {
            break;
        }
        match input::parse_request(line) {
            Ok(request) => {
                remix_once(pipeline, &request).await;
            }
            Err(e) => eprintln!("{e}"),
        }
    }
    Ok(())
}

/// Unix time `days` before `now`; absurd ages clamp instead of overflowing.
fn prune_cutoff(now: i64, days: u64) -> i64 {
    let age_secs = i64::try_from(days)
        .unwrap_or(i64::MAX)
        .saturating_mul(86_400);
    now.saturating_sub(age_secs)
}

fn age(secs: i64) -> String {
    let secs = secs.max(0);
    match secs {
        s if s < 3_600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h", s / 3_600),
        s => format!("{}d", s / 86_400),
    }
}
