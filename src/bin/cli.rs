// Audiobook Processor - folder to chaptered M4B converter
// Copyright (C) 2026 The Audiobook Processor Authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Console front end
//!
//! With no subcommand, runs an interactive loop: enter a folder path, review
//! the analysis, confirm, and watch progress. Subcommands expose the same
//! steps for scripting.

use anyhow::Result;
use audiobook_core::{
    AudiobookProcessor, FolderAnalysis, ProcessingPhase, ProcessingStatus, ProcessorError,
    ProcessorOptions, SharedSink,
};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

/// Width of the progress bar in columns
const BAR_WIDTH: usize = 50;

#[derive(Parser)]
#[command(name = "audiobook-cli")]
#[command(about = "Combine an audiobook folder into a single chaptered M4B", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the ffmpeg executable
    #[arg(long, env = "AUDIOBOOK_FFMPEG", global = true)]
    ffmpeg: Option<PathBuf>,

    /// Path to the ffprobe executable
    #[arg(long, env = "AUDIOBOOK_FFPROBE", global = true)]
    ffprobe: Option<PathBuf>,

    /// AAC bitrate for the output
    #[arg(long, default_value = "128k", global = true)]
    bitrate: String,

    /// Directory for temporary working files
    #[arg(long, env = "AUDIOBOOK_SCRATCH_DIR", global = true)]
    scratch_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what would be done with a folder
    Analyze {
        folder: PathBuf,
    },
    /// Convert a folder into a single M4B
    Process {
        folder: PathBuf,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
        /// Print statuses as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Check that an output file exists and is not empty
    Validate {
        file: PathBuf,
    },
}

/// Terminal writer shared by the progress sink
///
/// Messages print as timestamped log lines, percentages redraw a bar in place.
struct Renderer {
    json: bool,
    bar_active: bool,
}

impl Renderer {
    fn new(json: bool) -> Self {
        Self {
            json,
            bar_active: false,
        }
    }

    fn render(&mut self, status: &ProcessingStatus) {
        let mut out = std::io::stdout().lock();

        if self.json {
            if let Ok(line) = serde_json::to_string(status) {
                let _ = writeln!(out, "{}", line);
            }
            return;
        }

        if let Some(message) = &status.message {
            self.end_bar(&mut out);
            let _ = writeln!(out, "[{}] {}", Local::now().format("%H:%M:%S"), message);
            return;
        }

        if status.phase == ProcessingPhase::Processing && status.percentage > 0.0 {
            let filled = ((status.percentage / 100.0) * BAR_WIDTH as f64) as usize;
            let filled = filled.min(BAR_WIDTH);
            let eta = match status.estimated_remaining {
                Some(_) => format!(" ETR {}", status.eta_string()),
                None => String::new(),
            };
            let _ = write!(
                out,
                "\r[{}{}] {:>3}%{}   ",
                "█".repeat(filled),
                "-".repeat(BAR_WIDTH - filled),
                status.percentage as u32,
                eta
            );
            let _ = out.flush();
            self.bar_active = true;

            if status.percentage >= 100.0 {
                self.end_bar(&mut out);
            }
        }
    }

    fn end_bar(&mut self, out: &mut impl Write) {
        if self.bar_active {
            let _ = writeln!(out);
            self.bar_active = false;
        }
    }
}

fn renderer_sink(json: bool) -> SharedSink {
    let renderer = Arc::new(Mutex::new(Renderer::new(json)));
    Arc::new(move |status: ProcessingStatus| {
        if let Ok(mut renderer) = renderer.lock() {
            renderer.render(&status);
        }
    })
}

fn build_options(cli: &Cli) -> ProcessorOptions {
    let mut options = ProcessorOptions::default();

    if let Some(ffmpeg) = &cli.ffmpeg {
        options.tools.ffmpeg = ffmpeg.clone();
    }
    if let Some(ffprobe) = &cli.ffprobe {
        options.tools.ffprobe = ffprobe.clone();
    }
    options.audio_bitrate = cli.bitrate.clone();
    options.scratch_root = cli.scratch_dir.clone();

    options
}

fn print_analysis(folder: &Path, analysis: &FolderAnalysis) {
    println!("{}", analysis.message);
    for file in &analysis.audio_files {
        let shown = file.strip_prefix(folder).unwrap_or(file);
        println!("  {}", shown.display());
    }
}

async fn confirm(lines: &mut Lines<BufReader<Stdin>>) -> Result<bool> {
    print!("Process this folder? (Y/N): ");
    std::io::stdout().flush()?;

    let answer = lines.next_line().await?.unwrap_or_default();
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

/// Analyze, confirm and process one folder
async fn process(
    processor: &AudiobookProcessor,
    folder: &Path,
    yes: bool,
    json: bool,
    lines: &mut Lines<BufReader<Stdin>>,
) -> Result<()> {
    let analysis = processor.analyze_folder(folder).await?;

    if !json {
        print_analysis(folder, &analysis);
    }

    if !analysis.action.requires_processing() {
        return Ok(());
    }

    if !yes && !confirm(lines).await? {
        println!("Operation cancelled.");
        return Ok(());
    }

    let outcome = processor.process_folder(folder, renderer_sink(json)).await?;

    if !json {
        if let Some(artifact) = &outcome.artifact {
            println!("Output: {}", artifact.display());
        }
    }

    Ok(())
}

async fn interactive(processor: &AudiobookProcessor) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Audiobook Processor Initialized");

    loop {
        println!("\nPlease enter the full path to an audiobook folder (or type 'exit' to close):");

        let Some(input) = lines.next_line().await? else {
            break;
        };
        let input = input.trim().trim_matches('"');

        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("exit") {
            break;
        }

        let folder = PathBuf::from(input);
        if !folder.is_dir() {
            println!("Error: Directory not found. Please check the path and try again.");
            continue;
        }

        if let Err(e) = process(processor, &folder, false, false, &mut lines).await {
            println!("\n--- ERROR ---\n{}\n-------------", failure_message(&e));
        }
    }

    Ok(())
}

/// Log filter when `RUST_LOG` is unset
///
/// Status messages already reach the terminal through the renderer, so the
/// library only logs warnings unless `--verbose` is given.
fn default_log_filter(verbose: bool) -> &'static str {
    if verbose {
        "audiobook_core=debug,audiobook_cli=debug"
    } else {
        "audiobook_core=warn"
    }
}

/// One-line description of a failed command
///
/// Pipeline errors use their short form; the full diagnostic tail is in the
/// debug log.
fn failure_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<ProcessorError>() {
        Some(err) => {
            tracing::debug!("{}", err);
            err.user_message()
        }
        None => format!("{:#}", err),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let processor = AudiobookProcessor::new(build_options(&cli));

    match cli.command {
        None => interactive(&processor).await?,
        Some(Commands::Analyze { folder }) => {
            let analysis = processor.analyze_folder(&folder).await?;
            print_analysis(&folder, &analysis);
        }
        Some(Commands::Process { folder, yes, json }) => {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            process(&processor, &folder, yes, json, &mut lines).await?;
        }
        Some(Commands::Validate { file }) => {
            if !processor.validate_output(&file).await {
                return Err(ProcessorError::ValidationError(format!(
                    "{} is missing or empty",
                    file.display()
                ))
                .into());
            }
            println!("OK: {}", file.display());
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_log_filter(cli.verbose).to_string());

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", failure_message(&e));
            ExitCode::FAILURE
        }
    }
}
