use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing::info;

use cutplan::config::{load_config, CompilerConfig, LoggingConfig};
use cutplan::error_codes::{find_coded_error, CodedError, ErrorCode};
use cutplan::executor::{render, FfmpegExecutor, FfmpegMode};
use cutplan::filter_graph::compile;
use cutplan::logging::init_logging;
use cutplan::operation::OutputFormat;
use cutplan::plan::{describe, plan_prompt, Plan};

const SUPPORTED_INPUT_EXTENSIONS: [&str; 6] = ["mp4", "mov", "m4v", "mkv", "webm", "avi"];

#[derive(Debug, Parser)]
#[command(name = "cutplan", version)]
#[command(about = "Compile free-text edit prompts into ffmpeg invocations")]
struct Cli {
    /// YAML compiler config; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the edit plan a prompt resolves to.
    Plan {
        prompt: String,
        #[arg(long)]
        json: bool,
    },
    /// Print the ffmpeg arguments for a prompt.
    Compile {
        prompt: String,
        #[arg(short = 'i', long = "input")]
        input: String,
        #[arg(short = 'o', long = "output")]
        output: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Apply a prompt to a video file through ffmpeg.
    Run {
        prompt: String,
        #[arg(short = 'i', long = "input")]
        input: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = FfmpegChoice::Auto)]
        ffmpeg: FfmpegChoice,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FfmpegChoice {
    Auto,
    System,
    Sidecar,
}

impl From<FfmpegChoice> for FfmpegMode {
    fn from(choice: FfmpegChoice) -> Self {
        match choice {
            FfmpegChoice::Auto => Self::Auto,
            FfmpegChoice::System => Self::System,
            FfmpegChoice::Sidecar => Self::Sidecar,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&LoggingConfig {
        level: cli.log_level.clone(),
        json: cli.log_json,
    });

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => report_error(&error),
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_compiler_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Plan { prompt, json } => run_plan(&prompt, json, &config),
        Commands::Compile {
            prompt,
            input,
            output,
            json,
        } => run_compile(&prompt, &input, output.as_deref(), json, &config),
        Commands::Run {
            prompt,
            input,
            output,
            ffmpeg,
        } => run_render(&prompt, &input, output.as_deref(), ffmpeg.into(), &config),
    }
}

fn report_error(error: &anyhow::Error) -> ExitCode {
    if let Some(coded) = find_coded_error(error) {
        match serde_json::to_string(&coded.envelope()) {
            Ok(envelope) => eprintln!("{envelope}"),
            Err(_) => eprintln!("{coded}"),
        }
        return ExitCode::from(coded.exit_code());
    }
    eprintln!("error: {error:#}");
    ExitCode::FAILURE
}

fn load_compiler_config(path: Option<&Path>) -> Result<CompilerConfig> {
    match path {
        Some(path) => load_config(path),
        None => Ok(CompilerConfig::default()),
    }
}

fn plan_for(prompt: &str, config: &CompilerConfig) -> Result<Plan> {
    if prompt.trim().is_empty() {
        return Err(anyhow!(CodedError::new(
            ErrorCode::EmptyPrompt,
            "prompt must contain an editing instruction",
        )));
    }
    let plan = plan_prompt(prompt, config.duplicates);
    info!(
        operations = plan.operations().len(),
        output = plan.output().extension(),
        "planned prompt"
    );
    Ok(plan)
}

fn run_plan(prompt: &str, json: bool, config: &CompilerConfig) -> Result<()> {
    let plan = plan_for(prompt, config)?;
    let steps = describe(&plan);
    if json {
        let payload = json!({
            "prompt": prompt,
            "plan": plan,
            "steps": steps,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    if steps.is_empty() {
        println!(
            "No edits recognised; output will be re-encoded as {}.",
            plan.output().extension()
        );
    }
    for (index, step) in steps.iter().enumerate() {
        println!("{}. {step}", index + 1);
    }
    Ok(())
}

fn run_compile(
    prompt: &str,
    input: &str,
    output: Option<&str>,
    json: bool,
    config: &CompilerConfig,
) -> Result<()> {
    let plan = plan_for(prompt, config)?;
    let output = output
        .map(str::to_owned)
        .unwrap_or_else(|| format!("output.{}", plan.output().extension()));
    let args = compile(&plan, input, &output, config);

    if json {
        let payload = json!({
            "plan": plan,
            "args": args,
            "fingerprint": args.fingerprint(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    for arg in args.as_slice() {
        println!("{arg}");
    }
    Ok(())
}

fn run_render(
    prompt: &str,
    input: &Path,
    output: Option<&Path>,
    mode: FfmpegMode,
    config: &CompilerConfig,
) -> Result<()> {
    let input_ext = supported_input_extension(input)?;
    let plan = plan_for(prompt, config)?;
    let output_ext = plan.output().extension();
    let output_path = match output {
        Some(path) => {
            ensure_output_extension(path, plan.output())?;
            path.to_path_buf()
        }
        None => default_output_path(input, output_ext),
    };

    let input_bytes =
        fs::read(input).with_context(|| format!("failed to read input {}", input.display()))?;
    let executor = FfmpegExecutor::new(mode);
    let output_bytes = render(
        &executor,
        &plan,
        &format!("input.{input_ext}"),
        &format!("output.{output_ext}"),
        &input_bytes,
        config,
    )?;

    fs::write(&output_path, output_bytes)
        .with_context(|| format!("failed to write output {}", output_path.display()))?;
    println!("Wrote {}", output_path.display());
    Ok(())
}

fn supported_input_extension(input: &Path) -> Result<String> {
    let ext = input
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if SUPPORTED_INPUT_EXTENSIONS.contains(&ext.as_str()) {
        return Ok(ext);
    }
    Err(anyhow!(CodedError::new(
        ErrorCode::UnsupportedInput,
        format!("unsupported input file '{}'", input.display()),
    )
    .with_details(json!({
        "extension": ext,
        "allowed": SUPPORTED_INPUT_EXTENSIONS,
    }))))
}

fn ensure_output_extension(path: &Path, format: OutputFormat) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();
    if OutputFormat::from_extension(ext) == Some(format) {
        return Ok(());
    }
    Err(anyhow!(CodedError::new(
        ErrorCode::OutputFormatMismatch,
        format!(
            "output '{}' does not match the planned {} format",
            path.display(),
            format.extension()
        ),
    )
    .with_details(json!({
        "provided": ext,
        "expected": format.extension(),
    }))))
}

fn default_output_path(input: &Path, ext: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("output");
    input.with_file_name(format!("{stem}_edited.{ext}"))
}
