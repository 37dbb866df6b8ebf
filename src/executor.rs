use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{anyhow, Context, Result};
use serde_json::json;
use tracing::{debug, info};

use crate::config::CompilerConfig;
use crate::error_codes::{CodedError, ErrorCode};
use crate::filter_graph::{compile, CompiledArguments};
use crate::plan::Plan;

const GLOBAL_ARGS: [&str; 4] = ["-hide_banner", "-loglevel", "error", "-y"];
const MAX_RESOURCE_NAME_LEN: usize = 255;

/// Everything the media engine needs for one run.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionRequest<'a> {
    pub args: &'a CompiledArguments,
    pub input_name: &'a str,
    pub output_name: &'a str,
    pub input: &'a [u8],
}

/// Opaque media engine: compiled arguments plus input bytes in, output bytes out.
pub trait Executor {
    fn label(&self) -> &'static str;
    fn execute(&self, request: &ExecutionRequest<'_>) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfmpegMode {
    Auto,
    System,
    Sidecar,
}

/// Runs ffmpeg inside a private scratch directory holding the input under its name.
#[derive(Debug, Clone)]
pub struct FfmpegExecutor {
    mode: FfmpegMode,
}

impl FfmpegExecutor {
    pub fn new(mode: FfmpegMode) -> Self {
        Self { mode }
    }

    fn resolve_binary(&self) -> Result<PathBuf> {
        match self.mode {
            FfmpegMode::Auto | FfmpegMode::System => Ok(PathBuf::from("ffmpeg")),
            FfmpegMode::Sidecar => {
                #[cfg(feature = "sidecar_ffmpeg")]
                {
                    let path = ffmpeg_sidecar::paths::ffmpeg_path();
                    if !path.exists() {
                        ffmpeg_sidecar::download::auto_download()
                            .context("failed to auto-download ffmpeg sidecar binary")?;
                    }
                    Ok(path)
                }
                #[cfg(not(feature = "sidecar_ffmpeg"))]
                {
                    Err(anyhow!(
                        "ffmpeg sidecar mode requested but cutplan was built without `sidecar_ffmpeg`. Rebuild with `--features sidecar_ffmpeg`."
                    ))
                }
            }
        }
    }
}

impl Default for FfmpegExecutor {
    fn default() -> Self {
        Self::new(FfmpegMode::Auto)
    }
}

impl Executor for FfmpegExecutor {
    fn label(&self) -> &'static str {
        match self.mode {
            FfmpegMode::Auto | FfmpegMode::System => "system",
            FfmpegMode::Sidecar => "sidecar",
        }
    }

    fn execute(&self, request: &ExecutionRequest<'_>) -> Result<Vec<u8>> {
        validate_resource_names(request.input_name, request.output_name)?;
        let ffmpeg_path = self.resolve_binary()?;
        let workdir = tempfile::tempdir().context("failed to create ffmpeg scratch directory")?;

        fs::write(workdir.path().join(request.input_name), request.input)
            .with_context(|| format!("failed to stage input '{}'", request.input_name))?;

        run_ffmpeg_process(&ffmpeg_path, workdir.path(), request.args, self.label())?;

        let output_path = workdir.path().join(request.output_name);
        fs::read(&output_path)
            .with_context(|| format!("ffmpeg produced no output '{}'", request.output_name))
    }
}

fn run_ffmpeg_process(
    ffmpeg_path: &Path,
    workdir: &Path,
    args: &CompiledArguments,
    mode_label: &str,
) -> Result<()> {
    let mut command = Command::new(ffmpeg_path);
    command
        .current_dir(workdir)
        .args(GLOBAL_ARGS)
        .args(args.as_slice())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    debug!(mode = mode_label, args = %args.as_slice().join(" "), "spawning ffmpeg");
    let child = command.spawn().map_err(|error| {
        if error.kind() == ErrorKind::NotFound {
            anyhow!(
                "ffmpeg executable not found (mode={mode_label}, resolved_path={}). Install ffmpeg (system mode) or use sidecar mode with `--features sidecar_ffmpeg`.",
                ffmpeg_path.display()
            )
        } else {
            anyhow!(
                "failed to spawn ffmpeg process (mode={mode_label}, resolved_path={}, args='{}'): {error}",
                ffmpeg_path.display(),
                args.as_slice().join(" ")
            )
        }
    })?;

    let output = child
        .wait_with_output()
        .context("failed waiting for ffmpeg process")?;
    if !output.status.success() {
        let stderr_tail = last_n_chars(&String::from_utf8_lossy(&output.stderr), 500);
        return Err(anyhow!(
            "ffmpeg failed with status {} (mode={mode_label}, resolved_path={}, args='{}', stderr_tail='{}')",
            output.status,
            ffmpeg_path.display(),
            args.as_slice().join(" "),
            stderr_tail
        ));
    }
    Ok(())
}

/// Names must be plain file names; they are joined onto the scratch directory and
/// passed as ffmpeg arguments, so a leading `-` would be read as an option.
pub fn validate_resource_names(input_name: &str, output_name: &str) -> Result<()> {
    for name in [input_name, output_name] {
        let invalid = name.trim().is_empty()
            || name == "."
            || name == ".."
            || name.starts_with('-')
            || name.len() > MAX_RESOURCE_NAME_LEN
            || name.contains(|c: char| c == '/' || c == '\\')
            || name.chars().any(char::is_control);
        if invalid {
            return Err(anyhow!(CodedError::new(
                ErrorCode::InvalidResourceName,
                format!("resource name '{}' must be a plain file name", name.escape_default()),
            )
            .with_details(json!({ "name": name }))));
        }
    }
    if input_name == output_name {
        return Err(anyhow!(CodedError::new(
            ErrorCode::InvalidResourceName,
            "input and output resource names must differ",
        )
        .with_details(json!({ "name": input_name }))));
    }
    Ok(())
}

/// Compiles `plan` and hands it to `executor` together with the input bytes.
pub fn render(
    executor: &dyn Executor,
    plan: &Plan,
    input_name: &str,
    output_name: &str,
    input: &[u8],
    config: &CompilerConfig,
) -> Result<Vec<u8>> {
    validate_resource_names(input_name, output_name)?;
    let args = compile(plan, input_name, output_name, config);
    info!(
        executor = executor.label(),
        operations = plan.operations().len(),
        input_bytes = input.len(),
        "executing plan"
    );
    let output = executor.execute(&ExecutionRequest {
        args: &args,
        input_name,
        output_name,
        input,
    })?;
    info!(output_bytes = output.len(), "executor finished");
    Ok(output)
}

fn last_n_chars(s: &str, max_chars: usize) -> String {
    let mut chars = s.chars().collect::<Vec<_>>();
    if chars.len() > max_chars {
        chars = chars[chars.len().saturating_sub(max_chars)..].to_vec();
    }
    chars.into_iter().collect::<String>().trim().to_owned()
}
