use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::{CompilerConfig, Mp4Profile};
use crate::operation::{CropMode, Operation, OutputFormat};
use crate::plan::Plan;
use crate::tempo::{clamp_tempo, format_decimal};

const SETPTS_PRECISION: usize = 4;

/// Ordered executor invocation, consumed verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CompiledArguments(Vec<String>);

impl CompiledArguments {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Index of the first argument equal to `flag`.
    pub fn position(&self, flag: &str) -> Option<usize> {
        self.0.iter().position(|arg| arg == flag)
    }

    /// The argument following the first `flag`.
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        let index = self.position(flag)?;
        self.0.get(index + 1).map(String::as_str)
    }

    /// SHA-256 over the NUL-joined arguments, as lowercase hex.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for arg in &self.0 {
            hasher.update(arg.as_bytes());
            hasher.update([0u8]);
        }
        let digest = hasher.finalize();
        let mut out = String::with_capacity(digest.len() * 2);
        for byte in digest {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }
}

/// Lowers a plan into the argument list for the media executor.
///
/// Placement is fixed: seek before the input (fast seek), duration after it (relative
/// to the seek point), then video filters, audio handling, format flags, output name.
pub fn compile(plan: &Plan, input: &str, output: &str, config: &CompilerConfig) -> CompiledArguments {
    let mut args = seek_args(plan, config.time_precision);
    args.push("-i".to_owned());
    args.push(input.to_owned());
    args.extend(duration_args(plan, config.time_precision));

    let filters = video_filters(plan, config);
    if !filters.is_empty() {
        args.push("-vf".to_owned());
        args.push(filters.join(","));
    }

    args.extend(audio_args(plan));

    match plan.output() {
        OutputFormat::Mp4 => args.extend(mp4_output_args(&config.mp4, plan.is_muted())),
        OutputFormat::Gif => args.extend(gif_output_args()),
    }
    args.push(output.to_owned());

    debug!(
        arguments = args.len(),
        output_format = ?plan.output(),
        "compiled plan"
    );
    CompiledArguments(args)
}

fn seek_args(plan: &Plan, precision: usize) -> Vec<String> {
    match plan.trim() {
        Some((start, _)) if start > 0.0 => {
            vec!["-ss".to_owned(), format!("{start:.precision$}")]
        }
        _ => Vec::new(),
    }
}

fn duration_args(plan: &Plan, precision: usize) -> Vec<String> {
    match plan.trim() {
        Some((start, Some(end))) if end > start => {
            let duration = end - start;
            vec!["-t".to_owned(), format!("{duration:.precision$}")]
        }
        _ => Vec::new(),
    }
}

/// Video filters in plan order, with the GIF frame-rate filter appended last.
pub fn video_filters(plan: &Plan, config: &CompilerConfig) -> Vec<String> {
    let mut filters = Vec::new();
    for operation in plan.operations() {
        match *operation {
            Operation::Trim { .. } | Operation::Mute => {}
            Operation::Grayscale => filters.push("hue=s=0".to_owned()),
            Operation::Speed { factor } => filters.push(setpts_filter(factor)),
            Operation::Brightness { value } => {
                filters.push(format!("eq=brightness={}", format_decimal(value, 2)));
            }
            Operation::Crop {
                mode: CropMode::Square,
            } => filters.push("crop='min(iw,ih)':'min(iw,ih)'".to_owned()),
            Operation::Crop {
                mode: CropMode::PortraitFill,
            } => {
                let (width, height) = (config.portrait.width, config.portrait.height);
                filters.push(format!(
                    "scale={width}:{height}:force_original_aspect_ratio=increase"
                ));
                filters.push(format!("crop={width}:{height}"));
            }
        }
    }
    if plan.output() == OutputFormat::Gif {
        filters.push(format!("fps={}", config.gif.fps));
    }
    filters
}

/// Timestamp scale `1/factor` at four decimals, widened for very fast playback so the
/// multiplier never rounds to zero.
fn setpts_filter(factor: f64) -> String {
    let scale = 1.0 / factor;
    let mut precision = SETPTS_PRECISION;
    if scale > 0.0 && scale < 0.5e-4 {
        precision += (-scale.log10()).ceil() as usize;
    }
    format!("setpts={scale:.precision$}*PTS")
}

/// Mute always wins over a tempo chain.
fn audio_args(plan: &Plan) -> Vec<String> {
    if plan.is_muted() {
        return vec!["-an".to_owned()];
    }
    let chain = plan.speed().map(clamp_tempo).unwrap_or_default();
    match chain.to_filter() {
        Some(filter) => vec!["-af".to_owned(), filter],
        None => Vec::new(),
    }
}

pub fn mp4_output_args(profile: &Mp4Profile, muted: bool) -> Vec<String> {
    let mut args = vec![
        "-c:v".to_owned(),
        profile.video_codec.clone(),
        "-preset".to_owned(),
        profile.preset.clone(),
        "-pix_fmt".to_owned(),
        profile.pixel_format.clone(),
    ];
    if !muted {
        args.push("-c:a".to_owned());
        args.push(profile.audio_codec.clone());
    }
    args.push("-movflags".to_owned());
    args.push("+faststart".to_owned());
    args
}

pub fn gif_output_args() -> Vec<String> {
    vec!["-loop".to_owned(), "0".to_owned()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{plan_prompt, DuplicatePolicy};

    fn compile_prompt(prompt: &str) -> CompiledArguments {
        let plan = plan_prompt(prompt, DuplicatePolicy::First);
        compile(&plan, "input.mp4", "output.mp4", &CompilerConfig::default())
    }

    #[test]
    fn empty_plan_is_plain_transcode() {
        let args = compile_prompt("");
        assert_eq!(
            args.as_slice(),
            &[
                "-i",
                "input.mp4",
                "-c:v",
                "libx264",
                "-preset",
                "veryfast",
                "-pix_fmt",
                "yuv420p",
                "-c:a",
                "aac",
                "-movflags",
                "+faststart",
                "output.mp4",
            ]
        );
    }

    #[test]
    fn seek_precedes_input_and_duration_follows() {
        let args = compile_prompt("keep from 5s to 10s");
        let seek = args.position("-ss").expect("seek directive");
        let input = args.position("-i").expect("input directive");
        let duration = args.position("-t").expect("duration directive");
        assert!(seek < input && input < duration);
        assert_eq!(args.value_of("-ss"), Some("5.00"));
        assert_eq!(args.value_of("-t"), Some("5.00"));
    }

    #[test]
    fn zero_start_trim_only_emits_duration() {
        let args = compile_prompt("until 4.5 seconds");
        assert_eq!(args.position("-ss"), None);
        assert_eq!(args.value_of("-t"), Some("4.50"));
    }

    #[test]
    fn mute_suppresses_tempo_chain_and_audio_codec() {
        let args = compile_prompt("mute and speed up to 2x");
        assert!(args.position("-an").is_some());
        assert_eq!(args.position("-af"), None);
        assert_eq!(args.position("-c:a"), None);
        assert_eq!(args.value_of("-vf"), Some("setpts=0.5000*PTS"));
    }

    #[test]
    fn extreme_speed_uses_chained_tempo() {
        let args = compile_prompt("speed up to 4x");
        assert_eq!(args.value_of("-af"), Some("atempo=2,atempo=2"));
        let args = compile_prompt("slow down to 0.25x");
        assert_eq!(args.value_of("-af"), Some("atempo=0.5,atempo=0.5"));
        assert_eq!(args.value_of("-vf"), Some("setpts=4.0000*PTS"));
    }

    #[test]
    fn setpts_keeps_four_decimals_until_it_would_vanish() {
        assert_eq!(setpts_filter(1.2), "setpts=0.8333*PTS");
        assert_eq!(setpts_filter(0.25), "setpts=4.0000*PTS");
        assert_eq!(setpts_filter(10000.0), "setpts=0.0001*PTS");
        assert_eq!(setpts_filter(50000.0), "setpts=0.000020000*PTS");

        let args = compile_prompt("speed up to 50000x");
        let filter = args.value_of("-vf").expect("video filter");
        assert_ne!(filter, "setpts=0.0000*PTS");
        assert!(filter.starts_with("setpts=0.00002"), "filter: {filter}");
    }

    #[test]
    fn portrait_crop_uses_configured_target() {
        let mut config = CompilerConfig::default();
        config.portrait.width = 720;
        config.portrait.height = 1280;
        let plan = plan_prompt("make it vertical and brighten by 10%", DuplicatePolicy::First);
        let args = compile(&plan, "in.mov", "out.mp4", &config);
        assert_eq!(
            args.value_of("-vf"),
            Some("eq=brightness=0.1,scale=720:1280:force_original_aspect_ratio=increase,crop=720:1280")
        );
    }

    #[test]
    fn gif_appends_frame_rate_last_and_loops() {
        let plan = plan_prompt("grayscale square gif", DuplicatePolicy::First);
        let args = compile(&plan, "in.mp4", "out.gif", &CompilerConfig::default());
        assert_eq!(
            args.value_of("-vf"),
            Some("hue=s=0,crop='min(iw,ih)':'min(iw,ih)',fps=10")
        );
        assert_eq!(args.value_of("-loop"), Some("0"));
        assert_eq!(args.position("-c:a"), None);
        assert_eq!(args.position("-c:v"), None);
        assert_eq!(args.as_slice().last().map(String::as_str), Some("out.gif"));
    }

    #[test]
    fn fingerprint_is_stable_and_sensitive() {
        let a = compile_prompt("grayscale");
        let b = compile_prompt("grayscale");
        let c = compile_prompt("monochrome, mute");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }
}
