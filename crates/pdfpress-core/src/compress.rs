//! Multi-attempt compression pipeline.
//!
//! One request runs an ordered list of attempt profiles against the external
//! tool, keeping the smallest usable output:
//!
//! 1. the resolved preset, with its full parameter set;
//! 2. on failure, a fixed most-aggressive fallback profile;
//! 3. when an output exists but did not shrink the file and the requested
//!    tier is low enough, one escalation pass (no font embedding, lower
//!    resolution, grayscale) that replaces the best only if strictly smaller.
//!
//! The input artifact is deleted before the pipeline returns, whatever path
//! was taken; the winning output stays on disk for the response stream.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::PdfPressError;
use crate::preset::CompressionPreset;
use crate::tool::ToolRunner;
use crate::workspace::Workspace;

/// Default ceiling on one tool invocation.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// Default reduction (percent) below which a success is logged as a warning.
pub const DEFAULT_MIN_REDUCTION_PCT: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct CompressOptions {
    pub preset: CompressionPreset,
    /// Ceiling on each individual tool invocation.
    pub timeout: Duration,
    /// Reduction below this is a warning, not an error.
    pub min_reduction_pct: f64,
}

impl CompressOptions {
    pub fn new(preset: CompressionPreset) -> Self {
        Self {
            preset,
            timeout: DEFAULT_TOOL_TIMEOUT,
            min_reduction_pct: DEFAULT_MIN_REDUCTION_PCT,
        }
    }
}

/// Size metrics of the winning attempt.
#[derive(Debug, Clone)]
pub struct CompressionOutcome {
    pub output_path: PathBuf,
    pub original_size: u64,
    pub compressed_size: u64,
    /// `100 * (1 - compressed/original)`, floored at 0.
    pub reduction_pct: f64,
    /// Device tier of the attempt that produced the output.
    pub preset_name: &'static str,
    /// Reduction came in under the configured threshold.
    pub below_threshold: bool,
}

/// One entry in the ordered attempt list.
#[derive(Debug, Clone)]
struct AttemptProfile {
    label: &'static str,
    preset: CompressionPreset,
    embed_fonts: bool,
    grayscale: bool,
}

impl AttemptProfile {
    fn primary(preset: &CompressionPreset) -> Self {
        Self {
            label: "primary",
            preset: preset.clone(),
            embed_fonts: true,
            grayscale: false,
        }
    }

    fn fallback() -> Self {
        Self {
            label: "fallback",
            preset: CompressionPreset::fallback(),
            embed_fonts: true,
            grayscale: false,
        }
    }

    fn escalation() -> Self {
        let mut preset = CompressionPreset::fallback();
        preset.color_dpi = 50;
        preset.gray_dpi = 50;
        preset.jpeg_quality = 35;
        Self {
            label: "escalation",
            preset,
            embed_fonts: false,
            grayscale: true,
        }
    }
}

/// A usable attempt output: exists on disk and is non-empty.
struct AttemptResult {
    path: PathBuf,
    size: u64,
    preset_name: &'static str,
}

/// Deletes the input artifact when the pipeline returns, on every path.
struct RemoveOnDrop(PathBuf);

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            tracing::warn!("Failed to delete input artifact {}: {}", self.0.display(), e);
        }
    }
}

/// Compress the PDF at `input` into a fresh workspace artifact.
///
/// `input` must live inside the workspace; it is consumed (deleted) by this
/// call regardless of outcome.
pub async fn compress_file(
    runner: &dyn ToolRunner,
    workspace: &Workspace,
    input: &Path,
    opts: &CompressOptions,
) -> Result<CompressionOutcome, PdfPressError> {
    let _input_guard = RemoveOnDrop(input.to_path_buf());
    let original_size = tokio::fs::metadata(input).await?.len();

    let mut profiles = vec![AttemptProfile::primary(&opts.preset)];
    let mut best: Option<AttemptResult> = None;
    let mut last_diagnostic = String::new();
    let mut fallback_queued = false;
    let mut escalation_queued = false;

    let mut index = 0;
    while index < profiles.len() {
        let profile = profiles[index].clone();
        index += 1;

        let output_path = workspace.unique_path("compressed", "pdf");
        let args = tool_args(&profile, input, &output_path);
        tracing::debug!(
            attempt = profile.label,
            tier = profile.preset.tier.name(),
            "Running compression attempt"
        );

        match runner.run(&args, opts.timeout).await {
            Ok(output) => {
                if !output.stderr.trim().is_empty() {
                    last_diagnostic = output.stderr.trim().to_string();
                } else if !output.stdout.trim().is_empty() {
                    last_diagnostic = output.stdout.trim().to_string();
                }

                let size = usable_size(&output_path).await;
                match size {
                    Some(size) if output.success => {
                        let improves = best.as_ref().is_none_or(|b| size < b.size);
                        if improves {
                            if let Some(previous) = best.replace(AttemptResult {
                                path: output_path,
                                size,
                                preset_name: profile.preset.tier.name(),
                            }) {
                                discard(&previous.path).await;
                            }
                        } else {
                            discard(&output_path).await;
                        }
                    }
                    _ => {
                        if output.timed_out {
                            tracing::warn!(attempt = profile.label, "Compression attempt timed out");
                        } else {
                            tracing::warn!(
                                attempt = profile.label,
                                "Compression attempt produced no usable output"
                            );
                        }
                        discard(&output_path).await;
                    }
                }
            }
            Err(e @ PdfPressError::ToolUnavailable(_)) => return Err(e),
            Err(e) => {
                tracing::warn!(attempt = profile.label, "Compression attempt failed: {}", e);
                last_diagnostic = e.to_string();
            }
        }

        if best.is_none() {
            if !fallback_queued {
                fallback_queued = true;
                profiles.push(AttemptProfile::fallback());
            }
        } else if !escalation_queued
            && opts.preset.allows_escalation()
            && best.as_ref().is_some_and(|b| b.size >= original_size)
        {
            escalation_queued = true;
            profiles.push(AttemptProfile::escalation());
        }
    }

    let best = best.ok_or_else(|| {
        PdfPressError::Compression(if last_diagnostic.is_empty() {
            "No compression attempt produced a usable output".into()
        } else {
            last_diagnostic
        })
    })?;

    let reduction_pct = reduction_percentage(original_size, best.size);
    let below_threshold = reduction_pct < opts.min_reduction_pct;
    if below_threshold {
        tracing::warn!(
            reduction = reduction_pct,
            threshold = opts.min_reduction_pct,
            "Compression finished below the acceptable reduction threshold"
        );
    }

    Ok(CompressionOutcome {
        output_path: best.path,
        original_size,
        compressed_size: best.size,
        reduction_pct,
        preset_name: best.preset_name,
        below_threshold,
    })
}

/// `100 * (1 - compressed/original)` floored at 0; an empty original reports 0.
pub fn reduction_percentage(original: u64, compressed: u64) -> f64 {
    if original == 0 {
        return 0.0;
    }
    (100.0 * (1.0 - compressed as f64 / original as f64)).max(0.0)
}

/// Size of the attempt output if it exists and is non-empty.
async fn usable_size(path: &Path) -> Option<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() > 0 => Some(meta.len()),
        _ => None,
    }
}

/// Best-effort removal of a losing attempt output.
async fn discard(path: &Path) {
    if tokio::fs::remove_file(path).await.is_ok() {
        tracing::debug!("Discarded attempt output {}", path.display());
    }
}

/// Full Ghostscript argument set for one attempt.
fn tool_args(profile: &AttemptProfile, input: &Path, output: &Path) -> Vec<String> {
    let preset = &profile.preset;
    let mut args = vec![
        "-sDEVICE=pdfwrite".to_string(),
        "-dCompatibilityLevel=1.4".to_string(),
        "-dNOPAUSE".to_string(),
        "-dQUIET".to_string(),
        "-dBATCH".to_string(),
        "-dSAFER".to_string(),
        format!("-dPDFSETTINGS={}", preset.tier.setting()),
        "-dSubsetFonts=true".to_string(),
        format!("-dEmbedAllFonts={}", profile.embed_fonts),
        "-dDetectDuplicateImages=true".to_string(),
        format!("-dDownsampleColorImages={}", preset.downsample),
        format!("-dDownsampleGrayImages={}", preset.downsample),
        format!("-dDownsampleMonoImages={}", preset.downsample),
    ];
    if preset.downsample {
        args.push(format!("-dColorImageResolution={}", preset.color_dpi));
        args.push(format!("-dGrayImageResolution={}", preset.gray_dpi));
        args.push(format!("-dMonoImageResolution={}", preset.mono_dpi));
        args.push("-dColorImageDownsampleType=/Bicubic".to_string());
        args.push("-dGrayImageDownsampleType=/Bicubic".to_string());
        args.push("-dMonoImageDownsampleType=/Subsample".to_string());
    }
    args.push(format!("-dJPEGQ={}", preset.jpeg_quality));
    if profile.grayscale {
        args.push("-sColorConversionStrategy=Gray".to_string());
        args.push("-dProcessColorModel=/DeviceGray".to_string());
    }
    args.push(format!("-sOutputFile={}", output.display()));
    args.push(input.display().to_string());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preset::{resolve_level, resolve_quality};
    use crate::tool::ToolOutput;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// What the fake tool should do on one invocation.
    enum Script {
        /// Exit cleanly after writing an output of this many bytes.
        Write(usize),
        /// Exit with a failure status and this diagnostic.
        Fail(&'static str),
        /// Simulate the deadline elapsing.
        TimeOut,
    }

    struct FakeRunner {
        script: Mutex<Vec<Script>>,
        calls: AtomicUsize,
        available: bool,
    }

    impl FakeRunner {
        fn new(script: Vec<Script>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
                available: true,
            }
        }

        fn unavailable() -> Self {
            Self {
                script: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
                available: false,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn output_path(args: &[String]) -> PathBuf {
            let flag = args
                .iter()
                .find_map(|a| a.strip_prefix("-sOutputFile="))
                .expect("output flag present");
            PathBuf::from(flag)
        }
    }

    #[async_trait]
    impl ToolRunner for FakeRunner {
        fn name(&self) -> &str {
            "fake"
        }

        fn is_available(&self) -> bool {
            self.available
        }

        async fn run(
            &self,
            args: &[String],
            _deadline: Duration,
        ) -> Result<ToolOutput, PdfPressError> {
            if !self.available {
                return Err(PdfPressError::ToolUnavailable("fake tool removed".into()));
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self.script.lock().unwrap().remove(0);
            match step {
                Script::Write(size) => {
                    std::fs::write(Self::output_path(args), vec![b'x'; size]).unwrap();
                    Ok(ToolOutput {
                        success: true,
                        stdout: String::new(),
                        stderr: String::new(),
                        timed_out: false,
                    })
                }
                Script::Fail(diag) => Ok(ToolOutput {
                    success: false,
                    stdout: String::new(),
                    stderr: diag.to_string(),
                    timed_out: false,
                }),
                Script::TimeOut => Ok(ToolOutput {
                    success: false,
                    stdout: String::new(),
                    stderr: "fake timed out".to_string(),
                    timed_out: true,
                }),
            }
        }
    }

    fn scratch() -> (tempfile::TempDir, Workspace) {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::create(dir.path()).unwrap();
        (dir, ws)
    }

    fn write_input(ws: &Workspace, size: usize) -> PathBuf {
        let path = ws.unique_path("upload", "pdf");
        std::fs::write(&path, vec![b'p'; size]).unwrap();
        path
    }

    fn remaining_files(ws: &Workspace) -> Vec<PathBuf> {
        std::fs::read_dir(ws.root())
            .unwrap()
            .flatten()
            .map(|e| e.path())
            .collect()
    }

    #[tokio::test]
    async fn primary_success_reports_metrics_and_deletes_input() {
        let (_dir, ws) = scratch();
        let input = write_input(&ws, 1000);
        let runner = FakeRunner::new(vec![Script::Write(250)]);
        let opts = CompressOptions::new(resolve_quality(10).unwrap());

        let outcome = compress_file(&runner, &ws, &input, &opts).await.unwrap();

        assert_eq!(runner.calls(), 1);
        assert_eq!(outcome.original_size, 1000);
        assert_eq!(outcome.compressed_size, 250);
        assert!((outcome.reduction_pct - 75.0).abs() < 1e-9);
        assert_eq!(outcome.preset_name, "screen");
        assert!(!outcome.below_threshold);
        assert!(!input.exists());
        assert!(outcome.output_path.exists());
        // Only the winning artifact remains.
        assert_eq!(remaining_files(&ws), vec![outcome.output_path.clone()]);
    }

    #[tokio::test]
    async fn failed_primary_falls_back_to_aggressive_profile() {
        let (_dir, ws) = scratch();
        let input = write_input(&ws, 1000);
        let runner = FakeRunner::new(vec![Script::Fail("primary blew up"), Script::Write(400)]);
        let opts = CompressOptions::new(resolve_quality(90).unwrap());

        let outcome = compress_file(&runner, &ws, &input, &opts).await.unwrap();

        assert_eq!(runner.calls(), 2);
        assert_eq!(outcome.compressed_size, 400);
        assert_eq!(outcome.preset_name, "screen");
        assert!(!input.exists());
    }

    #[tokio::test]
    async fn timeout_counts_as_a_failed_attempt() {
        let (_dir, ws) = scratch();
        let input = write_input(&ws, 1000);
        let runner = FakeRunner::new(vec![Script::TimeOut, Script::Write(500)]);
        let opts = CompressOptions::new(resolve_level(1).unwrap());

        let outcome = compress_file(&runner, &ws, &input, &opts).await.unwrap();
        assert_eq!(runner.calls(), 2);
        assert_eq!(outcome.compressed_size, 500);
    }

    #[tokio::test]
    async fn oversized_output_triggers_escalation_for_low_tiers() {
        let (_dir, ws) = scratch();
        let input = write_input(&ws, 1000);
        // Primary "succeeds" but grows the file; escalation shrinks it.
        let runner = FakeRunner::new(vec![Script::Write(1500), Script::Write(600)]);
        let opts = CompressOptions::new(resolve_level(0).unwrap());

        let outcome = compress_file(&runner, &ws, &input, &opts).await.unwrap();

        assert_eq!(runner.calls(), 2);
        assert_eq!(outcome.compressed_size, 600);
        assert!((outcome.reduction_pct - 40.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn escalation_never_replaces_with_a_larger_output() {
        let (_dir, ws) = scratch();
        let input = write_input(&ws, 1000);
        let runner = FakeRunner::new(vec![Script::Write(1500), Script::Write(2000)]);
        let opts = CompressOptions::new(resolve_level(1).unwrap());

        let outcome = compress_file(&runner, &ws, &input, &opts).await.unwrap();

        assert_eq!(runner.calls(), 2);
        // The worse-but-usable primary result is kept; reduction clamps to 0.
        assert_eq!(outcome.compressed_size, 1500);
        assert_eq!(outcome.reduction_pct, 0.0);
        assert!(outcome.below_threshold);
    }

    #[tokio::test]
    async fn high_tiers_do_not_escalate() {
        let (_dir, ws) = scratch();
        let input = write_input(&ws, 1000);
        let runner = FakeRunner::new(vec![Script::Write(1500)]);
        let opts = CompressOptions::new(resolve_quality(80).unwrap());

        let outcome = compress_file(&runner, &ws, &input, &opts).await.unwrap();

        assert_eq!(runner.calls(), 1);
        assert_eq!(outcome.compressed_size, 1500);
        assert_eq!(outcome.reduction_pct, 0.0);
    }

    #[tokio::test]
    async fn escalation_failure_keeps_the_previous_best() {
        let (_dir, ws) = scratch();
        let input = write_input(&ws, 1000);
        let runner = FakeRunner::new(vec![Script::Write(1200), Script::Fail("escalation died")]);
        let opts = CompressOptions::new(resolve_level(0).unwrap());

        let outcome = compress_file(&runner, &ws, &input, &opts).await.unwrap();
        assert_eq!(outcome.compressed_size, 1200);
    }

    #[tokio::test]
    async fn exhausted_attempts_surface_the_last_diagnostic() {
        let (_dir, ws) = scratch();
        let input = write_input(&ws, 1000);
        let runner = FakeRunner::new(vec![Script::Fail("first"), Script::Fail("second")]);
        let opts = CompressOptions::new(resolve_quality(50).unwrap());

        let err = compress_file(&runner, &ws, &input, &opts).await.unwrap_err();
        match err {
            PdfPressError::Compression(msg) => assert!(msg.contains("second")),
            other => panic!("expected Compression, got {:?}", other),
        }
        assert!(!input.exists());
        assert!(remaining_files(&ws).is_empty());
    }

    #[tokio::test]
    async fn unavailable_tool_aborts_and_deletes_input() {
        let (_dir, ws) = scratch();
        let input = write_input(&ws, 1000);
        let runner = FakeRunner::unavailable();
        let opts = CompressOptions::new(resolve_quality(50).unwrap());

        let err = compress_file(&runner, &ws, &input, &opts).await.unwrap_err();
        assert!(matches!(err, PdfPressError::ToolUnavailable(_)));
        assert_eq!(runner.calls(), 0);
        assert!(!input.exists());
    }

    #[test]
    fn reduction_is_clamped_and_defined_for_empty_inputs() {
        assert_eq!(reduction_percentage(0, 100), 0.0);
        assert_eq!(reduction_percentage(100, 150), 0.0);
        assert_eq!(reduction_percentage(100, 100), 0.0);
        assert!((reduction_percentage(100, 25) - 75.0).abs() < 1e-9);
        assert!((reduction_percentage(200, 0) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn tool_args_reflect_the_profile() {
        let profile = AttemptProfile::primary(&resolve_quality(10).unwrap());
        let args = tool_args(&profile, Path::new("/tmp/in.pdf"), Path::new("/tmp/out.pdf"));
        assert!(args.contains(&"-dPDFSETTINGS=/screen".to_string()));
        assert!(args.contains(&"-dColorImageResolution=72".to_string()));
        assert!(args.contains(&"-dJPEGQ=50".to_string()));
        assert!(args.contains(&"-dEmbedAllFonts=true".to_string()));
        assert!(!args.iter().any(|a| a.contains("ColorConversionStrategy")));
        assert_eq!(args.last().unwrap(), "/tmp/in.pdf");

        let escalation = AttemptProfile::escalation();
        let args = tool_args(&escalation, Path::new("/tmp/in.pdf"), Path::new("/tmp/out.pdf"));
        assert!(args.contains(&"-dEmbedAllFonts=false".to_string()));
        assert!(args.contains(&"-sColorConversionStrategy=Gray".to_string()));
        assert!(args.contains(&"-dColorImageResolution=50".to_string()));
    }

    #[test]
    fn downsampling_off_omits_resolution_flags() {
        let profile = AttemptProfile::primary(&resolve_level(3).unwrap());
        let args = tool_args(&profile, Path::new("/tmp/in.pdf"), Path::new("/tmp/out.pdf"));
        assert!(args.contains(&"-dDownsampleColorImages=false".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("-dColorImageResolution")));
    }
}
