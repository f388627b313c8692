use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{ArgGroup, Parser, Subcommand};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

use toolbench::config::{TargetPreset, ToolbenchConfig, parse_byte_size};
use toolbench::pipeline::{ExecutionResult, PipelineRunner, run_batch};
use toolbench::processing::{CompressionRequest, DensityPatch, ImageCodec, OutputFormat};
use toolbench::tools::registry::{COMPRESS_IMAGE, IMAGE_DPI_CHANGER, IMAGE_DPI_CHECKER, TRANSCODE_MEDIA};
use toolbench::tools::{
    CompressOptions, DensityRequest, ToolKind, ToolRegistry, ToolRequest, ToolResponse,
    TranscodeOptions, TranscodeRequest,
};
use toolbench::transcode::{FfmpegTranscoder, TranscodeInput};

/// Small file tools that run through one validate → process → verify pipeline:
/// - compress images to a byte budget
/// - read or set the DPI stored in JPEG and PNG files
/// - transcode audio/video through ffmpeg
#[derive(Parser, Debug)]
#[command(name = "toolbench")]
#[command(about = "🧰 Compress images to a size, change DPI, transcode media")]
#[command(long_about = "Compress images to an exact byte budget, read or rewrite the DPI stored in \
JPEG and PNG headers without re-encoding, and hand audio/video jobs to ffmpeg.
Set RUST_LOG=debug to watch every search probe.")]
struct Args {
    /// JSON configuration file
    #[arg(long, global = true, help = "Load settings from a JSON file (missing keys use defaults)")]
    config: Option<PathBuf>,

    /// Emit a JSON outcome
    #[arg(long, global = true, help = "Print the outcome as JSON instead of text")]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compress an image to fit a byte budget
    #[command(group(ArgGroup::new("budget").required(true).args(["target", "preset"])))]
    Compress {
        /// Source images (JPEG, PNG or WebP); several run as one batch
        #[arg(required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,

        #[arg(short, long, help = "Output path for a single input (default: <name>.compressed.<ext>)")]
        output: Option<PathBuf>,

        #[arg(short, long, value_parser = parse_byte_size,
              help = "Byte budget: 51200, 50kb, 1.5mb")]
        target: Option<u64>,

        #[arg(short, long, value_enum, help = "Preset budget")]
        preset: Option<TargetPreset>,

        #[arg(short, long, value_enum, help = "Output format (default: same as input)")]
        format: Option<OutputFormat>,

        #[arg(long, help = "Never reduce resolution, only quality")]
        no_resize: bool,

        #[arg(long, help = "Write the smallest achievable file when the budget cannot be met")]
        accept_infeasible: bool,
    },

    /// Read or set the DPI stored in a JPEG or PNG
    Density {
        /// Source image
        input: PathBuf,

        #[arg(short, long, help = "Output path (default: <name>.<dpi>dpi.<ext>)")]
        output: Option<PathBuf>,

        #[arg(short, long, help = "New DPI; omit to only read the current value")]
        dpi: Option<u32>,
    },

    /// Run ffmpeg with the given arguments in a private working directory
    Transcode {
        #[arg(short, long = "input", required = true, help = "Input file; repeat for several")]
        inputs: Vec<PathBuf>,

        #[arg(long, help = "File name ffmpeg writes inside its working directory")]
        output_name: String,

        #[arg(short, long, help = "Where to save the result (default: ./<output-name>)")]
        output: Option<PathBuf>,

        #[arg(long, default_value = "ffmpeg", help = "Transcoder binary")]
        ffmpeg: PathBuf,

        /// Arguments passed to ffmpeg verbatim, after `--`
        #[arg(last = true, required = true)]
        args: Vec<String>,
    },

    /// List the registered tools
    Tools,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ToolbenchConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ToolbenchConfig::default(),
    };

    let ffmpeg = match &args.command {
        Command::Transcode { ffmpeg, .. } => ffmpeg.clone(),
        _ => PathBuf::from("ffmpeg"),
    };
    let registry = ToolRegistry::standard(
        &config,
        Arc::new(ImageCodec::new()),
        Arc::new(FfmpegTranscoder::new(ffmpeg)),
    )?;
    let runner = PipelineRunner::new();

    let (tool, request, output) = match args.command {
        Command::Tools => {
            print_tools(&registry, args.json);
            return Ok(ExitCode::SUCCESS);
        }
        Command::Compress {
            inputs,
            output,
            target,
            preset,
            format,
            no_resize,
            accept_infeasible,
        } => {
            if inputs.len() > 1 && output.is_some() {
                bail!("--output takes a single input; batch results are saved next to each source");
            }
            let (tool, target_bytes) = match preset {
                Some(preset) => (preset.tool_id(), preset.bytes()),
                None => (COMPRESS_IMAGE, target.unwrap_or_default()),
            };
            let mut jobs = Vec::with_capacity(inputs.len());
            for input in inputs {
                let mut request = CompressionRequest::new(read_input(&input)?, target_bytes);
                request.format = format;
                request.allow_resizing = !no_resize;
                let ext = request.resolved_format().extension();
                let path = sibling(&input, "compressed", ext);
                jobs.push((path, request));
            }
            let options = CompressOptions {
                cancel: None,
                accept_infeasible,
            };

            if jobs.len() > 1 {
                let concurrency = config.batch_concurrency;
                return compress_batch(&registry, &runner, tool, jobs, options, concurrency, args.json)
                    .await;
            }
            let Some((path, request)) = jobs.pop() else {
                bail!("no input given");
            };
            let output = output.unwrap_or(path);
            (tool, ToolRequest::Compress { request, options }, Some(output))
        }
        Command::Density { input, output, dpi } => {
            let bytes = read_input(&input)?;
            match dpi {
                Some(dpi) => {
                    let ext = input.extension().and_then(|e| e.to_str()).unwrap_or("img").to_string();
                    let output = output.unwrap_or_else(|| sibling(&input, &format!("{}dpi", dpi), &ext));
                    let request = DensityRequest::new(bytes, DensityPatch::dpi(dpi));
                    (IMAGE_DPI_CHANGER, ToolRequest::Density(request), Some(output))
                }
                None => (IMAGE_DPI_CHECKER, ToolRequest::DensityProbe(bytes), None),
            }
        }
        Command::Transcode {
            inputs,
            output_name,
            output,
            args: argv,
            ..
        } => {
            let mut files = Vec::with_capacity(inputs.len());
            for path in &inputs {
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .with_context(|| format!("input path has no file name: {}", path.display()))?;
                files.push(TranscodeInput::new(name, read_input(path)?));
            }
            let output = output.unwrap_or_else(|| PathBuf::from(&output_name));
            let quiet = args.json;
            let options = TranscodeOptions {
                on_progress: Some(Arc::new(move |pct: f32| {
                    if !quiet {
                        eprint!("\rprogress: {:>3.0}%", pct);
                    }
                })),
            };
            let request = TranscodeRequest {
                inputs: files,
                argv,
                output_name,
            };
            (TRANSCODE_MEDIA, ToolRequest::Transcode { request, options }, Some(output))
        }
    };

    let result = registry.dispatch(&runner, tool, request).await;
    if tool == TRANSCODE_MEDIA && !args.json {
        eprintln!();
    }

    let written = match (result.data().and_then(ToolResponse::output_bytes), &output) {
        (Some(bytes), Some(path)) => {
            std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))?;
            Some(path.as_path())
        }
        _ => None,
    };

    report(tool, &result, written, args.json)?;
    Ok(if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Compress several files with at most `concurrency` in flight, saving each
/// result next to its source.
async fn compress_batch(
    registry: &ToolRegistry,
    runner: &PipelineRunner,
    tool_id: &str,
    jobs: Vec<(PathBuf, CompressionRequest)>,
    options: CompressOptions,
    concurrency: usize,
    as_json: bool,
) -> Result<ExitCode> {
    let Some(ToolKind::Compress(tool)) = registry.get(tool_id) else {
        bail!("{} is not a compression tool", tool_id);
    };
    let (paths, requests): (Vec<PathBuf>, Vec<CompressionRequest>) = jobs.into_iter().unzip();
    let (results, summary) = run_batch(runner, tool, requests, options, concurrency).await;

    for (path, result) in paths.iter().zip(results) {
        let result = result.map(ToolResponse::Compressed);
        let written = match result.data().and_then(ToolResponse::output_bytes) {
            Some(bytes) => {
                std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))?;
                Some(path.as_path())
            }
            None => None,
        };
        report(tool_id, &result, written, as_json)?;
    }

    if as_json {
        println!(
            "{}",
            json!({
                "batch": {
                    "total": summary.total,
                    "succeeded": summary.succeeded,
                    "failed": summary.failed,
                    "infeasible": summary.infeasible,
                    "total_ms": summary.total_ms,
                }
            })
        );
    } else {
        println!(
            "📦 {} of {} compressed ({} over budget) in {:.1} ms",
            summary.succeeded, summary.total, summary.infeasible, summary.total_ms
        );
    }
    Ok(if summary.failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

/// `dir/photo.jpg` + `compressed` + `jpg` → `dir/photo.compressed.jpg`
fn sibling(input: &Path, tag: &str, ext: &str) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
    input.with_file_name(format!("{}.{}.{}", stem, tag, ext))
}

fn print_tools(registry: &ToolRegistry, as_json: bool) {
    let described = registry.describe();
    if as_json {
        let tools: Vec<Value> = described
            .iter()
            .map(|(id, text)| json!({ "id": id, "description": text }))
            .collect();
        println!("{}", json!({ "tools": tools }));
        return;
    }
    for (id, text) in described {
        println!("{:<26} {}", id, text);
    }
}

fn report(
    tool: &str,
    result: &ExecutionResult<ToolResponse>,
    written: Option<&Path>,
    as_json: bool,
) -> Result<()> {
    if as_json {
        let mut outcome = json!({
            "tool": tool,
            "success": result.is_success(),
            "timing_ms": result.timing_ms,
        });
        if let Some(explanation) = result.explanation() {
            outcome["explanation"] = json!(explanation);
        }
        if let Some(data) = result.data() {
            outcome["data"] = response_json(data)?;
        }
        if let Some(error) = result.error() {
            outcome["error"] = json!(error.to_string());
            outcome["kind"] = json!(error.kind().as_str());
            outcome["stage"] = json!(result.stage());
            outcome["failed_at"] = json!(result.failed_at().map(|s| s.as_str()));
        }
        if let Some(path) = written {
            outcome["output"] = json!(path.display().to_string());
        }
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match (result.explanation(), result.failure_message()) {
        (Some(explanation), _) => {
            println!("✅ {}", explanation);
            if let Some(path) = written {
                println!("   Saved {}", path.display());
            }
        }
        (None, Some(message)) => {
            println!("❌ {}", message);
            if let Some(hint) = result
                .error()
                .and_then(|e| e.context().recovery_suggestion.as_deref())
            {
                println!("   {}", hint);
            }
        }
        (None, None) => {}
    }
    println!("   ({:.1} ms)", result.timing_ms);
    Ok(())
}

fn response_json(response: &ToolResponse) -> Result<Value> {
    Ok(match response {
        ToolResponse::Compressed(r) => json!({
            "bytes": r.len(),
            "target_bytes": r.target_bytes,
            "format": r.format,
            "quality": r.quality_used,
            "width": r.width,
            "height": r.height,
            "scale": r.scale,
            "probes": r.probes,
            "infeasible": r.infeasible,
        }),
        ToolResponse::DensitySet(r) => json!({
            "container": r.container,
            "applied": r.applied,
            "original": r.original_density,
            "requested": r.requested,
            "bytes": r.patched_bytes.len(),
        }),
        ToolResponse::DensityRead(r) => serde_json::to_value(r)?,
        ToolResponse::Transcoded(r) => json!({
            "name": r.name,
            "bytes": r.bytes.len(),
            "inputs": r.input_count,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_compress_preset() {
        let args = Args::try_parse_from(["toolbench", "compress", "a.jpg", "--preset", "kb50"]).unwrap();
        match args.command {
            Command::Compress { preset, target, .. } => {
                assert_eq!(preset, Some(TargetPreset::Kb50));
                assert_eq!(target, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_requires_a_budget() {
        assert!(Args::try_parse_from(["toolbench", "compress", "a.jpg"]).is_err());
        assert!(Args::try_parse_from(["toolbench", "compress", "a.jpg", "-t", "0kb"]).is_err());
    }

    #[test]
    fn test_cli_transcode_passes_trailing_args() {
        let args = Args::try_parse_from([
            "toolbench", "--json", "transcode", "-i", "in.wav", "--output-name", "out.mp3", "--",
            "-i", "in.wav", "out.mp3",
        ])
        .unwrap();
        assert!(args.json);
        match args.command {
            Command::Transcode { args, inputs, .. } => {
                assert_eq!(args, vec!["-i", "in.wav", "out.mp3"]);
                assert_eq!(inputs, vec![PathBuf::from("in.wav")]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_compress_accepts_several_inputs() {
        let args =
            Args::try_parse_from(["toolbench", "compress", "a.jpg", "b.png", "-t", "20kb"]).unwrap();
        match args.command {
            Command::Compress { inputs, target, .. } => {
                assert_eq!(inputs.len(), 2);
                assert_eq!(target, Some(20 * 1024));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_sibling_path() {
        assert_eq!(
            sibling(Path::new("dir/photo.png"), "300dpi", "png"),
            PathBuf::from("dir/photo.300dpi.png")
        );
    }
}
