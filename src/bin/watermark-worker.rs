use std::path::PathBuf;
use std::process;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use watermark_inpaint::{
    JobConfig, JobOutput, MaskFit, MuxOutcome, OnMaskFailure, ProcessOptions, Reporter,
    ToolPaths, WatermarkRemover, DEFAULT_RADIUS,
};

#[derive(Parser)]
#[command(
    name = "watermark-worker",
    about = "Remove a static watermark from an image or video via mask-guided inpainting",
    version,
    after_help = "Progress is streamed on stdout as PROGRESS:<0-100> and STAGE:<text> lines.\n\
                  Exit code 0 on success, 1 on any validation or processing failure."
)]
struct Cli {
    /// Watermark template image (alpha or bright pixels mark the watermark)
    template: String,

    /// Legacy applied-mask slot (ignored, may be empty)
    applied_mask: String,

    /// Image or video to process
    media: String,

    /// Legacy steps count (ignored, may be empty)
    steps: String,

    /// Legacy watermark colour as #rrggbb (used with --color-mask)
    color: Option<String>,

    /// Legacy colour tolerance (used with --color-mask)
    tolerance: Option<String>,

    /// Inpainting neighbourhood radius in pixels
    #[arg(long, default_value_t = DEFAULT_RADIUS)]
    radius: u32,

    /// What to write when a video frame cannot be inpainted
    #[arg(long, value_enum, default_value_t = FailurePolicy::Passthrough)]
    on_mask_failure: FailurePolicy,

    /// How a mask of the wrong size is reconciled with the frame
    #[arg(long, value_enum, default_value_t = FitPolicy::Resize)]
    mask_fit: FitPolicy,

    /// Derive the mask from COLOR and TOLERANCE instead of TEMPLATE
    #[arg(long)]
    color_mask: bool,

    /// Four-character code of the output video stream
    #[arg(long, default_value = "mp4v")]
    codec_tag: String,

    /// ffmpeg binary used to decode and encode frames
    #[arg(long, env = "WATERMARK_FFMPEG", default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// ffprobe binary used to read stream metadata
    #[arg(long, env = "WATERMARK_FFPROBE", default_value = "ffprobe")]
    ffprobe: PathBuf,

    /// Multiplexer used to restore the audio track
    #[arg(long, env = "WATERMARK_MUXER", default_value = "ffmpeg")]
    muxer: PathBuf,

    /// Increase log verbosity on stderr (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum FailurePolicy {
    Skip,
    Passthrough,
}

#[derive(Clone, Copy, ValueEnum)]
enum FitPolicy {
    Resize,
    Reject,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            process::exit(1);
        }
        Err(e) => e.exit(),
    };

    init_tracing(cli.verbose);

    let mut reporter = Reporter::stdout();
    let job = JobConfig {
        use_color_mask: cli.color_mask,
        ..JobConfig::from_slots(
            &cli.template,
            &cli.applied_mask,
            &cli.media,
            &cli.steps,
            cli.color.as_deref(),
            cli.tolerance.as_deref(),
        )
    };

    let _ = reporter.message("Worker process started.");
    let _ = reporter.message(format!("Watermark template path: {}", cli.template));
    let _ = reporter.message(format!(
        "Watermark mask (image to be applied) path (ignored): {}",
        cli.applied_mask
    ));
    let _ = reporter.message(format!("Media to be edited path: {}", cli.media));
    let _ = reporter.message(format!("Processing steps: {}", cli.steps));

    let options = ProcessOptions {
        radius: cli.radius,
        on_mask_failure: match cli.on_mask_failure {
            FailurePolicy::Skip => OnMaskFailure::SkipFrame,
            FailurePolicy::Passthrough => OnMaskFailure::PassthroughOriginal,
        },
        mask_fit: match cli.mask_fit {
            FitPolicy::Resize => MaskFit::Resize,
            FitPolicy::Reject => MaskFit::Reject,
        },
        codec_tag: cli.codec_tag,
        tools: ToolPaths {
            ffmpeg: cli.ffmpeg,
            ffprobe: cli.ffprobe,
            muxer: cli.muxer,
        },
    };

    match WatermarkRemover::new(options).run(&job, &mut reporter) {
        Ok(output) => {
            if let JobOutput::Video {
                audio: MuxOutcome::SilentFallback { .. },
                ..
            } = &output
            {
                tracing::warn!("output has no audio track");
            }
            let _ = reporter.stage("Done");
            let _ = reporter.message("Worker process finished successfully.");
        }
        Err(e) => {
            tracing::error!(error = %e, "job failed");
            let _ = reporter.message(format!("Error: {e}"));
            process::exit(1);
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        })
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
