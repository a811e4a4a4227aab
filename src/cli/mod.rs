use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "videodoc",
    about = "Videodoc - Turn recorded presentation videos into translated, readable documents",
    version,
    long_about = "A CLI tool that extracts the audio track from a presentation video, transcribes it with AWS Transcribe, revises and translates the transcript with a Bedrock model, and renders the result as a paginated document."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a translated document from a video file
    Generate {
        /// Path to the video file to process
        #[arg(value_name = "VIDEO")]
        video: PathBuf,

        /// Target language code for the document (e.g. fr, ja, en)
        #[arg(short, long, value_name = "LANG")]
        target_language: String,

        /// Document title (defaults to the video file name)
        #[arg(long, value_name = "TITLE")]
        title: Option<String>,

        /// Output file path (derived from the video name if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "pdf")]
        format: OutputFormat,

        /// Source language hint for transcription (auto-detect if not specified)
        #[arg(short, long, value_name = "LANG")]
        language: Option<String>,

        /// Keep the extracted audio file after the run
        #[arg(long)]
        keep_audio: bool,
    },

    /// Configure AWS credentials and settings
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// List supported target languages
    Languages,
}

#[derive(ValueEnum, Clone, Debug)]
pub enum OutputFormat {
    /// Paginated PDF via the external layout engine
    Pdf,
    /// Standalone HTML
    Html,
    /// Markdown
    Markdown,
    /// JSON document model with timestamps
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Pdf => write!(f, "pdf"),
            OutputFormat::Html => write!(f, "html"),
            OutputFormat::Markdown => write!(f, "markdown"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl OutputFormat {
    /// File extension for the format
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Pdf => "pdf",
            OutputFormat::Html => "html",
            OutputFormat::Markdown => "md",
            OutputFormat::Json => "json",
        }
    }
}
