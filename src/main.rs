use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use videodoc::cli::{Cli, Commands};
use videodoc::config::Config;
use videodoc::pipeline::{DocumentPipeline, SourceVideo};
use videodoc::{render, utils};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose {
        "videodoc=debug"
    } else {
        "videodoc=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Check for required external dependencies (non-fatal in Docker)
    let missing_deps = utils::check_dependencies().await;
    if !missing_deps.is_empty() && !cli.quiet {
        eprintln!("⚠️  Dependency check warnings:");
        for dep in missing_deps {
            eprintln!("   • {}", dep);
        }
        eprintln!("   (Continuing anyway - tools may be available)");
    }

    match cli.command {
        Commands::Generate {
            video,
            target_language,
            title,
            output,
            format,
            language,
            keep_audio,
        } => {
            utils::check_file_accessible(&video)?;

            let mut config = Config::load().await?;
            if keep_audio {
                config.app.keep_audio = true;
            }

            let title = title.unwrap_or_else(|| {
                video
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| "Untitled".to_string())
            });

            let source = SourceVideo {
                path: video,
                title,
                target_language,
                language_hint: language,
            };

            let pipeline = DocumentPipeline::new(config).await?;

            tracing::info!("Starting processing for video: {}", source.path.display());

            let document = pipeline.run(&source).await?;

            // Handle output
            match output {
                Some(path) => {
                    render::save_to_file(&document, &path, &format).await?;
                    println!("Document saved to: {}", path.display());
                }
                None if matches!(format, videodoc::OutputFormat::Pdf) => {
                    // PDF is file-only; derive a path from the title
                    let path = PathBuf::from(format!(
                        "{}.{}",
                        utils::sanitize_filename(&document.metadata.title),
                        format.extension()
                    ));
                    render::save_to_file(&document, &path, &format).await?;
                    println!("Document saved to: {}", path.display());
                }
                None => {
                    render::print_to_console(&document, &format)?;
                }
            }

            if document.failed_segment_count() > 0 {
                println!(
                    "⚠️  {} segment(s) could not be revised and are marked in the document",
                    document.failed_segment_count()
                );
            }
        }
        Commands::Config { show } => {
            let config = Config::load().await?;
            if show {
                config.display();
            } else {
                println!("Edit the config file manually:");
                println!("  config.yaml in the working directory, or the platform config dir");
            }
        }
        Commands::Languages => {
            println!("Supported target languages:");
            println!("  • en (English)");
            println!("  • es (Spanish)");
            println!("  • fr (French)");
            println!("  • de (German)");
            println!("  • it (Italian)");
            println!("  • pt (Portuguese)");
            println!("  • ja (Japanese)");
            println!("  • ko (Korean)");
            println!("  • zh (Chinese)");
            println!("  • ar (Arabic)");
            println!("  • hi (Hindi)");
            println!("  • ru (Russian)");
        }
    }

    Ok(())
}
