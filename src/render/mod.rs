use anyhow::Result;
use std::path::Path;
use tokio::process::Command;

use crate::assemble::Document;
use crate::cli::OutputFormat;
use crate::PipelineError;

/// Serialize the document to a file in the selected format.
///
/// PDF output delegates page layout to the external rendering engine;
/// rendering failures surface as [`PipelineError::Render`] and are never
/// retried.
pub async fn save_to_file(document: &Document, path: &Path, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Markdown => write_text(path, &format_as_markdown(document))?,
        OutputFormat::Html => write_text(path, &format_as_html(document))?,
        OutputFormat::Json => write_text(path, &format_as_json(document)?)?,
        OutputFormat::Pdf => render_pdf(document, path).await?,
    }

    Ok(())
}

/// Print the document to the console (PDF is file-only)
pub fn print_to_console(document: &Document, format: &OutputFormat) -> Result<()> {
    let content = match format {
        OutputFormat::Markdown => format_as_markdown(document),
        OutputFormat::Html => format_as_html(document),
        OutputFormat::Json => format_as_json(document)?,
        OutputFormat::Pdf => {
            return Err(PipelineError::Render(
                "PDF output requires an output file path".to_string(),
            )
            .into())
        }
    };

    println!("{}", content);
    Ok(())
}

fn write_text(path: &Path, content: &str) -> Result<()> {
    fs_err::write(path, content).map_err(|e| PipelineError::Render(e.to_string()))?;
    Ok(())
}

/// Render the document as Markdown
pub fn format_as_markdown(document: &Document) -> String {
    let mut out = String::new();

    out.push_str(&format!("# {}\n\n", document.metadata.title));
    out.push_str(&format!(
        "*Generated from `{}` on {} · target language: {}*\n\n",
        document.metadata.source,
        document.metadata.generated_at.format("%Y-%m-%d"),
        document.metadata.target_language
    ));

    for paragraph in &document.body {
        out.push_str(paragraph);
        out.push_str("\n\n");
    }

    out
}

/// Render the document as a standalone HTML page.
///
/// The stylesheet carries `@page` and page-break rules; actual pagination is
/// the layout engine's job.
pub fn format_as_html(document: &Document) -> String {
    let mut out = String::new();

    out.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    out.push_str(&format!("<title>{}</title>\n", escape_html(&document.metadata.title)));
    out.push_str(
        "<style>\n\
         @page { size: A4; margin: 2.5cm; }\n\
         body { font-family: serif; line-height: 1.6; max-width: 42em; margin: 0 auto; }\n\
         h1 { page-break-after: avoid; }\n\
         p { page-break-inside: avoid; text-align: justify; }\n\
         .meta { color: #666; font-size: 0.9em; }\n\
         </style>\n</head>\n<body>\n",
    );

    out.push_str(&format!("<h1>{}</h1>\n", escape_html(&document.metadata.title)));
    out.push_str(&format!(
        "<p class=\"meta\">Generated from {} on {} · target language: {}</p>\n",
        escape_html(&document.metadata.source),
        document.metadata.generated_at.format("%Y-%m-%d"),
        escape_html(&document.metadata.target_language)
    ));

    for paragraph in &document.body {
        out.push_str(&format!("<p>{}</p>\n", escape_html(paragraph)));
    }

    out.push_str("</body>\n</html>\n");
    out
}

/// Render the full document model as JSON, timestamps included
pub fn format_as_json(document: &Document) -> Result<String> {
    let json = serde_json::to_string_pretty(document)
        .map_err(|e| PipelineError::Render(e.to_string()))?;
    Ok(json)
}

/// Produce a paginated PDF by handing the HTML serialization to the external
/// layout engine.
async fn render_pdf(document: &Document, path: &Path) -> Result<()> {
    let html = format_as_html(document);

    let html_file = tempfile::Builder::new()
        .suffix(".html")
        .tempfile()
        .map_err(|e| PipelineError::Render(e.to_string()))?;
    fs_err::write(html_file.path(), html).map_err(|e| PipelineError::Render(e.to_string()))?;

    tracing::info!("Rendering PDF to {}", path.display());

    let output = Command::new("wkhtmltopdf")
        .args([
            "--quiet",
            "--enable-local-file-access",
            &html_file.path().to_string_lossy(),
            &path.to_string_lossy(),
        ])
        .output()
        .await
        .map_err(|e| PipelineError::Render(format!("Failed to run wkhtmltopdf: {}", e)))?;

    if !output.status.success() {
        let error = String::from_utf8_lossy(&output.stderr);
        return Err(PipelineError::Render(format!("wkhtmltopdf failed: {}", error)).into());
    }

    Ok(())
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::{DocumentAssembler, DocumentMetadata};
    use crate::revise::{RevisedSegment, RevisionStatus};
    use chrono::TimeZone;

    fn sample_document() -> Document {
        let metadata = DocumentMetadata {
            title: "Launch <Plan>".to_string(),
            source: "talk.mp4".to_string(),
            source_language: Some("en-US".to_string()),
            target_language: "fr".to_string(),
            generated_at: chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        };

        let revised = vec![
            RevisedSegment {
                index: 0,
                start_time: 0.0,
                end_time: 2.0,
                source_text: "Hello team.".to_string(),
                text: "Bonjour l'équipe.".to_string(),
                status: RevisionStatus::Ok,
            },
            RevisedSegment {
                index: 1,
                start_time: 2.0,
                end_time: 4.0,
                source_text: "Let's begin.".to_string(),
                text: String::new(),
                status: RevisionStatus::Failed {
                    error: "rejected".to_string(),
                },
            },
        ];

        DocumentAssembler::assemble(metadata, revised).unwrap()
    }

    #[test]
    fn test_markdown_contains_title_body_and_marker() {
        let markdown = format_as_markdown(&sample_document());
        assert!(markdown.starts_with("# Launch <Plan>\n"));
        assert!(markdown.contains("Bonjour l'équipe."));
        assert!(markdown.contains(crate::assemble::UNAVAILABLE_MARKER));
    }

    #[test]
    fn test_html_escapes_content() {
        let html = format_as_html(&sample_document());
        assert!(html.contains("<h1>Launch &lt;Plan&gt;</h1>"));
        assert!(html.contains("<p>Bonjour l'équipe.</p>"));
    }

    #[test]
    fn test_json_round_trips_the_document_model() {
        let document = sample_document();
        let json = format_as_json(&document).unwrap();
        let parsed: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, document);
        assert_eq!(parsed.segments[0].start_time, 0.0);
    }

    #[test]
    fn test_pdf_to_console_is_rejected() {
        let err = print_to_console(&sample_document(), &OutputFormat::Pdf).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Render(_))
        ));
    }
}
