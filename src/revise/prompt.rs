use anyhow::{anyhow, Result};

use crate::utils::{language_name, languages_match};

/// System prompt for the revision model
pub const SYSTEM_PROMPT: &str =
    "You are a highly skilled technical editor and translator with extensive knowledge of IT and product development.";

/// Build the per-segment prompt.
///
/// One remote call both revises the speech-to-text output and translates it
/// into the target language; when source and target languages already match,
/// the prompt asks for revision only.
pub fn build_revision_prompt(
    segment_text: &str,
    source_language: Option<&str>,
    target_language: &str,
) -> String {
    let translate = match source_language {
        Some(source) => !languages_match(source, target_language),
        // Unknown source language: ask for the target language regardless
        None => true,
    };

    let task_instructions = if translate {
        let source_name = source_language
            .map(language_name)
            .unwrap_or_else(|| "the original language".to_string());
        format!(
            "- Your task is to revise the provided speech-to-text transcript segment and translate it from {} to {}.\n\
             - Remember that the target audience consists of technical people familiar with original-language terminology in their field. Retain people names, company names, product names, event names, and other domain-specific proper nouns untranslated for readability.",
            source_name,
            language_name(target_language)
        )
    } else {
        format!(
            "- Your task is to revise the provided speech-to-text transcript segment. Keep the text in {}; do not translate it.",
            language_name(target_language)
        )
    };

    format!(
        "I'm going to provide one segment of a presentation transcript in the <transcript> tag.\n\
Please read it carefully and follow ALL the instructions in the <instructions></instructions> tag.\n\
\n\
<transcript>\n\
{segment_text}\n\
</transcript>\n\
\n\
<instructions>\n\
{task_instructions}\n\
- The transcript may contain speech-to-text errors such as mistranscribed words; correct them from context.\n\
- While it is acceptable to rephrase individual phrases for clarity, you MUST NOT omit entire phrases or change the order of sentences.\n\
- You MUST NOT summarize or abbreviate the transcript, and you MUST NOT use bullet points, numbered lists, or other structural formatting in your output.\n\
- Remove filler words (such as \"um,\" \"uh,\" \"like\") and repetitive expressions to improve clarity.\n\
- Remove all content within square brackets [ ] from the transcript, such as audio descriptions (e.g. [music]) and speaker labels.\n\
- Keep the original speaker's perspective; do not switch to third-person references like \"the presenter says\".\n\
- Output only the revised text within a <result> tag. You MUST NOT output any other text outside of this tag.\n\
</instructions>"
    )
}

/// Extract the revised text from the model's `<result>` tag
pub fn extract_result(response: &str) -> Result<String> {
    let start = response
        .find("<result>")
        .ok_or_else(|| anyhow!("Model response is missing the <result> tag"))?
        + "<result>".len();
    let end = response[start..]
        .find("</result>")
        .map(|pos| pos + start)
        .ok_or_else(|| anyhow!("Model response is missing the closing </result> tag"))?;

    Ok(response[start..end].trim().to_string())
}
