//! Context assembly and prompt rendering.

use std::collections::BTreeMap;

use handlebars::Handlebars;
use viincci_core::{AppError, AppResult};

use crate::types::RetrievedChunk;

/// System prompt for grounded answers.
pub const SYSTEM_PROMPT: &str = "You are a research assistant answering from a set of retrieved \
source excerpts.\n\n\
Instructions:\n\
- Answer only from the provided context.\n\
- Cite the sources you use as [Source N].\n\
- If the context does not contain the answer, say so plainly.\n\
- Do not invent facts, figures or references.";

const PROMPT_TEMPLATE: &str = "Use the context below to answer the question.\n\n\
Context:\n{{context}}\n\
Question: {{question}}\n\n\
Answer:";

/// Concatenate retrieved chunks into a context block of at most `max_chars`
/// characters, in rank order.
///
/// Each chunk is rendered as `[Source i: label]` followed by its text. The
/// first chunk is always included, truncated if it alone exceeds the bound.
/// Returns the context and the chunks that made it in.
pub fn build_context(
    retrieved: &[RetrievedChunk],
    max_chars: usize,
) -> (String, Vec<RetrievedChunk>) {
    let mut context = String::new();
    let mut used = 0;
    let mut included = Vec::new();

    for (i, item) in retrieved.iter().enumerate() {
        let block = format!(
            "[Source {}: {}]\n{}\n\n",
            i + 1,
            item.chunk.source_label(),
            item.chunk.text.trim()
        );
        let block_chars = block.chars().count();

        if used + block_chars > max_chars {
            if included.is_empty() {
                context.extend(block.chars().take(max_chars));
                included.push(item.clone());
            }
            break;
        }

        context.push_str(&block);
        used += block_chars;
        included.push(item.clone());
    }

    (context, included)
}

/// Render the user prompt for `question` over `context`.
pub fn render_prompt(question: &str, context: &str) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Prompts are plain text
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars
        .register_template_string("prompt", PROMPT_TEMPLATE)
        .map_err(|e| AppError::Generation(format!("Invalid prompt template: {}", e)))?;

    let mut data = BTreeMap::new();
    data.insert("question", question.trim());
    data.insert("context", context);

    handlebars
        .render("prompt", &data)
        .map_err(|e| AppError::Generation(format!("Failed to render prompt: {}", e)))
}
