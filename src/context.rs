//! Context block assembly.
//!
//! Turns a ranked passage list into the single text block handed to the
//! completion service. Pure and deterministic: identical input always
//! produces byte-identical output, which keeps prompts reproducible.

use crate::models::RankedPassage;

/// Concatenate passage contents in the order given (the search's
/// similarity order), each prefixed with its page number so the model can
/// cite pages, with a separator between passages.
///
/// An empty input yields an empty block, a valid state meaning "no
/// relevant context found"; generation still proceeds and the model may
/// answer from general knowledge or say the topic is uncovered.
pub fn assemble_context(passages: &[RankedPassage]) -> String {
    let mut block = String::new();

    for (i, ranked) in passages.iter().enumerate() {
        block.push_str(&format!(
            "[Page {}]\n{}\n\n",
            ranked.passage.page_number, ranked.passage.content
        ));
        if i < passages.len() - 1 {
            block.push_str("---\n\n");
        }
    }

    block
}
