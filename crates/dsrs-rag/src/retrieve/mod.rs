//! Passage retrieval.
//!
//! A [`Retriever`] is a plain dependency handed to the pipeline at
//! construction; there is no process-global retrieval configuration.

pub mod colbert;

pub use colbert::*;

use async_trait::async_trait;

use crate::core::RetrievalError;

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Returns up to `k` passages for `query`, most relevant first.
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>, RetrievalError>;
}

/// Drops repeated passages, keeping the first occurrence of each.
pub fn deduplicate(passages: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    passages
        .into_iter()
        .filter(|passage| seen.insert(passage.clone()))
        .collect()
}

/// Title of a `"Title | body"` passage, or the whole passage when it has none.
pub fn passage_title(passage: &str) -> &str {
    passage
        .split_once(" | ")
        .map(|(title, _)| title)
        .unwrap_or(passage)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deduplicate_keeps_first_occurrence() {
        let passages = vec!["b".to_string(), "a".to_string(), "b".to_string()];
        assert_eq!(deduplicate(passages), vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn passage_title_splits_on_separator() {
        assert_eq!(passage_title("Paris | Paris is the capital."), "Paris");
        assert_eq!(passage_title("no title here"), "no title here");
    }
}
