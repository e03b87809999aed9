use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

use crate::core::MetricError;
use crate::data::{Example, HasAnswer, HasContext};
use crate::retrieve::passage_title;
use crate::trace::Trace;

static ARTICLES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(a|an|the)\b").expect("article pattern is valid"));

/// SQuAD-style answer normalization: NFD, lowercase, strip ASCII punctuation,
/// drop the articles a/an/the, collapse whitespace.
pub fn normalize_text(text: &str) -> String {
    let lowered: String = text.nfd().collect::<String>().to_lowercase();
    let without_punctuation: String = lowered
        .chars()
        .filter(|ch| !ch.is_ascii_punctuation())
        .collect();
    let without_articles = ARTICLES.replace_all(&without_punctuation, " ");
    without_articles.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalized prediction equals any normalized gold answer.
pub fn answer_exact_match<P: HasAnswer>(example: &Example, prediction: &P) -> bool {
    let predicted = normalize_text(prediction.answer());
    example
        .answers()
        .iter()
        .any(|gold| normalize_text(gold) == predicted)
}

/// Some gold answer occurs, on token boundaries, inside some retrieved passage.
pub fn answer_passage_match<P: HasContext>(example: &Example, prediction: &P) -> bool {
    let answers: Vec<Vec<String>> = example
        .answers()
        .iter()
        .map(|gold| tokens(&normalize_text(gold)))
        .filter(|gold| !gold.is_empty())
        .collect();

    prediction.context().iter().any(|passage| {
        let passage = tokens(&normalize_text(passage));
        answers
            .iter()
            .any(|gold| passage.windows(gold.len()).any(|window| window == gold.as_slice()))
    })
}

fn tokens(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

/// `(exact_match, passage_match)` for one prediction.
pub fn validate_context_and_answer<P: HasAnswer + HasContext>(
    example: &Example,
    prediction: &P,
    _trace: Option<&Trace>,
) -> (bool, bool) {
    (
        answer_exact_match(example, prediction),
        answer_passage_match(example, prediction),
    )
}

/// Every gold title appears among the titles of the retrieved passages.
///
/// Examples without a `gold_titles` list (the train split drops it) are an
/// error, not a vacuous pass.
pub fn gold_passages_retrieved<P: HasContext>(
    example: &Example,
    prediction: &P,
    _trace: Option<&Trace>,
) -> Result<bool, MetricError> {
    let titles = example
        .get("gold_titles")
        .and_then(|titles| titles.as_array())
        .ok_or_else(|| MetricError::new("example has no `gold_titles` list"))?;
    let gold: HashSet<String> = titles
        .iter()
        .filter_map(|title| title.as_str())
        .map(normalize_text)
        .collect();
    let found: HashSet<String> = prediction
        .context()
        .iter()
        .map(|passage| normalize_text(passage_title(passage)))
        .collect();
    Ok(gold.is_subset(&found))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Check {
    pub name: String,
    pub passed: bool,
}

/// Result of scoring one prediction: a list of named pass/fail checks.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricOutcome {
    pub checks: Vec<Check>,
}

impl MetricOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(mut self, name: impl Into<String>, passed: bool) -> Self {
        self.checks.push(Check {
            name: name.into(),
            passed,
        });
        self
    }

    /// True when there is at least one check and all of them passed.
    pub fn passes_all(&self) -> bool {
        !self.checks.is_empty() && self.checks.iter().all(|check| check.passed)
    }

    /// True when every named check is present and passed.
    pub fn passes(&self, names: &[&str]) -> bool {
        names.iter().all(|name| {
            self.checks
                .iter()
                .any(|check| check.name == *name && check.passed)
        })
    }

    /// Names in `names` for which this outcome carries no check at all.
    pub fn missing<'a>(&self, names: &[&'a str]) -> Vec<&'a str> {
        names
            .iter()
            .copied()
            .filter(|name| !self.checks.iter().any(|check| check.name == *name))
            .collect()
    }

    /// Fraction of checks that passed.
    pub fn score(&self) -> f32 {
        if self.checks.is_empty() {
            return 0.0;
        }
        let passed = self.checks.iter().filter(|check| check.passed).count();
        passed as f32 / self.checks.len() as f32
    }
}

impl From<bool> for MetricOutcome {
    fn from(passed: bool) -> Self {
        Self::new().check("0", passed)
    }
}

impl From<(bool, bool)> for MetricOutcome {
    fn from((first, second): (bool, bool)) -> Self {
        Self::new().check("0", first).check("1", second)
    }
}

/// Values a metric closure may return.
pub trait IntoMetricResult {
    fn into_metric_result(self) -> Result<MetricOutcome, MetricError>;
}

impl IntoMetricResult for bool {
    fn into_metric_result(self) -> Result<MetricOutcome, MetricError> {
        Ok(self.into())
    }
}

impl IntoMetricResult for (bool, bool) {
    fn into_metric_result(self) -> Result<MetricOutcome, MetricError> {
        Ok(self.into())
    }
}

impl IntoMetricResult for MetricOutcome {
    fn into_metric_result(self) -> Result<MetricOutcome, MetricError> {
        Ok(self)
    }
}

impl<T: IntoMetricResult> IntoMetricResult for Result<T, MetricError> {
    fn into_metric_result(self) -> Result<MetricOutcome, MetricError> {
        self.and_then(IntoMetricResult::into_metric_result)
    }
}

/// Scores a prediction of type `P` against its example.
///
/// `trace` is `Some` while bootstrapping and `None` during evaluation.
pub trait Metric<P>: Send + Sync {
    fn evaluate(
        &self,
        example: &Example,
        prediction: &P,
        trace: Option<&Trace>,
    ) -> Result<MetricOutcome, MetricError>;
}

impl<P, F, R> Metric<P> for F
where
    F: Fn(&Example, &P, Option<&Trace>) -> R + Send + Sync,
    R: IntoMetricResult,
{
    fn evaluate(
        &self,
        example: &Example,
        prediction: &P,
        trace: Option<&Trace>,
    ) -> Result<MetricOutcome, MetricError> {
        self(example, prediction, trace).into_metric_result()
    }
}

/// [`validate_context_and_answer`] with named checks `exact_match` and
/// `passage_match`, so callers can require a subset by name.
#[derive(Clone, Copy, Debug, Default)]
pub struct ContextAndAnswer;

impl<P: HasAnswer + HasContext> Metric<P> for ContextAndAnswer {
    fn evaluate(
        &self,
        example: &Example,
        prediction: &P,
        trace: Option<&Trace>,
    ) -> Result<MetricOutcome, MetricError> {
        if example.answers().is_empty() {
            return Err(MetricError::new("example has no `answer` label"));
        }
        let (exact, passage) = validate_context_and_answer(example, prediction, trace);
        Ok(MetricOutcome::new()
            .check("exact_match", exact)
            .check("passage_match", passage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_articles_and_punctuation() {
        assert_eq!(normalize_text("The  Eiffel Tower!"), "eiffel tower");
        assert_eq!(normalize_text("an apple, a day"), "apple day");
        assert_eq!(normalize_text("Theatre"), "theatre");
    }

    #[test]
    fn outcome_scores() {
        let outcome = MetricOutcome::from((true, false));
        assert!(!outcome.passes_all());
        assert!(outcome.passes(&["0"]));
        assert!(!outcome.passes(&["1"]));
        assert_eq!(outcome.score(), 0.5);
        assert!(!MetricOutcome::new().passes_all());
    }

    #[test]
    fn missing_names_checks_the_outcome_lacks() {
        let outcome = MetricOutcome::new().check("exact_match", false);
        assert!(outcome.missing(&["exact_match"]).is_empty());
        assert_eq!(outcome.missing(&["exact_match", "passage_match"]), vec!["passage_match"]);
    }
}
