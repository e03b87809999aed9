//! HotPotQA train/dev/test splits.
//!
//! The dev split is the "unofficial dev": the last quarter of the hard training
//! examples, which keeps its `gold_titles` so retrieval can be scored. The
//! official validation split is only downloaded when a test split is requested.

use anyhow::Result;
use bon::Builder;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::info;

use crate::data::{DataLoader, Example, shuffle_and_sample};

const DATASET: &str = "hotpotqa/hotpot_qa";
const SUBSET: &str = "fullwiki";
const POOL_SEED: u64 = 0;

/// Which raw fields survive on each example.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KeepDetails {
    /// Question and answer only.
    QuestionAnswer,
    /// Question and answer, plus `gold_titles` on the dev split.
    #[default]
    DevTitles,
    /// Every raw column, plus `gold_titles`.
    All,
}

#[derive(Clone, Debug, Default)]
pub struct DatasetSplits {
    pub train: Vec<Example>,
    pub dev: Vec<Example>,
    pub test: Vec<Example>,
}

#[derive(Clone, Debug, Builder)]
pub struct HotPotQA {
    #[builder(default = 1)]
    pub train_seed: u64,
    #[builder(default = 20)]
    pub train_size: usize,
    #[builder(default = 2023)]
    pub eval_seed: u64,
    #[builder(default = 50)]
    pub dev_size: usize,
    #[builder(default = 0)]
    pub test_size: usize,
    #[builder(default = true)]
    pub only_hard_examples: bool,
    #[builder(default)]
    pub keep_details: KeepDetails,
}

impl HotPotQA {
    #[tracing::instrument(name = "dsrs.data.hotpotqa", level = "info", skip(self))]
    pub async fn load(&self) -> Result<DatasetSplits> {
        let official_train = DataLoader::load_hf_rows(DATASET, SUBSET, "train").await?;
        let official_dev = if self.test_size > 0 {
            DataLoader::load_hf_rows(DATASET, SUBSET, "validation").await?
        } else {
            vec![]
        };

        let splits = self.split_rows(official_train, official_dev);
        info!(
            train = splits.train.len(),
            dev = splits.dev.len(),
            test = splits.test.len(),
            "hotpotqa splits ready"
        );
        Ok(splits)
    }

    /// Builds the three splits from raw rows of the official train and
    /// validation splits.
    pub fn split_rows(
        &self,
        official_train: Vec<Map<String, Value>>,
        official_dev: Vec<Map<String, Value>>,
    ) -> DatasetSplits {
        let pool: Vec<Example> = official_train
            .into_iter()
            .filter(|row| !self.only_hard_examples || row.get("level").and_then(Value::as_str) == Some("hard"))
            .map(|row| self.to_example(row))
            .collect();

        let pool = shuffle_and_sample(pool, None, POOL_SEED);
        let cut = pool.len() * 75 / 100;
        let mut train = pool;
        let dev = train.split_off(cut);

        if self.keep_details == KeepDetails::DevTitles {
            train = train
                .into_iter()
                .map(|example| example.without(&["gold_titles"]))
                .collect();
        }

        let test: Vec<Example> = official_dev
            .into_iter()
            .map(|row| self.to_example(row))
            .collect();

        DatasetSplits {
            train: self.finish(train, self.train_size, self.train_seed),
            dev: self.finish(dev, self.dev_size, self.eval_seed),
            test: self.finish(test, self.test_size, self.eval_seed),
        }
    }

    fn finish(&self, examples: Vec<Example>, size: usize, seed: u64) -> Vec<Example> {
        shuffle_and_sample(examples, Some(size), seed)
            .into_iter()
            .map(|example| example.with_inputs(["question"]))
            .collect()
    }

    fn to_example(&self, row: Map<String, Value>) -> Example {
        let gold_titles = gold_titles(&row);

        let mut data: IndexMap<String, Value> = match self.keep_details {
            KeepDetails::All => row.into_iter().collect(),
            _ => ["question", "answer"]
                .into_iter()
                .filter_map(|key| row.get(key).map(|value| (key.to_string(), value.clone())))
                .collect(),
        };

        if self.keep_details != KeepDetails::QuestionAnswer {
            data.shift_remove("supporting_facts");
            data.insert("gold_titles".to_string(), Value::Array(gold_titles));
        }

        Example::new(data, vec![], vec![])
    }
}

/// Distinct `supporting_facts.title` values, in first-seen order.
fn gold_titles(row: &Map<String, Value>) -> Vec<Value> {
    let mut titles: Vec<Value> = Vec::new();
    let raw = row
        .get("supporting_facts")
        .and_then(|facts| facts.get("title"))
        .and_then(Value::as_array);

    for title in raw.into_iter().flatten() {
        if !titles.contains(title) {
            titles.push(title.clone());
        }
    }
    titles
}
