use anyhow::{Context, Result, anyhow};
use arrow::json::ArrayWriter;
use csv::{ReaderBuilder, WriterBuilder};
use hf_hub::api::tokio::Api;
use indexmap::IndexMap;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::Example;

fn row_to_example(row: Map<String, Value>, input_keys: &[String], output_keys: &[String]) -> Example {
    Example::new(
        row.into_iter().collect(),
        input_keys.to_vec(),
        output_keys.to_vec(),
    )
}

/// Local and Hugging Face dataset access. Loading is pure data access; no
/// example is modified beyond designating its input keys.
pub struct DataLoader;

impl DataLoader {
    /// Loads flat JSON objects, either one array (`lines = false`) or JSON Lines.
    pub fn load_json(
        path: impl AsRef<Path>,
        lines: bool,
        input_keys: Vec<String>,
        output_keys: Vec<String>,
    ) -> Result<Vec<Example>> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        let rows: Vec<Map<String, Value>> = if lines {
            data.lines()
                .filter(|line| !line.trim().is_empty())
                .map(serde_json::from_str)
                .collect::<Result<_, _>>()?
        } else {
            serde_json::from_str(&data)?
        };

        Ok(rows
            .into_iter()
            .map(|row| row_to_example(row, &input_keys, &output_keys))
            .collect())
    }

    pub fn save_json(path: impl AsRef<Path>, examples: &[Example], lines: bool) -> Result<()> {
        let data = if lines {
            examples
                .iter()
                .map(|example| serde_json::to_string(&example.data))
                .collect::<Result<Vec<String>, _>>()?
                .join("\n")
        } else {
            let rows: Vec<&IndexMap<String, Value>> =
                examples.iter().map(|example| &example.data).collect();
            serde_json::to_string(&rows)?
        };
        fs::write(path, data)?;
        Ok(())
    }

    /// Loads a delimited file. Without headers, columns are named by position.
    pub fn load_csv(
        path: impl AsRef<Path>,
        delimiter: char,
        input_keys: Vec<String>,
        output_keys: Vec<String>,
        has_headers: bool,
    ) -> Result<Vec<Example>> {
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter as u8)
            .has_headers(has_headers)
            .from_path(path)?;

        let headers: Vec<String> = if has_headers {
            reader.headers()?.iter().map(str::to_string).collect()
        } else {
            vec![]
        };

        reader
            .records()
            .map(|record| {
                let record = record?;
                let data = record
                    .iter()
                    .enumerate()
                    .map(|(idx, cell)| {
                        let key = headers.get(idx).cloned().unwrap_or_else(|| idx.to_string());
                        (key, Value::String(cell.to_string()))
                    })
                    .collect();
                Ok(Example::new(data, input_keys.clone(), output_keys.clone()))
            })
            .collect()
    }

    pub fn save_csv(path: impl AsRef<Path>, examples: &[Example], delimiter: char) -> Result<()> {
        let first = examples
            .first()
            .ok_or_else(|| anyhow!("cannot write an empty CSV"))?;
        let headers = first.keys();

        let mut writer = WriterBuilder::new()
            .delimiter(delimiter as u8)
            .from_path(path)?;
        writer.write_record(&headers)?;
        for example in examples {
            writer.write_record(headers.iter().map(|key| match example.get(key) {
                Some(Value::String(text)) => text.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            }))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Decodes a parquet file into one flat JSON object per row.
    ///
    /// Nested columns (structs, lists) keep their JSON shape.
    pub fn read_parquet_rows(path: impl AsRef<Path>) -> Result<Vec<Map<String, Value>>> {
        let file = fs::File::open(path.as_ref())?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut rows = Vec::new();
        for batch in reader {
            let batch = batch?;
            let mut writer = ArrayWriter::new(Vec::new());
            writer.write_batches(&[&batch])?;
            writer.finish()?;
            let buffer = writer.into_inner();
            if buffer.is_empty() {
                continue;
            }
            let decoded: Vec<Map<String, Value>> = serde_json::from_slice(&buffer)?;
            rows.extend(decoded);
        }
        Ok(rows)
    }

    pub fn load_parquet(
        path: impl AsRef<Path>,
        input_keys: Vec<String>,
        output_keys: Vec<String>,
    ) -> Result<Vec<Example>> {
        Ok(Self::read_parquet_rows(path)?
            .into_iter()
            .map(|row| row_to_example(row, &input_keys, &output_keys))
            .collect())
    }

    /// Downloads every parquet shard of `{subset}/{split}` from a Hugging Face
    /// dataset repository and returns its rows.
    #[tracing::instrument(name = "dsrs.data.hf_rows", level = "info")]
    pub async fn load_hf_rows(
        dataset: &str,
        subset: &str,
        split: &str,
    ) -> Result<Vec<Map<String, Value>>> {
        let api = Api::new()?;
        let repo = api.dataset(dataset.to_string());
        let prefix = format!("{subset}/{split}-");

        let mut shards: Vec<String> = repo
            .info()
            .await?
            .siblings
            .into_iter()
            .map(|sibling| sibling.rfilename)
            .filter(|name| name.starts_with(&prefix) && name.ends_with(".parquet"))
            .collect();
        shards.sort();

        if shards.is_empty() {
            return Err(anyhow!("no parquet shards for {dataset} {subset}/{split}"));
        }

        let mut rows = Vec::new();
        for shard in &shards {
            let path = repo.get(shard).await?;
            debug!(shard = %shard, "parquet shard downloaded");
            rows.extend(Self::read_parquet_rows(&path)?);
        }
        info!(shards = shards.len(), rows = rows.len(), "dataset split loaded");
        Ok(rows)
    }

    pub async fn load_hf(
        dataset: &str,
        subset: &str,
        split: &str,
        input_keys: Vec<String>,
        output_keys: Vec<String>,
    ) -> Result<Vec<Example>> {
        Ok(Self::load_hf_rows(dataset, subset, split)
            .await?
            .into_iter()
            .map(|row| row_to_example(row, &input_keys, &output_keys))
            .collect())
    }
}

/// Shuffles with a seeded RNG and keeps the first `size` examples.
///
/// `size = None` keeps the whole shuffled set. The same seed always yields the
/// same order.
pub fn shuffle_and_sample(mut examples: Vec<Example>, size: Option<usize>, seed: u64) -> Vec<Example> {
    let mut rng = StdRng::seed_from_u64(seed);
    examples.shuffle(&mut rng);
    if let Some(size) = size {
        examples.truncate(size);
    }
    examples
}
