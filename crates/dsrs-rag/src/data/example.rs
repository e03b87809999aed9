use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An immutable record of named fields, split into inputs and labels.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
pub struct Example {
    pub data: IndexMap<String, Value>,
    #[serde(default)]
    pub input_keys: Vec<String>,
    #[serde(default)]
    pub output_keys: Vec<String>,
}

impl Example {
    pub fn new(
        data: IndexMap<String, Value>,
        input_keys: Vec<String>,
        output_keys: Vec<String>,
    ) -> Self {
        let output_keys = if !output_keys.is_empty() {
            output_keys
        } else if !input_keys.is_empty() {
            data.keys()
                .filter(|key| !input_keys.contains(key))
                .cloned()
                .collect()
        } else {
            vec![]
        };

        Self {
            data,
            input_keys,
            output_keys,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// String value of `key`, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn keys(&self) -> Vec<String> {
        self.data.keys().cloned().collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.data.values().cloned().collect()
    }

    /// Returns a copy with `keys` designated as inputs and every other field as a label.
    pub fn with_inputs<I, K>(&self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let input_keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        let output_keys = self
            .data
            .keys()
            .filter(|key| !input_keys.contains(key))
            .cloned()
            .collect();

        Self {
            data: self.data.clone(),
            input_keys,
            output_keys,
        }
    }

    /// Only the input fields.
    pub fn inputs(&self) -> Self {
        Self {
            data: self
                .data
                .iter()
                .filter(|(key, _)| self.input_keys.contains(key))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            input_keys: self.input_keys.clone(),
            output_keys: vec![],
        }
    }

    /// Every field that is not an input.
    pub fn labels(&self) -> Self {
        Self {
            data: self
                .data
                .iter()
                .filter(|(key, _)| !self.input_keys.contains(key))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            input_keys: vec![],
            output_keys: self.output_keys.clone(),
        }
    }

    pub fn without(&self, keys: &[&str]) -> Self {
        let keep = |key: &String| !keys.contains(&key.as_str());
        Self {
            data: self
                .data
                .iter()
                .filter(|(key, _)| keep(key))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            input_keys: self.input_keys.iter().filter(|k| keep(k)).cloned().collect(),
            output_keys: self.output_keys.iter().filter(|k| keep(k)).cloned().collect(),
        }
    }

    /// Acceptable gold answers: `answer` may hold one string or a list of them.
    pub fn answers(&self) -> Vec<String> {
        match self.data.get("answer") {
            Some(Value::String(answer)) => vec![answer.clone()],
            Some(Value::Array(answers)) => answers
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => vec![],
        }
    }
}

impl IntoIterator for Example {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.into_iter()
    }
}
