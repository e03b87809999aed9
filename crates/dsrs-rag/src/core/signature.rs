//! Statically declared input/output contracts for generation steps.
//!
//! A [`Signature`] names its instruction and fields up front and pairs them with
//! plain serde records for the typed input and output. The
//! [`ChatAdapter`](crate::ChatAdapter) only ever sees the flattened
//! [`SignatureSchema`], so prompt rendering needs no runtime reflection.

use indexmap::IndexMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Name and prompt-facing description of one field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub desc: &'static str,
}

impl FieldSpec {
    pub const fn new(name: &'static str, desc: &'static str) -> Self {
        Self { name, desc }
    }
}

pub trait Signature: Send + Sync + 'static {
    type Input: Serialize + DeserializeOwned + Clone + Send + Sync;
    type Output: Serialize + DeserializeOwned + Clone + Send + Sync;

    fn instruction() -> &'static str;
    fn input_fields() -> &'static [FieldSpec];
    fn output_fields() -> &'static [FieldSpec];
}

/// Flattened, owned view of a signature used for prompt formatting and parsing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureSchema {
    pub instruction: String,
    pub input_fields: Vec<FieldSpec>,
    pub output_fields: Vec<FieldSpec>,
}

impl SignatureSchema {
    pub fn of<S: Signature>() -> Self {
        Self {
            instruction: S::instruction().to_string(),
            input_fields: S::input_fields().to_vec(),
            output_fields: S::output_fields().to_vec(),
        }
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    /// Inserts an output field ahead of the declared ones.
    pub fn prepend_output(mut self, field: FieldSpec) -> Self {
        self.output_fields.insert(0, field);
        self
    }

    pub fn input_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.input_fields.iter().map(|field| field.name)
    }

    pub fn output_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.output_fields.iter().map(|field| field.name)
    }
}

/// Serializes a typed record into an ordered field map.
///
/// Non-object records (which no signature declares) map to an empty set of fields.
pub fn to_fields<T: Serialize>(record: &T) -> Result<IndexMap<String, Value>, serde_json::Error> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map.into_iter().collect()),
        _ => Ok(IndexMap::new()),
    }
}

/// Builds a typed record from an ordered field map.
pub fn from_fields<T: DeserializeOwned>(
    fields: IndexMap<String, Value>,
) -> Result<T, serde_json::Error> {
    serde_json::from_value(Value::Object(fields.into_iter().collect()))
}
