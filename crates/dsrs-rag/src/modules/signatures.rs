use serde::{Deserialize, Serialize};

use crate::core::{FieldSpec, Signature};
use crate::data::HasAnswer;

const INSTRUCTION: &str = "Answer questions with short factoid answers.";

const QUESTION: FieldSpec = FieldSpec::new("question", "");
const CONTEXT: FieldSpec = FieldSpec::new("context", "may contain relevant facts");
const ANSWER: FieldSpec = FieldSpec::new("answer", "often between 1 and 5 words");

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct QuestionInput {
    pub question: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ContextQuestionInput {
    pub context: Vec<String>,
    pub question: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AnswerOutput {
    pub answer: String,
}

impl HasAnswer for AnswerOutput {
    fn answer(&self) -> &str {
        &self.answer
    }
}

/// `question -> answer`
pub struct BasicQA;

impl Signature for BasicQA {
    type Input = QuestionInput;
    type Output = AnswerOutput;

    fn instruction() -> &'static str {
        INSTRUCTION
    }

    fn input_fields() -> &'static [FieldSpec] {
        &[QUESTION]
    }

    fn output_fields() -> &'static [FieldSpec] {
        &[ANSWER]
    }
}

/// `context, question -> answer`
pub struct GenerateAnswer;

impl Signature for GenerateAnswer {
    type Input = ContextQuestionInput;
    type Output = AnswerOutput;

    fn instruction() -> &'static str {
        INSTRUCTION
    }

    fn input_fields() -> &'static [FieldSpec] {
        &[CONTEXT, QUESTION]
    }

    fn output_fields() -> &'static [FieldSpec] {
        &[ANSWER]
    }
}
