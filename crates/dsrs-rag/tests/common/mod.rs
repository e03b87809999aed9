#![allow(dead_code)]

use async_trait::async_trait;
use dsrs_rag::{Chat, DummyLM, LmError, RetrievalError, Retriever, example};
use dsrs_rag::Example;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Retriever answering from a fixed question -> passages table.
#[derive(Default)]
pub struct ScriptedRetriever {
    passages: HashMap<String, Vec<String>>,
    slow: HashMap<String, Duration>,
    failing: HashSet<String>,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl ScriptedRetriever {
    pub fn new<I, Q, P>(table: I) -> Self
    where
        I: IntoIterator<Item = (Q, Vec<P>)>,
        Q: Into<String>,
        P: Into<String>,
    {
        Self {
            passages: table
                .into_iter()
                .map(|(question, passages)| {
                    (question.into(), passages.into_iter().map(Into::into).collect())
                })
                .collect(),
            ..Self::default()
        }
    }

    /// Sleeps for `delay` before answering `question`.
    pub fn slow_on(mut self, question: &str, delay: Duration) -> Self {
        self.slow.insert(question.to_string(), delay);
        self
    }

    pub fn failing_on(mut self, question: &str) -> Self {
        self.failing.insert(question.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Retriever for ScriptedRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>, RetrievalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.to_string());

        if let Some(delay) = self.slow.get(query) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(query) {
            return Err(RetrievalError::Network {
                endpoint: "scripted".to_string(),
                message: "connection refused".to_string(),
            });
        }
        Ok(self
            .passages
            .get(query)
            .map(|passages| passages.iter().take(k).cloned().collect())
            .unwrap_or_default())
    }
}

/// The `question` field of the live (last) user turn.
pub fn question_of(chat: &Chat) -> String {
    let content = chat.last_user_content().unwrap_or_default();
    content
        .split("[[ ## question ## ]]\n")
        .nth(1)
        .and_then(|rest| rest.split("\n\n").next())
        .unwrap_or_default()
        .to_string()
}

pub fn completion(rationale: &str, answer: &str) -> String {
    format!(
        "[[ ## rationale ## ]]\n{rationale}\n\n[[ ## answer ## ]]\n{answer}\n\n[[ ## completed ## ]]"
    )
}

/// LM that answers each question from `answers`, and "I don't know" otherwise.
pub fn answering_lm<I, Q, A>(answers: I) -> DummyLM
where
    I: IntoIterator<Item = (Q, A)>,
    Q: Into<String>,
    A: Into<String>,
{
    let answers: HashMap<String, String> = answers
        .into_iter()
        .map(|(question, answer)| (question.into(), answer.into()))
        .collect();
    DummyLM::new(move |chat| {
        let question = question_of(chat);
        if question.starts_with("llm-down") {
            return Err(LmError::RateLimit {
                message: "slow down".to_string(),
            });
        }
        let answer = answers
            .get(&question)
            .cloned()
            .unwrap_or_else(|| "I don't know".to_string());
        Ok(completion("Let's look at the context.", &answer))
    })
}

pub fn qa(question: &str, answer: &str) -> Example {
    example! {
        "question": "input" => question,
        "answer": "output" => answer,
    }
}

/// Five training examples. The LM and retriever get 0, 2 and 3 right.
pub fn hotpot_fixture() -> (Vec<Example>, ScriptedRetriever, DummyLM) {
    let trainset = vec![
        qa("Which city hosts the Louvre?", "Paris"),
        qa("Who wrote Hamlet?", "William Shakespeare"),
        qa("What river flows through Vienna?", "Danube"),
        qa("Which planet is known as the Red Planet?", "Mars"),
        qa("What is the capital of Australia?", "Canberra"),
    ];

    let retriever = ScriptedRetriever::new([
        (
            "Which city hosts the Louvre?",
            vec!["Louvre | The Louvre is a museum in Paris.", "Paris | Paris is the capital of France."],
        ),
        (
            "Who wrote Hamlet?",
            vec!["Hamlet | Hamlet is a tragedy."],
        ),
        (
            "What river flows through Vienna?",
            vec!["Vienna | Vienna lies on the Danube."],
        ),
        (
            "Which planet is known as the Red Planet?",
            vec!["Mars | Mars is often called the Red Planet."],
        ),
        (
            "What is the capital of Australia?",
            vec!["Australia | Australia is a country."],
        ),
    ]);

    let lm = answering_lm([
        ("Which city hosts the Louvre?", "Paris"),
        ("Who wrote Hamlet?", "Christopher Marlowe"),
        ("What river flows through Vienna?", "the Danube"),
        ("Which planet is known as the Red Planet?", "Mars"),
        ("What is the capital of Australia?", "Sydney"),
    ]);

    (trainset, retriever, lm)
}
