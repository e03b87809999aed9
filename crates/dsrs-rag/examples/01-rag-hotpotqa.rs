/*
End-to-end HotPotQA walkthrough: zero-shot QA, chain-of-thought QA, then a
retrieve-then-generate pipeline compiled with bootstrapped demonstrations.

Run with:
```
OPENAI_API_KEY=... cargo run --example 01-rag-hotpotqa
```
`COLBERT_URL` overrides the retrieval endpoint and `DSRS_MODEL` the model.
*/

use anyhow::Result;
use dsrs_rag::{
    BasicQA, BootstrapFewShot, ChainOfThought, ColBERTv2, GENERATE_STEP, HotPotQA, LM, Optimizer,
    Predict, QuestionInput, Rag, RagPrediction, init_tracing, truncate,
    validate_context_and_answer,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    let lm = Arc::new(LM::from_env()?);
    let retriever = Arc::new(ColBERTv2::from_env());

    let dataset = HotPotQA::builder()
        .train_seed(1)
        .train_size(20)
        .eval_seed(2023)
        .dev_size(50)
        .test_size(0)
        .build()
        .load()
        .await?;
    let trainset = dataset.train;
    let devset = dataset.dev;
    println!("Loaded {} train / {} dev examples", trainset.len(), devset.len());
    println!("Trainset Data:");
    for example in trainset.iter().take(5) {
        println!("  {}", serde_json::to_string(&example.data)?);
    }
    println!("Devset Data:");
    for example in devset.iter().take(5) {
        println!("  {}", serde_json::to_string(&example.data)?);
    }

    let example = devset
        .get(18)
        .or_else(|| devset.first())
        .ok_or_else(|| anyhow::anyhow!("dev split is empty"))?;
    let question = example.get_str("question").unwrap_or_default().to_string();
    println!("\n### Example question ###");
    println!("Question: {question}");
    println!("Answer: {}", example.get_str("answer").unwrap_or_default());
    let gold_titles: Vec<&str> = example
        .get("gold_titles")
        .and_then(|titles| titles.as_array())
        .into_iter()
        .flatten()
        .filter_map(|title| title.as_str())
        .collect();
    println!("Relevant Wikipedia Titles: {}", gold_titles.join(", "));

    println!("\n### Zero-shot answer ###");
    let generate_answer = Predict::<BasicQA>::builder().lm(lm.clone()).build();
    let prediction = generate_answer
        .call(QuestionInput {
            question: question.clone(),
        })
        .await?;
    println!("Question: {question}\nPredicted Answer: {}", prediction.answer);

    println!("\n### Chain-of-thought answer ###");
    let generate_with_reasoning = ChainOfThought::<BasicQA>::builder().lm(lm.clone()).build();
    let prediction = generate_with_reasoning
        .call(QuestionInput {
            question: question.clone(),
        })
        .await?;
    // The first sentence restates the reasoning prompt.
    let thought = prediction
        .rationale
        .split_once('.')
        .map(|(_, rest)| rest.trim())
        .unwrap_or(prediction.rationale.as_str());
    println!(
        "Question: {question}\nThought: {thought}\nPredicted Answer: {}",
        prediction.answer
    );

    println!("\n### RAG compiled with bootstrapped demonstrations ###");
    let rag = Rag::builder()
        .retriever(retriever.clone())
        .lm(lm.clone())
        .num_passages(3)
        .build();
    let compiled = BootstrapFewShot::builder()
        .display_progress(true)
        .build()
        .compile(rag, &trainset, &validate_context_and_answer::<RagPrediction>)
        .await?;

    let report = compiled.report();
    println!(
        "Bootstrapped {} demos from {} attempts ({} skipped)",
        compiled.demos(GENERATE_STEP).len(),
        report.attempted,
        report.skipped.len()
    );
    for warning in &report.warnings {
        println!("warning: {warning}");
    }

    let my_question = "What year was manchester united formed?";
    let prediction = compiled.run(my_question).await?;
    println!("Question: {my_question}");
    println!("Predicted Answer: {}", prediction.answer);
    let contexts: Vec<String> = prediction
        .context
        .iter()
        .map(|passage| format!("{}...", truncate(passage, 200)))
        .collect();
    println!("Retrieved Contexts (truncated): {contexts:?}");

    compiled.program().save("compiled_rag.json")?;
    println!("Saved compiled program to compiled_rag.json");
    Ok(())
}
