/*
Scores how often a (compiled) RAG pipeline retrieves every gold passage title
of a HotPotQA dev question.

Run with:
```
OPENAI_API_KEY=... cargo run --example 02-evaluate-retrieval [compiled_rag.json]
```
*/

use anyhow::Result;
use dsrs_rag::{
    ColBERTv2, CompiledProgram, Evaluate, HotPotQA, LM, Rag, RagPrediction,
    gold_passages_retrieved, init_tracing,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    let lm = Arc::new(LM::from_env()?);
    let retriever = Arc::new(ColBERTv2::from_env());
    let devset = HotPotQA::builder().dev_size(50).build().load().await?.dev;

    let evaluator = Evaluate::builder()
        .devset(devset)
        .num_threads(4)
        .display_progress(true)
        .display_table(5)
        .build();

    let rag = Rag::builder().retriever(retriever).lm(lm).build();
    let report = match std::env::args().nth(1) {
        Some(path) => {
            let compiled = CompiledProgram::load(&path)?.apply(rag)?;
            evaluator
                .evaluate(&compiled, &gold_passages_retrieved::<RagPrediction>)
                .await?
        }
        None => {
            evaluator
                .evaluate(&rag, &gold_passages_retrieved::<RagPrediction>)
                .await?
        }
    };

    println!(
        "Retrieval score: {:.1}% ({}/{}; {} failed runs)",
        report.score * 100.0,
        report.correct,
        report.total,
        report.errors
    );
    Ok(())
}
