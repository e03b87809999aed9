mod common;

use common::{ScriptedRetriever, answering_lm, hotpot_fixture, qa};
use dsrs_rag::{
    BootstrapFewShot, CompiledProgram, ContextAndAnswer, Example, GENERATE_STEP, LabeledFewShot,
    MetricError, MetricOutcome, Module, Optimizer, OptimizerError, Rag, RagPrediction, Trace,
    validate_context_and_answer,
};
use std::sync::Arc;
use std::time::Duration;

fn rag(retriever: ScriptedRetriever, lm: dsrs_rag::DummyLM) -> (Rag, Arc<ScriptedRetriever>, Arc<dsrs_rag::DummyLM>) {
    let retriever = Arc::new(retriever);
    let lm = Arc::new(lm);
    let rag = Rag::builder()
        .retriever(retriever.clone())
        .lm(lm.clone())
        .call_timeout(Duration::from_millis(100))
        .build();
    (rag, retriever, lm)
}

fn questions(demos: &[dsrs_rag::Demonstration]) -> Vec<String> {
    demos
        .iter()
        .map(|demo| demo.get("question").and_then(|q| q.as_str()).unwrap_or_default().to_string())
        .collect()
}

#[cfg_attr(miri, ignore)]
#[tokio::test]
async fn first_found_passing_examples_become_demos() {
    let (trainset, retriever, lm) = hotpot_fixture();
    let (program, retriever, lm) = rag(retriever, lm);

    let optimizer = BootstrapFewShot::builder().max_bootstrapped_demos(2).build();
    let compiled = optimizer
        .compile(program, &trainset, &validate_context_and_answer::<RagPrediction>)
        .await
        .unwrap();

    let demos = compiled.demos(GENERATE_STEP);
    assert_eq!(
        questions(demos),
        vec!["Which city hosts the Louvre?", "What river flows through Vienna?"]
    );
    assert!(demos.iter().all(|demo| demo.augmented));

    // Early stop: index 3 and 4 are never run.
    assert_eq!(lm.calls(), 3);
    assert_eq!(retriever.calls(), 3);
    assert_eq!(compiled.report().attempted, 3);
    assert_eq!(compiled.report().bootstrapped, 2);
}

#[cfg_attr(miri, ignore)]
#[tokio::test]
async fn demos_carry_actual_step_bindings() {
    let (trainset, retriever, lm) = hotpot_fixture();
    let (program, _, _) = rag(retriever, lm);

    let compiled = BootstrapFewShot::builder()
        .max_bootstrapped_demos(1)
        .build()
        .compile(program, &trainset, &ContextAndAnswer)
        .await
        .unwrap();

    let demo = &compiled.demos(GENERATE_STEP)[0];
    assert_eq!(demo.get("answer").unwrap(), "Paris");
    assert_eq!(demo.get("rationale").unwrap(), "Let's look at the context.");
    assert_eq!(
        demo.get("context").unwrap().as_array().unwrap().len(),
        2,
        "context is the passages the step actually saw"
    );
}

#[cfg_attr(miri, ignore)]
#[tokio::test]
async fn demos_never_exceed_valid_bootstraps() {
    let (trainset, retriever, lm) = hotpot_fixture();
    let (program, _, _) = rag(retriever, lm);

    let compiled = BootstrapFewShot::builder()
        .max_bootstrapped_demos(16)
        .build()
        .compile(program, &trainset, &ContextAndAnswer)
        .await
        .unwrap();

    // Only 0, 2 and 3 pass; the whole set is scanned.
    assert_eq!(compiled.demos(GENERATE_STEP).len(), 3);
    assert_eq!(compiled.report().attempted, 5);
    assert_eq!(compiled.report().steps[0].bootstrapped, 3);
}

#[cfg_attr(miri, ignore)]
#[tokio::test]
async fn timed_out_retrieval_is_skipped() {
    let (trainset, retriever, lm) = hotpot_fixture();
    let retriever = retriever.slow_on("Which city hosts the Louvre?", Duration::from_millis(500));
    let (program, _, lm) = rag(retriever, lm);

    let compiled = BootstrapFewShot::builder()
        .max_bootstrapped_demos(2)
        .build()
        .compile(program, &trainset, &ContextAndAnswer)
        .await
        .unwrap();

    let report = compiled.report();
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].index, 0);
    assert!(report.skipped[0].reason.contains("timed out"));
    assert_eq!(
        questions(compiled.demos(GENERATE_STEP)),
        vec![
            "What river flows through Vienna?",
            "Which planet is known as the Red Planet?"
        ]
    );
    // The skipped example never reached the LM.
    assert_eq!(lm.calls(), 3);
}

#[cfg_attr(miri, ignore)]
#[tokio::test]
async fn zero_passing_examples_compile_to_zero_shot() {
    let trainset = vec![qa("Who wrote Hamlet?", "William Shakespeare")];
    let retriever = ScriptedRetriever::new([("Who wrote Hamlet?", vec!["Hamlet | A tragedy."])]);
    let lm = answering_lm([("Who wrote Hamlet?", "Marlowe")]);
    let (program, _, lm) = rag(retriever, lm);

    let compiled = BootstrapFewShot::builder()
        .build()
        .compile(program, &trainset, &ContextAndAnswer)
        .await
        .unwrap();

    assert!(compiled.demos(GENERATE_STEP).is_empty());
    assert_eq!(compiled.report().warnings.len(), 1);

    let prediction = compiled.run("Who wrote Hamlet?").await.unwrap();
    assert_eq!(prediction.answer, "Marlowe");
    let history = lm.inspect_history(1);
    // system, live user, assistant reply: no demo turns.
    assert_eq!(history[0].chat.len(), 3);
}

#[cfg_attr(miri, ignore)]
#[tokio::test]
async fn failing_metric_is_skipped_not_fatal() {
    let (trainset, retriever, lm) = hotpot_fixture();
    let (program, _, _) = rag(retriever, lm);

    let metric = |example: &Example, prediction: &RagPrediction, _trace: Option<&Trace>| {
        if example.get_str("question") == Some("Which city hosts the Louvre?") {
            return Err(MetricError::new("judge unavailable"));
        }
        Ok(validate_context_and_answer(example, prediction, None))
    };

    let compiled = BootstrapFewShot::builder()
        .max_bootstrapped_demos(2)
        .build()
        .compile(program, &trainset, &metric)
        .await
        .unwrap();

    assert_eq!(compiled.report().skipped.len(), 1);
    assert_eq!(compiled.demos(GENERATE_STEP).len(), 2);
}

#[cfg_attr(miri, ignore)]
#[tokio::test]
async fn max_errors_aborts_compile() {
    let (trainset, retriever, lm) = hotpot_fixture();
    let retriever = retriever
        .failing_on("Which city hosts the Louvre?")
        .failing_on("Who wrote Hamlet?");
    let (program, _, _) = rag(retriever, lm);

    let result = BootstrapFewShot::builder()
        .max_errors(1)
        .build()
        .compile(program, &trainset, &ContextAndAnswer)
        .await;

    assert!(matches!(
        result,
        Err(OptimizerError::TooManyErrors { errors: 2, max_errors: 1 })
    ));
}

#[cfg_attr(miri, ignore)]
#[tokio::test]
async fn empty_trainset_is_a_configuration_error() {
    let (_, retriever, lm) = hotpot_fixture();
    let (program, _, _) = rag(retriever, lm);

    let result = BootstrapFewShot::builder()
        .build()
        .compile(program, &[], &ContextAndAnswer)
        .await;
    assert!(matches!(result, Err(OptimizerError::EmptyTrainset)));
}

#[cfg_attr(miri, ignore)]
#[tokio::test]
async fn required_checks_accept_a_subset() {
    let trainset = vec![qa("Who wrote Hamlet?", "William Shakespeare")];
    let retriever = ScriptedRetriever::new([(
        "Who wrote Hamlet?",
        vec!["Hamlet | Hamlet is a tragedy."],
    )]);
    let lm = answering_lm([("Who wrote Hamlet?", "William Shakespeare")]);
    let (program, _, _) = rag(retriever, lm);

    // The passage never names the author, so only exact match holds.
    let compiled = BootstrapFewShot::builder()
        .required_checks(vec!["exact_match".to_string()])
        .build()
        .compile(program, &trainset, &ContextAndAnswer)
        .await
        .unwrap();
    assert_eq!(compiled.demos(GENERATE_STEP).len(), 1);
}

#[cfg_attr(miri, ignore)]
#[tokio::test]
async fn required_checks_unknown_to_the_metric_fail_the_compile() {
    let (trainset, retriever, lm) = hotpot_fixture();
    let (program, _, lm) = rag(retriever, lm);

    // The tuple metric names its checks "0" and "1".
    let result = BootstrapFewShot::builder()
        .required_checks(vec!["exact_match".to_string()])
        .build()
        .compile(program, &trainset, &validate_context_and_answer::<RagPrediction>)
        .await;

    match result {
        Err(OptimizerError::InvalidConfig(message)) => assert!(message.contains("exact_match")),
        Err(other) => panic!("unexpected error: {other:?}"),
        Ok(_) => panic!("compile should fail"),
    }
    assert_eq!(lm.calls(), 1);
}

#[cfg_attr(miri, ignore)]
#[tokio::test]
async fn metric_threshold_scores_partial_outcomes() {
    let (trainset, retriever, lm) = hotpot_fixture();
    let (program, _, _) = rag(retriever, lm);

    let metric = |_: &Example, _: &RagPrediction, _: Option<&Trace>| {
        MetricOutcome::new().check("a", true).check("b", false)
    };
    let compiled = BootstrapFewShot::builder()
        .max_bootstrapped_demos(2)
        .metric_threshold(0.5)
        .build()
        .compile(program, &trainset, &metric)
        .await
        .unwrap();
    assert_eq!(compiled.demos(GENERATE_STEP).len(), 2);
}

#[cfg_attr(miri, ignore)]
#[tokio::test]
async fn concurrent_bootstrap_keeps_index_order() {
    let (trainset, retriever, lm) = hotpot_fixture();
    let (program, _, _) = rag(retriever, lm);

    let compiled = BootstrapFewShot::builder()
        .max_bootstrapped_demos(3)
        .num_threads(4)
        .build()
        .compile(program, &trainset, &ContextAndAnswer)
        .await
        .unwrap();

    let demos = compiled.demos(GENERATE_STEP);
    assert!(demos.len() <= 3);
    let found = questions(demos);
    let expected = [
        "Which city hosts the Louvre?",
        "What river flows through Vienna?",
        "Which planet is known as the Red Planet?",
    ];
    assert_eq!(found, expected[..found.len()]);
}

#[cfg_attr(miri, ignore)]
#[tokio::test]
async fn concurrent_bootstrap_stops_within_worker_slack() {
    let quota = 2;
    let num_threads = 3;
    let questions: Vec<String> = (0..12).map(|i| format!("What is item {i}?")).collect();
    let trainset: Vec<Example> = questions
        .iter()
        .map(|question| qa(question, &format!("value {question}")))
        .collect();
    let retriever = ScriptedRetriever::new(questions.iter().map(|question| {
        (
            question.clone(),
            vec![format!("Item | The answer is value {question}")],
        )
    }));
    let retriever = questions
        .iter()
        .fold(retriever, |retriever, question| {
            retriever.slow_on(question, Duration::from_millis(10))
        });
    let lm = answering_lm(
        questions
            .iter()
            .map(|question| (question.clone(), format!("value {question}"))),
    );
    let (program, retriever, _) = rag(retriever, lm);

    let compiled = BootstrapFewShot::builder()
        .max_bootstrapped_demos(quota)
        .num_threads(num_threads)
        .build()
        .compile(program, &trainset, &ContextAndAnswer)
        .await
        .unwrap();

    let attempted = compiled.report().attempted;
    assert_eq!(compiled.demos(GENERATE_STEP).len(), quota);
    assert!(attempted >= quota);
    assert!(attempted <= quota + num_threads - 1, "attempted {attempted}");
    assert!(retriever.calls() <= quota + num_threads - 1, "retrieved {}", retriever.calls());
    assert!(retriever.calls() < trainset.len());
}

#[cfg_attr(miri, ignore)]
#[tokio::test]
async fn labeled_demos_top_up_bootstraps() {
    let (trainset, retriever, lm) = hotpot_fixture();
    let (program, _, _) = rag(retriever, lm);

    let compiled = BootstrapFewShot::builder()
        .max_bootstrapped_demos(1)
        .max_labeled_demos(3)
        .seed(7)
        .build()
        .compile(program, &trainset, &ContextAndAnswer)
        .await
        .unwrap();

    let demos = compiled.demos(GENERATE_STEP);
    assert_eq!(demos.len(), 3);
    assert!(demos[0].augmented);
    assert!(demos[1..].iter().all(|demo| !demo.augmented));
    assert!(
        demos[1..]
            .iter()
            .all(|demo| demo.get("question").unwrap() != "Which city hosts the Louvre?")
    );
}

#[cfg_attr(miri, ignore)]
#[tokio::test]
async fn labeled_few_shot_samples_k_examples() {
    let (trainset, retriever, lm) = hotpot_fixture();
    let (program, _, lm) = rag(retriever, lm);

    let compiled = LabeledFewShot::builder()
        .k(2)
        .build()
        .compile(program, &trainset, &ContextAndAnswer)
        .await
        .unwrap();

    assert_eq!(compiled.demos(GENERATE_STEP).len(), 2);
    assert_eq!(lm.calls(), 0);
}

#[cfg_attr(miri, ignore)]
#[tokio::test]
async fn compiled_program_round_trips_through_disk() {
    let (trainset, retriever, lm) = hotpot_fixture();
    let (program, _, _) = rag(retriever, lm);
    let compiled = BootstrapFewShot::builder()
        .max_bootstrapped_demos(2)
        .build()
        .compile(program, &trainset, &ContextAndAnswer)
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rag.json");
    compiled.program().save(&path).unwrap();

    let loaded = CompiledProgram::load(&path).unwrap();
    assert_eq!(&loaded, compiled.program());

    let (_, retriever, lm) = hotpot_fixture();
    let (fresh, _, lm) = rag(retriever, lm);
    let restored = loaded.apply(fresh).unwrap();
    assert_eq!(restored.demos(GENERATE_STEP).len(), 2);
    assert_eq!(restored.report().steps[0].bootstrapped, 2);

    let example = trainset[4].clone();
    restored.call(&example).await.unwrap();
    // system + 2 demo pairs + live user + assistant reply.
    assert_eq!(lm.inspect_history(1)[0].chat.len(), 7);
}

#[cfg_attr(miri, ignore)]
#[tokio::test]
async fn apply_rejects_unknown_steps() {
    let (trainset, retriever, lm) = hotpot_fixture();
    let (program, _, _) = rag(retriever, lm);
    let compiled = LabeledFewShot::builder()
        .k(1)
        .build()
        .compile(program, &trainset, &ContextAndAnswer)
        .await
        .unwrap();

    let mut artifact = compiled.program().clone();
    artifact.steps[0].step_name = "summarize".to_string();

    let (_, retriever, lm) = hotpot_fixture();
    let (fresh, _, _) = rag(retriever, lm);
    assert!(matches!(
        artifact.apply(fresh),
        Err(OptimizerError::UnknownStep(step)) if step == "summarize"
    ));
}
