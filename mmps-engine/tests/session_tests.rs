//! End-to-end session tests against a scripted generation client

mod helpers;

use helpers::{
    capture_logs, default_settings, instance_for_temperature, is_scoring_request, StubClient,
};
use mmps_common::config::{FailurePolicy, SummaryScope, TomlConfig};
use mmps_engine::events::PipelineEvent;
use mmps_engine::generation::{GenerationError, GenerationRequest, ModelTier};
use mmps_engine::settings::EngineSettings;
use mmps_engine::{EngineError, Session};
use tokio::sync::mpsc;
use tracing::Level;

const PROBLEM: &str = "optimize a sorting routine";

/// Stage replies are tagged "instance-<i> stage-<budget>"; scoring answers `scores`
fn tagged_responder(
    scores: &'static str,
) -> impl Fn(&GenerationRequest) -> Result<String, GenerationError> + Send + Sync + 'static {
    move |request| {
        if is_scoring_request(request) {
            return Ok(scores.to_string());
        }
        let instance = instance_for_temperature(request.temperature());
        match request.tier() {
            ModelTier::Strong => Ok(format!("FINAL[{}]", instance)),
            ModelTier::Fast => Ok(format!(
                "instance-{} budget-{}",
                instance,
                request.max_output_tokens()
            )),
        }
    }
}

#[tokio::test]
async fn test_three_instances_full_flow() {
    let client = StubClient::new(tagged_responder("4,9,6"));
    let session = Session::new(client.clone(), default_settings());

    let best = session.run(PROBLEM).await.unwrap();

    assert_eq!(best.instance, 1);
    assert_eq!(best.text, "FINAL[1]");
    assert_eq!(best.score, 9.0);
    assert!(!best.degraded);
    assert_eq!(best.scores, vec![(0, 4.0), (1, 9.0), (2, 6.0)]);

    // Layer 5 holds one final answer per instance
    let finals = session.memory().retrieve_entries(5).await.unwrap();
    assert_eq!(finals.len(), 3);
    for entry in &finals {
        assert_eq!(entry.text, format!("FINAL[{}]", entry.instance));
    }

    // Exactly one scoring call listing those answers in instance order
    let scoring = client.scoring_requests();
    assert_eq!(scoring.len(), 1);
    let prompt = scoring[0].conversation().last_user_content().unwrap();
    assert!(prompt.contains(&format!("User's input: '{}'", PROBLEM)));
    assert!(prompt.contains("Response 1: FINAL[0]\nResponse 2: FINAL[1]\nResponse 3: FINAL[2]"));
    assert!(!prompt.contains("Response 4:"));
    assert_eq!(scoring[0].tier(), ModelTier::Strong);
    assert_eq!(scoring[0].temperature(), 0.0);
    assert_eq!(scoring[0].max_output_tokens(), 20);
}

#[tokio::test]
async fn test_sampling_schedule_applied_per_instance() {
    let client = StubClient::new(tagged_responder("5,5,5"));
    let session = Session::new(client.clone(), default_settings());
    session.run(PROBLEM).await.unwrap();

    let stage_requests = client.stage_requests();
    assert_eq!(stage_requests.len(), 15);

    for instance in 0..3 {
        let own: Vec<&GenerationRequest> = stage_requests
            .iter()
            .filter(|r| instance_for_temperature(r.temperature()) == instance)
            .collect();
        assert_eq!(own.len(), 5);

        let fast: Vec<u32> = own
            .iter()
            .filter(|r| r.tier() == ModelTier::Fast)
            .map(|r| r.max_output_tokens())
            .collect();
        assert_eq!(fast, vec![100 + 200 * instance as u32; 4]);

        let strong: Vec<u32> = own
            .iter()
            .filter(|r| r.tier() == ModelTier::Strong)
            .map(|r| r.max_output_tokens())
            .collect();
        assert_eq!(strong, vec![2000]);
    }

    // Every layer got one entry per instance
    for layer in 1..=5 {
        assert_eq!(session.memory().len(layer).await.unwrap(), 3);
    }
    let layer1 = session.memory().retrieve_entries(1).await.unwrap();
    for entry in layer1 {
        assert_eq!(
            entry.text,
            format!("instance-{} budget-{}", entry.instance, 100 + 200 * entry.instance)
        );
    }
}

#[tokio::test]
async fn test_each_stage_call_is_a_fresh_two_message_conversation() {
    let client = StubClient::new(tagged_responder("5,5,5"));
    let mut settings = default_settings();
    settings.system_directive = "You are a terse engineer.".to_string();
    let session = Session::new(client.clone(), settings);
    session.run(PROBLEM).await.unwrap();

    for request in client.requests() {
        let messages = request.conversation().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "You are a terse engineer.");
    }
}

#[tokio::test]
async fn test_unparseable_scores_fall_back_to_first_instance() {
    let (logs, _guard) = capture_logs();
    let client = StubClient::new(tagged_responder("Response 2 is clearly best"));
    let session = Session::new(client, default_settings());

    let best = session.run(PROBLEM).await.unwrap();

    assert!(best.degraded);
    assert_eq!(best.instance, 0);
    assert_eq!(best.text, "FINAL[0]");
    assert_eq!(best.score, 0.0);
    assert!(best.scores.iter().all(|&(_, score)| score == 0.0));
    assert!(logs.contains_at(Level::WARN, "Score parsing failed"));
}

#[tokio::test]
async fn test_out_of_range_scores_fall_back() {
    let client = StubClient::new(tagged_responder("11,5,2"));
    let session = Session::new(client, default_settings());

    let best = session.run(PROBLEM).await.unwrap();
    assert!(best.degraded);
    assert_eq!(best.instance, 0);
    assert_eq!(best.score, 0.0);
}

#[tokio::test]
async fn test_tied_scores_pick_earliest_instance() {
    let client = StubClient::new(tagged_responder("3,8,8"));
    let session = Session::new(client, default_settings());

    let best = session.run(PROBLEM).await.unwrap();
    assert_eq!(best.instance, 1);
    assert_eq!(best.score, 8.0);
}

#[tokio::test]
async fn test_single_instance() {
    let client = StubClient::new(tagged_responder("7"));
    let settings =
        EngineSettings::from_config_with_instances(&TomlConfig::default(), Some(1)).unwrap();
    let session = Session::new(client.clone(), settings);

    let best = session.run(PROBLEM).await.unwrap();
    assert_eq!(best.instance, 0);
    assert_eq!(best.score, 7.0);
    assert_eq!(client.requests().len(), 6);
}

#[tokio::test]
async fn test_empty_problem_rejected_without_calls() {
    let client = StubClient::new(tagged_responder("5,5,5"));
    let session = Session::new(client.clone(), default_settings());

    let err = session.run("   ").await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Common(mmps_common::Error::InvalidInput(_))
    ));
    assert!(client.requests().is_empty());
}

#[tokio::test]
async fn test_stage_failure_aborts_run_by_default() {
    let client = StubClient::new(|request: &GenerationRequest| {
        if is_scoring_request(request) {
            return Ok("5,5,5".to_string());
        }
        if instance_for_temperature(request.temperature()) == 2
            && request.tier() == ModelTier::Fast
            && request.conversation().last_user_content().unwrap_or("").contains("pairs of keywords")
        {
            return Err(GenerationError::Api(503, "overloaded".to_string()));
        }
        Ok("ok".to_string())
    });
    let session = Session::new(client.clone(), default_settings());

    let err = session.run(PROBLEM).await.unwrap_err();
    assert_eq!(err.instance(), Some(2));
    match err {
        EngineError::Stage { stage, source, .. } => {
            assert_eq!(stage.number(), 3);
            assert!(matches!(source, GenerationError::Api(503, _)));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(client.scoring_requests().is_empty());
}

#[tokio::test]
async fn test_exclude_failed_scores_survivors_only() {
    let client = StubClient::new(|request: &GenerationRequest| {
        if is_scoring_request(request) {
            return Ok("6,9".to_string());
        }
        let instance = instance_for_temperature(request.temperature());
        if instance == 0 {
            return Err(GenerationError::Network("connection refused".to_string()));
        }
        Ok(format!("answer from {}", instance))
    });
    let mut settings = default_settings();
    settings.failure_policy = FailurePolicy::ExcludeFailed;
    settings.summary_scope = SummaryScope::Instance;
    let session = Session::new(client.clone(), settings);

    let best = session.run(PROBLEM).await.unwrap();
    assert_eq!(best.instance, 2);
    assert_eq!(best.text, "answer from 2");
    assert_eq!(best.scores, vec![(1, 6.0), (2, 9.0)]);

    let scoring = client.scoring_requests();
    let prompt = scoring[0].conversation().last_user_content().unwrap();
    assert!(prompt.contains("Response 1: answer from 1\nResponse 2: answer from 2"));
    assert!(!prompt.contains("Response 3:"));
}

#[tokio::test]
async fn test_all_instances_failing_yields_no_candidates() {
    let client = StubClient::new(|_: &GenerationRequest| {
        Err(GenerationError::Authentication("bad key".to_string()))
    });
    let mut settings = default_settings();
    settings.failure_policy = FailurePolicy::ExcludeFailed;
    let session = Session::new(client, settings);

    let err = session.run(PROBLEM).await.unwrap_err();
    assert!(matches!(err, EngineError::NoCandidates));
}

#[tokio::test]
async fn test_scoring_call_failure_is_reported() {
    let client = StubClient::new(|request: &GenerationRequest| {
        if is_scoring_request(request) {
            return Err(GenerationError::Api(500, "internal".to_string()));
        }
        Ok("stage output".to_string())
    });
    let session = Session::new(client, default_settings());

    let err = session.run(PROBLEM).await.unwrap_err();
    assert!(matches!(err, EngineError::Scoring(GenerationError::Api(500, _))));
}

#[tokio::test]
async fn test_events_cover_every_stage_and_selection() {
    let client = StubClient::new(tagged_responder("2,3,10"));
    let (tx, mut rx) = mpsc::channel(256);
    let session = Session::with_events(client, default_settings(), tx);

    let best = session.run(PROBLEM).await.unwrap();
    drop(session);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    let started = events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::InstanceStarted { .. }))
        .count();
    let stages = events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::StageCompleted { .. }))
        .count();
    let completed = events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::InstanceCompleted { .. }))
        .count();
    assert_eq!(started, 3);
    assert_eq!(stages, 15);
    assert_eq!(completed, 3);

    // Stages of one instance complete in order
    for instance in 0..3 {
        let order: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::StageCompleted {
                    instance: i, stage, ..
                } if *i == instance => Some(*stage),
                _ => None,
            })
            .collect();
        assert_eq!(order, vec![1, 2, 3, 4, 5]);
    }

    assert_eq!(
        events.last(),
        Some(&PipelineEvent::Selected {
            instance: best.instance,
            score: 10.0,
            degraded: false,
        })
    );
    assert!(events
        .iter()
        .any(|e| matches!(e, PipelineEvent::ScoringStarted { candidates: 3 })));
}
