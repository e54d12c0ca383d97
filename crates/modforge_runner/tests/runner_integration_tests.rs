//! Integration tests for the command execution layer.
//!
//! These tests verify the runner contract using the mock runner so that no
//! external tool has to be installed.

use std::sync::Arc;

use modforge_runner::{
    CommandConfig, CommandRunner, MockResponse, MockRunner, RunConfig, RunnerError,
};

/// Test basic mock runner functionality.
#[tokio::test]
async fn test_mock_runner_basic_execution() {
    let runner = MockRunner::new().add_response(MockResponse::success("Terraform v1.6.0"));

    let config = CommandConfig::new("terraform").arg("version");
    let result = runner.run(&config, &RunConfig::default()).await.unwrap();

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "Terraform v1.6.0");
    assert!(result.success());
}

/// Test mock runner captures all call details.
#[tokio::test]
async fn test_mock_runner_captures_config() {
    let runner = MockRunner::new();

    let config = CommandConfig::new("terraform")
        .args(["plan", "-input=false", "-no-color"])
        .workdir("/projects/alpha")
        .env("TF_IN_AUTOMATION", "1");

    let _ = runner
        .run(&config, &RunConfig::default().timeout(42))
        .await;

    let calls = runner.get_subcommand_calls("plan");
    assert_eq!(calls.len(), 1);

    let call = &calls[0];
    assert_eq!(call.program, "terraform");
    assert_eq!(call.args, vec!["plan", "-input=false", "-no-color"]);
    assert_eq!(call.workdir.as_deref(), Some(std::path::Path::new("/projects/alpha")));
    assert_eq!(call.env.get("TF_IN_AUTOMATION"), Some(&"1".to_string()));
    assert_eq!(call.timeout_seconds, 42);
}

/// Test sequential execution with multiple responses.
#[tokio::test]
async fn test_mock_runner_sequential_responses() {
    let runner = MockRunner::new().with_responses(vec![
        MockResponse::success("step 1 output"),
        MockResponse::failure(1, "step 2 failed"),
    ]);

    let config = CommandConfig::new("terraform").arg("init");
    let run_config = RunConfig::default();

    let r1 = runner.run(&config, &run_config).await.unwrap();
    assert!(r1.success());
    assert_eq!(r1.stdout, "step 1 output");

    let r2 = runner.run(&config, &run_config).await.unwrap();
    assert!(!r2.success());
    assert_eq!(r2.combined_output(), "step 2 failed");

    // Responses cycle once exhausted
    let r3 = runner.run(&config, &run_config).await.unwrap();
    assert_eq!(r3.stdout, "step 1 output");
}

/// Test simulated timeouts carry partial output.
#[tokio::test]
async fn test_mock_runner_timeout() {
    let runner = MockRunner::new().respond_to("plan", MockResponse::timeout("Refreshing state..."));

    let config = CommandConfig::new("terraform").arg("plan");
    let err = runner
        .run(&config, &RunConfig::default().timeout(5))
        .await
        .unwrap_err();

    match err {
        RunnerError::Timeout { seconds, stdout, .. } => {
            assert_eq!(seconds, 5);
            assert_eq!(stdout, "Refreshing state...");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

/// Test simulated infrastructure failure.
#[tokio::test]
async fn test_mock_runner_simulated_failure() {
    let runner = MockRunner::new().simulate_failure("spawn refused");

    let config = CommandConfig::new("terraform").arg("graph");
    let err = runner.run(&config, &RunConfig::default()).await.unwrap_err();

    assert!(err.to_string().contains("spawn refused"));
}

/// Test the runner can be shared as a trait object.
#[tokio::test]
async fn test_runner_as_trait_object() {
    let mock = MockRunner::new().respond_to("graph", MockResponse::success("digraph {}"));
    let runner: Arc<dyn CommandRunner> = Arc::new(mock.clone());

    assert!(runner.is_available("terraform").await.unwrap());

    let result = runner
        .run(&CommandConfig::new("terraform").arg("graph"), &RunConfig::default())
        .await
        .unwrap();
    assert_eq!(result.stdout, "digraph {}");
    assert_eq!(mock.call_count(), 1);
}
