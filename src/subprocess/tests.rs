use super::*;
use std::time::Duration;

#[tokio::test]
async fn test_production_runner_success() {
    let runner = TokioProcessRunner;
    let command = ProcessCommand::new("echo").args(["hello world"]);

    let output = runner.run(command).await.unwrap();
    assert!(output.status.success());
    assert_eq!(output.stdout.trim(), "hello world");
    assert!(output.stderr.is_empty());
}

#[tokio::test]
async fn test_production_runner_pipes_stdin() {
    let runner = TokioProcessRunner;
    let command = ProcessCommand::new("cat").stdin("{\"segment\":1}");

    let output = runner.run(command).await.unwrap();
    assert!(output.status.success());
    assert_eq!(output.stdout, "{\"segment\":1}");
}

#[tokio::test]
async fn test_production_runner_failure() {
    let runner = TokioProcessRunner;
    let output = runner.run(ProcessCommand::new("false")).await.unwrap();
    assert_eq!(output.status, ExitStatus::Error(1));
}

#[tokio::test]
async fn test_child_ignoring_stdin_keeps_its_stderr() {
    // Large enough to overflow the pipe buffer after the child is gone
    let input = "word ".repeat(1 << 20);
    let command = ProcessCommand::new("sh")
        .args(["-c", "echo 'Permission denied' >&2; exit 255"])
        .stdin(input);

    let output = TokioProcessRunner.run(command).await.unwrap();
    assert_eq!(output.status, ExitStatus::Error(255));
    assert_eq!(output.stderr.trim(), "Permission denied");
}

#[tokio::test]
async fn test_production_runner_command_not_found() {
    let runner = TokioProcessRunner;
    let command = ProcessCommand::new("nonexistent-command-12345");

    let result = runner.run(command).await;
    assert!(matches!(
        result.unwrap_err(),
        ProcessError::CommandNotFound(_)
    ));
}

#[tokio::test]
async fn test_production_runner_timeout() {
    let runner = TokioProcessRunner;
    let command = ProcessCommand::new("sleep")
        .args(["5"])
        .timeout(Some(Duration::from_millis(100)));

    let result = runner.run(command).await;
    assert!(matches!(result.unwrap_err(), ProcessError::Timeout(_)));
}

#[tokio::test]
async fn test_production_runner_drops_unlisted_environment() {
    std::env::set_var("WORDSHARD_TEST_SECRET", "leak");
    let command = ProcessCommand::new("sh").args(["-c", "echo \"[$WORDSHARD_TEST_SECRET]\""]);

    let output = TokioProcessRunner.run(command).await.unwrap();
    assert_eq!(output.stdout.trim(), "[]");
}

#[tokio::test]
async fn test_mock_runner_matches_scripts_in_order() {
    let mock = MockProcessRunner::new();
    mock.on("wordshard")
        .when(|cmd| cmd.stdin.as_deref().is_some_and(|s| s.contains("cat")))
        .stdout("{\"mode\":\"unique\",\"result\":[\"cat\"]}");
    mock.on("wordshard").exit(2, "bad payload");

    let cat = ProcessCommand::new("wordshard").args(["map"]).stdin("cat");
    let output = mock.run(cat).await.unwrap();
    assert!(output.stdout.contains("cat"));

    let dog = ProcessCommand::new("wordshard").args(["map"]).stdin("dog");
    let output = mock.run(dog).await.unwrap();
    assert_eq!(output.status, ExitStatus::Error(2));
    assert_eq!(output.stderr, "bad payload");

    assert_eq!(mock.call_count("wordshard"), 2);
    assert_eq!(mock.calls()[1].stdin.as_deref(), Some("dog"));
}

#[tokio::test]
async fn test_mock_runner_limit_and_unscripted() {
    let mock = MockProcessRunner::new();
    mock.on("ssh").limit(2).stdout("");

    for _ in 0..2 {
        assert!(mock.run(ProcessCommand::new("ssh")).await.is_ok());
    }

    let third = mock.run(ProcessCommand::new("ssh")).await;
    assert!(matches!(third.unwrap_err(), ProcessError::Unscripted(_)));
    assert_eq!(mock.call_count("ssh"), 3);
}

#[tokio::test]
async fn test_subprocess_manager_mock() {
    let (manager, mock) = SubprocessManager::mock();
    mock.on("ls").stdout("corpus.txt\n");

    let output = manager
        .runner()
        .run(ProcessCommand::new("ls"))
        .await
        .unwrap();

    assert_eq!(output.stdout, "corpus.txt\n");
}

#[test]
fn test_process_command_builder() {
    let command = ProcessCommand::new("ssh")
        .args(["-p", "22"])
        .args(vec!["node1".to_string()])
        .timeout(Some(Duration::from_secs(30)))
        .stdin("payload");

    assert_eq!(command.args, vec!["-p", "22", "node1"]);
    assert_eq!(command.timeout, Some(Duration::from_secs(30)));
    assert_eq!(command.stdin.as_deref(), Some("payload"));
}
