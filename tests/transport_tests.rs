//! End-to-end jobs over the process, ssh and http transports

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use wordshard::config::JobConfig;
use wordshard::corpus::Corpus;
use wordshard::job::Job;
use wordshard::reduce::FinalResult;
use wordshard::server::{router, ServerState};
use wordshard::subprocess::SubprocessManager;
use wordshard::tokenizer::TokenPolicy;

fn binary() -> PathBuf {
    assert_cmd::cargo::cargo_bin("wordshard")
}

fn words(list: &[&str]) -> FinalResult {
    FinalResult::Unique(list.iter().map(|s| s.to_string()).collect())
}

fn job(toml: &str) -> Job {
    let config = JobConfig::from_toml(toml).unwrap();
    config.validate().unwrap();
    Job::new(config, SubprocessManager::production())
}

#[tokio::test]
async fn test_command_workers_run_the_map_subcommand() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.txt");
    let output = dir.path().join("out.json");
    fs::write(&input, "b a b c b a").unwrap();

    let job = job(&format!(
        r#"
[[workers]]
kind = "command"
program = {program:?}
args = ["map"]

[[workers]]
kind = "local"

[[workers]]
kind = "command"
program = {program:?}
args = ["map"]
"#,
        program = binary().display().to_string()
    ));

    job.run(TokenPolicy::Frequency, &input, &output).await.unwrap();

    assert_eq!(
        fs::read_to_string(&output).unwrap(),
        "{\n  \"b\": 3,\n  \"a\": 2,\n  \"c\": 1\n}"
    );
}

#[tokio::test]
async fn test_command_workers_read_file_ranges() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.txt");
    fs::write(&input, "zebra apple mango apple kiwi zebra").unwrap();

    let job = job(&format!(
        r#"
window_size = 2

[[workers]]
kind = "command"
program = {program:?}
args = ["map"]

[[workers]]
kind = "command"
program = {program:?}
args = ["map"]
"#,
        program = binary().display().to_string()
    ));

    let corpus = Corpus::open(&input).await.unwrap();
    let result = job.execute(TokenPolicy::Unique, &corpus).await.unwrap();
    assert_eq!(result, words(&["apple", "kiwi", "mango", "zebra"]));
}

#[tokio::test]
async fn test_failing_command_worker_fails_job() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.txt");
    let output = dir.path().join("out.json");
    fs::write(&input, "a b c").unwrap();

    let job = job(&format!(
        r#"
[[workers]]
kind = "local"

[[workers]]
kind = "command"
program = {program:?}
args = ["no-such-subcommand"]
"#,
        program = binary().display().to_string()
    ));

    let err = job
        .run(TokenPolicy::Frequency, &input, &output)
        .await
        .unwrap_err();
    assert!(err.is_worker_failure());
    assert!(err.to_string().contains("command-1"));
    assert!(!output.exists());
}

/// Stands in for `ssh`: drops every option and runs the remote command locally.
#[cfg(unix)]
fn fake_ssh(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-ssh");
    let script = r#"#!/bin/sh
while [ "$#" -gt 0 ]; do
  if [ "$1" = "--" ]; then shift; break; fi
  shift
done
exec /bin/sh -c "$1"
"#;
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(unix)]
#[tokio::test]
async fn test_ssh_workers_sharing_a_host() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.txt");
    fs::write(&input, "one two three four five six seven eight").unwrap();

    let job = job(&format!(
        r#"
[ssh]
program = {ssh:?}
control_dir = {control:?}
remote_command = [{program:?}, "map"]

[[workers]]
kind = "ssh"
host = "node1"

[[workers]]
kind = "ssh"
host = "node1"

[[workers]]
kind = "ssh"
host = "node2"
user = "me"
port = 2222
"#,
        ssh = fake_ssh(dir.path()).display().to_string(),
        control = dir.path().display().to_string(),
        program = binary().display().to_string()
    ));

    let corpus = Corpus::open(&input).await.unwrap();
    let result = job.execute(TokenPolicy::Unique, &corpus).await.unwrap();
    assert_eq!(
        result,
        words(&["eight", "five", "four", "one", "seven", "six", "three", "two"])
    );
}

#[tokio::test]
async fn test_http_workers_against_in_process_server() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(ServerState::text_only())).await.unwrap();
    });

    let job = job(&format!(
        r#"
worker_timeout = "10s"

[[workers]]
kind = "http"
url = "http://{addr}"

[[workers]]
kind = "http"
url = "http://{addr}"
"#
    ));

    let result = job
        .execute(TokenPolicy::Frequency, &Corpus::from_text("Go go GO stop"))
        .await
        .unwrap();
    assert_eq!(
        result,
        FinalResult::Frequency(vec![("go".to_string(), 3), ("stop".to_string(), 1)])
    );
}

#[tokio::test]
async fn test_unique_file_job_sends_text_to_http_workers() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(ServerState::text_only())).await.unwrap();
    });

    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.txt");
    fs::write(&input, "one two three four five six").unwrap();

    let job = job(&format!(
        r#"
window_size = 4

[[workers]]
kind = "http"
url = "http://{addr}"

[[workers]]
kind = "http"
url = "http://{addr}"

[[workers]]
kind = "local"
"#
    ));

    let corpus = Corpus::open(&input).await.unwrap();
    let result = job.execute(TokenPolicy::Unique, &corpus).await.unwrap();
    assert_eq!(result, words(&["five", "four", "one", "six", "three", "two"]));
}
