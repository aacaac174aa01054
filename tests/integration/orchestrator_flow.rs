//! Orchestrator start-up staggering and per-account crash isolation.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use angler::config::{AccountProfile, AppConfig};
use angler::engine::orchestrator::Orchestrator;

const TWO_ACCOUNTS: &str = r#"
[orchestrator]
start_stagger_ms = 5000
account_restart_delay_ms = 60000

[[accounts]]
label = "alpha"
token = "token-a"

[[accounts]]
label = "beta"
token = "token-b"
is_5x = true
"#;

#[test]
fn test_orchestrator_requires_an_account() {
    let cfg = AppConfig::from_toml_str("").unwrap();
    assert!(Orchestrator::new(cfg).is_err());
}

#[test]
fn test_orchestrator_resolves_accounts_in_order() {
    let cfg = AppConfig::from_toml_str(TWO_ACCOUNTS).unwrap();
    let orchestrator = Orchestrator::new(cfg).unwrap();

    let labels: Vec<_> = orchestrator.accounts().iter().map(|p| p.label.as_str()).collect();
    assert_eq!(labels, vec!["alpha", "beta"]);
    assert!(!orchestrator.accounts()[0].settings.fishing.is_5x);
    assert!(orchestrator.accounts()[1].settings.fishing.is_5x);
}

#[tokio::test(start_paused = true)]
async fn test_staggered_start_and_isolated_restart() {
    let cfg = AppConfig::from_toml_str(TWO_ACCOUNTS).unwrap();
    let orchestrator = Orchestrator::new(cfg).unwrap();

    let started = Instant::now();
    let launches: Arc<Mutex<Vec<(String, u64)>>> = Arc::new(Mutex::new(Vec::new()));
    let log = launches.clone();
    let launch = move |profile: AccountProfile| {
        let log = log.clone();
        async move {
            let runs = {
                let mut log = log.lock().unwrap();
                log.push((profile.label.clone(), started.elapsed().as_secs()));
                log.iter().filter(|(label, _)| *label == profile.label).count()
            };
            if profile.label == "alpha" && runs == 1 {
                panic!("alpha crashed on first run");
            }
            std::future::pending::<()>().await;
            Ok::<(), anyhow::Error>(())
        }
    };

    let result = tokio::time::timeout(Duration::from_secs(200), orchestrator.run_with(launch)).await;
    assert!(result.is_err(), "supervisors should keep running");

    let launches = launches.lock().unwrap().clone();
    assert_eq!(
        launches,
        vec![
            ("alpha".to_string(), 0),
            ("beta".to_string(), 5),
            ("alpha".to_string(), 60),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_supervisor_crash_restarts_every_account() {
    let cfg = AppConfig::from_toml_str(TWO_ACCOUNTS).unwrap();
    let orchestrator = Orchestrator::new(cfg).unwrap();

    let started = Instant::now();
    let launches: Arc<Mutex<Vec<(String, u64)>>> = Arc::new(Mutex::new(Vec::new()));
    let log = launches.clone();
    // Panicking inside the launcher itself takes down the supervisor,
    // not just the account task.
    let launch = move |profile: AccountProfile| {
        let first = {
            let mut log = log.lock().unwrap();
            log.push((profile.label.clone(), started.elapsed().as_secs()));
            log.len() == 1
        };
        if first {
            panic!("launcher crashed");
        }
        async move {
            std::future::pending::<()>().await;
            Ok::<(), anyhow::Error>(())
        }
    };

    let result =
        tokio::time::timeout(Duration::from_secs(200), orchestrator.run_forever_with(launch)).await;
    assert!(result.is_err(), "orchestrator should keep running");

    // Alpha's supervisor dies at 0s and takes beta's pending start with
    // it; both accounts come back after the 60s restart delay.
    let launches = launches.lock().unwrap().clone();
    assert_eq!(
        launches,
        vec![
            ("alpha".to_string(), 0),
            ("alpha".to_string(), 60),
            ("beta".to_string(), 65),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_run_with_returns_when_a_supervisor_crashes() {
    let cfg = AppConfig::from_toml_str(TWO_ACCOUNTS).unwrap();
    let orchestrator = Orchestrator::new(cfg).unwrap();

    let launch = |_profile: AccountProfile| -> std::future::Ready<anyhow::Result<()>> {
        panic!("launcher crashed")
    };

    let result = tokio::time::timeout(Duration::from_secs(1), orchestrator.run_with(launch)).await;
    let run = result.expect("run_with should return promptly");
    assert!(run.is_err());
}
