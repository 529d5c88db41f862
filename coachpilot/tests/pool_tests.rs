mod common;

use coachpilot::{AutomationError, RunStatus, RunSummary, SessionPool, UiAutomationPort};
use common::{FakeFactory, FakePort};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_sessions_are_isolated_bounded_and_ordered() {
    let factory = Arc::new(FakeFactory::new(|_session_id: &str| {
        let port = Arc::new(FakePort::new());
        port.element("#ok", "ok", "OK");
        Ok(port)
    }));

    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let job = {
        let running = running.clone();
        let peak = peak.clone();
        move |subject: String, port: Arc<dyn UiAutomationPort>| {
            let running = running.clone();
            let peak = peak.clone();
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;

                let mut summary = RunSummary::new(&subject, "scrape-checkin");
                if subject == "client-b" {
                    summary.failed("weight", "not reported");
                } else {
                    port.navigate("https://coach.test").await.unwrap();
                    summary.succeeded("weight");
                }
                running.fetch_sub(1, Ordering::SeqCst);
                summary
            }
        }
    };

    let subjects: Vec<String> = ["client-a", "client-b", "client-c", "client-d"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let outcomes = SessionPool::new(2, "scrape-checkin")
        .run(subjects.clone(), factory.clone(), job)
        .await;

    let order: Vec<&str> = outcomes.iter().map(|o| o.subject.as_str()).collect();
    assert_eq!(order, vec!["client-a", "client-b", "client-c", "client-d"]);
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(outcomes[1].summary.status(), RunStatus::Failure);
    assert_eq!(outcomes[0].summary.status(), RunStatus::Success);
    assert_eq!(outcomes[3].summary.status(), RunStatus::Success);

    let mut ids: Vec<String> = factory.opened.lock().unwrap().clone();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 4);

    let summaries: Vec<RunSummary> = outcomes.into_iter().map(|o| o.summary).collect();
    assert_eq!(RunSummary::aggregate_status(&summaries), RunStatus::Partial);
}

#[tokio::test]
async fn test_unopenable_session_only_aborts_its_subject() {
    let factory = Arc::new(FakeFactory::new(|_: &str| Ok(Arc::new(FakePort::new()))));
    let failing = Arc::new(FakeFactory::new(|_: &str| {
        Err(AutomationError::PlatformError("browser crashed".to_string()))
    }));

    let job = |subject: String, _port: Arc<dyn UiAutomationPort>| async move {
        let mut summary = RunSummary::new(subject, "build-program");
        summary.succeeded("workout Push A");
        summary
    };

    let ok = SessionPool::new(4, "build-program")
        .run(vec!["client-a".to_string()], factory, job)
        .await;
    assert_eq!(ok[0].summary.exit_code(), 0);
    assert!(!ok[0].session_id.is_empty());

    let broken = SessionPool::new(4, "build-program")
        .run(vec!["client-a".to_string(), "client-b".to_string()], failing, job)
        .await;
    assert_eq!(broken.len(), 2);
    for outcome in &broken {
        assert_eq!(outcome.summary.exit_code(), 1);
        assert!(outcome
            .summary
            .aborted
            .as_deref()
            .is_some_and(|r| r.contains("browser crashed")));
    }
}
