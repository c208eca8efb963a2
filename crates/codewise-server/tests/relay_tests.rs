//! Relay tests: a stub analyzer behind the controller and a broker session
//! standing in for the WebSocket client.

mod common;

use codewise_server::identity::{IdentityContext, Principal};
use codewise_server::relay::{AnalyzeMessage, RelayOutcome};
use codewise_server::stomp::Command;
use database::models::NewUser;
use database::{result, submission, user};
use serde_json::Value;

use common::*;

fn analyze(code: &str, language: &str) -> AnalyzeMessage {
    serde_json::from_value(serde_json::json!({"code": code, "language": language})).unwrap()
}

fn principal(email: &str) -> Principal {
    Principal {
        email: email.to_string(),
    }
}

fn body(frame: &codewise_server::stomp::Frame) -> Value {
    serde_json::from_str(&frame.body).unwrap()
}

#[tokio::test]
async fn test_successful_analysis_is_persisted_then_delivered() {
    let analyzer = StubAnalyzer::ok("Prints a constant");
    let state = test_state(analyzer.clone()).await;
    let owner = user::create_user(state.db.pool(), &NewUser::with_password("a@x.com", "h"))
        .await
        .unwrap();

    let mut rx = state.broker.register("s1", Some("a@x.com".into())).await;
    state
        .broker
        .subscribe("s1", "sub-0", "/user/queue/result")
        .await
        .unwrap();

    let ctx = IdentityContext::authenticated("s1", principal("a@x.com"));
    let outcome = state
        .relay
        .dispatch(ctx, analyze("print(1)", "python"))
        .await
        .unwrap();

    let (submission_id, result_id) = match outcome {
        RelayOutcome::Delivered {
            submission_id,
            result_id,
        } => (submission_id, result_id),
        other => panic!("unexpected outcome: {other:?}"),
    };

    let submissions = submission::list_submissions_for_user(state.db.pool(), owner.id)
        .await
        .unwrap();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].id, submission_id);
    assert_eq!(submissions[0].code, "print(1)");

    let stored = result::find_result_by_submission(state.db.pool(), submission_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.result.id, result_id);
    assert_eq!(stored.result.score, Some(84));

    let frame = rx.try_recv().unwrap();
    assert_eq!(frame.command, Command::Message);
    assert_eq!(frame.header("destination"), Some("/user/queue/result"));
    let delivered = body(&frame);
    assert_eq!(delivered["summary"], stored.result.summary.as_str());
    assert_eq!(delivered["suggestions"], stored.result.suggestions.as_str());
    assert_eq!(delivered["submissionId"], submission_id);
    assert!(rx.try_recv().is_err());

    let seen = analyzer.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].language, "python");
}

#[tokio::test]
async fn test_analyzer_failure_delivers_error_without_persisting() {
    let state = test_state(StubAnalyzer::failing("model overloaded")).await;
    let owner = user::create_user(state.db.pool(), &NewUser::with_password("a@x.com", "h"))
        .await
        .unwrap();
    let mut rx = state.broker.register("s1", Some("a@x.com".into())).await;
    state
        .broker
        .subscribe("s1", "sub-0", "/user/queue/result")
        .await
        .unwrap();

    let outcome = state
        .relay
        .dispatch(
            IdentityContext::authenticated("s1", principal("a@x.com")),
            analyze("x", "go"),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, RelayOutcome::AnalyzerFailed(ref m) if m.contains("model overloaded")));

    let delivered = body(&rx.try_recv().unwrap());
    assert!(delivered["error"].as_str().unwrap().contains("model overloaded"));
    assert!(submission::list_submissions_for_user(state.db.pool(), owner.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_storage_failure_still_delivers_report() {
    let state = test_state(StubAnalyzer::ok("Looks fine")).await;
    // Principal without an account: the save cannot find an owner.
    let mut rx = state.broker.register("s1", Some("ghost@x.com".into())).await;
    state
        .broker
        .subscribe("s1", "sub-0", "/user/queue/result")
        .await
        .unwrap();

    let outcome = state
        .relay
        .dispatch(
            IdentityContext::authenticated("s1", principal("ghost@x.com")),
            analyze("x", "go"),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, RelayOutcome::StorageFailed(_)));

    let delivered = body(&rx.try_recv().unwrap());
    assert!(delivered["error"].as_str().unwrap().contains("storage failed"));
    assert_eq!(delivered["result"]["summary"], "Looks fine");
}

#[tokio::test]
async fn test_anonymous_session_gets_delivery_only() {
    let state = test_state(StubAnalyzer::ok("Anonymous ok")).await;
    let mut anon = state.broker.register("anon-1", None).await;
    let mut bystander = state.broker.register("anon-2", None).await;
    for s in ["anon-1", "anon-2"] {
        state
            .broker
            .subscribe(s, "r", "/user/queue/result")
            .await
            .unwrap();
    }

    let outcome = state
        .relay
        .dispatch(IdentityContext::anonymous("anon-1"), analyze("x", "go"))
        .await
        .unwrap();
    assert_eq!(outcome, RelayOutcome::DeliveredWithoutPersistence);

    let delivered = body(&anon.try_recv().unwrap());
    assert_eq!(delivered["summary"], "Anonymous ok");
    assert!(delivered.get("submissionId").is_none());
    assert!(bystander.try_recv().is_err());
    assert_eq!(user::count_users(state.db.pool()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_concurrent_requests_each_get_a_result() {
    let state = test_state(StubAnalyzer::ok("ok")).await;
    user::create_user(state.db.pool(), &NewUser::with_password("a@x.com", "h"))
        .await
        .unwrap();
    let mut rx = state.broker.register("s1", Some("a@x.com".into())).await;
    state
        .broker
        .subscribe("s1", "sub-0", "/user/queue/result")
        .await
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            state.relay.dispatch(
                IdentityContext::authenticated("s1", principal("a@x.com")),
                analyze(&format!("print({i})"), "python"),
            )
        })
        .collect();
    for handle in handles {
        assert!(matches!(handle.await.unwrap(), RelayOutcome::Delivered { .. }));
    }

    let mut submission_ids: Vec<i64> = (0..4)
        .map(|_| body(&rx.try_recv().unwrap())["submissionId"].as_i64().unwrap())
        .collect();
    submission_ids.sort_unstable();
    submission_ids.dedup();
    assert_eq!(submission_ids.len(), 4);
}

#[tokio::test]
async fn test_undecodable_message_is_reported_to_caller() {
    let state = test_state(StubAnalyzer::ok("unused")).await;
    let mut rx = state.broker.register("s1", None).await;
    state
        .broker
        .subscribe("s1", "r", "/user/queue/result")
        .await
        .unwrap();

    let outcome = state
        .relay
        .reject(&IdentityContext::anonymous("s1"), "missing field `code`")
        .await;
    assert!(matches!(outcome, RelayOutcome::Rejected(_)));
    let delivered = body(&rx.try_recv().unwrap());
    assert!(delivered["error"].as_str().unwrap().contains("missing field"));
}
