//! Pull mode: one step per call, state carried by the caller.

mod harness;

use ritual_engine::{
    fn_step, Board, BoardError, CancellationToken, PullRequest, PullState, Registry,
    SelectionReason, Tag,
};

use harness::{finish, no_tags, parse, pipeline, trick_pipeline, Doc};

#[tokio::test]
async fn each_call_executes_exactly_one_step() {
    let board = Board::new(pipeline());
    let driver = board.pull_driver::<String>();

    let first = driver.advance(PullRequest::new(" Hi ".to_string())).await.unwrap();
    let step = first.step.as_ref().unwrap();
    assert_eq!(step.name, "Parse");
    assert!(!first.is_final);
    assert_eq!(first.state.steps, 1);
    assert_eq!(first.output.downcast_ref::<Doc>(), Some(&Doc::new("Hi")));

    let second = driver.advance(first.into_request()).await.unwrap();
    assert_eq!(second.step.as_ref().unwrap().name, "Finish");
    assert!(second.is_final);
    assert_eq!(second.state.steps, 2);
    assert_eq!(second.output.downcast_ref::<String>().unwrap(), "<Hi>");
}

#[tokio::test]
async fn persisted_tags_carry_fresh_hints_but_no_observations() {
    let board = Board::new(pipeline());
    let driver = board.pull_driver::<String>();

    let request = PullRequest::new("Hi".to_string()).with_tags(["style:loud"]);
    let first = driver.advance(request).await.unwrap();

    let tags = &first.state.tags;
    assert!(tags.contains(&Tag::new("style:loud")));
    assert!(tags.contains(&Tag::hint("Loud")));
    assert!(tags.contains(&Tag::hint("Quiet")));
    assert!(tags.contains(&Tag::hint("Finish")));
    assert!(!tags.iter().any(Tag::is_observation));

    let second = driver.advance(first.into_request()).await.unwrap();
    assert_eq!(second.step.as_ref().unwrap().name, "Loud");

    // Loud's output is still a Doc: the same hints are fresh again.
    assert!(second.state.tags.contains(&Tag::hint("Finish")));
    assert!(!second.state.tags.iter().any(Tag::is_observation));
}

#[tokio::test]
async fn stale_hints_are_dropped() {
    let board = Board::new(pipeline());
    let driver = board.pull_driver::<String>();

    let first = driver.advance(PullRequest::new("Hi".to_string())).await.unwrap();
    let second = driver.advance(first.into_request()).await.unwrap();

    assert_eq!(second.step.as_ref().unwrap().name, "Finish");
    let tags = &second.state.tags;
    assert!(tags.contains(&Tag::hint("Parse")));
    assert!(!tags.contains(&Tag::hint("Loud")));
    assert!(!tags.contains(&Tag::hint("Finish")));
}

#[tokio::test]
async fn caller_tags_steer_the_next_step() {
    let board = Board::new(pipeline());
    let driver = board.pull_driver::<String>();

    let first = driver.advance(PullRequest::new("Hi".to_string())).await.unwrap();
    let request = first.into_request().with_tags(["to:Quiet"]);
    let second = driver.advance(request).await.unwrap();

    let step = second.step.as_ref().unwrap();
    assert_eq!(step.name, "Quiet");
    assert_eq!(step.reason, SelectionReason::ExplicitOverride);
    assert!(!second.is_final);
}

#[tokio::test]
async fn end_kind_is_not_final_while_a_later_handler_admits_it() {
    let registry = Registry::builder()
        .step("Trim", fn_step(|s: String, _cx| Ok(s.trim().to_string())), no_tags())
        .step("Exclaim", fn_step(|s: String, _cx| Ok(format!("{s}!"))), ["loud"])
        .build();
    let board = Board::new(registry);
    let driver = board.pull_driver::<String>();

    let first = driver.advance(PullRequest::new(" hi ".to_string())).await.unwrap();
    assert_eq!(first.step.as_ref().unwrap().name, "Trim");
    assert!(!first.is_final);

    let second = driver
        .advance(first.into_request().with_tags(["loud"]))
        .await
        .unwrap();
    assert_eq!(second.step.as_ref().unwrap().name, "Exclaim");
    assert!(second.is_final);
    assert_eq!(second.output.downcast_ref::<String>().unwrap(), "hi!");
}

#[tokio::test]
async fn nothing_eligible_on_the_end_kind_is_final() {
    let board = Board::new(finish(Registry::builder()).build());
    let driver = board.pull_driver::<String>();

    let response = driver.advance(PullRequest::new("done".to_string())).await.unwrap();

    assert!(response.is_final);
    assert!(response.step.is_none());
    assert_eq!(response.state.steps, 0);
    assert_eq!(response.output.downcast_ref::<String>().unwrap(), "done");
}

#[tokio::test]
async fn nothing_eligible_on_another_kind_is_routing_exhausted() {
    let board = Board::new(finish(Registry::builder()).build());
    let driver = board.pull_driver::<String>();

    let err = driver.advance(PullRequest::new(7u32)).await.err().unwrap();
    assert!(matches!(err, BoardError::RoutingExhausted { .. }), "{err}");
}

#[tokio::test]
async fn parked_state_resumes_after_serialization() {
    let board = Board::new(pipeline());
    let driver = board.pull_driver::<String>();

    let request = PullRequest::new("Hi".to_string()).with_tags(["style:quiet"]);
    let first = driver.advance(request).await.unwrap();
    let ritual = first.state.ritual;

    let json = serde_json::to_string(&first.state).unwrap();
    let parked: PullState = serde_json::from_str(&json).unwrap();
    assert_eq!(parked, first.state);

    let doc = first.output.downcast::<Doc>().ok().unwrap();
    let second = driver.advance(PullRequest::resume(doc, parked)).await.unwrap();

    assert_eq!(second.step.as_ref().unwrap().name, "Quiet");
    assert_eq!(second.state.ritual, ritual);
}

#[tokio::test]
async fn failed_step_leaves_earlier_state_usable() {
    let builder = parse(Registry::builder()).step(
        "Flaky",
        fn_step(|_: Doc, _cx| -> anyhow::Result<Doc> { anyhow::bail!("upstream timeout") }),
        ["flaky"],
    );
    let board = Board::new(finish(builder).build());
    let driver = board.pull_driver::<String>();

    let first = driver.advance(PullRequest::new("Hi".to_string())).await.unwrap();
    let parked = first.state.clone();

    let err = driver
        .advance(first.into_request().with_tags(["flaky"]))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, BoardError::Handler { .. }), "{err}");

    let retry = driver
        .advance(PullRequest::resume(Doc::new("Hi"), parked))
        .await
        .unwrap();
    assert_eq!(retry.step.as_ref().unwrap().name, "Finish");
    assert!(retry.is_final);
}

#[tokio::test]
async fn fence_survives_between_calls() {
    let board = Board::new(trick_pipeline());
    let driver = board.pull_driver::<String>();

    let request = PullRequest::new("Hi".to_string()).with_tags(["style:quiet"]);
    let parsed = driver.advance(request).await.unwrap();

    let fenced = driver.advance(parsed.into_request()).await.unwrap();
    assert_eq!(fenced.step.as_ref().unwrap().name, "Style");
    let fence = fenced.state.fence.as_ref().unwrap();
    assert_eq!(fence.forced(), Some(3));
    assert!(fenced.state.tags.contains(&Tag::override_name("Quiet")));

    let json = serde_json::to_string(&fenced.state).unwrap();
    let state: PullState = serde_json::from_str(&json).unwrap();
    let doc = fenced.output.downcast::<Doc>().ok().unwrap();

    let resolved = driver.advance(PullRequest::resume(doc, state)).await.unwrap();
    let step = resolved.step.as_ref().unwrap();
    assert_eq!(step.name, "Quiet");
    assert_eq!(step.reason, SelectionReason::ExplicitOverride);
    assert!(resolved.state.fence.is_none());
    assert!(!resolved.state.tags.contains(&Tag::override_name("Quiet")));
}

#[tokio::test]
async fn cancelled_pull_step_reports_cancellation() {
    let board = Board::new(pipeline());
    let driver = board.pull_driver::<String>();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = driver
        .advance_with(PullRequest::new("Hi".to_string()), &cancel)
        .await
        .err()
        .unwrap();
    assert!(err.is_cancelled());
}
