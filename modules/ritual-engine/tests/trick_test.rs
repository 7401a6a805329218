//! Tricks: identity steps that fence the following selection.

mod harness;

use ritual_engine::{
    fn_step, Board, BoardConfig, BoardError, CancellationToken, Registry, SelectionReason, Tag,
};

use harness::{finish, loud, no_tags, parse, trick_pipeline, Doc};

#[tokio::test]
async fn fence_resolves_to_best_match_then_routing_resumes() {
    let board = Board::new(trick_pipeline());
    let cancel = CancellationToken::new();

    let ritual = board
        .invoke_with::<String, String>("Hi".to_string(), ["style:quiet", "volume:low"], &cancel)
        .await
        .unwrap();

    assert_eq!(
        ritual.trail.names(),
        vec!["Parse", "Style", "Quiet", "Whisper", "Finish"]
    );
    assert_eq!(ritual.value, "<(hi)>");

    let reasons: Vec<_> = ritual.trail.steps.iter().map(|s| s.reason).collect();
    assert_eq!(
        reasons,
        vec![
            SelectionReason::RegistrationOrder,
            SelectionReason::TrickPreference,
            SelectionReason::ExplicitOverride,
            SelectionReason::CapabilityOverlap,
            SelectionReason::RegistrationOrder,
        ]
    );
}

#[tokio::test]
async fn injected_override_does_not_outlive_the_fence() {
    let board = Board::new(trick_pipeline());
    let cancel = CancellationToken::new();

    let ritual = board
        .invoke_with::<String, String>("Hi".to_string(), ["style:quiet"], &cancel)
        .await
        .unwrap();

    assert!(!ritual.tags.contains(&Tag::override_name("Quiet")));
    assert!(ritual.tags.contains(&Tag::observed("Style")));
}

#[tokio::test]
async fn caller_override_survives_a_fence_that_reused_it() {
    let board = Board::new(trick_pipeline());
    let cancel = CancellationToken::new();

    // `to:Style` wins first (lower index); the fence then forces Quiet with
    // a tag the caller already supplied.
    let ritual = board
        .invoke_with::<String, String>(
            "Hi".to_string(),
            ["to:Style", "to:Quiet", "style:quiet"],
            &cancel,
        )
        .await
        .unwrap();

    assert_eq!(
        ritual.trail.names(),
        vec!["Parse", "Style", "Quiet", "Whisper", "Finish"]
    );
    assert!(ritual.tags.contains(&Tag::override_name("Quiet")));
}

#[tokio::test]
async fn fence_excludes_handlers_outside_it() {
    // Whisper outscores both fenced handlers but only runs once the fence
    // is spent.
    let board = Board::new(trick_pipeline());
    let cancel = CancellationToken::new();

    let ritual = board
        .invoke_with::<String, String>(
            "Hi".to_string(),
            ["style:quiet", "volume:low", "style:loud"],
            &cancel,
        )
        .await
        .unwrap();

    let names = ritual.trail.names();
    assert_eq!(names[1], "Style");
    assert_eq!(names[2], "Loud");
    assert_eq!(names[3], "Whisper");
}

#[tokio::test]
async fn fence_without_overlap_falls_to_the_first_fenced_handler() {
    let board = Board::new(trick_pipeline());

    let cancel = CancellationToken::new();
    let ritual = board
        .invoke_with::<String, String>("Hi".to_string(), no_tags(), &cancel)
        .await
        .unwrap();

    assert_eq!(ritual.trail.names(), vec!["Parse", "Style", "Loud", "Finish"]);
    assert_eq!(ritual.value, "<HI>");
}

#[tokio::test]
async fn trick_preference_can_be_disabled() {
    let config = BoardConfig::builder().prefer_tricks(false).build();
    let board = Board::new(trick_pipeline()).with_config(config);
    let cancel = CancellationToken::new();

    let ritual = board
        .invoke_with::<String, String>("Hi".to_string(), ["style:quiet", "volume:low"], &cancel)
        .await
        .unwrap();

    assert_eq!(ritual.trail.names(), vec!["Parse", "Whisper", "Finish"]);
}

#[tokio::test]
async fn explicit_override_outranks_trick_preference() {
    let board = Board::new(trick_pipeline());
    let cancel = CancellationToken::new();

    let ritual = board
        .invoke_with::<String, String>("Hi".to_string(), ["to:Finish"], &cancel)
        .await
        .unwrap();

    assert_eq!(ritual.trail.names(), vec!["Parse", "Finish"]);
}

#[tokio::test]
async fn trick_is_not_preferred_on_the_first_step() {
    let builder = Registry::builder()
        .step("Shout", fn_step(|s: String, _cx| Ok(s.to_uppercase())), no_tags())
        .trick::<String>("Gate", ["Parse"]);
    let board = Board::new(parse(builder).build());
    let cancel = CancellationToken::new();

    let ritual = board
        .invoke_with::<String, Doc>("Hi".to_string(), no_tags(), &cancel)
        .await
        .unwrap();

    assert_eq!(ritual.trail.names(), vec!["Shout", "Gate", "Parse"]);
    assert_eq!(ritual.value, Doc::new("HI"));
    let reasons: Vec<_> = ritual.trail.steps.iter().map(|s| s.reason).collect();
    assert_eq!(
        reasons,
        vec![
            SelectionReason::RegistrationOrder,
            SelectionReason::TrickPreference,
            SelectionReason::ExplicitOverride,
        ]
    );
}

#[tokio::test]
async fn unknown_fence_candidate_fails_compilation() {
    let builder = loud(parse(Registry::builder())).trick::<Doc>("Style", ["Loud", "Nope"]);
    let board = Board::new(finish(builder).build());

    let err = board
        .invoke::<String, String>("Hi".to_string(), no_tags())
        .await
        .err()
        .unwrap();

    match err {
        BoardError::UnknownFenceCandidate { trick, candidate } => {
            assert_eq!(trick, "Style");
            assert_eq!(candidate, "Nope");
        }
        other => panic!("expected UnknownFenceCandidate, got {other}"),
    }
}
