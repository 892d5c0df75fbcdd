mod common;

use std::rc::Rc;

use common::{advance, runner, text, RecordingStage};
use slideshow_timeline_core::{FillMode, NodeType, RunnerState, Timeline};
use tokio::task::LocalSet;

fn load(name: &str) -> Timeline {
    let json = slideshow_test_fixtures::timelines::json(name).expect("load timeline fixture");
    Timeline::from_json(&json).expect("parse timeline fixture")
}

#[test]
fn every_fixture_parses() {
    let keys = slideshow_test_fixtures::timelines::keys();
    assert!(keys.len() >= 4);
    for key in keys {
        let timeline = load(&key);
        assert_eq!(timeline.is_playable(), key != "unplayable", "{key}");
    }
}

#[test]
fn fixtures_load_through_serde_directly() {
    let timeline: Timeline =
        slideshow_test_fixtures::timelines::load("click-reveal").expect("typed load");
    let root = timeline.root.get(&NodeType::Par).expect("root par");
    assert_eq!(root.len(), 1);
    assert!(slideshow_test_fixtures::timelines::path("click-reveal")
        .unwrap()
        .exists());
}

#[tokio::test(start_paused = true)]
async fn fly_in_step_plays_one_step_per_next() {
    LocalSet::new()
        .run_until(async {
            let stage = Rc::new(RecordingStage::for_fixture("fly-in-step"));
            let runner = runner(&stage, load("fly-in-step"));
            runner.start().unwrap();
            assert_eq!(runner.state(), RunnerState::Running);

            // Resting positions come from each shape's first keyframes.
            assert_eq!(
                stage.style_value("title", "transform"),
                Some(text("translateX(0px) translateY(756px)"))
            );
            assert_eq!(
                stage.style_value("subtitle", "transform"),
                Some(text("scaleX(0.5)"))
            );

            advance(1).await;
            assert_eq!(runner.pending_steps(), 2);
            assert!(stage.calls().is_empty());

            // Step 1: the title becomes visible and flies in.
            assert!(runner.next());
            advance(5).await;
            assert_eq!(stage.style_value("title", "visibility"), Some(text("visible")));
            assert!(stage.calls().is_empty());
            advance(10).await;
            let calls = stage.calls_for("title");
            assert_eq!(calls.len(), 1);
            assert_eq!(calls[0].keyframes.len(), 2);
            assert_eq!(
                calls[0].keyframes[0].props["transform"],
                text("translateX(0px) translateY(756px)")
            );
            assert_eq!(calls[0].options.duration, 500);
            assert_eq!(calls[0].options.fill, Some(FillMode::Forwards));

            // Step 2: the subtitle grows; the audio node is ignored.
            assert!(runner.next());
            advance(20).await;
            let calls = stage.calls_for("subtitle");
            assert_eq!(calls.len(), 1);
            assert_eq!(calls[0].keyframes[0].props["transform"], text("scaleX(0.5)"));
            assert_eq!(calls[0].keyframes[1].props["transform"], text("scaleX(1)"));
            assert_eq!(calls[0].options.duration, 300);

            assert!(!runner.next());
            advance(1000).await;
            assert!(runner.failures().is_empty());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn click_reveal_waits_for_the_button() {
    LocalSet::new()
        .run_until(async {
            let stage = Rc::new(RecordingStage::for_fixture("click-reveal"));
            let runner = runner(&stage, load("click-reveal"));
            runner.start().unwrap();
            assert_eq!(stage.style_value("panel", "transform"), Some(text("scaleY(0)")));

            advance(100).await;
            // The indefinite sibling defers to the click.
            assert!(!runner.next());
            assert_eq!(stage.style_value("button", "cursor"), Some(text("pointer")));

            let ev = stage.click("button");
            assert!(ev.propagation_stopped() && ev.default_prevented());
            advance(20).await;
            let calls = stage.calls_for("panel");
            assert_eq!(calls.len(), 1);
            assert_eq!(calls[0].keyframes[1].props["transform"], text("scaleY(1)"));
            assert_eq!(calls[0].options.fill, None);
            assert_eq!(stage.listener_count("button"), 0);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn begin_blink_repeats_three_times() {
    LocalSet::new()
        .run_until(async {
            let stage = Rc::new(RecordingStage::for_fixture("begin-blink"));
            let runner = runner(&stage, load("begin-blink"));
            runner.start().unwrap();
            advance(250).await;
            assert!(stage.writes_to("button").is_empty());
            advance(100).await;
            assert_eq!(stage.writes_to("button").len(), 1);
            advance(1000).await;
            assert_eq!(stage.writes_to("button").len(), 3);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn unplayable_fixture_stays_initial() {
    LocalSet::new()
        .run_until(async {
            let stage = Rc::new(RecordingStage::for_fixture("fly-in-step"));
            let runner = runner(&stage, load("unplayable"));
            runner.start().unwrap();
            advance(100).await;
            assert_eq!(runner.state(), RunnerState::Initial);
            assert!(stage.writes_to("title").is_empty());
        })
        .await;
}
