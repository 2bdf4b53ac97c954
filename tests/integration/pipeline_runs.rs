//! End-to-end pipeline runs against scripted collaborators

use super::test_utils::{date, harness, solid_png, stories, StaticFeed, SELECT_FIRST_SIX};
use ai_things_considered::composition::Layout;
use ai_things_considered::error::{PipelineError, SelectionError};
use ai_things_considered::output::Rotation;
use ai_things_considered::provider::MockImageGenerator;
use ai_things_considered::types::{ComicMetadata, PanelIndex};
use image::Rgb;
use std::time::Duration;
use tempfile::TempDir;

const TEAL: Rgb<u8> = Rgb([20, 140, 150]);

#[tokio::test]
async fn five_of_six_panels_publish_with_placeholder() {
    let dir = TempDir::new().unwrap();
    let h = harness(
        dir.path(),
        StaticFeed::new(stories(20)),
        SELECT_FIRST_SIX,
        MockImageGenerator::new(solid_png(TEAL)).always_fail("Story 04"),
    );

    let report = h.pipeline.run(date(16)).await.unwrap();

    assert_eq!(report.succeeded, 5);
    assert_eq!(report.rotation, Rotation::Advance);
    assert!(!report.panels[3].succeeded);
    assert_eq!(report.panels[3].attempts, 3);
    assert!(report.panels[3].last_error.is_some());

    let metadata: ComicMetadata =
        serde_json::from_slice(&std::fs::read(dir.path().join("2026-01-16.json")).unwrap())
            .unwrap();
    let panels: Vec<u8> = metadata.stories.iter().map(|s| s.panel.get()).collect();
    assert_eq!(panels, vec![1, 2, 3, 5, 6]);
    assert_eq!(metadata.image, "2026-01-16.png");

    let strip = image::open(dir.path().join("2026-01-16.png")).unwrap().to_rgb8();
    let layout = Layout::default();
    let center = |panel: u8| {
        let (x, y) = layout.cell_origin(PanelIndex::new(panel).unwrap());
        *strip.get_pixel(x + layout.panel_width / 2, y + layout.panel_height / 2)
    };
    assert_eq!(center(4), layout.placeholder);
    for panel in [1, 2, 3, 5, 6] {
        assert_eq!(center(panel), TEAL);
    }

    let title_band_inked = (0..layout.canvas_width()).any(|x| {
        (layout.margin..layout.margin + layout.date_offset)
            .any(|y| *strip.get_pixel(x, y) != layout.background)
    });
    assert!(title_band_inked);

    let web = image::open(dir.path().join("2026-01-16.jpg")).unwrap();
    assert_eq!(web.width(), 1000);
    assert!(report.written.contains(&dir.path().join("2026-01-16.jpg")));
}

#[tokio::test]
async fn three_of_six_panels_abort_without_touching_output() {
    let dir = TempDir::new().unwrap();

    // Seed a published history: day 14 then day 15
    for day in [14, 15] {
        let seed = harness(
            dir.path(),
            StaticFeed::new(stories(8)),
            SELECT_FIRST_SIX,
            MockImageGenerator::new(solid_png(Rgb([day as u8, 0, 0]))),
        );
        seed.pipeline.run(date(day)).await.unwrap();
    }
    let snapshot = |name: &str| std::fs::read(dir.path().join(name)).unwrap();
    let latest_json = snapshot("latest.json");
    let latest_1 = snapshot("latest-1.png");
    let latest_2 = snapshot("latest-2.png");

    let h = harness(
        dir.path(),
        StaticFeed::new(stories(8)),
        SELECT_FIRST_SIX,
        MockImageGenerator::new(solid_png(TEAL))
            .always_fail("Story 01")
            .always_fail("Story 03")
            .always_fail("Story 05"),
    );

    let err = h.pipeline.run(date(16)).await.unwrap_err();

    match err {
        PipelineError::Threshold {
            succeeded,
            required,
            panels,
            ..
        } => {
            assert_eq!(succeeded, 3);
            assert_eq!(required, 4);
            assert_eq!(panels.len(), 6);
            assert!(panels
                .iter()
                .filter(|p| !p.succeeded)
                .all(|p| p.attempts == 3 && p.last_error.is_some()));
        }
        other => panic!("expected threshold failure, got {}", other),
    }
    assert!(!dir.path().join("2026-01-16.png").exists());
    assert!(!dir.path().join("2026-01-16.json").exists());
    assert!(!dir.path().join("2026-01-16.jpg").exists());
    assert_eq!(snapshot("latest.json"), latest_json);
    assert_eq!(snapshot("latest-1.png"), latest_1);
    assert_eq!(snapshot("latest-2.png"), latest_2);
}

#[tokio::test]
async fn panel_recovers_on_third_attempt() {
    let dir = TempDir::new().unwrap();
    let h = harness(
        dir.path(),
        StaticFeed::new(stories(10)),
        "[2, 4, 6, 8, 10, 1]",
        MockImageGenerator::new(solid_png(TEAL)).fail_first("Story 06", 2),
    );

    let report = h.pipeline.run(date(16)).await.unwrap();

    assert_eq!(report.succeeded, 6);
    let third = &report.panels[2];
    assert_eq!(third.title, "Story 06");
    assert!(third.succeeded);
    assert_eq!(third.attempts, 3);
    assert_eq!(
        h.sleeper.delays(),
        vec![Duration::from_secs(2), Duration::from_secs(4)]
    );
    assert_eq!(h.images.calls().len(), 8);
}

#[tokio::test]
async fn feed_failure_aborts_run() {
    let dir = TempDir::new().unwrap();
    let h = harness(
        dir.path(),
        StaticFeed::failing("connection refused"),
        SELECT_FIRST_SIX,
        MockImageGenerator::new(solid_png(TEAL)),
    );

    let err = h.pipeline.run(date(16)).await.unwrap_err();

    assert!(matches!(err, PipelineError::Fetch(_)));
    assert!(h.reasoning.requests().is_empty());
    assert!(h.images.calls().is_empty());
}

#[tokio::test]
async fn malformed_selection_is_fatal_and_renders_nothing() {
    let dir = TempDir::new().unwrap();
    let h = harness(
        dir.path(),
        StaticFeed::new(stories(10)),
        "[1, 2, 3, 4, 5]",
        MockImageGenerator::new(solid_png(TEAL)),
    );

    let err = h.pipeline.run(date(16)).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Selection(SelectionError::Malformed(_))
    ));
    assert_eq!(h.reasoning.requests().len(), 1);
    assert!(h.images.calls().is_empty());
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn short_feed_is_a_selection_error() {
    let dir = TempDir::new().unwrap();
    let h = harness(
        dir.path(),
        StaticFeed::new(stories(4)),
        SELECT_FIRST_SIX,
        MockImageGenerator::new(solid_png(TEAL)),
    );

    let err = h.pipeline.run(date(16)).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Selection(SelectionError::NotEnoughStories { .. })
    ));
    assert!(h.reasoning.requests().is_empty());
}
