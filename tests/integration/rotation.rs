//! Latest-view rotation across repeated and out-of-order runs

use super::test_utils::{date, harness, solid_png, stories, StaticFeed, SELECT_FIRST_SIX};
use ai_things_considered::output::{OutputManager, Rotation};
use ai_things_considered::provider::MockImageGenerator;
use image::Rgb;
use std::path::Path;
use tempfile::TempDir;

async fn run_day(dir: &Path, day: u32, shade: u8) -> Rotation {
    let h = harness(
        dir,
        StaticFeed::new(stories(8)),
        SELECT_FIRST_SIX,
        MockImageGenerator::new(solid_png(Rgb([shade, shade, shade]))),
    );
    h.pipeline.run(date(day)).await.unwrap().rotation
}

fn read(dir: &Path, name: &str) -> Vec<u8> {
    std::fs::read(dir.join(name)).unwrap()
}

#[tokio::test]
async fn same_date_twice_refreshes_in_place() {
    let dir = TempDir::new().unwrap();
    assert_eq!(run_day(dir.path(), 15, 10).await, Rotation::Advance);
    assert_eq!(run_day(dir.path(), 16, 20).await, Rotation::Advance);
    let latest_2_before = read(dir.path(), "latest-2.png");
    let first_strip = read(dir.path(), "2026-01-16.png");
    assert_eq!(latest_2_before, read(dir.path(), "2026-01-15.png"));

    assert_eq!(run_day(dir.path(), 16, 90).await, Rotation::RefreshInPlace);

    let second_strip = read(dir.path(), "2026-01-16.png");
    assert_ne!(first_strip, second_strip);
    assert_eq!(read(dir.path(), "latest-1.png"), second_strip);
    assert_eq!(read(dir.path(), "latest-2.png"), latest_2_before);
    assert_eq!(
        OutputManager::new(dir.path()).latest_date(),
        Some(date(16))
    );
}

#[tokio::test]
async fn regenerating_an_older_date_is_a_backfill() {
    let dir = TempDir::new().unwrap();
    run_day(dir.path(), 15, 10).await;
    run_day(dir.path(), 16, 20).await;
    let latest_1 = read(dir.path(), "latest-1.png");
    let latest_2 = read(dir.path(), "latest-2.png");

    assert_eq!(run_day(dir.path(), 12, 70).await, Rotation::Backfill);

    assert!(dir.path().join("2026-01-12.png").exists());
    assert_eq!(read(dir.path(), "latest-1.png"), latest_1);
    assert_eq!(read(dir.path(), "latest-2.png"), latest_2);

    let archive: Vec<String> = OutputManager::new(dir.path())
        .read_archive()
        .comics
        .into_iter()
        .map(|c| c.date)
        .collect();
    assert_eq!(archive, vec!["2026-01-16", "2026-01-15", "2026-01-12"]);
}
