mod common;

use assert_fs::prelude::*;
use predicates::prelude::*;

use dishmatch::{AppError, Decision, Recognizer, DEFAULT_THRESHOLD};

use common::{embedder, png_bytes, solid_image, split_image};

const RED: [u8; 3] = [220, 30, 30];
const GREEN: [u8; 3] = [30, 200, 40];
const BLUE: [u8; 3] = [20, 40, 230];

fn open(temp: &assert_fs::TempDir) -> Recognizer {
    Recognizer::open(
        embedder(),
        &temp.path().join("templates_store"),
        &temp.path().join("threshold.json"),
        DEFAULT_THRESHOLD,
    )
    .unwrap()
}

#[test]
fn test_pizza_scenario() {
    let temp = assert_fs::TempDir::new().unwrap();
    let recognizer = open(&temp);
    let pizza = png_bytes(&solid_image(RED));

    let record = recognizer.add_template("pizza", "a.jpg", &pizza).unwrap();
    temp.child("templates_store/pizza/a.jpg").assert(predicate::path::exists());
    temp.child("templates_store/pizza/embeddings.json")
        .assert(predicate::str::contains("\"file\": \"a.jpg\""));

    let listing = recognizer.list_templates().unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing["pizza"], vec![record]);

    let prediction = recognizer.predict(&pizza, None).unwrap();
    match prediction.decision {
        Decision::Accepted(best) => {
            assert_eq!(best.dish, "pizza");
            assert!((best.score - 1.0).abs() < 1e-5);
        }
        other => panic!("expected acceptance, got {:?}", other),
    }

    recognizer.set_threshold(1.1).unwrap();
    let prediction = recognizer.predict(&pizza, None).unwrap();
    match prediction.decision {
        Decision::Rejected { best: Some(best) } => assert!((best.score - 1.0).abs() < 1e-5),
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[test]
fn test_embeddings_are_unit_length() {
    let temp = assert_fs::TempDir::new().unwrap();
    let recognizer = open(&temp);

    for (i, img) in [solid_image(RED), split_image(GREEN, BLUE), solid_image([128, 128, 128])]
        .iter()
        .enumerate()
    {
        let record = recognizer
            .add_template("misc", &format!("{}.png", i), &png_bytes(img))
            .unwrap();
        let norm = record.embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}

#[test]
fn test_predict_picks_closest_dish() {
    let temp = assert_fs::TempDir::new().unwrap();
    let recognizer = open(&temp);
    recognizer.set_threshold(0.0).unwrap();

    recognizer.add_template("pizza", "red.png", &png_bytes(&solid_image(RED))).unwrap();
    recognizer.add_template("salad", "green.png", &png_bytes(&solid_image(GREEN))).unwrap();
    recognizer.add_template("salad", "mixed.png", &png_bytes(&split_image(GREEN, BLUE))).unwrap();

    let query = png_bytes(&split_image(GREEN, [25, 190, 60]));
    let prediction = recognizer.predict(&query, Some(2)).unwrap();
    assert_eq!(prediction.decision.best().unwrap().dish, "salad");

    let candidates = prediction.candidates.unwrap();
    assert_eq!(candidates.len(), 2);
    assert!(candidates[0].score >= candidates[1].score);
}

#[test]
fn test_empty_store_rejects_at_any_threshold() {
    let temp = assert_fs::TempDir::new().unwrap();
    let recognizer = open(&temp);
    let query = png_bytes(&solid_image(RED));

    for threshold in [-1.0, 0.0, 0.7] {
        recognizer.set_threshold(threshold).unwrap();
        let prediction = recognizer.predict(&query, Some(3)).unwrap();
        assert_eq!(prediction.decision, Decision::Rejected { best: None });
        assert!(prediction.candidates.unwrap().is_empty());
    }
}

#[test]
fn test_delete_template_twice() {
    let temp = assert_fs::TempDir::new().unwrap();
    let recognizer = open(&temp);
    recognizer.add_template("pizza", "a.png", &png_bytes(&solid_image(RED))).unwrap();
    recognizer.add_template("pizza", "b.png", &png_bytes(&solid_image(BLUE))).unwrap();

    recognizer.remove_template("pizza", "a.png").unwrap();
    let after_first = recognizer.list_templates().unwrap();
    recognizer.remove_template("pizza", "a.png").unwrap();
    assert_eq!(recognizer.list_templates().unwrap(), after_first);

    temp.child("templates_store/pizza/a.png").assert(predicate::path::missing());
    assert!(recognizer.audit().unwrap().is_empty());
}

#[test]
fn test_remove_dish_and_not_found() {
    let temp = assert_fs::TempDir::new().unwrap();
    let recognizer = open(&temp);
    recognizer.add_template("pizza", "a.png", &png_bytes(&solid_image(RED))).unwrap();

    recognizer.remove_dish("pizza").unwrap();
    temp.child("templates_store/pizza").assert(predicate::path::missing());
    assert!(matches!(recognizer.remove_dish("pizza"), Err(AppError::NotFound(_))));
}

#[test]
fn test_bad_upload_leaves_store_untouched() {
    let temp = assert_fs::TempDir::new().unwrap();
    let recognizer = open(&temp);

    let err = recognizer.add_template("pizza", "a.jpg", b"definitely not a jpeg").unwrap_err();
    assert!(matches!(err, AppError::Image(_)));
    temp.child("templates_store/pizza").assert(predicate::path::missing());

    let err = recognizer
        .add_template("../escape", "a.png", &png_bytes(&solid_image(RED)))
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
    temp.child("escape").assert(predicate::path::missing());
}

#[test]
fn test_threshold_survives_reopen() {
    let temp = assert_fs::TempDir::new().unwrap();
    open(&temp).set_threshold(0.42).unwrap();
    assert_eq!(open(&temp).threshold(), 0.42);
}
