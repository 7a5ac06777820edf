//! Encode + infer latency for a single lead

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lead_scoring_core::model::{DecisionTree, Node};
use lead_scoring_core::{
    encode, Classifier, DecisionThreshold, Estimator, ModelArtifact, ModelWrapper, LEAD_SCHEMA,
};
use serde_json::{json, Map, Value};

fn sample_record() -> Map<String, Value> {
    json!({
        "age": 36,
        "website_visits": 4,
        "time_spent_on_website": 1240,
        "page_views_per_visit": 2.5,
        "current_occupation": "Student",
        "first_interaction": "Website",
        "profile_completed": "Medium",
        "last_activity": "Phone",
        "referral": "Yes"
    })
    .as_object()
    .cloned()
    .unwrap_or_default()
}

/// 100 stumps cycling over every column
fn forest() -> ModelWrapper {
    let names: Vec<String> = LEAD_SCHEMA
        .feature_names()
        .into_iter()
        .map(String::from)
        .collect();
    let trees = (0..100)
        .map(|i| DecisionTree {
            nodes: vec![
                Node::Split {
                    feature: i % names.len(),
                    threshold: 0.5,
                    left: 1,
                    right: 2,
                },
                Node::Leaf { value: 0.2 },
                Node::Leaf { value: 0.8 },
            ],
        })
        .collect();
    let artifact = ModelArtifact {
        format_version: 1,
        model_version: "bench".to_string(),
        schema_version: LEAD_SCHEMA.version().to_string(),
        feature_names: names,
        estimator: Estimator::RandomForest { trees },
    };
    ModelWrapper::from_artifact(artifact, &LEAD_SCHEMA, String::new())
        .unwrap_or_else(|e| panic!("bench artifact rejected: {e}"))
}

fn bench_validate_encode(c: &mut Criterion) {
    let record = sample_record();
    c.bench_function("validate_encode", |b| {
        b.iter(|| {
            let lead = LEAD_SCHEMA.validate(black_box(&record)).ok();
            lead.map(|l| encode(&l))
        });
    });
}

fn bench_score(c: &mut Criterion) {
    let record = sample_record();
    let model = forest();
    let features = LEAD_SCHEMA.validate(&record).map(|l| encode(&l)).ok();

    c.bench_function("infer_forest_100", |b| {
        b.iter(|| features.as_ref().map(|f| model.infer(black_box(f))));
    });

    c.bench_function("score_end_to_end", |b| {
        b.iter(|| {
            lead_scoring_core::score(
                &LEAD_SCHEMA,
                &model,
                DecisionThreshold::DEFAULT,
                black_box(&record),
            )
        });
    });
}

criterion_group!(benches, bench_validate_encode, bench_score);
criterion_main!(benches);
