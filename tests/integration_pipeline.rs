#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

//! End-to-end tests for the offline pipeline and the query path, using
//! in-process embedding and generation fakes.

use std::fs;

use tempfile::TempDir;

use chapter_rag::assistant::{Assistant, Session};
use chapter_rag::config::Config;
use chapter_rag::database::KnowledgeBase;
use chapter_rag::embeddings::EmbeddingProvider;
use chapter_rag::generation::TextGenerator;
use chapter_rag::indexer::{Indexer, build_knowledge_base, embed_document, flatten_embedded};
use chapter_rag::retriever::Retriever;
use chapter_rag::{RagError, Result};

const VOCABULARY: [&str; 4] = ["limit", "series", "matrix", "derivative"];

/// Bag-of-words embedder over a tiny fixed vocabulary
struct KeywordEmbedder;

impl EmbeddingProvider for KeywordEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let text = text.to_lowercase();
        Ok(VOCABULARY
            .iter()
            .map(|word| text.matches(word).count() as f32)
            .collect())
    }
}

/// Echoes the prompt length so tests can see that generation ran
struct EchoGenerator;

impl TextGenerator for EchoGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        Ok(format!("generated from {} characters", prompt.len()))
    }
}

const CORPUS: &str = r#"{
    "data": [
        {
            "chapter": "Limits",
            "start_page": 1,
            "end_page": 20,
            "content": "A limit describes the value a function approaches. Every limit is unique.",
            "subsections": [
                {"type": "Definition", "title": "Epsilon Delta", "start": 3, "content": "The formal limit definition."},
                {"type": "Example", "title": "Sequence", "content": "A series of terms whose limit exists."}
            ]
        },
        {
            "chapter": "Linear Algebra",
            "start_page": 21,
            "end_page": 40,
            "content": "A matrix is a grid of numbers. Matrix products compose maps.",
            "subsections": []
        },
        {
            "chapter": "Calculus",
            "content": "The derivative measures change. A derivative of a series is taken term by term."
        }
    ]
}"#;

fn setup() -> (Config, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config::load(temp_dir.path()).expect("should load default config");
    fs::write(config.corpus_path(), CORPUS).expect("should write corpus");
    (config, temp_dir)
}

#[test]
fn offline_pipeline_then_question() {
    let (config, _temp_dir) = setup();

    let (report, knowledge_base) = Indexer::new(&config, &KeywordEmbedder)
        .with_progress(false)
        .run()
        .expect("pipeline should succeed");

    assert!(report.failures.is_empty());
    assert_eq!(knowledge_base.len(), 5);
    assert_eq!(knowledge_base.dimension(), VOCABULARY.len());

    // A fresh process would load the stored files
    let loaded = KnowledgeBase::open(&config).expect("stored knowledge base should load");
    let assistant = Assistant::new(loaded, Box::new(KeywordEmbedder), Box::new(EchoGenerator))
        .with_top_k(2);
    let mut session = Session::new();

    let answer = assistant
        .answer(&mut session, "What is a matrix?")
        .expect("answer should be produced");

    assert_eq!(answer.sources[0].record.source_id, "linear_algebra");
    assert_eq!(answer.sources[0].record.start_page, Some(21));
    assert!(answer.explanation.starts_with("generated from"));
    assert!(answer.render().starts_with("### Explanation\n"));
    assert_eq!(session.questions().collect::<Vec<_>>(), vec!["What is a matrix?"]);
}

#[test]
fn metadata_file_has_external_layout() {
    let (config, _temp_dir) = setup();
    Indexer::new(&config, &KeywordEmbedder)
        .with_progress(false)
        .run()
        .expect("pipeline should succeed");

    let json: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(config.metadata_path()).expect("metadata should exist"),
    )
    .expect("metadata should be JSON");
    let records = json.as_array().expect("metadata should be an array");

    let ids: Vec<&str> = records
        .iter()
        .map(|r| r["source_id"].as_str().expect("source_id should be a string"))
        .collect();
    assert_eq!(
        ids,
        vec![
            "limits",
            "limits_definition_epsilon_delta",
            "limits_example_sequence",
            "linear_algebra",
            "calculus",
        ]
    );
    assert_eq!(records[1]["type"], "Definition");
    assert_eq!(records[1]["start"], 3);
    assert!(records[2]["start"].is_null());
    assert_eq!(records[0]["position_in_source"], 0);
    assert!(records[0]["content"].as_str().is_some_and(|c| c.contains("Every limit")));
}

#[test]
fn exact_match_scores_full_relevance() {
    let (config, _temp_dir) = setup();
    let report = embed_document(
        &chapter_rag::corpus::Document::load(&config.corpus_path()).expect("corpus should load"),
        &KeywordEmbedder,
        config.segmenting.max_segment_length,
    );
    let batch = flatten_embedded(&report.chapters);
    let knowledge_base =
        KnowledgeBase::build(&batch.vectors, batch.records).expect("knowledge base should build");

    let query = batch.vectors[3].clone();
    let results = Retriever::new(&knowledge_base)
        .retrieve(&query, 3)
        .expect("retrieve should succeed");

    assert_eq!(results[0].record.source_id, "linear_algebra");
    assert_eq!(results[0].relevance, 100.0);
    assert!(results.windows(2).all(|w| w[0].relevance >= w[1].relevance));
}

#[test]
fn missing_metadata_stops_serving() {
    let (config, _temp_dir) = setup();
    Indexer::new(&config, &KeywordEmbedder)
        .with_progress(false)
        .run()
        .expect("pipeline should succeed");
    fs::remove_file(config.metadata_path()).expect("should remove metadata");

    let error = KnowledgeBase::open(&config).expect_err("load should fail");

    assert!(matches!(error, RagError::MissingFile { .. }));
    assert!(error.is_fatal());
}

#[test]
fn build_requires_embeddings_file() {
    let (config, _temp_dir) = setup();

    let error = build_knowledge_base(&config).expect_err("build should fail");
    assert!(matches!(error, RagError::MissingFile { ref path } if *path == config.embeddings_path()));
}

#[test]
fn legacy_metadata_keys_are_accepted() {
    let (config, _temp_dir) = setup();
    Indexer::new(&config, &KeywordEmbedder)
        .with_progress(false)
        .run()
        .expect("pipeline should succeed");

    // Rewrite the metadata with the older `id` / `index` key names
    let legacy = fs::read_to_string(config.metadata_path())
        .expect("metadata should exist")
        .replace("\"source_id\"", "\"id\"")
        .replace("\"position_in_source\"", "\"index\"");
    fs::write(config.metadata_path(), legacy).expect("should rewrite metadata");

    let knowledge_base = KnowledgeBase::open(&config).expect("legacy metadata should load");
    assert_eq!(
        knowledge_base
            .metadata()
            .get(0)
            .map(|record| record.source_id.as_str()),
        Some("limits")
    );
}

#[test]
fn duplicate_chapters_are_rejected_before_embedding() {
    let (config, _temp_dir) = setup();
    let duplicate = r#"{"data": [
        {"chapter": "Same Title", "content": "one"},
        {"chapter": "same title", "content": "two"}
    ]}"#;
    fs::write(config.corpus_path(), duplicate).expect("should write corpus");

    let result = Indexer::new(&config, &KeywordEmbedder)
        .with_progress(false)
        .embed_corpus();

    assert!(matches!(result, Err(RagError::InvalidCorpus(_))));
    assert!(!config.embeddings_path().exists());
}
