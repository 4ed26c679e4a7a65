//! Indexing, retrieval and grounded answering over a small handbook

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use common::{FLOOD_DOC, KeywordEmbedder, RecordingGenerator, keyword_index, single_page_pdf};
use handbook_assistant::config::Config;
use handbook_assistant::config::file::HandbookConfigFile;
use handbook_assistant::daemon::{build_index, configure_embedder};
use handbook_assistant::rag::{
    Chunker, DocumentIndex, DocumentIndexer, Embeds, RetrievalResult, Retriever, TextChunk,
    load_document,
};
use handbook_assistant::{AnswerGenerator, Error, StartupStep};

#[tokio::test]
async fn test_index_is_deterministic() {
    let first = keyword_index(FLOOD_DOC, Arc::new(KeywordEmbedder::default())).await;
    let second = keyword_index(FLOOD_DOC, Arc::new(KeywordEmbedder::default())).await;

    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
    assert_eq!(first.dimension(), 7);
    assert_eq!(
        first.chunk(0).map(|c| c.text.as_str()),
        Some("Flood damage is covered under Section 4.")
    );
    assert_eq!(
        first.chunk(1).map(|c| c.text.as_str()),
        Some("Fire damage is covered under Section 7.")
    );
}

#[tokio::test]
async fn test_best_chunk_is_selected() {
    let embedder = Arc::new(KeywordEmbedder::default());
    let index = keyword_index(FLOOD_DOC, Arc::clone(&embedder)).await;
    let retriever = Retriever::new(Arc::new(index), embedder);

    let result = retriever.search("Is flood damage covered?").await.unwrap();

    let RetrievalResult::Match(scored) = result else {
        panic!("expected a match, got {result:?}");
    };
    assert_eq!(scored.chunk.index, 0);
    // 3 shared terms over |q| = sqrt(3), |c| = 2
    assert!((scored.score - 0.866).abs() < 0.001);
}

#[tokio::test]
async fn test_unrelated_query_is_no_match() {
    let embedder = Arc::new(KeywordEmbedder::default());
    let index = keyword_index(FLOOD_DOC, Arc::clone(&embedder)).await;
    let retriever = Retriever::new(Arc::new(index), embedder);

    let result = retriever
        .search("What is the capital of France?")
        .await
        .unwrap();

    assert_eq!(result, RetrievalResult::NoMatch { best_score: Some(0.0) });
}

#[tokio::test]
async fn test_threshold_is_configurable() {
    let embedder = Arc::new(KeywordEmbedder::default());
    let index = keyword_index(FLOOD_DOC, Arc::clone(&embedder)).await;
    let retriever = Retriever::new(Arc::new(index), embedder).with_threshold(0.9);

    let result = retriever.search("Is flood damage covered?").await.unwrap();

    assert!(!result.is_match());
    let best = result.score().unwrap();
    assert!((best - 0.866).abs() < 0.001);
}

#[test]
fn test_ties_keep_the_earliest_chunk() {
    let chunks = vec![
        TextChunk {
            index: 0,
            text: "Water damage from burst pipes.".to_string(),
        },
        TextChunk {
            index: 1,
            text: "Damage from burst water pipes.".to_string(),
        },
    ];
    let index = DocumentIndex::new(chunks, vec![vec![0.6, 0.8], vec![0.6, 0.8]]).unwrap();
    let retriever = Retriever::new(Arc::new(index), Arc::new(KeywordEmbedder::default()));

    let result = retriever.rank(&[0.6, 0.8]);

    assert_eq!(result.chunk().map(|c| c.index), Some(0));
}

#[tokio::test]
async fn test_cached_index_skips_embedding() {
    let dir = tempfile::tempdir().unwrap();

    let embedder = Arc::new(KeywordEmbedder::default());
    let indexer = DocumentIndexer::new(embedder.clone(), Chunker::new(45, 0))
        .with_cache_dir(Some(dir.path().to_path_buf()));

    let built = indexer.build(FLOOD_DOC).await.unwrap();
    let calls = embedder.calls.load(Ordering::SeqCst);
    assert_eq!(calls, 2);

    let loaded = indexer.build(FLOOD_DOC).await.unwrap();
    assert_eq!(loaded, built);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), calls);

    // A changed document misses the cache
    indexer
        .build("Theft is covered under Section 9.")
        .await
        .unwrap();
    assert_eq!(embedder.calls.load(Ordering::SeqCst), calls + 1);
}

#[tokio::test]
async fn test_missing_document_fails_at_loading_step() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::from_sources(HandbookConfigFile::default(), |_| None).unwrap();
    config.document_path = dir.path().join("missing.txt");

    let err = build_index(&config, Arc::new(KeywordEmbedder::default()))
        .await
        .unwrap_err();

    assert_eq!(err.startup_step(), Some(StartupStep::LoadingDocument));
}

#[tokio::test]
async fn test_blank_document_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("handbook.txt");
    std::fs::write(&path, "  \n\n ").unwrap();

    let indexer = DocumentIndexer::new(Arc::new(KeywordEmbedder::default()), Chunker::new(500, 50));
    let err = indexer.build_from_file(&path).await.unwrap_err();

    assert!(matches!(err, Error::Document(_)));
}

#[tokio::test]
async fn test_pdf_handbook_is_indexed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("handbook.pdf");
    std::fs::write(&path, single_page_pdf(FLOOD_DOC)).unwrap();

    let text = load_document(&path).unwrap();
    assert!(text.contains("Flood damage"), "extracted {text:?}");

    let embedder: Arc<dyn Embeds> = Arc::new(KeywordEmbedder::default());
    let index = DocumentIndexer::new(Arc::clone(&embedder), Chunker::new(500, 50))
        .build_from_file(&path)
        .await
        .unwrap();
    assert!(!index.is_empty());

    let retriever = Retriever::new(Arc::new(index), embedder);
    let result = retriever.search("Is flood damage covered?").await.unwrap();
    assert!(result.is_match());
}

#[tokio::test]
async fn test_blank_pdf_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blank.pdf");
    std::fs::write(&path, single_page_pdf(" ")).unwrap();

    let err = load_document(&path).unwrap_err();

    assert!(matches!(err, Error::Document(_)));
}

#[test]
fn test_missing_api_key_fails_at_provider_step() {
    let config = Config::from_sources(HandbookConfigFile::default(), |_| None).unwrap();

    let step = configure_embedder(&config).err().and_then(|e| e.startup_step());

    assert_eq!(step, Some(StartupStep::ConfiguringProviders));
}

#[tokio::test]
async fn test_flood_question_is_grounded_in_section_four() {
    let embedder = Arc::new(KeywordEmbedder::default());
    let index = keyword_index(FLOOD_DOC, Arc::clone(&embedder)).await;
    let retriever = Retriever::new(Arc::new(index), embedder);

    let generator = RecordingGenerator::replying("Yes. Flood damage is covered under Section 4.");
    let prompts = Arc::clone(&generator.prompts);
    let answerer = AnswerGenerator::new(Arc::new(generator));

    let query = "Is flood damage covered?";
    let retrieval = retriever.search(query).await.unwrap();
    let answer = answerer.generate(query, &retrieval).await.unwrap();

    assert!(answer.contains("Section 4"));

    let prompts = prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].user.contains("Flood damage is covered under Section 4."));
    assert!(!prompts[0].user.contains("Section 7"));
    assert!(prompts[0].user.contains(query));
}

#[tokio::test]
async fn test_unrelated_question_gets_no_context() {
    let embedder = Arc::new(KeywordEmbedder::default());
    let index = keyword_index(FLOOD_DOC, Arc::clone(&embedder)).await;
    let retriever = Retriever::new(Arc::new(index), embedder);

    let generator = RecordingGenerator::replying("The capital of France is Paris.");
    let prompts = Arc::clone(&generator.prompts);
    let answerer = AnswerGenerator::new(Arc::new(generator));

    let query = "What is the capital of France?";
    let retrieval = retriever.search(query).await.unwrap();
    answerer.generate(query, &retrieval).await.unwrap();

    let prompts = prompts.lock().unwrap();
    assert!(!prompts[0].user.contains("Section"));
    assert!(!prompts[0].system.is_empty());
    assert!(prompts[0].user.contains(query));
}

#[tokio::test]
async fn test_generation_failure_is_reported() {
    let answerer = AnswerGenerator::new(Arc::new(RecordingGenerator::failing()));
    let retrieval = RetrievalResult::NoMatch { best_score: None };

    let err = answerer.generate("anything", &retrieval).await.unwrap_err();

    assert!(matches!(err, Error::Generation(_)));
}
