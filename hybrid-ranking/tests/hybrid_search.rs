use hybrid_ranking::{
    FusionPolicy, HybridSearch, InMemorySearchService, QuerySpec, RankedHit, RankingConfig,
    RankingError, RawHit, ScoreKind, SearchServiceError, SearchSource, SourceName,
    StaticEmbeddingProvider, TermMatchMode, TextRankingMode, TextSearchMode, VectorSearchMode,
};
use pretty_assertions::assert_eq;
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const QUERY_VECTOR: [f32; 3] = [0.2, 0.1, 0.7];

fn text_hits() -> Vec<RawHit> {
    vec![
        RawHit::new("h1")
            .with_lexical_score(0.9)
            .with_field("title", "Ownership"),
        RawHit::new("h2")
            .with_lexical_score(0.5)
            .with_field("title", "Borrowing"),
        RawHit::new("h3")
            .with_lexical_score(0.2)
            .with_field("title", "Lifetimes"),
    ]
}

fn vector_hits() -> Vec<RawHit> {
    vec![
        RawHit::new("h1").with_vector_score(0.1),
        RawHit::new("h2").with_vector_score(0.95),
        RawHit::new("h3").with_vector_score(0.4),
    ]
}

fn ids(hits: &[RankedHit]) -> Vec<&str> {
    hits.iter().map(RankedHit::id).collect()
}

fn hybrid_spec() -> QuerySpec {
    QuerySpec::hybrid(
        "borrow checker",
        QUERY_VECTOR.to_vec(),
        FusionPolicy::ReciprocalRankFusion,
        3,
    )
}

fn engine(service: InMemorySearchService) -> (HybridSearch, Arc<InMemorySearchService>) {
    engine_with_config(service, RankingConfig::default())
}

fn engine_with_config(
    service: InMemorySearchService,
    config: RankingConfig,
) -> (HybridSearch, Arc<InMemorySearchService>) {
    let service = Arc::new(service);
    let search = HybridSearch::new(config, service.clone()).unwrap();
    (search, service)
}

#[test_log::test(tokio::test)]
async fn rrf_ranks_document_strong_in_both_lists_first() {
    let (search, service) = engine(
        InMemorySearchService::new()
            .with_text_hits(text_hits())
            .with_vector_hits(vector_hits()),
    );

    let hits = search.execute(&hybrid_spec()).await.unwrap();

    assert_eq!(ids(&hits), vec!["h2", "h1", "h3"]);
    assert_eq!(hits[0].source, SearchSource::Hybrid);
    assert!((hits[0].final_score - (1.0 / 62.0 + 1.0 / 61.0)).abs() < 1e-12);
    assert_eq!(hits[0].source_ranks[&SourceName::Text], 2);
    assert_eq!(hits[0].source_ranks[&SourceName::Vector], 1);
    assert_eq!(hits[0].hit.fields["title"], "Borrowing");

    // Separate requests: one per modality.
    let requests = service.requests().await;
    assert_eq!(requests.len(), 2);
    assert_eq!(requests.iter().filter(|r| r.has_text()).count(), 1);
    assert_eq!(requests.iter().filter(|r| r.has_vector()).count(), 1);
}

#[tokio::test]
async fn combined_request_gives_same_ranking() {
    let (search, service) = engine(
        InMemorySearchService::new()
            .with_text_hits(text_hits())
            .with_vector_hits(vector_hits())
            .with_combined_queries(),
    );

    let results = search
        .search(&hybrid_spec(), CancellationToken::new())
        .await
        .unwrap();

    assert!(results.stats.combined_request);
    assert_eq!(results.stats.text_count, 3);
    assert_eq!(results.stats.vector_count, 3);
    assert_eq!(ids(&results.hits), vec!["h2", "h1", "h3"]);

    let requests = service.requests().await;
    assert_eq!(requests.len(), 1);
    assert!(requests[0].has_text() && requests[0].has_vector());
}

#[tokio::test]
async fn combined_request_can_be_disabled() {
    let config = RankingConfig {
        prefer_combined_queries: false,
        ..Default::default()
    };
    let (search, service) = engine_with_config(
        InMemorySearchService::new()
            .with_text_hits(text_hits())
            .with_vector_hits(vector_hits())
            .with_combined_queries(),
        config,
    );

    search.execute(&hybrid_spec()).await.unwrap();

    assert_eq!(service.requests().await.len(), 2);
}

#[tokio::test]
async fn output_is_independent_of_backend_order() {
    let mut rng = rand::rng();
    let mut expected: Option<Vec<RankedHit>> = None;

    for _ in 0..20 {
        let mut text = text_hits();
        let mut vector = vector_hits();
        text.push(RawHit::new("h0").with_lexical_score(0.5));
        vector.push(RawHit::new("h4").with_vector_score(0.4));
        text.shuffle(&mut rng);
        vector.shuffle(&mut rng);

        let (search, _) = engine(
            InMemorySearchService::new()
                .with_text_hits(text)
                .with_vector_hits(vector),
        );
        let spec = hybrid_spec().with_neighbors(10);
        let hits = search.execute(&spec).await.unwrap();

        match &expected {
            Some(expected) => assert_eq!(&hits, expected),
            None => expected = Some(hits),
        }
    }
}

#[tokio::test]
async fn text_only_query_truncates_to_limit() {
    let hits: Vec<RawHit> = (1..=5)
        .map(|i| RawHit::new(format!("doc{i}")).with_lexical_score(f64::from(10 - i)))
        .collect();
    let (search, service) = engine(InMemorySearchService::new().with_text_hits(hits));
    let spec = QuerySpec::text("rust", TextRankingMode::Bm25, 2).with_neighbors(5);

    let ranked = search.execute(&spec).await.unwrap();

    assert_eq!(ids(&ranked), vec!["doc1", "doc2"]);
    assert_eq!(ranked[1].final_rank, 2);
    assert_eq!(ranked[0].source, SearchSource::Text);
    assert_eq!(service.requests().await[0].limit, 5);
}

#[tokio::test]
async fn vector_only_query_passes_neighbors_and_mode() {
    let (search, service) = engine(InMemorySearchService::new().with_vector_hits(vector_hits()));
    let spec = QuerySpec::vector(QUERY_VECTOR.to_vec(), VectorSearchMode::Exact, 3)
        .with_neighbors(999)
        .with_fusion(FusionPolicy::ScoreDescending(ScoreKind::Vector));

    let ranked = search.execute(&spec).await.unwrap();

    assert_eq!(ids(&ranked), vec!["h2", "h3", "h1"]);
    let request = &service.requests().await[0];
    assert_eq!(request.limit, 999);
    assert_eq!(request.exhaustive_vector_search, Some(true));
    assert_eq!(request.query_vector.as_deref(), Some(&QUERY_VECTOR[..]));
}

#[tokio::test]
async fn semantic_ranking_treats_null_scores_as_zero() {
    let hits = vec![
        RawHit::new("a")
            .with_lexical_score(9.0)
            .with_semantic_score(None),
        RawHit::new("b")
            .with_lexical_score(1.0)
            .with_semantic_score(Some(2.1)),
        RawHit::new("c")
            .with_lexical_score(5.0)
            .with_semantic_score(Some(0.4)),
    ];
    let config = RankingConfig::default().with_semantic_configuration("my-semantic-config");
    let (search, service) =
        engine_with_config(InMemorySearchService::new().with_text_hits(hits), config);
    let spec = QuerySpec::text("rust", TextRankingMode::Semantic, 3);

    let ranked = search.execute(&spec).await.unwrap();

    assert_eq!(ids(&ranked), vec!["b", "c", "a"]);
    assert_eq!(ranked[2].final_score, 0.0);
    assert_eq!(
        service.requests().await[0].semantic_config_name.as_deref(),
        Some("my-semantic-config")
    );
}

#[tokio::test]
async fn semantic_rerank_fusion_over_both_sources() {
    let text = vec![
        RawHit::new("a")
            .with_lexical_score(3.0)
            .with_semantic_score(Some(1.0)),
        RawHit::new("b")
            .with_lexical_score(2.0)
            .with_semantic_score(Some(3.0)),
    ];
    let vector = vec![RawHit::new("c").with_vector_score(0.99)];
    let config = RankingConfig::default().with_semantic_configuration("sem");
    let (search, _) = engine_with_config(
        InMemorySearchService::new()
            .with_text_hits(text)
            .with_vector_hits(vector),
        config,
    );
    let spec = hybrid_spec().with_fusion(FusionPolicy::SemanticRerank);

    let ranked = search.execute(&spec).await.unwrap();

    assert_eq!(ids(&ranked), vec!["b", "a", "c"]);
}

#[tokio::test]
async fn semantic_fusion_over_bm25_requests_reranker_scores() {
    let text = vec![
        RawHit::new("z")
            .with_lexical_score(9.0)
            .with_semantic_score(Some(0.5)),
        RawHit::new("a")
            .with_lexical_score(1.0)
            .with_semantic_score(Some(2.0)),
    ];
    let vector = vec![RawHit::new("m").with_vector_score(0.99)];
    let config = RankingConfig::default().with_semantic_configuration("sem");
    let (search, service) = engine_with_config(
        InMemorySearchService::new()
            .with_text_hits(text)
            .with_vector_hits(vector),
        config,
    );
    let spec = hybrid_spec().with_fusion(FusionPolicy::SemanticRerank);

    let ranked = search.execute(&spec).await.unwrap();

    assert_eq!(ids(&ranked), vec!["a", "z", "m"]);
    let requests = service.requests().await;
    let text_request = requests.iter().find(|r| r.has_text()).unwrap();
    assert_eq!(text_request.semantic_config_name.as_deref(), Some("sem"));
}

#[tokio::test]
async fn semantic_fusion_without_configuration_is_invalid_strategy() {
    let (search, service) = engine(
        InMemorySearchService::new()
            .with_text_hits(text_hits())
            .with_vector_hits(vector_hits()),
    );

    for fusion in [
        FusionPolicy::SemanticRerank,
        FusionPolicy::ScoreDescending(ScoreKind::SemanticRerank),
    ] {
        let err = search
            .execute(&hybrid_spec().with_fusion(fusion))
            .await
            .unwrap_err();
        assert!(matches!(err, RankingError::InvalidStrategy(_)));
    }
    assert!(service.requests().await.is_empty());
}

#[tokio::test]
async fn combined_split_uses_the_score_text_ranking_needs() {
    let text = vec![
        RawHit::new("a")
            .with_lexical_score(2.0)
            .with_semantic_score(Some(1.0)),
    ];
    // `m` only matched the vector query but the index reranked it too.
    let vector = vec![
        RawHit::new("a").with_vector_score(0.3),
        RawHit::new("m")
            .with_vector_score(0.9)
            .with_semantic_score(Some(3.0)),
    ];
    let config = RankingConfig::default().with_semantic_configuration("sem");
    let (search, service) = engine_with_config(
        InMemorySearchService::new()
            .with_text_hits(text)
            .with_vector_hits(vector)
            .with_combined_queries(),
        config,
    );
    let spec = hybrid_spec().with_fusion(FusionPolicy::SemanticRerank);

    let results = search.search(&spec, CancellationToken::new()).await.unwrap();

    assert!(results.stats.combined_request);
    assert_eq!(results.stats.text_count, 1);
    assert_eq!(results.stats.vector_count, 2);
    assert_eq!(ids(&results.hits), vec!["m", "a"]);
    assert_eq!(service.requests().await.len(), 1);
}

#[tokio::test]
async fn full_syntax_requests_any_term_matching() {
    let (search, service) = engine(InMemorySearchService::new().with_text_hits(text_hits()));
    let spec = QuerySpec::text("borrow OR lifetime", TextRankingMode::Bm25, 3)
        .with_text_search(TextSearchMode::Full);

    search.execute(&spec).await.unwrap();

    let request = &service.requests().await[0];
    assert_eq!(request.query_syntax, Some(TextSearchMode::Full));
    assert_eq!(request.search_mode, Some(TermMatchMode::Any));
}

#[tokio::test]
async fn query_vector_can_come_from_embedding_provider() {
    let provider = StaticEmbeddingProvider::new().with_embedding("borrow checker", vec![0.3, 0.3]);
    let service = Arc::new(
        InMemorySearchService::new()
            .with_text_hits(text_hits())
            .with_vector_hits(vector_hits()),
    );
    let search = HybridSearch::new(RankingConfig::default(), service.clone())
        .unwrap()
        .with_embedding_provider(Arc::new(provider));
    let spec = QuerySpec::text("borrow checker", TextRankingMode::Bm25, 3)
        .with_vector_from_text()
        .with_fusion(FusionPolicy::ReciprocalRankFusion);

    let ranked = search.execute(&spec).await.unwrap();

    assert_eq!(ids(&ranked), vec!["h2", "h1", "h3"]);
    let requests = service.requests().await;
    let vector_request = requests.iter().find(|r| r.has_vector()).unwrap();
    assert_eq!(vector_request.query_vector, Some(vec![0.3, 0.3]));
}

#[tokio::test]
async fn embedding_failure_is_upstream_unavailable() {
    let search = HybridSearch::new(
        RankingConfig::default(),
        Arc::new(InMemorySearchService::new().with_text_hits(text_hits())),
    )
    .unwrap()
    .with_embedding_provider(Arc::new(StaticEmbeddingProvider::new()));
    let spec = QuerySpec::text("unknown", TextRankingMode::Bm25, 3)
        .with_vector_from_text()
        .with_fusion(FusionPolicy::ReciprocalRankFusion);

    let err = search.execute(&spec).await.unwrap_err();

    assert!(matches!(err, RankingError::UpstreamUnavailable(_)));
}

#[tokio::test(start_paused = true)]
async fn sub_queries_run_concurrently() {
    let (search, _) = engine(
        InMemorySearchService::new()
            .with_text_hits(text_hits())
            .with_vector_hits(vector_hits())
            .with_text_latency(Duration::from_millis(400))
            .with_vector_latency(Duration::from_millis(400)),
    );

    let start = Instant::now();
    let results = search
        .search(&hybrid_spec(), CancellationToken::new())
        .await
        .unwrap();

    // Sequential dispatch would need 800ms of (paused) time.
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(400));
    assert!(elapsed < Duration::from_millis(800));
    assert!(!results.stats.combined_request);
    assert_eq!(results.len(), 3);
}

#[tokio::test]
async fn failing_sub_query_aborts_the_other() {
    let (search, _) = engine(
        InMemorySearchService::new()
            .with_text_hits(text_hits())
            .with_vector_hits(vector_hits())
            .failing_text(SearchServiceError::Unavailable("503 Service Unavailable".to_string()))
            .with_vector_latency(Duration::from_secs(30)),
    );

    let result = tokio::time::timeout(Duration::from_secs(5), search.execute(&hybrid_spec()))
        .await
        .expect("failure should not wait for the slow sub-query");

    let err = result.unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(
        err,
        RankingError::UpstreamUnavailable(SearchServiceError::Unavailable(_))
    ));
}

#[tokio::test]
async fn caller_cancellation_stops_both_sub_queries() {
    let (search, _) = engine(
        InMemorySearchService::new()
            .with_text_latency(Duration::from_secs(30))
            .with_vector_latency(Duration::from_secs(30)),
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        search.execute_with_cancel(&hybrid_spec(), cancel),
    )
    .await
    .expect("cancellation should end the query");

    assert!(matches!(
        result,
        Err(RankingError::UpstreamUnavailable(SearchServiceError::Cancelled))
    ));
}

#[tokio::test]
async fn query_timeout_is_upstream_unavailable() {
    let config = RankingConfig::default().with_query_timeout_ms(50);
    let (search, _) = engine_with_config(
        InMemorySearchService::new()
            .with_text_hits(text_hits())
            .with_text_latency(Duration::from_secs(30)),
        config,
    );
    let spec = QuerySpec::text("rust", TextRankingMode::Bm25, 3);

    let result = search.execute(&spec).await;

    assert!(matches!(
        result,
        Err(RankingError::UpstreamUnavailable(SearchServiceError::Timeout(50)))
    ));
}

#[tokio::test]
async fn invalid_hit_from_service_is_reported() {
    let (search, _) = engine(
        InMemorySearchService::new().with_text_hits(vec![RawHit::new("a").with_vector_score(0.3)]),
    );
    let spec = QuerySpec::text("rust", TextRankingMode::Bm25, 3);

    let err = search.execute(&spec).await.unwrap_err();

    assert!(matches!(err, RankingError::InvalidHit { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn missing_text_and_vector_is_invalid_query_spec() {
    let (search, service) = engine(InMemorySearchService::new());
    let mut spec = hybrid_spec();
    spec.text = None;
    spec.vector = None;

    let err = search.execute(&spec).await.unwrap_err();

    assert!(matches!(err, RankingError::InvalidQuerySpec(_)));
    assert!(service.requests().await.is_empty());
}
