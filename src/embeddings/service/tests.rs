use super::*;
use crate::embeddings::testing::StubProvider;
use crate::testing::Harness;
use chrono::Duration as ChronoDuration;

fn service_with(harness: &Harness, provider: Arc<StubProvider>) -> EmbeddingService {
    harness.embedding_service(provider)
}

#[test]
fn empty_old_text_always_re_vectorizes() {
    let harness = Harness::new();
    let service = service_with(&harness, Arc::new(StubProvider::new()));

    assert!(service.should_re_vectorize(None, "anything non-empty"));
    assert!(service.should_re_vectorize(Some(""), "anything non-empty"));
    assert!(service.should_re_vectorize(Some("   "), "x"));
}

#[test]
fn identical_text_never_re_vectorizes() {
    let harness = Harness::new();
    let service = service_with(&harness, Arc::new(StubProvider::new()));

    for text in ["a", "Bold coffee, brewed daily.", "multi\nline\ntext"] {
        assert!(!service.should_re_vectorize(Some(text), text));
    }
}

#[test]
fn delta_threshold_is_tunable() {
    let harness = Harness::new();
    let old = "Family bakery in Lyon known for sourdough";
    let new = "Family bakery in Lyon known for sourdough and croissants";

    let strict = service_with(&harness, Arc::new(StubProvider::new())).with_re_vectorize_delta(0.5);
    assert!(!strict.should_re_vectorize(Some(old), new));

    let eager = service_with(&harness, Arc::new(StubProvider::new())).with_re_vectorize_delta(0.05);
    assert!(eager.should_re_vectorize(Some(old), new));
}

#[tokio::test]
async fn dimension_mismatch_is_a_provider_error() {
    let harness = Harness::new();
    let service = service_with(&harness, Arc::new(StubProvider::new().with_fixed_len(3)));

    let err = service
        .generate_embedding("hello")
        .await
        .expect_err("should reject 3 dimensions");
    assert!(matches!(err, RagError::Provider(_)));
    assert!(err.to_string().contains("expected 768"));
}

#[tokio::test]
async fn generate_embedding_uses_configured_dimensions() -> Result<()> {
    let harness = Harness::new();
    harness.configure(|c| c.embedding.dimensions = 16).await;
    let service = service_with(&harness, Arc::new(StubProvider::new()));

    assert_eq!(service.generate_embedding("hello").await?.len(), 16);
    Ok(())
}

#[tokio::test]
async fn vectorize_stores_and_dedupes() -> Result<()> {
    let harness = Harness::new();
    harness.configure(|c| c.embedding.dimensions = 8).await;
    let provider = Arc::new(StubProvider::new());
    let service = service_with(&harness, provider.clone());

    let first = service
        .vectorize("alice", "currentLogo", "logo", "https://cdn.example.com/a.png")
        .await;
    let VectorizeOutcome::Stored {
        vector_id,
        replaced: false,
    } = first
    else {
        panic!("expected a new vector, got {:?}", first);
    };

    let logo = crate::storage::VectorRef {
        content_id: "currentLogo".to_string(),
        content_type: "logo".to_string(),
    };
    harness
        .vectors
        .set_performance_score("alice", &logo, 0.9)
        .await?;
    harness.clock.advance(ChronoDuration::days(3));

    let second = service
        .vectorize("alice", "currentLogo", "logo", "https://cdn.example.com/b.png")
        .await;
    assert_eq!(
        second,
        VectorizeOutcome::Stored {
            vector_id: vector_id.clone(),
            replaced: true
        }
    );

    let stored = harness.vectors.list_for_user("alice", Some("logo")).await?;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, vector_id);
    assert_eq!(stored[0].source_text, "https://cdn.example.com/b.png");
    assert_eq!(stored[0].vector.len(), 8);
    assert_eq!(stored[0].created_at, harness.clock.now());
    assert!((stored[0].performance_score - 0.9).abs() < f32::EPSILON);
    assert_eq!(provider.calls(), 2);

    Ok(())
}

#[tokio::test]
async fn rate_limited_vectorize_is_a_silent_no_op() -> Result<()> {
    let harness = Harness::new();
    harness
        .configure(|c| {
            c.embedding.dimensions = 8;
            c.rate_limiting.user_max_per_hour = 1;
        })
        .await;
    let provider = Arc::new(StubProvider::new());
    let service = service_with(&harness, provider.clone());

    assert!(service.vectorize("alice", "p1", "social_post", "first").await.is_stored());

    let outcome = service.vectorize("alice", "p2", "social_post", "second").await;
    let VectorizeOutcome::RateLimited { reason } = outcome else {
        panic!("expected rate limiting, got {:?}", outcome);
    };
    assert!(reason.contains("hourly user limit"));
    assert_eq!(provider.calls(), 1);
    assert_eq!(harness.vectors.list_for_user("alice", None).await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn provider_failure_becomes_failed_outcome() -> Result<()> {
    let harness = Harness::new();
    let service = service_with(&harness, Arc::new(StubProvider::new().failing()));

    let outcome = service.vectorize("alice", "p1", "blog", "text").await;
    assert!(matches!(outcome, VectorizeOutcome::Failed { .. }));
    assert!(harness.vectors.list_all().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn slow_provider_times_out() {
    let harness = Harness::new();
    let service = service_with(
        &harness,
        Arc::new(StubProvider::new().stalled(Duration::from_secs(5))),
    )
    .with_provider_timeout(Duration::from_millis(20));

    let outcome = service.vectorize("alice", "p1", "blog", "text").await;
    let VectorizeOutcome::Failed { error } = outcome else {
        panic!("expected failure, got {:?}", outcome);
    };
    assert!(error.contains("Timed out"));
}

#[tokio::test]
async fn empty_text_is_skipped_without_spending_quota() -> Result<()> {
    let harness = Harness::new();
    let provider = Arc::new(StubProvider::new());
    let service = service_with(&harness, provider.clone());

    let outcome = service.vectorize("alice", "p1", "blog", "  \n").await;
    assert!(matches!(outcome, VectorizeOutcome::Skipped { .. }));
    assert_eq!(provider.calls(), 0);
    assert_eq!(harness.rate_limiter.usage("alice").await?[0].count, 0);

    Ok(())
}

#[tokio::test]
async fn vectorize_if_changed_skips_trivial_edits() {
    let harness = Harness::new();
    harness.configure(|c| c.embedding.dimensions = 8).await;
    let provider = Arc::new(StubProvider::new());
    let service = service_with(&harness, provider.clone());

    let old = "Eco-friendly yoga mats made from natural rubber, shipped worldwide.";
    let outcome = service
        .vectorize_if_changed("alice", "brandProfile", "brand_profile", Some(old), old)
        .await;
    assert_eq!(outcome, VectorizeOutcome::Unchanged);
    assert_eq!(provider.calls(), 0);

    let outcome = service
        .vectorize_if_changed(
            "alice",
            "brandProfile",
            "brand_profile",
            Some(old),
            "Artisanal hot sauce brand from New Mexico with a cult following.",
        )
        .await;
    assert!(outcome.is_stored());
}
