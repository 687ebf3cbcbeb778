use super::*;
use crate::embeddings::testing::StubProvider;
use crate::testing::Harness;

async fn vectorizer(harness: &Harness, provider: StubProvider) -> (BrandVectorizer, Arc<StubProvider>) {
    harness.configure(|c| c.embedding.dimensions = 8).await;
    let provider = Arc::new(provider);
    let service = Arc::new(harness.embedding_service(provider.clone()));
    (BrandVectorizer::new(service), provider)
}

fn profile(description: &str, logo: Option<&str>) -> BrandProfile {
    BrandProfile {
        brand_name: "Northwind Roasters".to_string(),
        brand_description: description.to_string(),
        industry: "Coffee".to_string(),
        target_keywords: vec!["cold brew".to_string(), "single origin".to_string()],
        logo_url: logo.map(str::to_string),
        ..BrandProfile::default()
    }
}

#[test]
fn profile_text_skips_empty_fields() {
    let text = profile("Small-batch roastery", None).profile_text();
    assert_eq!(
        text,
        "Northwind Roasters\nSmall-batch roastery\nCoffee\ncold brew, single origin"
    );
    assert_eq!(BrandProfile::default().profile_text(), "");
}

#[tokio::test]
async fn first_save_vectorizes_text_and_logo() {
    let harness = Harness::new();
    let (vectorizer, provider) = vectorizer(&harness, StubProvider::new()).await;

    let result = vectorizer
        .on_save(
            "alice",
            None,
            &profile("Small-batch roastery", Some("https://cdn.example.com/logo.png")),
        )
        .await;

    assert!(result.success);
    assert!(result.text_vectorized);
    assert!(result.logo_vectorized);
    assert_eq!(provider.calls(), 2);

    let logo = harness
        .vectors
        .get("alice", LOGO_CONTENT_TYPE, LOGO_CONTENT_ID)
        .await
        .expect("read should succeed")
        .expect("logo vector should exist");
    assert_eq!(logo.source_text, "https://cdn.example.com/logo.png");
}

#[tokio::test]
async fn trivial_edit_and_same_logo_do_nothing() {
    let harness = Harness::new();
    let (vectorizer, provider) = vectorizer(&harness, StubProvider::new()).await;
    let old = profile(
        "Small-batch roastery sourcing directly from farmers in Ethiopia and Colombia",
        Some("https://cdn.example.com/logo.png"),
    );
    let mut new = old.clone();
    new.brand_description.push('.');

    let result = vectorizer.on_save("alice", Some(&old), &new).await;
    assert!(result.success);
    assert!(!result.text_vectorized);
    assert!(!result.logo_vectorized);
    assert_eq!(result.text_outcome, Some(VectorizeOutcome::Unchanged));
    assert_eq!(result.logo_outcome, None);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn changed_logo_dedupes_against_stored_vector() {
    let harness = Harness::new();
    let (vectorizer, provider) = vectorizer(&harness, StubProvider::new()).await;
    harness
        .seed_vector(
            "alice",
            LOGO_CONTENT_TYPE,
            LOGO_CONTENT_ID,
            "https://cdn.example.com/new.png",
            vec![1.0; 8],
        )
        .await;

    let old = profile("Roastery", Some("https://cdn.example.com/old.png"));
    let new = profile("Roastery", Some("https://cdn.example.com/new.png"));

    let result = vectorizer.on_save("alice", Some(&old), &new).await;
    assert!(!result.logo_vectorized);
    assert_eq!(result.logo_outcome, Some(VectorizeOutcome::Unchanged));
    assert_eq!(provider.calls(), 0);

    let newer = profile("Roastery", Some("https://cdn.example.com/newer.png"));
    let result = vectorizer.on_save("alice", Some(&new), &newer).await;
    assert!(result.logo_vectorized);
    assert_eq!(provider.calls(), 1);
    assert_eq!(
        harness
            .vectors
            .list_for_user("alice", Some(LOGO_CONTENT_TYPE))
            .await
            .expect("listing should succeed")
            .len(),
        1
    );
}

#[tokio::test]
async fn provider_failure_reports_unsuccessful() {
    let harness = Harness::new();
    let (vectorizer, _provider) = vectorizer(&harness, StubProvider::new().failing()).await;

    let result = vectorizer
        .on_save("alice", None, &profile("Roastery", None))
        .await;
    assert!(!result.success);
    assert!(!result.text_vectorized);
    assert!(!result.logo_vectorized);
}
