//! Identity resolution and tenant isolation tests.

use peyk::ai::ModelPreference;
use peyk::identity::{IdentityResolver, SqlIdentityResolver};
use peyk::types::Platform;

use crate::common::{seed_binding, test_pool};

#[tokio::test]
async fn resolve_bound_chat() {
    let pool = test_pool().await;
    seed_binding(&pool, 7, 1, "student", Some("local"), "bale", "123").await;
    let resolver = SqlIdentityResolver::new(pool);

    let user = resolver
        .resolve(Platform::Bale, "123", 1)
        .await
        .expect("query should succeed")
        .expect("binding should resolve");

    assert_eq!(user.user_id, 7);
    assert_eq!(user.school_id, 1);
    assert_eq!(user.role, "student");
    assert_eq!(user.model_preference, ModelPreference::Local);
}

#[tokio::test]
async fn resolve_unknown_chat_is_none() {
    let pool = test_pool().await;
    let resolver = SqlIdentityResolver::new(pool);

    let user = resolver
        .resolve(Platform::Bale, "123", 1)
        .await
        .expect("query should succeed");
    assert!(user.is_none());
}

#[tokio::test]
async fn resolve_is_platform_scoped() {
    let pool = test_pool().await;
    seed_binding(&pool, 7, 1, "student", None, "bale", "123").await;
    let resolver = SqlIdentityResolver::new(pool);

    // Same external id on the other platform is a different chat.
    let user = resolver
        .resolve(Platform::Eitaa, "123", 1)
        .await
        .expect("query should succeed");
    assert!(user.is_none());
}

#[tokio::test]
async fn tenant_mismatch_resolves_to_none() {
    let pool = test_pool().await;
    // Binding belongs to school 2; the webhook URL claims school 1.
    seed_binding(&pool, 7, 2, "student", None, "bale", "123").await;
    let resolver = SqlIdentityResolver::new(pool);

    let user = resolver
        .resolve(Platform::Bale, "123", 1)
        .await
        .expect("query should succeed");
    assert!(user.is_none(), "stale binding must not leak across tenants");

    // The same binding resolves normally through its own tenant's webhook.
    let user = resolver
        .resolve(Platform::Bale, "123", 2)
        .await
        .expect("query should succeed");
    assert!(user.is_some());
}

#[tokio::test]
async fn null_model_preference_defaults_to_cloud() {
    let pool = test_pool().await;
    seed_binding(&pool, 7, 1, "teacher", None, "eitaa", "88").await;
    let resolver = SqlIdentityResolver::new(pool);

    let user = resolver
        .resolve(Platform::Eitaa, "88", 1)
        .await
        .expect("query should succeed")
        .expect("binding should resolve");
    assert_eq!(user.model_preference, ModelPreference::Cloud);
}
