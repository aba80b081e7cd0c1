//! Tests for the description cache: keys and the moka-backed store.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use huginn::cache::CACHE_PREFIX;
use huginn::{CacheKey, CacheStore, MemoryCacheStore, ResolvedImage};

// =========================================================================
// CacheKey
// =========================================================================

#[test]
fn key_is_prefixed_sha256() {
    let key = CacheKey::derive(b"pixels", None);
    let hex = key.as_str().strip_prefix(CACHE_PREFIX).unwrap();
    assert_eq!(hex.len(), 64);
    assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn key_depends_on_bytes_and_mtime_only() {
    let t1 = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
    let t2 = UNIX_EPOCH + Duration::from_secs(1_700_000_001);

    assert_eq!(
        CacheKey::derive(b"pixels", Some(t1)),
        CacheKey::derive(b"pixels", Some(t1))
    );
    assert_ne!(
        CacheKey::derive(b"pixels", Some(t1)),
        CacheKey::derive(b"pixels", Some(t2))
    );
    assert_ne!(
        CacheKey::derive(b"pixels", Some(t1)),
        CacheKey::derive(b"other", Some(t1))
    );
}

#[test]
fn key_ignores_mime_type() {
    let png = ResolvedImage::new(b"same".to_vec(), "image/png");
    let jpeg = ResolvedImage::new(b"same".to_vec(), "image/jpeg");
    assert_eq!(CacheKey::for_image(&png), CacheKey::for_image(&jpeg));
}

#[test]
fn key_uses_whole_seconds() {
    let base = SystemTime::UNIX_EPOCH + Duration::from_secs(42);
    let a = ResolvedImage::new(b"x".to_vec(), "image/png").with_modified(base);
    let b = ResolvedImage::new(b"x".to_vec(), "image/png")
        .with_modified(base + Duration::from_millis(300));
    assert_eq!(CacheKey::for_image(&a), CacheKey::for_image(&b));
}

// =========================================================================
// MemoryCacheStore
// =========================================================================

#[tokio::test]
async fn entry_expires_after_its_ttl() {
    let store = MemoryCacheStore::new();
    store
        .set("huginn_img_a", "short".into(), Duration::from_millis(50))
        .await;
    store
        .set("huginn_img_b", "long".into(), Duration::from_secs(60))
        .await;

    assert_eq!(store.get("huginn_img_a").await.as_deref(), Some("short"));
    tokio::time::sleep(Duration::from_millis(120)).await;

    assert!(store.get("huginn_img_a").await.is_none());
    assert_eq!(store.get("huginn_img_b").await.as_deref(), Some("long"));
}

#[tokio::test]
async fn overwrite_resets_ttl() {
    let store = MemoryCacheStore::new();
    store.set("k", "v1".into(), Duration::from_millis(50)).await;
    store.set("k", "v2".into(), Duration::from_secs(60)).await;

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(store.get("k").await.as_deref(), Some("v2"));
}

#[tokio::test]
async fn prefix_operations_leave_other_keys_alone() {
    let store = MemoryCacheStore::new();
    let ttl = Duration::from_secs(60);
    store.set("huginn_img_1", "a".into(), ttl).await;
    store.set("huginn_img_2", "b".into(), ttl).await;
    store.set("session_9", "c".into(), ttl).await;

    assert_eq!(store.count(CACHE_PREFIX).await, 2);
    assert_eq!(store.invalidate_all(CACHE_PREFIX).await, 2);
    assert_eq!(store.count(CACHE_PREFIX).await, 0);
    assert_eq!(store.get("session_9").await.as_deref(), Some("c"));
}

#[tokio::test]
async fn invalidate_single_key() {
    let store = MemoryCacheStore::new();
    store.set("k", "v".into(), Duration::from_secs(60)).await;
    store.invalidate("k").await;
    assert!(store.get("k").await.is_none());
    // Removing an absent key is a no-op.
    store.invalidate("k").await;
}

#[tokio::test]
async fn clones_share_entries() {
    let store = MemoryCacheStore::new();
    let clone = store.clone();
    store.set("k", "v".into(), Duration::from_secs(60)).await;
    assert_eq!(clone.get("k").await.as_deref(), Some("v"));
}

#[tokio::test]
async fn shared_store_is_usable_as_trait_object() {
    let store = MemoryCacheStore::with_max_entries(10).shared();
    store.set("huginn_img_x", "v".into(), Duration::from_secs(60)).await;
    assert_eq!(store.count(CACHE_PREFIX).await, 1);
}
