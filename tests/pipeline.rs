//! End-to-end pipeline scenarios over a two-layer stack with recording
//! providers and a mock origin.

use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use serde_json::json;

use stratacache::cache::provider::CacheProvider;
use stratacache::cache::providers::RecordingProvider;
use stratacache::cache::{LayerController, LayerService};
use stratacache::config::registry::CacheRegistry;
use stratacache::config::Config;
use stratacache::manager::{AsyncAdapter, CacheManager};
use stratacache::origin::OriginService;
use stratacache::resolver::Resolver;
use stratacache::types::{CacheEntry, CacheId};

/// Time for fire-and-forget writes and back-fills to land.
const SETTLE: Duration = Duration::from_millis(200);

struct Stack {
    l0: RecordingProvider,
    l1: RecordingProvider,
    adapter: AsyncAdapter,
}

/// Two enabled layers; `users` has an origin when a URL is given, `mixed`
/// has layer 0 disabled.
fn build_stack(origin_url: Option<String>) -> Stack {
    let origin_block = match origin_url {
        Some(url) => format!(
            r#"
    origin:
      enabled: true
      url: {url}
      prop: ids
      key_type: string
      timeout_seconds: 2
"#
        ),
        None => String::new(),
    };
    let config: Config = serde_yaml::from_str(&format!(
        r#"
providers:
  - name: l0
    type: memory
    max_capacity: 100
  - name: l1
    type: memory
    max_capacity: 100
layers:
  - name: l0
    mode: enabled
  - name: l1
    mode: enabled
caches:
  - name: users
    prefix: usr
    layers:
      - {{ enabled: true, ttl_seconds: 0 }}
      - {{ enabled: true, ttl_seconds: 0 }}{origin_block}
  - name: mixed
    prefix: mix
    layers:
      - {{ enabled: false, ttl_seconds: 0 }}
      - {{ enabled: true, ttl_seconds: 0 }}
"#
    ))
    .expect("yaml should parse");

    let registry = CacheRegistry::new(&config);
    let l0 = RecordingProvider::new();
    let l1 = RecordingProvider::new();
    let controller = Arc::new(LayerController::new(vec![
        LayerService::active(CacheProvider::Recording(l0.clone()), registry.clone(), 0),
        LayerService::active(CacheProvider::Recording(l1.clone()), registry.clone(), 1),
    ]));
    let manager = Arc::new(CacheManager::new(
        Resolver::new(registry.clone()),
        controller,
        OriginService::new(registry),
    ));
    let adapter = AsyncAdapter::new(manager, Duration::from_secs(1), Duration::from_secs(1));
    Stack { l0, l1, adapter }
}

fn id(cache: &str, key: &str) -> CacheId {
    CacheId::new(cache, key)
}

fn entry(cache: &str, key: &str, value: &str) -> CacheEntry {
    serde_json::from_str(&format!(r#"{{"c":"{cache}","k":"{key}","v":{value}}}"#))
        .expect("entry should parse")
}

#[tokio::test]
async fn all_hit_at_l0_never_descends() {
    let server = MockServer::start_async().await;
    let origin = server
        .mock_async(|when, then| {
            when.method(POST).path("/batch");
            then.status(200).json_body(json!({}));
        })
        .await;

    let stack = build_stack(Some(server.url("/batch")));
    stack.l0.seed("usr:x", "\"1\"");

    let hits = stack.adapter.get_all(&[id("users", "x")]).await;
    assert_eq!(hits.len(), 1);
    assert!(hits[0].found);
    assert_eq!(hits[0].value.as_ref().map(|v| v.get()), Some("\"1\""));

    tokio::time::sleep(SETTLE).await;
    // The origin was never called and no layer received a write.
    assert_eq!(origin.hits_async().await, 0);
    assert_eq!(stack.l0.put_calls(), 0);
    assert_eq!(stack.l1.put_calls(), 0);
    assert_eq!(stack.l1.get_calls(), 0);
}

#[tokio::test]
async fn l1_hit_backfills_l0() {
    let stack = build_stack(None);
    stack.l1.seed("usr:x", "\"2\"");

    let hits = stack.adapter.get_all(&[id("users", "x")]).await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].value.as_ref().map(|v| v.get()), Some("\"2\""));

    tokio::time::sleep(SETTLE).await;
    assert_eq!(stack.l0.value("usr:x").as_deref(), Some("\"2\""));

    // A second read is served entirely from layer 0.
    let hits = stack.adapter.get_all(&[id("users", "x")]).await;
    assert!(hits[0].found);
    assert_eq!(stack.l1.get_calls(), 1);
}

#[tokio::test]
async fn full_miss_hits_origin_and_backfills_both_layers() {
    let server = MockServer::start_async().await;
    let origin = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/batch")
                .json_body(json!({"ids": ["x"]}));
            then.status(200).json_body(json!({"x": "3"}));
        })
        .await;

    let stack = build_stack(Some(server.url("/batch")));

    let hits = stack.adapter.get_all(&[id("users", "x")]).await;
    assert_eq!(hits.len(), 1);
    assert!(hits[0].found);
    assert_eq!(hits[0].value.as_ref().map(|v| v.get()), Some("\"3\""));
    origin.assert_async().await;

    tokio::time::sleep(SETTLE).await;
    assert_eq!(stack.l0.value("usr:x").as_deref(), Some("\"3\""));
    assert_eq!(stack.l1.value("usr:x").as_deref(), Some("\"3\""));
}

#[tokio::test]
async fn origin_outage_yields_no_hits_and_no_writes() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/batch");
            then.status(500).body("boom");
        })
        .await;

    let stack = build_stack(Some(server.url("/batch")));

    let hits = stack.adapter.get_all(&[id("users", "x")]).await;
    assert!(hits.is_empty());

    tokio::time::sleep(SETTLE).await;
    assert_eq!(stack.l0.put_calls(), 0);
    assert_eq!(stack.l1.put_calls(), 0);
}

#[tokio::test]
async fn l0_outage_serves_from_l1_without_backfilling_l0() {
    let stack = build_stack(None);
    stack.l0.set_failing(true);
    stack.l1.seed("usr:x", "\"5\"");

    let hits = stack.adapter.get_all(&[id("users", "x")]).await;
    assert_eq!(hits.len(), 1);
    assert!(hits[0].found);

    tokio::time::sleep(SETTLE).await;
    // An erroring layer counts as pass-through, not as a miss, so it is
    // not back-filled during this request.
    assert_eq!(stack.l0.put_calls(), 0);
}

#[tokio::test]
async fn disabled_layer_is_never_touched() {
    let stack = build_stack(None);
    stack.l1.seed("mix:x", "\"7\"");

    let hits = stack.adapter.get_all(&[id("mixed", "x")]).await;
    assert_eq!(hits.len(), 1);
    assert!(hits[0].found);
    // Layer 0 is disabled for this cache: no provider call at all.
    assert_eq!(stack.l0.get_calls(), 0);

    stack.adapter.put_all(vec![entry("mixed", "y", "8")]).await;
    tokio::time::sleep(SETTLE).await;
    assert_eq!(stack.l0.put_calls(), 0);
    assert_eq!(stack.l1.value("mix:y").as_deref(), Some("8"));
}

#[tokio::test]
async fn put_then_get_round_trips() {
    let stack = build_stack(None);

    stack
        .adapter
        .put_all(vec![entry("users", "42", r#"{ "name" : "a" }"#)])
        .await;
    tokio::time::sleep(SETTLE).await;

    let hits = stack.adapter.get_all(&[id("users", "42")]).await;
    assert_eq!(hits.len(), 1);
    assert!(hits[0].found);
    // Whitespace compaction is the only permitted byte change.
    assert_eq!(
        hits[0].value.as_ref().map(|v| v.get()),
        Some(r#"{"name":"a"}"#)
    );
}

#[tokio::test]
async fn eviction_is_idempotent_and_hits_every_layer() {
    let stack = build_stack(None);

    stack.adapter.put_all(vec![entry("users", "x", "1")]).await;
    tokio::time::sleep(SETTLE).await;

    stack.adapter.evict_all(vec![id("users", "x")]).await;
    stack.adapter.evict_all(vec![id("users", "x")]).await;
    tokio::time::sleep(SETTLE).await;

    assert_eq!(stack.l0.delete_calls(), 2);
    assert_eq!(stack.l1.delete_calls(), 2);
    assert_eq!(stack.l0.entry_count(), 0);
    assert_eq!(stack.l1.entry_count(), 0);

    let hits = stack.adapter.get_all(&[id("users", "x")]).await;
    assert!(hits.is_empty());
}

#[tokio::test]
async fn unknown_cache_ids_are_dropped_not_fatal() {
    let stack = build_stack(None);
    stack.l0.seed("usr:x", "\"1\"");

    let hits = stack
        .adapter
        .get_all(&[id("ghost", "a"), id("users", "x")])
        .await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].key, "x");
}
