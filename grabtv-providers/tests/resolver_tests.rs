//! End-to-end resolver tests against mocked upstreams.
//!
//! Each test spins up throwaway mock servers for the catalog and file-host
//! APIs and drives the resolvers through the same composition the
//! application uses.

use std::sync::Arc;

use serde_json::{json, Map};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use grabtv_core::config::{RateConfig, SccConfig, WebshareConfig};
use grabtv_core::models::ItemKind;
use grabtv_core::ratelimit::RateLimiter;
use grabtv_core::{token, KeyBuilder};
use grabtv_providers::{
    CatalogResolver, DownloadLinkResolver, IdentResolver, ProviderError, SccClient,
    SessionManager, WebshareClient,
};

fn ws_config(base_url: &str) -> WebshareConfig {
    WebshareConfig {
        base_url: base_url.to_string(),
        username: "alice".to_string(),
        password: "hunter2".to_string(),
        uuid: Some("test-uuid".to_string()),
        ..WebshareConfig::default()
    }
}

fn scc_config(base_url: &str) -> SccConfig {
    SccConfig {
        base_url: base_url.to_string(),
        rate: RateConfig {
            min_spacing_seconds: 0,
            ..RateConfig::default()
        },
        ..SccConfig::default()
    }
}

async fn mount_login_flow(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/salt/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": "OK", "salt": "pepper"})),
        )
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/login/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": "OK", "token": "wst-1"})),
        )
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/device_token/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "OK", "device_token": "dev-1"})),
        )
        .mount(server)
        .await;
}

async fn count_requests(server: &MockServer, endpoint: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == endpoint)
        .count()
}

fn session_for(server: &MockServer) -> SessionManager {
    let client = Arc::new(WebshareClient::new(server.uri()));
    SessionManager::new(client, &ws_config(&server.uri())).unwrap()
}

fn link_resolver(scc: &MockServer, ws: &MockServer) -> DownloadLinkResolver {
    let rate = RateLimiter::in_memory(KeyBuilder::default());
    let idents = IdentResolver::new(
        Arc::new(SccClient::new(scc.uri())),
        rate.clone(),
        scc_config(&scc.uri()),
    );
    let mut config = ws_config(&ws.uri());
    config.rate.min_spacing_seconds = 0;
    DownloadLinkResolver::new(idents, session_for(ws), rate, config)
}

fn stream_token(ident: &str) -> String {
    let mut payload = Map::new();
    payload.insert("ident".to_string(), json!(ident));
    token::encode(token::KIND_STREAM, &payload)
}

#[tokio::test]
async fn test_session_login_and_device_token_derivation() {
    let ws = MockServer::start().await;
    mount_login_flow(&ws).await;

    let mut session = session_for(&ws);
    let device = session.ensure_secondary_token().await.unwrap();
    assert_eq!(device, "dev-1");

    // The derivation logged in exactly once; a second ask hits the cache.
    let device_again = session.ensure_secondary_token().await.unwrap();
    assert_eq!(device_again, "dev-1");
    assert_eq!(count_requests(&ws, "/api/salt/").await, 1);
    assert_eq!(count_requests(&ws, "/api/login/").await, 1);
    assert_eq!(count_requests(&ws, "/api/device_token/").await, 1);
}

#[tokio::test]
async fn test_mint_success_from_stream_token() {
    let scc = MockServer::start().await;
    let ws = MockServer::start().await;
    mount_login_flow(&ws).await;
    Mock::given(method("POST"))
        .and(path("/api/file_link/"))
        .and(body_string_contains("ident=abc9"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"link": "https://dl.example/f.mkv"}])),
        )
        .mount(&ws)
        .await;

    let mut resolver = link_resolver(&scc, &ws);
    let link = resolver.resolve_url(&stream_token("abc9")).await.unwrap();
    assert_eq!(link, "https://dl.example/f.mkv");
    assert_eq!(count_requests(&ws, "/api/file_link/").await, 1);
}

#[tokio::test]
async fn test_mint_auth_failure_replays_exactly_once() {
    let scc = MockServer::start().await;
    let ws = MockServer::start().await;
    mount_login_flow(&ws).await;

    // First mint is rejected with 401, the replay succeeds.
    Mock::given(method("POST"))
        .and(path("/api/file_link/"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&ws)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/file_link/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"link": "https://dl.example/f.mkv"}])),
        )
        .mount(&ws)
        .await;

    let mut resolver = link_resolver(&scc, &ws);
    let link = resolver.resolve_url(&stream_token("abc9")).await.unwrap();
    assert_eq!(link, "https://dl.example/f.mkv");

    // Two mint calls, and the replay re-ran the full login flow.
    assert_eq!(count_requests(&ws, "/api/file_link/").await, 2);
    assert_eq!(count_requests(&ws, "/api/login/").await, 2);
}

#[tokio::test]
async fn test_mint_auth_failure_replay_is_bounded() {
    let scc = MockServer::start().await;
    let ws = MockServer::start().await;
    mount_login_flow(&ws).await;
    Mock::given(method("POST"))
        .and(path("/api/file_link/"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&ws)
        .await;

    let mut resolver = link_resolver(&scc, &ws);
    let err = resolver
        .resolve_url(&stream_token("abc9"))
        .await
        .unwrap_err();
    assert!(err.is_auth_failure());
    // One original attempt plus one replay, never more.
    assert_eq!(count_requests(&ws, "/api/file_link/").await, 2);
}

#[tokio::test]
async fn test_invalid_ident_triggers_single_recovery() {
    let scc = MockServer::start().await;
    let ws = MockServer::start().await;
    mount_login_flow(&ws).await;

    // The stale ident is rejected with the structured invalid-ident code.
    Mock::given(method("POST"))
        .and(path("/api/file_link/"))
        .and(body_string_contains("ident=stale9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"status": "FATAL", "code": "FILE_IDENT_INVALID", "message": "unknown"}),
        ))
        .mount(&ws)
        .await;
    // Recovery re-scans the play-path detail and finds the fresh ident.
    Mock::given(method("GET"))
        .and(path("/Play/stale9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "movie",
            "streams": [{"provider": "webshare", "ident": "fresh9"}]
        })))
        .mount(&scc)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/file_link/"))
        .and(body_string_contains("ident=fresh9"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"link": "https://dl.example/fresh.mkv"}])),
        )
        .mount(&ws)
        .await;

    let mut resolver = link_resolver(&scc, &ws);
    let link = resolver.resolve_url(&stream_token("stale9")).await.unwrap();
    assert_eq!(link, "https://dl.example/fresh.mkv");
    assert_eq!(count_requests(&ws, "/api/file_link/").await, 2);
}

#[tokio::test]
async fn test_invalid_ident_without_recovery_propagates_original_error() {
    let scc = MockServer::start().await;
    let ws = MockServer::start().await;
    mount_login_flow(&ws).await;
    Mock::given(method("POST"))
        .and(path("/api/file_link/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"status": "FATAL", "code": "FILE_IDENT_INVALID", "message": "unknown"}),
        ))
        .mount(&ws)
        .await;
    // Detail scans find nothing usable.
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"streams": []})))
        .mount(&scc)
        .await;

    let mut resolver = link_resolver(&scc, &ws);
    let err = resolver
        .resolve_url(&stream_token("stale9"))
        .await
        .unwrap_err();
    assert!(err.is_invalid_ident());
    assert_eq!(count_requests(&ws, "/api/file_link/").await, 1);
}

#[tokio::test]
async fn test_mint_from_video_token_with_bare_ident() {
    let scc = MockServer::start().await;
    let ws = MockServer::start().await;
    mount_login_flow(&ws).await;

    // A descriptor ident issued at search time has no catalog page; the
    // detail probe 404s and the raw value goes to the mint call unchanged.
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&scc)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/file_link/"))
        .and(body_string_contains("ident=abc9"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"link": "https://dl.example/f.mkv"}])),
        )
        .mount(&ws)
        .await;

    let mut payload = Map::new();
    payload.insert("v".to_string(), json!("abc9"));
    payload.insert("t".to_string(), json!("Movie"));
    let tok = token::encode(token::KIND_VIDEO, &payload);

    let mut resolver = link_resolver(&scc, &ws);
    let link = resolver.resolve_url(&tok).await.unwrap();
    assert_eq!(link, "https://dl.example/f.mkv");
    assert_eq!(count_requests(&ws, "/api/file_link/").await, 1);
}

#[tokio::test]
async fn test_recovery_refetches_path_despite_armed_throttle() {
    let scc = MockServer::start().await;
    let ws = MockServer::start().await;
    mount_login_flow(&ws).await;

    // Resolving the path arms the detail throttle and yields a stale ident...
    Mock::given(method("GET"))
        .and(path("/Play/11"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "streams": [{"provider": "webshare", "ident": "stale9"}]
        })))
        .up_to_n_times(1)
        .mount(&scc)
        .await;
    // ...and the recovery re-fetch of the same path sees the rotated one.
    Mock::given(method("GET"))
        .and(path("/Play/11"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "streams": [{"provider": "webshare", "ident": "fresh9"}]
        })))
        .mount(&scc)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/file_link/"))
        .and(body_string_contains("ident=stale9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"status": "FATAL", "code": "FILE_IDENT_INVALID", "message": "unknown"}),
        ))
        .mount(&ws)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/file_link/"))
        .and(body_string_contains("ident=fresh9"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"link": "https://dl.example/fresh.mkv"}])),
        )
        .mount(&ws)
        .await;

    let mut resolver = link_resolver(&scc, &ws);
    let link = resolver.resolve_url("/Play/11").await.unwrap();
    assert_eq!(link, "https://dl.example/fresh.mkv");
    // The recovery retried the original path exactly once, nothing nested.
    assert_eq!(count_requests(&scc, "/Play/11").await, 2);
    assert_eq!(count_requests(&scc, "/Play/Play/11").await, 0);
    assert_eq!(count_requests(&ws, "/api/file_link/").await, 2);
}

#[tokio::test]
async fn test_search_normalizes_and_classifies() {
    let scc = MockServer::start().await;
    let ws = MockServer::start().await;

    let listing = json!({
        "title": "Results",
        "menu": [
            {
                "type": "movie",
                "id": 1,
                "i18n_info": {"en": {"title": "[B]Alpha[/B]"}},
                "info": {"year": 2000, "mediatype": "movie"},
                "streams": [{"provider": "webshare", "ident": "aaa1"}]
            },
            {"type": "next", "title": "Next", "url": "/Search/alpha?page=2"}
        ]
    });
    Mock::given(method("GET"))
        .and(path("/api/media/filter/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&listing))
        .mount(&scc)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/media/filter/cast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"menu": []})))
        .mount(&scc)
        .await;
    // Enrichment detail for the movie hit.
    Mock::given(method("GET"))
        .and(path("/Play/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "streams": [
                {"provider": "webshare", "ident": "aaa1", "quality": "1080p", "size": 4200}
            ]
        })))
        .mount(&scc)
        .await;

    let resolver = CatalogResolver::new(
        Arc::new(SccClient::new(scc.uri())),
        RateLimiter::in_memory(KeyBuilder::default()),
        scc_config(&scc.uri()),
        ws_config(&ws.uri()),
    );
    let mut session = session_for(&ws);
    let page = resolver.search("alpha", 10, &mut session).await.unwrap();

    assert_eq!(page.title, "Results");
    // Identical entries from the tiered searches are deduplicated.
    assert_eq!(page.items.len(), 2);

    let playable = &page.items[0];
    assert_eq!(playable.kind, ItemKind::Playable);
    assert_eq!(playable.label, "Alpha");
    let (kind, payload) = token::decode(playable.ident.as_deref().unwrap()).unwrap();
    assert_eq!(kind, "video");
    assert_eq!(payload.get("v"), Some(&json!("aaa1")));
    assert_eq!(playable.meta.quality.as_deref(), Some("1080p"));
    assert_eq!(playable.meta.size_bytes, Some(4200));

    let pager = &page.items[1];
    assert_eq!(pager.kind, ItemKind::Paginator);
    assert!(!pager.selectable);

    // No fallback traffic when the catalog answered.
    assert_eq!(count_requests(&ws, "/api/search/").await, 0);
}

#[tokio::test]
async fn test_short_query_never_reaches_cast_search() {
    let scc = MockServer::start().await;
    let ws = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/media/filter/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"menu": []})))
        .mount(&scc)
        .await;
    // The people search floods on short prefixes; it must never be asked.
    Mock::given(method("GET"))
        .and(path("/api/media/filter/cast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"menu": []})))
        .expect(0)
        .mount(&scc)
        .await;

    let resolver = CatalogResolver::new(
        Arc::new(SccClient::new(scc.uri())),
        RateLimiter::in_memory(KeyBuilder::default()),
        scc_config(&scc.uri()),
        ws_config(&ws.uri()),
    );
    let mut session = session_for(&ws);
    let page = resolver.search("ab", 10, &mut session).await.unwrap();
    assert!(page.items.is_empty());
}

#[tokio::test]
async fn test_search_falls_back_to_flat_file_search() {
    let scc = MockServer::start().await;
    let ws = MockServer::start().await;
    mount_login_flow(&ws).await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&scc)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/search/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "OK",
            "total": 1,
            "files": [
                {"ident": "f1abc", "name": "alpha.mkv", "size": 700, "type": "video"}
            ]
        })))
        .mount(&ws)
        .await;

    let resolver = CatalogResolver::new(
        Arc::new(SccClient::new(scc.uri())),
        RateLimiter::in_memory(KeyBuilder::default()),
        scc_config(&scc.uri()),
        ws_config(&ws.uri()),
    );
    let mut session = session_for(&ws);
    let page = resolver.search("alpha", 10, &mut session).await.unwrap();

    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].label, "alpha.mkv");
    assert_eq!(page.items[0].meta.size_bytes, Some(700));
    let (_, payload) = token::decode(page.items[0].ident.as_deref().unwrap()).unwrap();
    assert_eq!(payload.get("v"), Some(&json!("f1abc")));
}

#[tokio::test]
async fn test_search_propagates_catalog_error_when_fallback_fails_too() {
    let scc = MockServer::start().await;
    let ws = MockServer::start().await;
    mount_login_flow(&ws).await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&scc)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/search/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&ws)
        .await;

    let resolver = CatalogResolver::new(
        Arc::new(SccClient::new(scc.uri())),
        RateLimiter::in_memory(KeyBuilder::default()),
        scc_config(&scc.uri()),
        ws_config(&ws.uri()),
    );
    let mut session = session_for(&ws);
    let err = resolver.search("alpha", 10, &mut session).await.unwrap_err();
    // The catalog's own error wins over the fallback's.
    match err {
        ProviderError::Http { status, .. } => assert_eq!(status.as_u16(), 503),
        other => panic!("expected catalog HTTP error, got {other}"),
    }
}

#[tokio::test]
async fn test_browse_maps_menu_levels() {
    let scc = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/genres"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "title": "Genres",
            "filter": "genre",
            "menu": [
                {"type": "dir", "title": "Action", "url": "/genres/action"},
                {"type": "dir", "title": "Drama", "url": "/genres/drama"},
                "garbage entry"
            ]
        })))
        .mount(&scc)
        .await;

    let resolver = CatalogResolver::new(
        Arc::new(SccClient::new(scc.uri())),
        RateLimiter::in_memory(KeyBuilder::default()),
        scc_config(&scc.uri()),
        WebshareConfig::default(),
    );
    let page = resolver.browse("/genres").await.unwrap();
    assert_eq!(page.title, "Genres");
    assert_eq!(page.filter.as_deref(), Some("genre"));
    // The undecodable entry is skipped, not fatal.
    assert_eq!(page.items.len(), 2);
    assert!(page.items.iter().all(|i| i.kind == ItemKind::Directory));
}

#[tokio::test]
async fn test_detail_throttle_defers_and_dedupes_queue() {
    let scc = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Play/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "streams": [{"provider": "webshare", "ident": "one1"}]
        })))
        .mount(&scc)
        .await;

    let mut idents = IdentResolver::new(
        Arc::new(SccClient::new(scc.uri())),
        RateLimiter::in_memory(KeyBuilder::default()),
        scc_config(&scc.uri()),
    );

    // First detail fetch goes through and starts the throttle interval.
    assert_eq!(idents.resolve("/Play/1").await.unwrap(), "one1");

    // Everything else within the interval is deferred onto the queue.
    let err = idents.resolve("/Play/2").await.unwrap_err();
    assert!(matches!(err, ProviderError::Deferred { .. }));
    let err = idents.resolve("/Play/3").await.unwrap_err();
    assert!(matches!(err, ProviderError::Deferred { .. }));
    assert_eq!(idents.queue_len(), 2);

    // Re-asking for a queued path does not grow the queue.
    let _ = idents.resolve("/Play/2").await;
    assert_eq!(idents.queue_len(), 2);

    // Draining respects the same throttle: nothing moves yet.
    assert_eq!(idents.process_queue(10).await.unwrap(), 0);
    assert_eq!(idents.queue_len(), 2);
}

#[tokio::test]
async fn test_list_variants_from_detail() {
    let scc = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Play/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "title": "Seven",
            "streams": [
                {"provider": "webshare", "ident": "hd7", "quality": "1080p", "size": 4000},
                {"provider": "webshare", "ident": "sd7", "quality": "720p", "size": 1500},
                {"provider": "other", "ident": "x", "quality": "4K"}
            ]
        })))
        .mount(&scc)
        .await;

    let mut idents = IdentResolver::new(
        Arc::new(SccClient::new(scc.uri())),
        RateLimiter::in_memory(KeyBuilder::default()),
        scc_config(&scc.uri()),
    );
    let variants = idents.list_variants("7").await.unwrap();
    assert_eq!(variants.len(), 2);
    assert_eq!(variants[0].title, "Seven");
    assert_eq!(variants[0].quality.as_deref(), Some("1080p"));

    // Each variant id decodes back to its own stream payload.
    let (kind, payload) = token::decode(&variants[1].id).unwrap();
    assert_eq!(kind, "stream");
    assert_eq!(payload.get("ident"), Some(&json!("sd7")));
}
