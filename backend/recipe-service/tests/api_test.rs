//! End-to-end tests over the real route table with in-memory storage.
//!
//! Covers search (filters, ordering, pagination, validation, candidate
//! limits), the save toggle and history ledger behind the idempotency gate,
//! storage outages, rate limiting, and the user recipe share/submit/review
//! flow.

mod common;

use actix_middleware::{ClassPolicy, RateLimitConfig};
use actix_web::http::StatusCode;
use actix_web::{test, App};
use chrono::Duration;
use common::{content, published, Harness, USER_ID_HEADER, USER_ROLES_HEADER};
use error_types::error_types as problem_types;
use recipe_service::models::{EventKind, HistoryEvent};
use serde_json::{json, Value};
use uuid::Uuid;

fn ids(body: &Value) -> Vec<String> {
    body["items"]
        .as_array()
        .expect("items array")
        .iter()
        .map(|item| item["id"].as_str().expect("id").to_string())
        .collect()
}

fn get(uri: &str, user: Uuid) -> test::TestRequest {
    test::TestRequest::get()
        .uri(uri)
        .insert_header((USER_ID_HEADER, user.to_string()))
}

#[actix_web::test]
async fn test_search_requires_identity() {
    let harness = Harness::new();
    let app = test::init_service(App::new().configure(harness.config())).await;

    let req = test::TestRequest::get()
        .uri("/api/v1/recipes/search")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.headers().get("x-ratelimit-limit").unwrap(), "60");
    assert_eq!(resp.headers().get("x-ratelimit-remaining").unwrap(), "59");
    assert!(resp.headers().contains_key("x-ratelimit-reset"));
}

#[actix_web::test]
async fn test_unidentified_requests_are_limited_by_address() {
    let harness = Harness::with_rate_limits(RateLimitConfig {
        read: ClassPolicy {
            capacity: 2,
            refill_per_minute: 1,
        },
        ..RateLimitConfig::default()
    });
    let app = test::init_service(App::new().configure(harness.config())).await;

    let anonymous = || {
        test::TestRequest::get()
            .uri("/api/v1/recipes/search")
            .insert_header((USER_ID_HEADER, "not-a-uuid"))
            .to_request()
    };
    for _ in 0..2 {
        let resp = test::call_service(&app, anonymous()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
    let resp = test::call_service(&app, anonymous()).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(resp.headers().contains_key("retry-after"));

    // An identified user has a bucket of their own.
    let req = get("/api/v1/recipes/search", Uuid::new_v4()).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("x-ratelimit-remaining").unwrap(), "1");
}

#[actix_web::test]
async fn test_protein_and_time_filter_ranks_recent_first() {
    let harness = Harness::new();

    let mut a = content("Lentil bowl");
    a.nutrition.protein_g = 25.0;
    a.prep_minutes = 10;
    a.cook_minutes = 10;
    let a = harness.add(published(a, Duration::days(1)));

    let mut b = content("Chickpea stew");
    b.nutrition.protein_g = 22.0;
    b.prep_minutes = 10;
    b.cook_minutes = 15;
    let b = harness.add(published(b, Duration::days(30)));

    let mut low_protein = content("Cucumber salad");
    low_protein.nutrition.protein_g = 15.0;
    harness.add(published(low_protein, Duration::hours(1)));

    let mut slow = content("Braised beans");
    slow.nutrition.protein_g = 30.0;
    slow.prep_minutes = 15;
    slow.cook_minutes = 30;
    harness.add(published(slow, Duration::hours(1)));

    let app = test::init_service(App::new().configure(harness.config())).await;
    let user = Uuid::new_v4();
    let req = get(
        "/api/v1/recipes/search?protein_min=20&time_max=30&limit=50",
        user,
    )
    .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(ids(&body), vec![a.to_string(), b.to_string()]);
    assert_eq!(body["total"], 2);
    assert_eq!(body["has_more"], false);
}

#[actix_web::test]
async fn test_tag_filters_combine() {
    let harness = Harness::new();

    let tagged = |title: &str, diets: &[&str], cuisines: &[&str], allergens: &[&str]| {
        let mut c = content(title);
        c.diet_tags = diets.iter().map(|s| s.to_string()).collect();
        c.cuisines = cuisines.iter().map(|s| s.to_string()).collect();
        c.allergens = allergens.iter().map(|s| s.to_string()).collect();
        published(c, Duration::days(2))
    };

    let keep = harness.add(tagged("Green curry", &["vegan", "gluten_free"], &["thai"], &[]));
    harness.add(tagged("Pasta", &["vegan"], &["italian"], &[]));
    harness.add(tagged(
        "Satay risotto",
        &["vegan", "gluten_free"],
        &["italian"],
        &["peanut"],
    ));
    harness.add(tagged("Tacos", &["vegan", "gluten_free"], &["mexican"], &[]));

    let app = test::init_service(App::new().configure(harness.config())).await;
    let req = get(
        "/api/v1/recipes/search?diet=vegan,gluten-free&allergens=peanut&cuisine=thai,italian",
        Uuid::new_v4(),
    )
    .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(ids(&body), vec![keep.to_string()]);
}

#[actix_web::test]
async fn test_pages_are_deterministic_and_gap_free() {
    let harness = Harness::new();
    let base = chrono::Utc::now();
    for i in 0..7i64 {
        // Pairs share a timestamp so the id tie-break is exercised.
        let mut recipe = published(content(&format!("Recipe {}", i)), Duration::zero());
        recipe.updated_at = base - Duration::days(i / 2);
        harness.add(recipe);
    }

    let app = test::init_service(App::new().configure(harness.config())).await;
    let user = Uuid::new_v4();

    let full_req = get("/api/v1/recipes/search?sort=newest&limit=50", user).to_request();
    let full: Value = test::call_and_read_body_json(&app, full_req).await;
    let again_req = get("/api/v1/recipes/search?sort=newest&limit=50", user).to_request();
    let again: Value = test::call_and_read_body_json(&app, again_req).await;
    assert_eq!(ids(&full), ids(&again));
    assert_eq!(ids(&full).len(), 7);

    let mut paged = Vec::new();
    for offset in [0, 3, 6] {
        let req = get(
            &format!("/api/v1/recipes/search?sort=newest&limit=3&offset={}", offset),
            user,
        )
        .to_request();
        let page: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(page["has_more"], offset < 6);
        paged.extend(ids(&page));
    }
    assert_eq!(paged, ids(&full));
}

#[actix_web::test]
async fn test_oversized_limit_is_clamped() {
    let harness = Harness::new();
    harness.add(published(content("Toast"), Duration::days(1)));
    let app = test::init_service(App::new().configure(harness.config())).await;

    let req = get("/api/v1/recipes/search?limit=5000", Uuid::new_v4()).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["limit"], 200);
    assert_eq!(body["limit_clamped"], true);
}

#[actix_web::test]
async fn test_invalid_query_lists_every_problem() {
    let harness = Harness::new();
    let app = test::init_service(App::new().configure(harness.config())).await;

    let req = get(
        "/api/v1/recipes/search?protein_min=-1&calories_min=900&calories_max=100&diet=carnivore",
        Uuid::new_v4(),
    )
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "application/problem+json"
    );

    let body: Value = test::read_body_json(resp).await;
    let codes: Vec<&str> = body["errors"]
        .as_array()
        .expect("errors")
        .iter()
        .map(|e| e["code"].as_str().unwrap())
        .collect();
    assert_eq!(codes.len(), 3);
    assert!(codes.contains(&"out_of_range"));
    assert!(codes.contains(&"contradictory_bounds"));
    assert!(codes.contains(&"unknown_token"));
}

#[actix_web::test]
async fn test_text_match_is_found_past_candidate_limit() {
    let harness = Harness::with_candidate_limit(3);
    for _ in 0..3 {
        harness.add(published(content("Plain soup"), Duration::hours(1)));
    }
    let curry = harness.add(published(content("Green curry"), Duration::days(10)));

    let app = test::init_service(App::new().configure(harness.config())).await;
    let user = Uuid::new_v4();

    let req = get("/api/v1/recipes/search?q=curry", user).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(ids(&body), vec![curry.to_string()]);
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["signals"]["text"], 1.0);
}

#[actix_web::test]
async fn test_search_wider_than_candidate_limit_is_rejected() {
    let harness = Harness::with_candidate_limit(3);
    for _ in 0..4 {
        harness.add(published(content("Plain soup"), Duration::hours(1)));
    }
    let app = test::init_service(App::new().configure(harness.config())).await;

    let req = get("/api/v1/recipes/search", Uuid::new_v4()).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "application/problem+json"
    );
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["type"], problem_types::SEARCH_TOO_BROAD);
    assert!(body["detail"].as_str().unwrap().contains('4'));
}

async fn assert_retryable_unavailable(resp: actix_web::dev::ServiceResponse, dependency: &str) {
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "application/problem+json"
    );
    let retry_after: u64 = resp
        .headers()
        .get("retry-after")
        .expect("retry-after")
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 0);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["type"], problem_types::DEPENDENCY_UNAVAILABLE);
    assert!(body["detail"].as_str().unwrap().contains(dependency));
}

#[actix_web::test]
async fn test_search_fails_retryably_when_corpus_unavailable() {
    let harness = Harness::new();
    harness.add(published(content("Omelette"), Duration::days(1)));
    harness.corpus.set_unavailable(true);
    let app = test::init_service(App::new().configure(harness.config())).await;

    let req = get("/api/v1/recipes/search?q=omelette", Uuid::new_v4()).to_request();
    let resp = test::call_service(&app, req).await;
    assert_retryable_unavailable(resp, "recipe corpus").await;
}

#[actix_web::test]
async fn test_search_fails_retryably_when_ledger_unavailable() {
    let harness = Harness::new();
    harness.add(published(content("Omelette"), Duration::days(1)));
    harness.ledger.set_unavailable(true);
    let app = test::init_service(App::new().configure(harness.config())).await;

    let req = get("/api/v1/recipes/search?q=omelette", Uuid::new_v4()).to_request();
    let resp = test::call_service(&app, req).await;
    assert_retryable_unavailable(resp, "interaction ledger").await;
}

#[actix_web::test]
async fn test_save_fails_retryably_and_releases_key_when_ledger_unavailable() {
    let harness = Harness::new();
    let recipe = harness.add(published(content("Omelette"), Duration::days(1)));
    harness.ledger.set_unavailable(true);
    let app = test::init_service(App::new().configure(harness.config())).await;
    let user = Uuid::new_v4();

    let toggle = || {
        test::TestRequest::put()
            .uri(&format!("/api/v1/recipes/{}/save", recipe))
            .insert_header((USER_ID_HEADER, user.to_string()))
            .insert_header(("Idempotency-Key", "save-once"))
            .to_request()
    };

    let resp = test::call_service(&app, toggle()).await;
    assert_retryable_unavailable(resp, "interaction ledger").await;

    // The failed attempt did not pin the key; the retry runs for real.
    harness.ledger.set_unavailable(false);
    let resp = test::call_service(&app, toggle()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().get("idempotency-replayed").is_none());
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["saved"], true);
}

#[actix_web::test]
async fn test_recently_cooked_recipe_ranks_lower() {
    let harness = Harness::new();
    let user = Uuid::new_v4();

    let now = chrono::Utc::now();
    let mut cooked = published(content("Omelette"), Duration::days(3));
    let mut fresh = published(content("Omelette"), Duration::days(3));
    cooked.updated_at = now - Duration::days(3);
    fresh.updated_at = cooked.updated_at;
    let cooked = harness.add(cooked);
    let fresh = harness.add(fresh);

    harness.ledger.push_event(HistoryEvent::new(
        user,
        cooked,
        EventKind::Cooked,
        now - Duration::hours(2),
    ));

    let app = test::init_service(App::new().configure(harness.config())).await;
    let req = get("/api/v1/recipes/search?q=omelette", user).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(ids(&body), vec![fresh.to_string(), cooked.to_string()]);
    assert!(body["items"][1]["signals"]["repeat_penalty"].as_f64().unwrap() > 0.0);

    // Another user's history does not affect this ranking.
    let other = get("/api/v1/recipes/search?q=omelette", Uuid::new_v4()).to_request();
    let other: Value = test::call_and_read_body_json(&app, other).await;
    assert_eq!(other["items"][0]["signals"]["repeat_penalty"], 0.0);
}

#[actix_web::test]
async fn test_unknown_or_malformed_recipe_is_not_found() {
    let harness = Harness::new();
    let app = test::init_service(App::new().configure(harness.config())).await;
    let user = Uuid::new_v4();

    let req = get(&format!("/api/v1/recipes/{}", Uuid::new_v4()), user).to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::NOT_FOUND
    );

    let req = get("/api/v1/recipes/not-an-id", user).to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[actix_web::test]
async fn test_save_toggle_is_its_own_inverse() {
    let harness = Harness::new();
    let recipe = harness.add(published(content("Soup"), Duration::days(1)));
    let app = test::init_service(App::new().configure(harness.config())).await;
    let user = Uuid::new_v4();
    let uri = format!("/api/v1/recipes/{}/save", recipe);

    let toggle = || {
        test::TestRequest::put()
            .uri(&uri)
            .insert_header((USER_ID_HEADER, user.to_string()))
            .to_request()
    };

    let first: Value = test::call_and_read_body_json(&app, toggle()).await;
    assert_eq!(first["saved"], true);

    let saved: Value =
        test::call_and_read_body_json(&app, get("/api/v1/me/saved", user).to_request()).await;
    assert_eq!(saved["total"], 1);
    assert_eq!(saved["items"][0]["recipe_id"], recipe.to_string());

    let second: Value = test::call_and_read_body_json(&app, toggle()).await;
    assert_eq!(second["saved"], false);

    let membership: Value = test::call_and_read_body_json(&app, get(&uri, user).to_request()).await;
    assert_eq!(membership["saved"], false);
}

#[actix_web::test]
async fn test_retried_toggle_replays_first_response() {
    let harness = Harness::new();
    let recipe = harness.add(published(content("Soup"), Duration::days(1)));
    let app = test::init_service(App::new().configure(harness.config())).await;
    let user = Uuid::new_v4();
    let uri = format!("/api/v1/recipes/{}/save", recipe);

    let toggle = || {
        test::TestRequest::put()
            .uri(&uri)
            .insert_header((USER_ID_HEADER, user.to_string()))
            .insert_header(("Idempotency-Key", "save-1"))
            .to_request()
    };

    let first = test::call_service(&app, toggle()).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert!(first.headers().get("Idempotency-Replayed").is_none());
    let first: Value = test::read_body_json(first).await;

    let retry = test::call_service(&app, toggle()).await;
    assert_eq!(retry.status(), StatusCode::OK);
    assert_eq!(retry.headers().get("Idempotency-Replayed").unwrap(), "true");
    let retry: Value = test::read_body_json(retry).await;

    assert_eq!(first, retry);
    let membership: Value = test::call_and_read_body_json(&app, get(&uri, user).to_request()).await;
    assert_eq!(membership["saved"], true);
}

#[actix_web::test]
async fn test_concurrent_duplicates_apply_once() {
    let harness = Harness::new();
    let recipe = harness.add(published(content("Soup"), Duration::days(1)));
    let app = test::init_service(App::new().configure(harness.config())).await;
    let user = Uuid::new_v4();
    let uri = format!("/api/v1/recipes/{}/save", recipe);

    let toggle = || {
        test::TestRequest::put()
            .uri(&uri)
            .insert_header((USER_ID_HEADER, user.to_string()))
            .insert_header(("Idempotency-Key", "burst"))
            .to_request()
    };

    let (a, b) = futures::join!(
        test::call_service(&app, toggle()),
        test::call_service(&app, toggle())
    );
    assert_eq!(a.status(), StatusCode::OK);
    assert_eq!(b.status(), StatusCode::OK);

    let membership: Value = test::call_and_read_body_json(&app, get(&uri, user).to_request()).await;
    assert_eq!(membership["saved"], true);
}

#[actix_web::test]
async fn test_reused_key_with_different_body_conflicts() {
    let harness = Harness::new();
    let recipe = harness.add(published(content("Soup"), Duration::days(1)));
    let app = test::init_service(App::new().configure(harness.config())).await;
    let user = Uuid::new_v4();
    let uri = format!("/api/v1/recipes/{}/history", recipe);

    let record = |kind: &str| {
        test::TestRequest::post()
            .uri(&uri)
            .insert_header((USER_ID_HEADER, user.to_string()))
            .insert_header(("Idempotency-Key", "event-1"))
            .set_json(json!({ "kind": kind }))
            .to_request()
    };

    let first = test::call_service(&app, record("viewed")).await;
    assert_eq!(first.status(), StatusCode::CREATED);

    let reused = test::call_service(&app, record("cooked")).await;
    assert_eq!(reused.status(), StatusCode::CONFLICT);
    let problem: Value = test::read_body_json(reused).await;
    assert_eq!(problem["type"], "https://errors.nova.dev/idempotency-key-reused");

    assert_eq!(harness.ledger.events_for(user, recipe).len(), 1);
}

#[actix_web::test]
async fn test_repeated_views_collapse_but_cooks_do_not() {
    let harness = Harness::new();
    let recipe = harness.add(published(content("Soup"), Duration::days(1)));
    let app = test::init_service(App::new().configure(harness.config())).await;
    let user = Uuid::new_v4();
    let uri = format!("/api/v1/recipes/{}/history", recipe);

    let record = |kind: &str| {
        test::TestRequest::post()
            .uri(&uri)
            .insert_header((USER_ID_HEADER, user.to_string()))
            .set_json(json!({ "kind": kind }))
            .to_request()
    };

    let view = test::call_service(&app, record("viewed")).await;
    assert_eq!(view.status(), StatusCode::CREATED);
    let view: Value = test::read_body_json(view).await;

    let again = test::call_service(&app, record("viewed")).await;
    assert_eq!(again.status(), StatusCode::OK);
    let again: Value = test::read_body_json(again).await;
    assert_eq!(again["collapsed"], true);
    assert_eq!(again["event"]["id"], view["event"]["id"]);

    for _ in 0..2 {
        let cook = test::call_service(&app, record("cooked")).await;
        assert_eq!(cook.status(), StatusCode::CREATED);
    }

    let history: Value =
        test::call_and_read_body_json(&app, get("/api/v1/me/history", user).to_request()).await;
    assert_eq!(history["total"], 3);
}

#[actix_web::test]
async fn test_heavy_writes_admit_burst_then_reject() {
    let harness = Harness::new();
    let app = test::init_service(App::new().configure(harness.config())).await;
    let user = Uuid::new_v4();

    let create = || {
        test::TestRequest::post()
            .uri("/api/v1/me/recipes")
            .insert_header((USER_ID_HEADER, user.to_string()))
            .set_json(content("Flatbread"))
            .to_request()
    };

    for _ in 0..6 {
        let resp = test::call_service(&app, create()).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert!(resp.headers().contains_key("x-ratelimit-remaining"));
    }

    let rejected = test::call_service(&app, create()).await;
    assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = rejected
        .headers()
        .get("retry-after")
        .expect("retry-after")
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 0);

    // Reads draw from a separate bucket.
    let search = get("/api/v1/recipes/search", user).to_request();
    assert_eq!(test::call_service(&app, search).await.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_share_submit_review_flow() {
    let harness = Harness::new();
    let app = test::init_service(App::new().configure(harness.config())).await;
    let owner = Uuid::new_v4();
    let curator = Uuid::new_v4();

    let post = |uri: String, user: Uuid| {
        test::TestRequest::post()
            .uri(&uri)
            .insert_header((USER_ID_HEADER, user.to_string()))
    };

    let mut recipe = content("Grandma's Dumplings");
    recipe.cuisines = vec!["Chinese".to_string()];
    let created: Value = test::call_and_read_body_json(
        &app,
        post("/api/v1/me/recipes".to_string(), owner)
            .set_json(&recipe)
            .to_request(),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["visibility"], "private");
    assert_eq!(created["cuisines"], json!(["chinese"]));

    let shared: Value = test::call_and_read_body_json(
        &app,
        post(format!("/api/v1/me/recipes/{}/share", id), owner).to_request(),
    )
    .await;
    let slug = shared["share_slug"].as_str().unwrap().to_string();

    // Link holders need no identity and see no owner details.
    let public = test::TestRequest::get()
        .uri(&format!("/api/v1/shared/{}", slug))
        .to_request();
    let public = test::call_service(&app, public).await;
    assert_eq!(public.status(), StatusCode::OK);
    let public: Value = test::read_body_json(public).await;
    assert_eq!(public["title"], "Grandma's Dumplings");
    assert!(public.get("owner_id").is_none());

    let submitted = test::call_service(
        &app,
        post(format!("/api/v1/me/recipes/{}/submit", id), owner).to_request(),
    )
    .await;
    assert_eq!(submitted.status(), StatusCode::OK);

    let retired = test::TestRequest::get()
        .uri(&format!("/api/v1/shared/{}", slug))
        .to_request();
    assert_eq!(
        test::call_service(&app, retired).await.status(),
        StatusCode::NOT_FOUND
    );

    let edit = test::TestRequest::patch()
        .uri(&format!("/api/v1/me/recipes/{}", id))
        .insert_header((USER_ID_HEADER, owner.to_string()))
        .set_json(content("Changed mind"))
        .to_request();
    assert_eq!(
        test::call_service(&app, edit).await.status(),
        StatusCode::CONFLICT
    );

    let not_curator = post(format!("/api/v1/curation/{}/review", id), owner)
        .set_json(json!({ "decision": "approve" }))
        .to_request();
    assert_eq!(
        test::call_service(&app, not_curator).await.status(),
        StatusCode::FORBIDDEN
    );

    let review = post(format!("/api/v1/curation/{}/review", id), curator)
        .insert_header((USER_ROLES_HEADER, "curator"))
        .set_json(json!({ "decision": "approve", "note": "lovely" }))
        .to_request();
    let reviewed: Value = test::call_and_read_body_json(&app, review).await;
    assert_eq!(reviewed["user_recipe"]["curation"], "approved");
    let published_id = reviewed["published_recipe"]["id"].as_str().unwrap();

    let found = get(&format!("/api/v1/recipes/{}", published_id), owner).to_request();
    assert_eq!(test::call_service(&app, found).await.status(), StatusCode::OK);

    let search: Value = test::call_and_read_body_json(
        &app,
        get("/api/v1/recipes/search?q=dumplings&cuisine=chinese", curator).to_request(),
    )
    .await;
    assert_eq!(ids(&search), vec![published_id.to_string()]);
}

#[actix_web::test]
async fn test_other_users_recipes_are_hidden() {
    let harness = Harness::new();
    let app = test::init_service(App::new().configure(harness.config())).await;
    let owner = Uuid::new_v4();

    let created: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/me/recipes")
            .insert_header((USER_ID_HEADER, owner.to_string()))
            .set_json(content("Secret sauce"))
            .to_request(),
    )
    .await;
    let id = created["id"].as_str().unwrap();

    let share = test::TestRequest::post()
        .uri(&format!("/api/v1/me/recipes/{}/share", id))
        .insert_header((USER_ID_HEADER, Uuid::new_v4().to_string()))
        .to_request();
    assert_eq!(
        test::call_service(&app, share).await.status(),
        StatusCode::NOT_FOUND
    );
}
