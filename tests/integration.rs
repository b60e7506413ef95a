use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use ride_dispatch::api::rest::router;
use ride_dispatch::config::MatchPolicy;
use ride_dispatch::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

const PICKUP_LAT: f64 = 10.9538;
const PICKUP_LNG: f64 = 76.3182;
const KM_PER_DEGREE_LAT: f64 = 111.194_926_644_558_74;

fn setup() -> axum::Router {
    let state = AppState::new(10.0, MatchPolicy::Broadcast, 1024);
    router(Arc::new(state))
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn patch_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("PATCH")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location_km_north(km: f64) -> Value {
    json!({ "lat": PICKUP_LAT + km / KM_PER_DEGREE_LAT, "lng": PICKUP_LNG })
}

fn pickup() -> Value {
    json!({ "lat": PICKUP_LAT, "lng": PICKUP_LNG })
}

fn dropoff() -> Value {
    json!({ "lat": 11.0018, "lng": 76.4545 })
}

async fn create_driver(app: &axum::Router, km_away: f64) -> String {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/drivers",
            json!({
                "user_id": Uuid::new_v4(),
                "name": "Test Driver",
                "vehicle_model": "Toyota Etios",
                "registration_number": "KL-51-1234",
                "color": "White",
                "location": location_km_north(km_away)
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    body["id"].as_str().unwrap().to_string()
}

async fn create_ride(app: &axum::Router, rider_id: Uuid) -> Value {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/rides",
            json!({
                "rider_id": rider_id,
                "pickup": pickup(),
                "dropoff": dropoff()
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

async fn get_ride(app: &axum::Router, ride_id: &str) -> Value {
    let response = app
        .clone()
        .oneshot(get_request(&format!("/rides/{ride_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

async fn driver_requests(app: &axum::Router, driver_id: &str) -> Vec<Value> {
    let response = app
        .clone()
        .oneshot(get_request(&format!("/drivers/{driver_id}/requests")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await.as_array().unwrap().clone()
}

#[tokio::test]
async fn health_returns_ok() {
    let app = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["rides"], 0);
    assert_eq!(body["drivers"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let app = setup();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("drivers_available"));
}

#[tokio::test]
async fn create_driver_returns_driver() {
    let app = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/drivers",
            json!({
                "user_id": Uuid::new_v4(),
                "name": "Anand",
                "vehicle_model": "Maruti Dzire",
                "registration_number": "KL-52-9988",
                "color": "Blue",
                "location": { "lat": 10.9538, "lng": 76.3182 }
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["name"], "Anand");
    assert_eq!(body["available"], true);
    assert_eq!(body["pending_requests"].as_array().unwrap().len(), 0);
    assert!(body["id"].as_str().unwrap().len() > 0);
}

#[tokio::test]
async fn create_driver_empty_name_returns_400() {
    let app = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/drivers",
            json!({
                "user_id": Uuid::new_v4(),
                "name": "  ",
                "vehicle_model": "Maruti Dzire",
                "registration_number": "KL-52-9988",
                "color": "Blue",
                "location": null
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_driver_for_user_returns_409() {
    let app = setup();
    let user_id = Uuid::new_v4();

    let payload = json!({
        "user_id": user_id,
        "name": "Anand",
        "vehicle_model": "Maruti Dzire",
        "registration_number": "KL-52-9988",
        "color": "Blue",
        "location": null
    });

    let response = app
        .clone()
        .oneshot(json_request("POST", "/drivers", payload.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(json_request("POST", "/drivers", payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn create_ride_with_out_of_range_pickup_returns_400() {
    let app = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/rides",
            json!({
                "rider_id": Uuid::new_v4(),
                "pickup": { "lat": 123.0, "lng": 76.3182 },
                "dropoff": dropoff()
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_nonexistent_ride_returns_404() {
    let app = setup();
    let fake_id = "00000000-0000-0000-0000-000000000000";
    let response = app
        .oneshot(get_request(&format!("/rides/{fake_id}")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn ride_is_offered_only_within_radius() {
    let app = setup();
    let near = create_driver(&app, 9.9).await;
    let far = create_driver(&app, 10.1).await;

    let ride = create_ride(&app, Uuid::new_v4()).await;
    assert_eq!(ride["status"], "Pending");
    assert!(ride["driver_id"].is_null());

    let candidates = ride["candidates"].as_array().unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0], near.as_str());

    assert_eq!(driver_requests(&app, &near).await.len(), 1);
    assert_eq!(driver_requests(&app, &far).await.len(), 0);
}

#[tokio::test]
async fn accept_assigns_ride_and_clears_other_offers() {
    let app = setup();
    let winner = create_driver(&app, 2.0).await;
    let loser = create_driver(&app, 3.0).await;

    let ride = create_ride(&app, Uuid::new_v4()).await;
    let ride_id = ride["id"].as_str().unwrap().to_string();
    assert_eq!(ride["candidates"].as_array().unwrap().len(), 2);

    let response = app
        .clone()
        .oneshot(post_request(&format!(
            "/drivers/{winner}/rides/{ride_id}/accept"
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let ride = get_ride(&app, &ride_id).await;
    assert_eq!(ride["status"], "InProgress");
    assert_eq!(ride["driver_id"], winner.as_str());
    assert_eq!(ride["candidates"].as_array().unwrap().len(), 0);

    assert_eq!(driver_requests(&app, &loser).await.len(), 0);

    let response = app
        .clone()
        .oneshot(get_request(&format!("/drivers/{winner}")))
        .await
        .unwrap();
    let driver = body_json(response).await;
    assert_eq!(driver["available"], false);
}

#[tokio::test]
async fn second_accept_returns_409() {
    let app = setup();
    let first = create_driver(&app, 2.0).await;
    let second = create_driver(&app, 3.0).await;

    let ride = create_ride(&app, Uuid::new_v4()).await;
    let ride_id = ride["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(post_request(&format!(
            "/drivers/{first}/rides/{ride_id}/accept"
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(post_request(&format!(
            "/drivers/{second}/rides/{ride_id}/accept"
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = body_json(response).await;
    assert_eq!(body["kind"], "ride_not_acceptable");

    let ride = get_ride(&app, &ride_id).await;
    assert_eq!(ride["driver_id"], first.as_str());
}

#[tokio::test]
async fn reject_is_idempotent_and_monotone() {
    let app = setup();
    let driver = create_driver(&app, 2.0).await;

    let ride = create_ride(&app, Uuid::new_v4()).await;
    let ride_id = ride["id"].as_str().unwrap().to_string();
    assert_eq!(driver_requests(&app, &driver).await.len(), 1);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(post_request(&format!(
                "/drivers/{driver}/rides/{ride_id}/reject"
            )))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let ride = get_ride(&app, &ride_id).await;
    assert_eq!(ride["status"], "Pending");
    let rejected = ride["rejected"].as_array().unwrap();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0], driver.as_str());
    assert_eq!(ride["candidates"].as_array().unwrap().len(), 0);
    assert_eq!(driver_requests(&app, &driver).await.len(), 0);
}

#[tokio::test]
async fn reject_rematches_replacement_drivers() {
    let app = setup();
    let rejector = create_driver(&app, 2.0).await;

    let ride = create_ride(&app, Uuid::new_v4()).await;
    let ride_id = ride["id"].as_str().unwrap().to_string();

    // second driver registers after the initial match pass
    let replacement = create_driver(&app, 4.0).await;
    assert_eq!(driver_requests(&app, &replacement).await.len(), 0);

    let response = app
        .clone()
        .oneshot(post_request(&format!(
            "/drivers/{rejector}/rides/{ride_id}/reject"
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let ride = get_ride(&app, &ride_id).await;
    let candidates = ride["candidates"].as_array().unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0], replacement.as_str());
    assert_eq!(driver_requests(&app, &replacement).await.len(), 1);
}

#[tokio::test]
async fn cancel_clears_offers_and_repeat_cancel_returns_400() {
    let app = setup();
    let driver = create_driver(&app, 2.0).await;

    let ride = create_ride(&app, Uuid::new_v4()).await;
    let ride_id = ride["id"].as_str().unwrap().to_string();
    assert_eq!(driver_requests(&app, &driver).await.len(), 1);

    let response = app
        .clone()
        .oneshot(post_request(&format!("/rides/{ride_id}/cancel")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let ride = get_ride(&app, &ride_id).await;
    assert_eq!(ride["status"], "Cancelled");
    assert_eq!(ride["candidates"].as_array().unwrap().len(), 0);
    assert_eq!(driver_requests(&app, &driver).await.len(), 0);

    let response = app
        .clone()
        .oneshot(post_request(&format!("/rides/{ride_id}/cancel")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["kind"], "invalid_transition");
}

#[tokio::test]
async fn new_ride_cancels_riders_prior_pending_rides() {
    let app = setup();
    let rider = Uuid::new_v4();

    let first = create_ride(&app, rider).await;
    let second = create_ride(&app, rider).await;
    let third = create_ride(&app, rider).await;

    let first = get_ride(&app, first["id"].as_str().unwrap()).await;
    let second = get_ride(&app, second["id"].as_str().unwrap()).await;
    let third = get_ride(&app, third["id"].as_str().unwrap()).await;

    assert_eq!(first["status"], "Cancelled");
    assert_eq!(second["status"], "Cancelled");
    assert_eq!(third["status"], "Pending");

    let response = app
        .clone()
        .oneshot(get_request(&format!("/rides?rider_id={rider}")))
        .await
        .unwrap();
    let rides = body_json(response).await;
    assert_eq!(rides.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn complete_finishes_ride_and_restores_availability() {
    let app = setup();
    let driver = create_driver(&app, 2.0).await;

    let ride = create_ride(&app, Uuid::new_v4()).await;
    let ride_id = ride["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(post_request(&format!(
            "/drivers/{driver}/rides/{ride_id}/complete"
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(post_request(&format!(
            "/drivers/{driver}/rides/{ride_id}/accept"
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(post_request(&format!(
            "/drivers/{driver}/rides/{ride_id}/complete"
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let ride = get_ride(&app, &ride_id).await;
    assert_eq!(ride["status"], "Completed");

    let response = app
        .clone()
        .oneshot(get_request(&format!("/drivers/{driver}")))
        .await
        .unwrap();
    let driver = body_json(response).await;
    assert_eq!(driver["available"], true);
}

#[tokio::test]
async fn update_driver_location() {
    let app = setup();
    let driver = create_driver(&app, 2.0).await;

    let response = app
        .clone()
        .oneshot(patch_request(
            &format!("/drivers/{driver}/location"),
            json!({ "location": { "lat": 10.9729, "lng": 76.2721 } }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["location"]["lat"], 10.9729);
    assert_eq!(body["location"]["lng"], 76.2721);
}

#[tokio::test]
async fn full_dispatch_round_trip() {
    let app = setup();
    let rider = Uuid::new_v4();
    let d1 = create_driver(&app, 8.0).await;
    let d2 = create_driver(&app, 15.0).await;

    // only the driver inside the radius is offered the ride
    let ride = create_ride(&app, rider).await;
    let ride_id = ride["id"].as_str().unwrap().to_string();
    let candidates = ride["candidates"].as_array().unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0], d1.as_str());

    // d1 declines; d2 is still out of range, so nobody is left
    let response = app
        .clone()
        .oneshot(post_request(&format!(
            "/drivers/{d1}/rides/{ride_id}/reject"
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let ride = get_ride(&app, &ride_id).await;
    assert_eq!(ride["status"], "Pending");
    assert_eq!(ride["candidates"].as_array().unwrap().len(), 0);
    assert_eq!(driver_requests(&app, &d2).await.len(), 0);

    // the rider gives up
    let response = app
        .clone()
        .oneshot(post_request(&format!("/rides/{ride_id}/cancel")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let ride = get_ride(&app, &ride_id).await;
    assert_eq!(ride["status"], "Cancelled");
    assert_eq!(driver_requests(&app, &d1).await.len(), 0);
}
