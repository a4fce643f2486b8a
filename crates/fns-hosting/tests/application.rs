use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::Request;
use fns_hosting::{Application, ApplicationSettings, StaticDiscovery};
use fns_transport::LifecycleState;
use tower::ServiceExt;

fn request(method: &str, uri: &str) -> Request<Body> {
    let mut req = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-fns-device-id", "dev-1")
        .body(Body::empty())
        .unwrap();
    req.extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 0))));
    req
}

#[tokio::test]
async fn assembled_application_serves_health_and_registers_signatures() {
    let settings = ApplicationSettings {
        node_id: "node-1".to_string(),
        node_name: "test-node".to_string(),
        ..ApplicationSettings::default()
    };
    let discovery = Arc::new(StaticDiscovery::new(Vec::new()));
    let app = Application::new(settings, discovery);
    app.state().lifecycle.set_state(LifecycleState::Serving);

    let router = fns_transport::router(app.state());

    let response = router
        .clone()
        .oneshot(request("GET", "/application/health"))
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    let bytes = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["id"], "node-1");

    let response = router
        .oneshot(request("GET", "/services/names"))
        .await
        .unwrap();
    let bytes = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
    let names: Vec<String> = serde_json::from_slice(&bytes).unwrap();
    assert!(names.contains(&"signatures".to_string()));
}
