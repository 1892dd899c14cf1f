//! HTTP API for the export robot.
//!
//! - `POST /api/robo/:report_id` runs one export and returns the file
//! - `GET /api/robo` lists the known reports
//! - `GET /api/health` liveness check

mod handlers;
mod routes;

pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::RoboConfig;
use crate::robo::Robo;

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub robo: Arc<Robo>,
}

impl AppState {
    pub fn new(robo: Robo) -> Self {
        Self {
            robo: Arc::new(robo),
        }
    }
}

/// Start the web server.
pub async fn serve(config: RoboConfig, host: &str, port: u16) -> anyhow::Result<()> {
    if config.portal.credentials().is_err() {
        warn!("ZG_USER/ZG_PASS are not set; exports will fail at login");
    }
    let headless = config.browser.headless;
    let state = AppState::new(Robo::from_config(config));
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Starting robo at http://{} (headless={})", addr, headless);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{test_config, FakeLauncher, FakePortal, EXPORTED_FILE};
    use crate::robo::{exports, portal};
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        Router,
    };
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct TestApp {
        app: Router,
        launcher: Arc<FakeLauncher>,
        portal: FakePortal,
        _dir: TempDir,
    }

    fn setup_test_app() -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let portal = FakePortal::new(dir.path());
        let launcher = Arc::new(FakeLauncher::new(portal.page.clone(), dir.path()));
        let robo = Robo::new(Arc::new(test_config()), launcher.clone());
        TestApp {
            app: create_router(AppState::new(robo)),
            launcher,
            portal,
            _dir: dir,
        }
    }

    fn post(uri: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_export_returns_attachment() {
        let test = setup_test_app();

        let response = test
            .app
            .oneshot(post("/api/robo/analitico_glosas"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/octet-stream"
        );
        let disposition = response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .to_string();
        assert_eq!(
            disposition,
            format!("attachment; filename=\"{}\"", EXPORTED_FILE)
        );
        assert!(disposition.ends_with(".xlsx\""));

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(!body.is_empty());
        assert_eq!(test.launcher.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_export_unknown_report() {
        let test = setup_test_app();

        let response = test.app.oneshot(post("/api/robo/nao_existe")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({ "error": "Relatório desconhecido: nao_existe" })
        );
        assert_eq!(test.launcher.launches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_export_login_outage() {
        let test = setup_test_app();
        test.portal.main.remove(portal::USERNAME_SELECTOR);

        let response = test
            .app
            .oneshot(post("/api/robo/visao_pagamento"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = json_body(response).await;
        assert!(json["error"].as_str().unwrap().contains("#username"));
        assert_eq!(test.launcher.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_export_panel_regression_closes_session() {
        let test = setup_test_app();
        test.portal
            .reports
            .on_click("export-btn", |frame| frame.remove(exports::PANEL_SELECTOR));

        let response = test
            .app
            .oneshot(post("/api/robo/glosa_mantida"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await["error"],
            "Exports box não encontrado para baixar."
        );
        assert_eq!(test.launcher.launches.load(Ordering::SeqCst), 1);
        assert_eq!(test.launcher.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_list_reports() {
        let test = setup_test_app();

        let response = test
            .app
            .oneshot(
                Request::builder()
                    .uri("/api/robo")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        let ids: Vec<&str> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["analitico_glosas", "visao_pagamento", "glosa_mantida"]);
        assert_eq!(json[1]["label"], "Visão por Pagamento");
    }

    #[tokio::test]
    async fn test_health() {
        let test = setup_test_app();

        let response = test
            .app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_export_requires_post() {
        let test = setup_test_app();

        let response = test
            .app
            .oneshot(
                Request::builder()
                    .uri("/api/robo/analitico_glosas")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(test.launcher.launches.load(Ordering::SeqCst), 0);
    }
}
