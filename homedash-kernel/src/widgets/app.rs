//! `app` : lien vers une application, avec health check HTTP optionnel.

use super::{check_url, Widget, WidgetError};
use crate::scheduler::InstanceHandle;
use crate::view::{Header, SideContent, View, INDICATOR_GREEN, INDICATOR_RED, INDICATOR_YELLOW};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub title: String,
    pub sub_title: Option<String>,
    pub icon: Option<String>,
    pub href: Option<String>,
    pub health: Option<HealthCheck>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthCheck {
    #[serde(rename = "type")]
    pub probe: Probe,
    pub url: String,
    #[serde(default = "default_health_interval")]
    pub interval: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Probe {
    Http,
}

fn default_health_interval() -> u64 {
    5
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Checking,
    Online,
    Offline,
    Error,
}

impl Health {
    fn side(self) -> SideContent {
        match self {
            Health::Checking => SideContent::label(INDICATOR_YELLOW, "Checking"),
            Health::Online => SideContent::label(INDICATOR_GREEN, "Online"),
            Health::Offline => SideContent::label(INDICATOR_RED, "Offline"),
            Health::Error => SideContent::label(INDICATOR_RED, "Error"),
        }
    }
}

pub struct AppWidget {
    http: reqwest::Client,
}

impl AppWidget {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

fn render(config: &AppConfig, health: Option<Health>) -> View {
    let header = Header::new(&config.title)
        .icon(config.icon.clone())
        .subtitle(config.sub_title.clone())
        .side(health.map(Health::side));
    let view = View::new("app").with(header);
    match &config.href {
        Some(href) => view.with_action(format!("open_href::{href}")),
        None => view,
    }
}

async fn probe(http: &reqwest::Client, url: &str) -> Health {
    match http.get(url).send().await {
        Ok(resp) if resp.status().is_success() => Health::Online,
        Ok(resp) => {
            warn!(url, status = %resp.status(), "health check answered with an error status");
            Health::Offline
        }
        Err(e) => {
            warn!(url, error = %e, "health check failed");
            Health::Error
        }
    }
}

impl Widget for AppWidget {
    type Config = AppConfig;
    type State = ();

    fn kind(&self) -> &'static str {
        "app"
    }

    fn validate(&self, config: &AppConfig) -> Result<(), WidgetError> {
        if let Some(health) = &config.health {
            check_url("health.url", &health.url)?;
        }
        Ok(())
    }

    fn identity(&self, config: &AppConfig) -> String {
        format!(
            "app_{}_{}",
            config.href.as_deref().unwrap_or_default(),
            Utc::now().timestamp_millis()
        )
    }

    fn init(&self, config: AppConfig, _previous: Option<()>, handle: InstanceHandle) -> Result<View, WidgetError> {
        let Some(health) = config.health.clone() else {
            return Ok(render(&config, None));
        };

        let config = Arc::new(config);
        let http = self.http.clone();
        let updates = handle.clone();
        let shared = config.clone();
        handle.every(Duration::from_secs(health.interval), move || {
            let http = http.clone();
            let handle = updates.clone();
            let config = shared.clone();
            let url = health.url.clone();
            async move {
                let status = probe(&http, &url).await;
                handle.replace_view(render(&config, Some(status)));
            }
        });

        Ok(render(&config, Some(Health::Checking)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::Complication;
    use crate::widgets::testing::Harness;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn side_label(view: &View) -> Option<String> {
        match view.header()?.side_content.as_ref()? {
            SideContent::Label { label, .. } => Some(label.clone()),
            _ => None,
        }
    }

    #[test]
    fn test_render_without_health() {
        let config: AppConfig = serde_json::from_value(json!({
            "title": "Jellyfin", "subTitle": "media", "href": "http://media.lan"
        }))
        .unwrap();
        let view = render(&config, None);
        assert_eq!(view.action.as_deref(), Some("open_href::http://media.lan"));
        let header = view.header().unwrap();
        assert_eq!(header.subtitle.as_deref(), Some("media"));
        assert!(header.side_content.is_none());
        assert_eq!(view.complications.len(), 1);
        assert!(matches!(view.complications[0], Complication::Header(_)));
    }

    #[test]
    fn test_rejects_non_http_health_url() {
        let config: AppConfig = serde_json::from_value(json!({
            "title": "x", "health": {"type": "http", "url": "tcp://host"}
        }))
        .unwrap();
        assert!(AppWidget::new(reqwest::Client::new()).validate(&config).is_err());
    }

    #[tokio::test]
    async fn test_health_check_goes_online() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let harness = Harness::new(AppWidget::new(reqwest::Client::new()));
        let id = harness.start(
            "app",
            json!({"title": "Svc", "health": {"type": "http", "url": format!("{}/health", server.uri())}}),
        );
        assert!(id.starts_with("app__"));

        let view = harness.wait_for(&id, |v| side_label(v).as_deref() == Some("Online")).await;
        assert_eq!(view.header().unwrap().title, "Svc");
    }

    #[tokio::test]
    async fn test_health_check_error_status_is_offline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let harness = Harness::new(AppWidget::new(reqwest::Client::new()));
        let id = harness.start("app", json!({"title": "Svc", "health": {"type": "http", "url": server.uri()}}));
        harness.wait_for(&id, |v| side_label(v).as_deref() == Some("Offline")).await;
    }

    #[tokio::test]
    async fn test_unreachable_health_url_is_error() {
        // port libéré juste après le bind : connexion refusée
        let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();

        let harness = Harness::new(AppWidget::new(reqwest::Client::new()));
        let id = harness.start(
            "app",
            json!({"title": "Svc", "health": {"type": "http", "url": format!("http://127.0.0.1:{port}/")}}),
        );
        let view = harness.wait_for(&id, |v| side_label(v).as_deref() == Some("Error")).await;
        assert_eq!(
            view.header().unwrap().side_content,
            Some(SideContent::label(INDICATOR_RED, "Error"))
        );
    }
}
