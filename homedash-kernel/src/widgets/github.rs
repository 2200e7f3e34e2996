//! `github` : header du dépôt (stars / forks) + une liste par section de recherche d'issues.
//!
//! Rafraîchissement non "guarded" : un échec est loggé et la vue précédente reste affichée.

use super::{check_interval, check_url, default_hourly, Widget, WidgetError};
use crate::format::format_age;
use crate::scheduler::InstanceHandle;
use crate::view::{Header, ListBlock, ListRow, SideContent, TextPair, View};
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const SECTION_SIZE: &str = "5";

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubConfig {
    pub owner: String,
    pub repo: String,
    #[serde(default = "default_hourly")]
    pub refresh_interval: u64,
    pub icon: Option<String>,
    pub personal_access_token: String,
    #[serde(default)]
    pub sections: Vec<SearchSection>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchSection {
    pub name: String,
    pub filter: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubState {
    pub content: View,
}

#[derive(Debug, Deserialize)]
struct Repository {
    name: String,
    stargazers_count: u64,
    forks_count: u64,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    items: Vec<Issue>,
}

#[derive(Debug, Deserialize)]
struct Issue {
    title: String,
    html_url: String,
    updated_at: DateTime<Utc>,
}

/// Client minimal de l'API REST GitHub
struct GithubApi {
    http: reqwest::Client,
    config: GithubConfig,
}

impl GithubApi {
    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let base = self.config.api_url.trim_end_matches('/');
        self.http
            .get(format!("{base}{path}"))
            .bearer_auth(&self.config.personal_access_token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
    }

    async fn repository(&self) -> Result<Repository, WidgetError> {
        let path = format!("/repos/{}/{}", self.config.owner, self.config.repo);
        Ok(self.get(&path).send().await?.error_for_status()?.json().await?)
    }

    async fn search(&self, section: &SearchSection) -> Result<ListBlock, WidgetError> {
        let result: SearchResult = self
            .get("/search/issues")
            .query(&[
                ("q", section.filter.as_str()),
                ("per_page", SECTION_SIZE),
                ("sort", "updated"),
                ("order", "desc"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let now = Utc::now();
        Ok(ListBlock {
            title: Some(section.name.clone()),
            rows: result
                .items
                .into_iter()
                .map(|issue| ListRow::pair(issue.title, Some(format_age(issue.updated_at, now)), Some(issue.html_url)))
                .collect(),
        })
    }

    async fn view(&self) -> Result<View, WidgetError> {
        let (repo, sections) = tokio::try_join!(
            self.repository(),
            try_join_all(self.config.sections.iter().map(|s| self.search(s)))
        )?;

        let header = Header::new(repo.name)
            .subtitle(Some(format!("{}/{}", self.config.owner, self.config.repo)))
            .icon(self.config.icon.clone())
            .side(Some(SideContent::Text {
                content: vec![
                    TextPair {
                        title: repo.stargazers_count.to_string(),
                        subtitle: Some("Stars".into()),
                    },
                    TextPair {
                        title: repo.forks_count.to_string(),
                        subtitle: Some("Forks".into()),
                    },
                ],
            }));

        Ok(sections.into_iter().fold(View::new("github").with(header), |view, list| view.with(list)))
    }
}

pub struct GithubWidget {
    http: reqwest::Client,
}

impl GithubWidget {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl Widget for GithubWidget {
    type Config = GithubConfig;
    type State = GithubState;

    fn kind(&self) -> &'static str {
        "github"
    }

    fn validate(&self, config: &GithubConfig) -> Result<(), WidgetError> {
        check_url("api_url", &config.api_url)?;
        check_interval(config.refresh_interval)
    }

    fn identity(&self, config: &GithubConfig) -> String {
        format!("github_{}", config.repo)
    }

    fn init(&self, config: GithubConfig, previous: Option<GithubState>, handle: InstanceHandle) -> Result<View, WidgetError> {
        let initial = match previous {
            Some(state) => state.content,
            None => View::new("github").with(Header::new("--").subtitle(Some("Loading...".into()))),
        };

        let period = Duration::from_secs(config.refresh_interval);
        let api = Arc::new(GithubApi {
            http: self.http.clone(),
            config,
        });
        let updates = handle.clone();
        handle.every(period, move || {
            let api = api.clone();
            let handle = updates.clone();
            async move {
                match api.view().await {
                    Ok(view) => {
                        if let Err(e) = handle.persist_state(&GithubState { content: view.clone() }) {
                            warn!(instance = %handle.instance_id(), error = %e, "failed to persist github state");
                        }
                        handle.replace_view(view);
                    }
                    Err(e) => warn!(instance = %handle.instance_id(), error = %e, "github refresh failed, keeping previous view"),
                }
            }
        });

        Ok(initial)
    }
}
