/**
 * RSS WIDGET - Flux RSS 2.0 / Atom
 *
 * FONCTIONNEMENT :
 * - fetch de `url` toutes les `refresh_interval` secondes (défaut 1h)
 * - 5 premiers items : titre + âge compact ("3h"), lien si présent
 * - rafraîchissement "guarded" : un échec remplace la vue par la vue d'erreur
 * - la dernière vue réussie est persistée ({content}) et resservie au redémarrage
 */

use super::{check_interval, check_url, default_hourly, Widget, WidgetError};
use crate::format::format_age;
use crate::scheduler::InstanceHandle;
use crate::view::{Header, ListBlock, ListRow, View};
use chrono::{DateTime, Utc};
use roxmltree::{Document, Node, ParsingOptions};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const MAX_ITEMS: usize = 5;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RssConfig {
    pub title: Option<String>,
    pub sub_title: Option<String>,
    pub icon: Option<String>,
    #[serde(default = "default_hourly", rename = "refresh_interval")]
    pub refresh_interval: u64,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RssState {
    pub content: View,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    pub title: Option<String>,
    pub items: Vec<FeedItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub title: String,
    pub link: Option<String>,
    pub published: DateTime<Utc>,
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|c| c.is_element() && c.tag_name().name() == name)
}

fn child_text(node: Node, name: &str) -> Option<String> {
    child(node, name)
        .and_then(|c| c.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn parse_item(node: Node, now: DateTime<Utc>) -> FeedItem {
    // Atom : <link href=".."/>, RSS : <link>..</link>
    let link = child(node, "link").and_then(|l| {
        l.attribute("href")
            .map(String::from)
            .or_else(|| l.text().map(|t| t.trim().to_string()))
    });
    let published = ["pubDate", "published", "updated", "date"]
        .iter()
        .find_map(|tag| child_text(node, tag).and_then(|raw| parse_date(&raw)))
        .unwrap_or(now);

    FeedItem {
        title: child_text(node, "title").unwrap_or_default(),
        link: link.filter(|l| !l.is_empty()),
        published,
    }
}

/// Parse un document RSS 2.0 (`rss/channel/item`) ou Atom (`feed/entry`)
pub fn parse_feed(xml: &str, now: DateTime<Utc>) -> Result<Feed, WidgetError> {
    // flux RSS 0.91 : DOCTYPE Netscape
    let mut options = ParsingOptions::default();
    options.allow_dtd = true;
    let doc = Document::parse_with_options(xml, options).map_err(|e| WidgetError::Feed(e.to_string()))?;
    let root = doc.root_element();
    let (container, item_tag) = match root.tag_name().name() {
        "rss" => (
            child(root, "channel").ok_or_else(|| WidgetError::Feed("rss document without channel".into()))?,
            "item",
        ),
        "feed" => (root, "entry"),
        other => return Err(WidgetError::Feed(format!("unsupported feed root <{other}>"))),
    };

    let items = container
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == item_tag)
        .take(MAX_ITEMS)
        .map(|n| parse_item(n, now))
        .collect();

    Ok(Feed {
        title: child_text(container, "title"),
        items,
    })
}

fn header(config: &RssConfig, feed_title: Option<&str>) -> Header {
    let title = config
        .title
        .as_deref()
        .filter(|t| !t.is_empty())
        .or(feed_title)
        .unwrap_or("--");
    Header::new(title)
        .subtitle(config.sub_title.clone())
        .icon(config.icon.clone())
}

pub fn render(config: &RssConfig, feed: &Feed, now: DateTime<Utc>) -> View {
    let rows = feed
        .items
        .iter()
        .map(|item| ListRow::pair(&item.title, Some(format_age(item.published, now)), item.link.clone()))
        .collect();
    View::new("rss")
        .with(header(config, feed.title.as_deref()))
        .with(ListBlock { title: None, rows })
}

pub struct RssWidget {
    http: reqwest::Client,
}

impl RssWidget {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

async fn refresh(http: &reqwest::Client, config: &RssConfig) -> Result<View, WidgetError> {
    let body = http
        .get(&config.url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    let now = Utc::now();
    let feed = parse_feed(&body, now)?;
    debug!(url = %config.url, items = feed.items.len(), "feed refreshed");
    Ok(render(config, &feed, now))
}

impl Widget for RssWidget {
    type Config = RssConfig;
    type State = RssState;

    fn kind(&self) -> &'static str {
        "rss"
    }

    fn validate(&self, config: &RssConfig) -> Result<(), WidgetError> {
        check_url("url", &config.url)?;
        check_interval(config.refresh_interval)
    }

    fn identity(&self, config: &RssConfig) -> String {
        format!("rss_{}", config.url)
    }

    fn init(&self, config: RssConfig, previous: Option<RssState>, handle: InstanceHandle) -> Result<View, WidgetError> {
        let initial = match previous {
            Some(state) => state.content,
            None => View::new("rss").with(header(&config, None)),
        };

        let period = Duration::from_secs(config.refresh_interval);
        let config = Arc::new(config);
        let http = self.http.clone();
        let updates = handle.clone();
        handle.every(period, move || {
            let http = http.clone();
            let config = config.clone();
            let handle = updates.clone();
            async move {
                let result = refresh(&http, &config).await;
                if let Ok(view) = &result {
                    if let Err(e) = handle.persist_state(&RssState { content: view.clone() }) {
                        warn!(instance = %handle.instance_id(), error = %e, "failed to persist feed state");
                    }
                }
                handle.safely_replace_view(result);
            }
        });

        Ok(initial)
    }
}
