//! `bookmark` : sections de liens statiques.

use super::{Widget, WidgetError};
use crate::scheduler::InstanceHandle;
use crate::view::{Header, ListBlock, ListRow, View};
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkConfig {
    pub title: String,
    pub sub_title: Option<String>,
    pub icon: Option<String>,
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Section {
    pub name: String,
    pub items: Vec<Link>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    pub name: String,
    pub url: String,
}

pub struct BookmarkWidget;

fn render(config: &BookmarkConfig) -> View {
    let header = Header::new(&config.title)
        .subtitle(config.sub_title.clone())
        .icon(config.icon.clone());
    config.sections.iter().fold(View::new("bookmark").with(header), |view, section| {
        view.with(ListBlock {
            title: Some(section.name.clone()),
            rows: section
                .items
                .iter()
                .map(|link| ListRow::pair(&link.name, None, Some(link.url.clone())))
                .collect(),
        })
    })
}

impl Widget for BookmarkWidget {
    type Config = BookmarkConfig;
    type State = ();

    fn kind(&self) -> &'static str {
        "bookmark"
    }

    fn identity(&self, _config: &BookmarkConfig) -> String {
        format!("app_bookmark_{}", Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    fn init(&self, config: BookmarkConfig, _previous: Option<()>, handle: InstanceHandle) -> Result<View, WidgetError> {
        let view = render(&config);
        let config = Arc::new(config);
        let updates = handle.clone();
        handle.every(Duration::from_secs(1), move || {
            updates.replace_view(render(&config));
            async {}
        });
        Ok(view)
    }
}
