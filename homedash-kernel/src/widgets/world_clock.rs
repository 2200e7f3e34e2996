//! `world_clock` : date et heure de la première zone en header, les autres en liste.

use super::{Widget, WidgetError};
use crate::scheduler::InstanceHandle;
use crate::view::{Header, ListBlock, ListRow, SideContent, TextPair, View};
use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct WorldClockConfig {
    pub region: Vec<Region>,
}

/// `"Europe/Paris"` ou `{ timezone: "Asia/Tokyo", label: "Tokyo" }`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Region {
    Name(String),
    Zone { timezone: String, label: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    pub label: String,
    pub tz: Tz,
}

impl Region {
    fn resolve(&self) -> Result<Zone, WidgetError> {
        let (timezone, label) = match self {
            Region::Name(name) => (name, None),
            Region::Zone { timezone, label } => (timezone, label.as_ref()),
        };
        let tz: Tz = timezone
            .parse()
            .map_err(|_| WidgetError::InvalidConfig(format!("unknown timezone '{timezone}'")))?;
        Ok(Zone {
            label: label.unwrap_or(timezone).clone(),
            tz,
        })
    }
}

fn resolve_all(config: &WorldClockConfig) -> Result<Vec<Zone>, WidgetError> {
    if config.region.is_empty() {
        return Err(WidgetError::InvalidConfig("region must list at least one timezone".into()));
    }
    config.region.iter().map(Region::resolve).collect()
}

pub fn render(now: DateTime<Utc>, zones: &[Zone]) -> View {
    let Some((first, rest)) = zones.split_first() else {
        return View::new("world_clock");
    };
    let local = now.with_timezone(&first.tz);
    let header = Header::new(local.format("%b %-d").to_string())
        .subtitle(Some(local.format("%Y").to_string()))
        .side(Some(SideContent::Text {
            content: vec![TextPair {
                title: local.format("%I:%M %p").to_string(),
                subtitle: Some(local.format("%A").to_string()),
            }],
        }));

    let rows = rest
        .iter()
        .map(|zone| {
            let time = now.with_timezone(&zone.tz).format("%a, %I:%M %p").to_string();
            ListRow::pair(&zone.label, Some(time), None)
        })
        .collect();

    View::new("world_clock").with(header).with(ListBlock { title: None, rows })
}

pub struct WorldClockWidget;

impl Widget for WorldClockWidget {
    type Config = WorldClockConfig;
    type State = ();

    fn kind(&self) -> &'static str {
        "world_clock"
    }

    fn validate(&self, config: &WorldClockConfig) -> Result<(), WidgetError> {
        resolve_all(config).map(|_| ())
    }

    fn identity(&self, _config: &WorldClockConfig) -> String {
        format!("app_world_clock_{}", Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    fn init(&self, config: WorldClockConfig, _previous: Option<()>, handle: InstanceHandle) -> Result<View, WidgetError> {
        let zones = resolve_all(&config)?;
        let view = render(Utc::now(), &zones);
        let updates = handle.clone();
        handle.every(Duration::from_secs(1), move || {
            updates.replace_view(render(Utc::now(), &zones));
            async {}
        });
        Ok(view)
    }
}
