/**
 * VIEW MODEL - Vue renderable d'une instance de widget
 *
 * RÔLE :
 * Décrit ce que le front-end affiche pour un widget : une liste ordonnée de
 * "complications" (header, metric, list, button, custom) + une action optionnelle.
 *
 * FORMAT JSON (consommé tel quel par le front) :
 * ```json
 * {
 *   "widget": "rss",
 *   "complication": [
 *     { "type": "header", "title": "Hacker News", "sideContent": { "type": "label", "label": "ONLINE" } },
 *     { "type": "list", "rows": [ { "content": [ { "text": "...", "classes": "..." } ], "href": "..." } ] }
 *   ],
 *   "action": "open_href::https://..."
 * }
 * ```
 */

use serde::{Deserialize, Serialize};

/// Classes du fragment principal d'une ligne de liste
pub const PRIMARY_TEXT: &str = "text-sm text-primary-500 font-semibold grow truncate w-full";
/// Classes du fragment secondaire (heure, âge...)
pub const SECONDARY_TEXT: &str = "text-sm shrink-0 font-medium text-neutral-200";

pub const INDICATOR_GREEN: &str = "bg-green-500";
pub const INDICATOR_RED: &str = "bg-red-500";
pub const INDICATOR_YELLOW: &str = "bg-yellow-500";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    #[serde(rename = "widget")]
    pub kind: String,
    #[serde(rename = "complication")]
    pub complications: Vec<Complication>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Complication {
    Header(Header),
    Metric(MetricBlock),
    List(ListBlock),
    Button(Button),
    Custom,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side_content: Option<SideContent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SideContent {
    Button {
        label: String,
        action: String,
    },
    Label {
        #[serde(rename = "indicatorClass", default, skip_serializing_if = "Option::is_none")]
        indicator_class: Option<String>,
        label: String,
    },
    Text {
        content: Vec<TextPair>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPair {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub rows: Vec<MetricRow>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ListBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub rows: Vec<ListRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListRow {
    pub content: Vec<TextFragment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFragment {
    pub text: String,
    pub classes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub action: String,
}

impl View {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            complications: Vec::new(),
            action: None,
        }
    }

    /// Vue de repli : un header "Error" portant le message de l'opération en échec
    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(kind).with(Header::new("Error").subtitle(Some(message.into())))
    }

    pub fn with(mut self, complication: impl Into<Complication>) -> Self {
        self.complications.push(complication.into());
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn header(&self) -> Option<&Header> {
        self.complications.iter().find_map(|c| match c {
            Complication::Header(h) => Some(h),
            _ => None,
        })
    }

    pub fn is_error(&self) -> bool {
        matches!(self.complications.as_slice(), [Complication::Header(h)] if h.title == "Error")
    }
}

impl Header {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn subtitle(mut self, subtitle: Option<String>) -> Self {
        self.subtitle = subtitle;
        self
    }

    pub fn icon(mut self, icon: Option<String>) -> Self {
        self.icon = icon;
        self
    }

    pub fn side(mut self, side: Option<SideContent>) -> Self {
        self.side_content = side;
        self
    }
}

impl SideContent {
    pub fn label(indicator_class: &str, label: impl Into<String>) -> Self {
        SideContent::Label {
            indicator_class: Some(indicator_class.to_string()),
            label: label.into(),
        }
    }
}

impl ListRow {
    /// Ligne standard : texte principal + texte secondaire optionnel
    pub fn pair(primary: impl Into<String>, secondary: Option<String>, href: Option<String>) -> Self {
        let mut content = vec![TextFragment {
            text: primary.into(),
            classes: PRIMARY_TEXT.to_string(),
        }];
        if let Some(text) = secondary {
            content.push(TextFragment {
                text,
                classes: SECONDARY_TEXT.to_string(),
            });
        }
        Self { content, href }
    }
}

impl From<Header> for Complication {
    fn from(h: Header) -> Self {
        Complication::Header(h)
    }
}

impl From<MetricBlock> for Complication {
    fn from(m: MetricBlock) -> Self {
        Complication::Metric(m)
    }
}

impl From<ListBlock> for Complication {
    fn from(l: ListBlock) -> Self {
        Complication::List(l)
    }
}

impl From<Button> for Complication {
    fn from(b: Button) -> Self {
        Complication::Button(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_view_wire_format() {
        let view = View::new("app")
            .with(
                Header::new("Jellyfin")
                    .icon(Some("jellyfin.svg".into()))
                    .side(Some(SideContent::label(INDICATOR_GREEN, "Online"))),
            )
            .with_action("open_href::http://media.lan");

        assert_eq!(
            serde_json::to_value(&view).unwrap(),
            json!({
                "widget": "app",
                "complication": [{
                    "type": "header",
                    "icon": "jellyfin.svg",
                    "title": "Jellyfin",
                    "sideContent": {"type": "label", "indicatorClass": "bg-green-500", "label": "Online"}
                }],
                "action": "open_href::http://media.lan"
            })
        );
    }

    #[test]
    fn test_custom_and_button_variants() {
        let view = View::new("x")
            .with(Complication::Custom)
            .with(Button { label: "Go".into(), action: "go".into() });
        let value = serde_json::to_value(&view).unwrap();
        assert_eq!(value["complication"][0], json!({"type": "custom"}));
        assert_eq!(value["complication"][1], json!({"type": "button", "label": "Go", "action": "go"}));

        let back: View = serde_json::from_value(value).unwrap();
        assert_eq!(back, view);
    }

    #[test]
    fn test_error_view() {
        let view = View::error("rss", "connection refused");
        assert!(view.is_error());
        let header = view.header().unwrap();
        assert_eq!(header.title, "Error");
        assert_eq!(header.subtitle.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_list_row_pair() {
        let row = ListRow::pair("Standup", Some("09:30 AM".into()), None);
        assert_eq!(row.content.len(), 2);
        assert_eq!(row.content[0].classes, PRIMARY_TEXT);
        assert_eq!(row.content[1].classes, SECONDARY_TEXT);
        assert!(row.href.is_none());
    }
}
