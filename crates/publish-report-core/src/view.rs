//! Rendering projection of the viewer state.
//!
//! [`ViewModel::project`] turns a [`TabController`] into everything a
//! renderer needs: header title, tab bar, content pane, and the download
//! command. It is a pure function of the controller; renderers do not read
//! the controller directly.

use serde::Serialize;

use crate::tabs::{TabController, TabState};

/// Label shown next to the loading indicator.
pub const LOADING_LABEL: &str = "Loading .....";

/// Message shown when the selected report has no content.
pub const NO_CONTENT_MESSAGE: &str = "the report is empty";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TabView {
    /// Item key, used as the tab id.
    pub id: String,
    /// Friendly name.
    pub label: String,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Pane {
    Loading { label: String },
    Document { html: String },
    Message { text: String, severity: Severity },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// "Download" header command: opens the original attachment in a new window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadCommand {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewModel {
    pub title: String,
    pub tabs: Vec<TabView>,
    pub pane: Pane,
    pub download: Option<DownloadCommand>,
}

impl ViewModel {
    pub fn project(controller: &TabController, title: &str) -> Self {
        let highlighted = match controller.state() {
            TabState::Ready(key) => Some(key),
            TabState::Loading => controller.pending(),
            TabState::Empty(_) | TabState::Error(_) => None,
        };

        let tabs = controller
            .items()
            .iter()
            .map(|item| TabView {
                id: item.key.to_string(),
                label: item.friendly_name.clone(),
                selected: highlighted == Some(&item.key),
            })
            .collect();

        let pane = match controller.state() {
            TabState::Loading => Pane::Loading {
                label: LOADING_LABEL.to_string(),
            },
            TabState::Ready(_) => match controller.selected_item().and_then(|i| i.content.clone()) {
                Some(html) if !html.is_empty() => Pane::Document { html },
                _ => Pane::Message {
                    text: NO_CONTENT_MESSAGE.to_string(),
                    severity: Severity::Warning,
                },
            },
            TabState::Empty(message) => Pane::Message {
                text: message.clone(),
                severity: Severity::Warning,
            },
            TabState::Error(message) => Pane::Message {
                text: message.clone(),
                severity: Severity::Error,
            },
        };

        let download = controller.selected_item().map(|item| DownloadCommand {
            label: "Download".to_string(),
            url: item.url.clone(),
        });

        Self {
            title: title.to_string(),
            tabs,
            pane,
            download,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReportError;
    use crate::models::ReportItem;
    use crate::tabs::EMPTY_MESSAGE;

    fn item(name: &str) -> ReportItem {
        ReportItem::new(
            format!("https://host/T/R/build/publish-report/{}.html", name),
            "T",
            "R",
            format!("{}.html", name),
            None,
        )
    }

    #[test]
    fn loading_highlights_pending_tab() {
        let mut controller = TabController::new();
        let a = item("A");
        controller.catalog_loaded(vec![a.clone(), item("B")]);
        let view = ViewModel::project(&controller, "CI");

        assert_eq!(view.title, "CI");
        assert!(matches!(view.pane, Pane::Loading { .. }));
        assert_eq!(view.tabs.len(), 2);
        assert!(view.tabs[0].selected);
        assert_eq!(view.tabs[0].id, a.key.to_string());
        assert_eq!(view.tabs[1].label, "B");
        assert!(view.download.is_none());
    }

    #[test]
    fn ready_shows_document_and_download() {
        let mut controller = TabController::new();
        let a = item("A");
        controller.catalog_loaded(vec![a.clone()]);
        controller.apply_fetch(&a.key, Ok("<h1>A</h1>".to_string()));
        let view = ViewModel::project(&controller, "CI");

        assert_eq!(
            view.pane,
            Pane::Document {
                html: "<h1>A</h1>".to_string()
            }
        );
        assert_eq!(view.download.map(|d| d.url), Some(a.url));
    }

    #[test]
    fn empty_and_error_render_messages() {
        let mut controller = TabController::new();
        controller.catalog_loaded(vec![]);
        let view = ViewModel::project(&controller, "CI");
        assert_eq!(
            view.pane,
            Pane::Message {
                text: EMPTY_MESSAGE.to_string(),
                severity: Severity::Warning
            }
        );

        controller.catalog_failed(&ReportError::CatalogFailed("denied".to_string()));
        let view = ViewModel::project(&controller, "CI");
        assert_eq!(
            view.pane,
            Pane::Message {
                text: "denied".to_string(),
                severity: Severity::Error
            }
        );
        assert!(view.tabs.is_empty());
    }
}
