//! Client command dispatch: the closed vocabulary of actions the remote
//! agent may ask the widget to perform.

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::backend::FacilityClient;
use crate::types::{Facility, FacilitySearchQuery, MapRequest};
use crate::widget::{WidgetBus, WidgetEvent};

/// A validated command from the agent's tool-calling layer.
///
/// Parameter bags are validated here, at the dispatch boundary; nothing
/// downstream sees loosely-typed JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    SearchFacilities(FacilitySearchQuery),
    ShowSearchResults {
        facilities: Vec<Facility>,
        summary: String,
    },
    ShowFacilitiesOnMap {
        tags: String,
        location: String,
    },
    DisplayMap(MapRequest),
    Navigate {
        path: String,
    },
    ShowToast {
        message: String,
    },
}

#[derive(Deserialize)]
struct ShowSearchResultsParams {
    results: Value,
    #[serde(default)]
    summary: Option<String>,
}

#[derive(Deserialize)]
struct ShowFacilitiesOnMapParams {
    tags: String,
    location: String,
}

#[derive(Deserialize)]
struct NavigateParams {
    path: String,
}

#[derive(Deserialize)]
struct ShowToastParams {
    message: String,
}

impl ClientCommand {
    /// Parse a named command with its parameter bag.
    ///
    /// Unknown names and malformed parameters yield `None`; the caller logs
    /// and ignores them — a bad tool call is never fatal.
    pub fn parse(name: &str, params: Value) -> Option<Self> {
        let parsed = match name {
            "search_facilities" | "searchFacilities" => {
                serde_json::from_value(params).map(Self::SearchFacilities)
            }
            "show_search_results" | "showSearchResultsPanel" => {
                serde_json::from_value::<ShowSearchResultsParams>(params).and_then(|p| {
                    // The agent sometimes sends the facility list as a
                    // JSON-encoded string rather than an array.
                    let facilities = match p.results {
                        Value::String(raw) => serde_json::from_str(&raw)?,
                        other => serde_json::from_value(other)?,
                    };
                    Ok(Self::ShowSearchResults {
                        facilities,
                        summary: p.summary.unwrap_or_default(),
                    })
                })
            }
            "show_facilities_on_map" | "showFacilitiesOnMap" => {
                serde_json::from_value::<ShowFacilitiesOnMapParams>(params).map(|p| {
                    Self::ShowFacilitiesOnMap {
                        tags: p.tags,
                        location: p.location,
                    }
                })
            }
            "display_map" | "displayMap" => {
                serde_json::from_value(params).map(Self::DisplayMap)
            }
            "navigate" => serde_json::from_value::<NavigateParams>(params)
                .map(|p| Self::Navigate { path: p.path }),
            "show_toast" | "showToastMessage" => {
                serde_json::from_value::<ShowToastParams>(params)
                    .map(|p| Self::ShowToast { message: p.message })
            }
            _ => {
                warn!(command = name, "ignoring unknown client command");
                return None;
            }
        };

        match parsed {
            Ok(command) => Some(command),
            Err(err) => {
                warn!(command = name, error = %err, "ignoring malformed client command");
                None
            }
        }
    }
}

/// Maps validated commands to widget side-effects.
///
/// Every handler is idempotent and side-effect-only: it publishes events on
/// the widget bus and consumes no return value.
pub struct CommandDispatcher {
    bus: WidgetBus,
    facilities: Option<FacilityClient>,
}

impl CommandDispatcher {
    pub fn new(bus: WidgetBus) -> Self {
        Self {
            bus,
            facilities: None,
        }
    }

    /// Attach the facility search backend used by `search_facilities`.
    pub fn with_facility_client(mut self, client: FacilityClient) -> Self {
        self.facilities = Some(client);
        self
    }

    /// Validate and execute a named command.
    ///
    /// Returns the parsed command when one was recognized, for display in
    /// the session event stream.
    pub async fn dispatch(&self, name: &str, params: Value) -> Option<ClientCommand> {
        let command = ClientCommand::parse(name, params)?;
        self.run(&command).await;
        Some(command)
    }

    async fn run(&self, command: &ClientCommand) {
        match command {
            ClientCommand::SearchFacilities(query) => self.search(query).await,
            ClientCommand::ShowSearchResults {
                facilities,
                summary,
            } => {
                self.bus.publish(WidgetEvent::SearchResults {
                    facilities: facilities.clone(),
                    summary: summary.clone(),
                });
            }
            ClientCommand::ShowFacilitiesOnMap { tags, location } => {
                self.bus.publish(WidgetEvent::FacilitiesOnMap {
                    tags: tags.clone(),
                    location: location.clone(),
                });
            }
            ClientCommand::DisplayMap(request) => {
                self.bus.publish(WidgetEvent::MapDisplayed(request.clone()));
            }
            ClientCommand::Navigate { path } => {
                self.bus.publish(WidgetEvent::Navigated { path: path.clone() });
            }
            ClientCommand::ShowToast { message } => {
                self.bus.publish(WidgetEvent::Toast {
                    message: message.clone(),
                });
            }
        }
    }

    async fn search(&self, query: &FacilitySearchQuery) {
        let Some(client) = &self.facilities else {
            warn!("search_facilities requested but no facility backend is configured");
            return;
        };
        match client.search(query).await {
            Ok(response) => {
                info!(count = response.facilities.len(), "facility search completed");
                // The original widget navigates to the results surface
                // before showing them.
                self.bus.publish(WidgetEvent::Navigated {
                    path: "/find-care".into(),
                });
                let summary = response.display_summary();
                self.bus.publish(WidgetEvent::SearchResults {
                    facilities: response.facilities,
                    summary,
                });
            }
            Err(err) => {
                warn!(error = %err, "facility search failed");
                self.bus.publish(WidgetEvent::Toast {
                    message: "Facility search is unavailable right now.".into(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_commands_parse_with_typed_payloads() {
        let command = ClientCommand::parse(
            "show_facilities_on_map",
            json!({ "tags": "memory care", "location": "Austin" }),
        )
        .unwrap();
        assert_eq!(
            command,
            ClientCommand::ShowFacilitiesOnMap {
                tags: "memory care".into(),
                location: "Austin".into(),
            },
        );
    }

    #[test]
    fn camel_case_aliases_are_accepted() {
        let command =
            ClientCommand::parse("showToastMessage", json!({ "message": "hi" })).unwrap();
        assert_eq!(
            command,
            ClientCommand::ShowToast {
                message: "hi".into()
            },
        );
    }

    #[test]
    fn results_accepted_as_array_or_json_string() {
        let as_array = ClientCommand::parse(
            "show_search_results",
            json!({ "results": [{ "id": "f1", "name": "Oak Grove" }] }),
        )
        .unwrap();
        let as_string = ClientCommand::parse(
            "show_search_results",
            json!({ "results": "[{\"id\":\"f1\",\"name\":\"Oak Grove\"}]" }),
        )
        .unwrap();
        assert_eq!(as_array, as_string);
    }

    #[test]
    fn unknown_command_is_ignored() {
        assert!(ClientCommand::parse("summon_dragon", json!({})).is_none());
    }

    #[test]
    fn malformed_parameters_are_ignored() {
        assert!(ClientCommand::parse("show_toast", json!({ "msg": "typo" })).is_none());
    }

    #[tokio::test]
    async fn dispatch_publishes_to_the_bus() {
        let bus = WidgetBus::new(8);
        let mut events = bus.subscribe();
        let dispatcher = CommandDispatcher::new(bus);

        let command = dispatcher
            .dispatch("display_map", json!({ "markers": [{ "lat": 1.0, "lng": 2.0 }] }))
            .await
            .unwrap();
        assert!(matches!(command, ClientCommand::DisplayMap(_)));

        match events.recv().await.unwrap() {
            WidgetEvent::MapDisplayed(request) => {
                assert_eq!(request.markers.len(), 1);
                assert_eq!(request.markers[0].lat, 1.0);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn dispatching_unknown_command_has_no_effect() {
        let bus = WidgetBus::new(8);
        let mut events = bus.subscribe();
        let dispatcher = CommandDispatcher::new(bus);

        assert!(dispatcher.dispatch("summon_dragon", json!({})).await.is_none());
        assert!(events.try_recv().is_err());
    }
}
