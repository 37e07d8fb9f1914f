//! Scenario routing: (intent, channel, seller settings) -> action.

use serde::Serialize;

use crate::domain::interaction::Channel;
use crate::domain::scenario::{Intent, ScenarioAction, SellerSettings};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteAction {
    Auto,
    Draft,
    Block,
    /// Not eligible this cycle; neither drafted nor blocked.
    Skip,
}

impl RouteAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Draft => "draft",
            Self::Block => "block",
            Self::Skip => "skip",
        }
    }
}

impl From<ScenarioAction> for RouteAction {
    fn from(value: ScenarioAction) -> Self {
        match value {
            ScenarioAction::Auto => Self::Auto,
            ScenarioAction::Draft => Self::Draft,
            ScenarioAction::Block => Self::Block,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RouteDecision {
    pub action: RouteAction,
    pub reason: &'static str,
}

impl RouteDecision {
    fn new(action: RouteAction, reason: &'static str) -> Self {
        Self { action, reason }
    }

    /// Hard blocks are safety events, not ordinary seller choices.
    pub fn is_safety_block(&self) -> bool {
        self.action == RouteAction::Block && self.reason == "intent_always_blocked"
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ScenarioRouter;

impl ScenarioRouter {
    pub fn route(&self, intent: Intent, channel: Channel, settings: &SellerSettings) -> RouteDecision {
        if intent.is_always_blocked() {
            return RouteDecision::new(RouteAction::Block, "intent_always_blocked");
        }
        if intent == Intent::Unclassified {
            return RouteDecision::new(RouteAction::Draft, "intent_unclassified");
        }

        let Some(scenario) = settings.scenarios.get(&intent) else {
            return RouteDecision::new(RouteAction::Skip, "scenario_not_configured");
        };
        if !scenario.enabled {
            return RouteDecision::new(RouteAction::Skip, "scenario_disabled");
        }
        if !scenario.channels.contains(&channel) {
            return RouteDecision::new(RouteAction::Skip, "scenario_channel_not_enabled");
        }

        let reason = match scenario.action {
            ScenarioAction::Auto => "scenario_auto",
            ScenarioAction::Draft => "scenario_draft",
            ScenarioAction::Block => "scenario_block",
        };
        RouteDecision::new(scenario.action.into(), reason)
    }
}
