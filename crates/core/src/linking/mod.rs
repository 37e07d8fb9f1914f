//! Thread linking between a new interaction and the seller's earlier interactions.
//!
//! Every prior interaction is scored with additive signals. Exact identifiers (order,
//! customer, product or article inside a time window) are deterministic evidence and
//! lift the candidate to a confidence floor; everything else is probabilistic and can
//! only ever provide context.

use std::collections::{BTreeSet, HashMap};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::domain::interaction::{Channel, Interaction, InteractionId};

pub const ORDER_ID_WEIGHT: f64 = 0.88;
pub const CUSTOMER_ID_WEIGHT: f64 = 0.68;
pub const NM_ID_WINDOW_WEIGHT: f64 = 0.34;
pub const ARTICLE_WINDOW_WEIGHT: f64 = 0.28;
pub const WITHIN_DAY_WEIGHT: f64 = 0.16;
pub const WITHIN_WEEK_WEIGHT: f64 = 0.10;
pub const WITHIN_MONTH_WEIGHT: f64 = 0.05;
pub const NAME_FULL_WEIGHT: f64 = 0.12;
pub const NAME_PARTIAL_WEIGHT: f64 = 0.08;
pub const TEXT_STRONG_WEIGHT: f64 = 0.10;
pub const TEXT_WEAK_WEIGHT: f64 = 0.06;

const TEXT_STRONG_SIMILARITY: f64 = 0.45;
const TEXT_WEAK_SIMILARITY: f64 = 0.25;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    OrderIdExact,
    CustomerIdExact,
    NmIdTimeWindow,
    ArticleTimeWindow,
    Probabilistic,
}

impl MatchReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderIdExact => "order_id_exact",
            Self::CustomerIdExact => "customer_id_exact",
            Self::NmIdTimeWindow => "nm_id_time_window",
            Self::ArticleTimeWindow => "article_time_window",
            Self::Probabilistic => "probabilistic",
        }
    }

    fn weight(&self) -> f64 {
        match self {
            Self::OrderIdExact => ORDER_ID_WEIGHT,
            Self::CustomerIdExact => CUSTOMER_ID_WEIGHT,
            Self::NmIdTimeWindow => NM_ID_WINDOW_WEIGHT,
            Self::ArticleTimeWindow => ARTICLE_WINDOW_WEIGHT,
            Self::Probabilistic => 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    Deterministic,
    Probabilistic,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deterministic => "deterministic",
            Self::Probabilistic => "probabilistic",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "deterministic" => Some(Self::Deterministic),
            "probabilistic" => Some(Self::Probabilistic),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkCandidate {
    pub interaction_id: InteractionId,
    pub channel: Channel,
    pub external_id: String,
    pub confidence: f64,
    pub match_reason: MatchReason,
    pub link_type: LinkType,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LinkPolicyDecision {
    pub auto_action_allowed: bool,
    pub reason: &'static str,
}

/// Scoring thresholds for thread linking.
///
/// Under the defaults no probabilistic score reaches `min_confidence` and every deterministic
/// floor clears `auto_action_threshold`. The `probabilistic_link_assist_only` and
/// `deterministic_below_confidence_threshold` policy outcomes, and the auto-to-draft downgrade
/// they trigger, only occur with a lowered `min_confidence` or a raised threshold.
#[derive(Clone, Debug, PartialEq)]
pub struct LinkResolverConfig {
    pub min_confidence: f64,
    pub max_confidence: f64,
    pub deterministic_floor: f64,
    pub order_id_floor: f64,
    pub auto_action_threshold: f64,
    pub product_window: Duration,
}

impl Default for LinkResolverConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.55,
            max_confidence: 0.99,
            deterministic_floor: 0.90,
            order_id_floor: 0.99,
            auto_action_threshold: 0.85,
            product_window: Duration::days(45),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LinkResolver {
    config: LinkResolverConfig,
}

impl LinkResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LinkResolverConfig) -> Self {
        Self { config }
    }

    /// Scores every prior interaction of the same seller against `current`.
    ///
    /// Candidates are deduplicated by `(channel, external_id)` keeping the strongest
    /// score, filtered by the minimum confidence and ranked by confidence descending.
    pub fn resolve(&self, current: &Interaction, prior: &[Interaction]) -> Vec<LinkCandidate> {
        let mut best: HashMap<(Channel, String), LinkCandidate> = HashMap::new();

        for other in prior {
            if other.seller_id != current.seller_id
                || other.id == current.id
                || (other.channel == current.channel && other.external_id == current.external_id)
            {
                continue;
            }

            let Some(candidate) = self.score(current, other) else {
                continue;
            };

            let key = (candidate.channel, candidate.external_id.clone());
            match best.get(&key) {
                Some(existing) if existing.confidence >= candidate.confidence => {}
                _ => {
                    best.insert(key, candidate);
                }
            }
        }

        let mut candidates: Vec<LinkCandidate> = best.into_values().collect();
        candidates.sort_by(|left, right| {
            right
                .confidence
                .total_cmp(&left.confidence)
                .then_with(|| left.channel.cmp(&right.channel))
                .then_with(|| left.external_id.cmp(&right.external_id))
        });
        candidates
    }

    /// Scores one pair. Returns `None` when the pair falls below the minimum confidence.
    pub fn score(&self, current: &Interaction, other: &Interaction) -> Option<LinkCandidate> {
        let elapsed = (current.created_at - other.created_at).abs();
        let mut score = 0.0;
        let mut fired: Vec<MatchReason> = Vec::new();

        if same_identifier(current.order_id.as_deref(), other.order_id.as_deref()) {
            score += ORDER_ID_WEIGHT;
            fired.push(MatchReason::OrderIdExact);
        }
        if same_identifier(current.customer_id.as_deref(), other.customer_id.as_deref()) {
            score += CUSTOMER_ID_WEIGHT;
            fired.push(MatchReason::CustomerIdExact);
        }
        let in_product_window = elapsed <= self.config.product_window;
        if in_product_window
            && same_identifier(current.product_id.as_deref(), other.product_id.as_deref())
        {
            score += NM_ID_WINDOW_WEIGHT;
            fired.push(MatchReason::NmIdTimeWindow);
        }
        if in_product_window
            && same_identifier(current.article.as_deref(), other.article.as_deref())
        {
            score += ARTICLE_WINDOW_WEIGHT;
            fired.push(MatchReason::ArticleTimeWindow);
        }

        score += time_proximity_weight(elapsed);
        score += name_match_weight(current.customer_name.as_deref(), other.customer_name.as_deref());

        let similarity = text_similarity(&current.text, &other.text);
        if similarity >= TEXT_STRONG_SIMILARITY {
            score += TEXT_STRONG_WEIGHT;
        } else if similarity >= TEXT_WEAK_SIMILARITY {
            score += TEXT_WEAK_WEIGHT;
        }

        let mut confidence = score.clamp(0.0, self.config.max_confidence);
        let strongest =
            fired.iter().copied().max_by(|left, right| left.weight().total_cmp(&right.weight()));

        let (match_reason, link_type) = match strongest {
            Some(reason) => {
                let floor = if reason == MatchReason::OrderIdExact {
                    self.config.order_id_floor
                } else {
                    self.config.deterministic_floor
                };
                confidence = confidence.max(floor);
                (reason, LinkType::Deterministic)
            }
            None => (MatchReason::Probabilistic, LinkType::Probabilistic),
        };

        let confidence = round_confidence(confidence);
        if confidence < self.config.min_confidence {
            return None;
        }

        Some(LinkCandidate {
            interaction_id: other.id.clone(),
            channel: other.channel,
            external_id: other.external_id.clone(),
            confidence,
            match_reason,
            link_type,
        })
    }

    /// Whether a link is strong enough to back an autonomous action.
    pub fn policy(&self, candidate: &LinkCandidate) -> LinkPolicyDecision {
        match candidate.link_type {
            LinkType::Probabilistic => LinkPolicyDecision {
                auto_action_allowed: false,
                reason: "probabilistic_link_assist_only",
            },
            LinkType::Deterministic if candidate.confidence >= self.config.auto_action_threshold => {
                LinkPolicyDecision { auto_action_allowed: true, reason: "deterministic_confidence_ok" }
            }
            LinkType::Deterministic => LinkPolicyDecision {
                auto_action_allowed: false,
                reason: "deterministic_below_confidence_threshold",
            },
        }
    }

    /// Policy for the top-ranked candidate, if any.
    pub fn best_policy(&self, candidates: &[LinkCandidate]) -> Option<LinkPolicyDecision> {
        candidates.first().map(|candidate| self.policy(candidate))
    }

    /// Ranked candidates with their policy, in the shape kept in interaction metadata.
    pub fn timeline(&self, current: &Interaction, prior: &[Interaction]) -> Vec<TimelineEntry> {
        self.resolve(current, prior)
            .into_iter()
            .map(|candidate| {
                let policy = self.policy(&candidate);
                TimelineEntry {
                    candidate,
                    auto_action_allowed: policy.auto_action_allowed,
                    policy_reason: policy.reason,
                }
            })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TimelineEntry {
    #[serde(flatten)]
    pub candidate: LinkCandidate,
    pub auto_action_allowed: bool,
    pub policy_reason: &'static str,
}

fn same_identifier(left: Option<&str>, right: Option<&str>) -> bool {
    match (left.map(str::trim), right.map(str::trim)) {
        (Some(left), Some(right)) => !left.is_empty() && left == right,
        _ => false,
    }
}

fn time_proximity_weight(elapsed: Duration) -> f64 {
    if elapsed <= Duration::hours(24) {
        WITHIN_DAY_WEIGHT
    } else if elapsed <= Duration::days(7) {
        WITHIN_WEEK_WEIGHT
    } else if elapsed <= Duration::days(30) {
        WITHIN_MONTH_WEIGHT
    } else {
        0.0
    }
}

fn name_match_weight(left: Option<&str>, right: Option<&str>) -> f64 {
    let (Some(left), Some(right)) = (left, right) else {
        return 0.0;
    };
    let left_tokens = name_tokens(left);
    let right_tokens = name_tokens(right);
    if left_tokens.is_empty() || right_tokens.is_empty() {
        return 0.0;
    }

    if left_tokens == right_tokens {
        NAME_FULL_WEIGHT
    } else if left_tokens.intersection(&right_tokens).next().is_some() {
        NAME_PARTIAL_WEIGHT
    } else {
        0.0
    }
}

fn name_tokens(name: &str) -> BTreeSet<String> {
    name.split(|ch: char| !ch.is_alphanumeric())
        .map(|token| token.to_lowercase().replace('ё', "е"))
        .filter(|token| token.chars().count() >= 2)
        .collect()
}

/// Jaccard similarity over lowercase word sets, ignoring very short words.
pub fn text_similarity(left: &str, right: &str) -> f64 {
    let left = text_tokens(left);
    let right = text_tokens(right);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let shared = left.intersection(&right).count() as f64;
    let union = left.union(&right).count() as f64;
    shared / union
}

fn text_tokens(text: &str) -> BTreeSet<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .map(|token| token.to_lowercase().replace('ё', "е"))
        .filter(|token| token.chars().count() >= 3)
        .collect()
}

fn round_confidence(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
