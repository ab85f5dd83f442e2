//! # Selected Rewards
//!
//! The consumer may pre-select rewards on their own device before showing
//! the QR code. The selection travels as a serialized list on the token and
//! is copied onto the session.
//!
//! ## Best-Effort Parsing
//! ```text
//! payload                          parse_selected_rewards()
//! ───────                          ────────────────────────
//! None / ""                   ──►  []
//! "[{\"rewardTierId\":\"t1\"}]"──►  [SelectedReward { t1 }]
//! "{garbage"                  ──►  [] + warn!   (never an error)
//! ```
//! A presentation fault must never block the scan flow, and the schema can
//! grow fields without breaking older readers.

use serde::{Deserialize, Serialize};
use tracing::warn;
use ts_rs::TS;

/// One reward the consumer picked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SelectedReward {
    pub reward_tier_id: String,
    /// Display name as the consumer saw it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Points as the consumer saw them; informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points_required: Option<i64>,
}

impl SelectedReward {
    pub fn new(reward_tier_id: impl Into<String>) -> Self {
        SelectedReward {
            reward_tier_id: reward_tier_id.into(),
            name: None,
            points_required: None,
        }
    }
}

/// Parses a stored payload, degrading to an empty list on any problem.
pub fn parse_selected_rewards(payload: Option<&str>) -> Vec<SelectedReward> {
    let payload = match payload.map(str::trim) {
        Some(p) if !p.is_empty() => p,
        _ => return Vec::new(),
    };

    match serde_json::from_str::<Vec<SelectedReward>>(payload) {
        Ok(rewards) => rewards
            .into_iter()
            .filter(|r| !r.reward_tier_id.trim().is_empty())
            .collect(),
        Err(e) => {
            warn!(error = %e, "Ignoring malformed selected-rewards payload");
            Vec::new()
        }
    }
}

/// Serializes a selection for storage. An empty selection is stored as NULL.
pub fn serialize_selected_rewards(rewards: &[SelectedReward]) -> Option<String> {
    if rewards.is_empty() {
        return None;
    }
    serde_json::to_string(rewards).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_payloads() {
        assert!(parse_selected_rewards(None).is_empty());
        assert!(parse_selected_rewards(Some("")).is_empty());
        assert!(parse_selected_rewards(Some("   ")).is_empty());
        assert!(parse_selected_rewards(Some("[]")).is_empty());
    }

    #[test]
    fn test_malformed_payload_degrades_to_empty() {
        assert!(parse_selected_rewards(Some("{garbage")).is_empty());
        assert!(parse_selected_rewards(Some(r#"{"rewardTierId":"t1"}"#)).is_empty());
        assert!(parse_selected_rewards(Some("[1, 2, 3]")).is_empty());
    }

    #[test]
    fn test_unknown_fields_are_tolerated() {
        let payload = r#"[{"rewardTierId":"t1","name":"Free Coffee","addedIn":"v9"}]"#;
        let rewards = parse_selected_rewards(Some(payload));
        assert_eq!(rewards.len(), 1);
        assert_eq!(rewards[0].reward_tier_id, "t1");
        assert_eq!(rewards[0].name.as_deref(), Some("Free Coffee"));
    }

    #[test]
    fn test_blank_tier_ids_dropped() {
        let payload = r#"[{"rewardTierId":""},{"rewardTierId":"t2"}]"#;
        let rewards = parse_selected_rewards(Some(payload));
        assert_eq!(rewards, vec![SelectedReward::new("t2")]);
    }

    #[test]
    fn test_serialize() {
        assert_eq!(serialize_selected_rewards(&[]), None);

        let stored = serialize_selected_rewards(&[SelectedReward::new("t1")]).unwrap();
        assert_eq!(stored, r#"[{"rewardTierId":"t1"}]"#);
        assert_eq!(
            parse_selected_rewards(Some(&stored)),
            vec![SelectedReward::new("t1")]
        );
    }
}
