//! Promotion eligibility
//!
//! Pure functions over an agent's experience total, certificate count and
//! the rank table. The rule used is always the one keyed by the agent's
//! *current* rank; a rank without a rule is terminal.

use crate::agent::Agent;
use crate::error::RosterError;
use crate::text::fold;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Threshold pair and resulting rank
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionRule {
    /// Experience needed
    pub required_xp: u64,
    /// Certificates needed
    pub required_certificates: u32,
    /// Rank granted
    pub next_rank: String,
}

impl PromotionRule {
    /// Create a rule
    #[inline]
    #[must_use]
    pub fn new(required_xp: u64, required_certificates: u32, next_rank: impl Into<String>) -> Self {
        Self {
            required_xp,
            required_certificates,
            next_rank: next_rank.into(),
        }
    }
}

/// Rank → rule, keyed by folded rank label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, PromotionRule>", into = "BTreeMap<String, PromotionRule>")]
pub struct RankTable {
    rules: BTreeMap<String, PromotionRule>,
}

impl RankTable {
    /// Empty table (every rank terminal)
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    /// Add or replace the rule for `rank`
    #[must_use]
    pub fn with_rule(mut self, rank: &str, rule: PromotionRule) -> Self {
        self.rules.insert(fold(rank), rule);
        self
    }

    /// Rule for `rank`, compared case- and accent-insensitively
    #[inline]
    #[must_use]
    pub fn rule_for(&self, rank: &str) -> Option<&PromotionRule> {
        self.rules.get(&fold(rank))
    }

    /// Number of rules
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// No rules
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for RankTable {
    fn default() -> Self {
        Self::empty()
            .with_rule("RECLUTA", PromotionRule::new(300, 5, "ACTIVO"))
            .with_rule("ACTIVO", PromotionRule::new(800, 10, "CONSAGRADO"))
            .with_rule("CONSAGRADO", PromotionRule::new(1_500, 15, "REFERENTE"))
            .with_rule("REFERENTE", PromotionRule::new(3_000, 20, "LÍDER"))
    }
}

impl From<BTreeMap<String, PromotionRule>> for RankTable {
    fn from(raw: BTreeMap<String, PromotionRule>) -> Self {
        raw.into_iter()
            .fold(Self::empty(), |table, (rank, rule)| table.with_rule(&rank, rule))
    }
}

impl From<RankTable> for BTreeMap<String, PromotionRule> {
    fn from(table: RankTable) -> Self {
        table.rules
    }
}

/// Progress towards the next rank
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromotionProgress {
    /// Rank the agent holds now
    pub current_rank: String,
    /// Rank that promotion would grant; `None` at max rank
    pub next_rank: Option<String>,
    /// Experience requirement met
    pub xp_met: bool,
    /// Certificate requirement met
    pub cert_met: bool,
    /// Experience progress, 0–100
    pub xp_progress_pct: f64,
    /// Certificate progress, 0–100
    pub cert_progress_pct: f64,
    /// Experience still missing
    pub missing_xp: u64,
    /// Certificates still missing
    pub missing_certificates: u32,
}

impl PromotionProgress {
    /// No further rank exists
    #[inline]
    #[must_use]
    pub fn is_max_rank(&self) -> bool {
        self.next_rank.is_none()
    }

    /// Both requirements met and a next rank exists
    #[inline]
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        !self.is_max_rank() && self.xp_met && self.cert_met
    }
}

/// Promotion history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionRecord {
    /// Rank before
    pub from: String,
    /// Rank after
    pub to: String,
    /// When
    pub date: DateTime<Utc>,
    /// Experience at promotion time
    pub xp: u64,
    /// Certificates at promotion time
    pub certificates: u32,
}

#[allow(clippy::cast_precision_loss)]
fn percent(have: u64, need: u64) -> f64 {
    if need == 0 {
        return 100.0;
    }
    (have as f64 / need as f64 * 100.0).clamp(0.0, 100.0)
}

/// Evaluate `agent` against `table`
#[must_use]
pub fn progress(agent: &Agent, table: &RankTable) -> PromotionProgress {
    let xp = agent.experience_total();
    let certs = agent.certificates;
    match table.rule_for(&agent.rank) {
        Some(rule) => PromotionProgress {
            current_rank: agent.rank.clone(),
            next_rank: Some(rule.next_rank.clone()),
            xp_met: xp >= rule.required_xp,
            cert_met: certs >= rule.required_certificates,
            xp_progress_pct: percent(xp, rule.required_xp),
            cert_progress_pct: percent(u64::from(certs), u64::from(rule.required_certificates)),
            missing_xp: rule.required_xp.saturating_sub(xp),
            missing_certificates: rule.required_certificates.saturating_sub(certs),
        },
        None => PromotionProgress {
            current_rank: agent.rank.clone(),
            next_rank: None,
            xp_met: true,
            cert_met: true,
            xp_progress_pct: 100.0,
            cert_progress_pct: 100.0,
            missing_xp: 0,
            missing_certificates: 0,
        },
    }
}

/// Promote `agent` in place when both requirements hold.
///
/// Never force-promotes: any unmet requirement is a deterministic
/// `PromotionRejected`.
pub fn promote(agent: &mut Agent, table: &RankTable, now_ms: u64) -> Result<PromotionRecord, RosterError> {
    let status = progress(agent, table);
    let Some(next_rank) = status.next_rank.clone() else {
        return Err(RosterError::PromotionRejected {
            rank: agent.rank.clone(),
            reason: "max rank reached".to_string(),
        });
    };
    if !status.is_eligible() {
        let mut missing = Vec::new();
        if !status.xp_met {
            missing.push(format!("{} xp", status.missing_xp));
        }
        if !status.cert_met {
            missing.push(format!("{} certificates", status.missing_certificates));
        }
        return Err(RosterError::PromotionRejected {
            rank: agent.rank.clone(),
            reason: format!("missing {}", missing.join(" and ")),
        });
    }

    let date = i64::try_from(now_ms)
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_else(Utc::now);
    let record = PromotionRecord {
        from: std::mem::replace(&mut agent.rank, next_rank.clone()),
        to: next_rank,
        date,
        xp: agent.experience_total(),
        certificates: agent.certificates,
    };
    tracing::info!(agent_id = %agent.id, from = %record.from, to = %record.to, "agent promoted");
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ExperienceComponents;

    fn recruit(biblical: u32, participatory: u32, leadership: u32, certs: u32) -> Agent {
        Agent::new("V-1", "Ana")
            .with_rank("RECLUTA")
            .with_experience(ExperienceComponents::new(biblical, participatory, leadership))
            .with_certificates(certs)
    }

    #[test]
    fn recruit_with_seventy_xp() {
        let agent = recruit(40, 30, 0, 0);
        let status = progress(&agent, &RankTable::default());
        assert_eq!(agent.experience_total(), 70);
        assert!(!status.xp_met);
        assert!(!status.cert_met);
        assert!((status.xp_progress_pct - 23.333).abs() < 0.01);
        assert_eq!(status.xp_progress_pct.round(), 23.0);
        assert_eq!(status.missing_xp, 230);
        assert_eq!(status.next_rank.as_deref(), Some("ACTIVO"));
    }

    #[test]
    fn progress_is_clamped() {
        let agent = recruit(900, 0, 0, 50);
        let status = progress(&agent, &RankTable::default());
        assert_eq!(status.xp_progress_pct, 100.0);
        assert_eq!(status.cert_progress_pct, 100.0);
        assert!(status.is_eligible());
    }

    #[test]
    fn rank_lookup_ignores_case_and_accents() {
        let table = RankTable::default();
        assert!(table.rule_for("recluta").is_some());
        assert!(table.rule_for("Referente").is_some());
        assert!(table.rule_for("LÍDER").is_none());
    }

    #[test]
    fn terminal_rank_cannot_promote() {
        let mut agent = recruit(5_000, 0, 0, 99).with_rank("LÍDER");
        let status = progress(&agent, &RankTable::default());
        assert!(status.is_max_rank());
        assert!(!status.is_eligible());
        assert!(matches!(
            promote(&mut agent, &RankTable::default(), 0),
            Err(RosterError::PromotionRejected { .. })
        ));
    }

    #[test]
    fn promote_updates_rank_and_records_history() {
        let mut agent = recruit(200, 100, 0, 5);
        let record = promote(&mut agent, &RankTable::default(), 1_700_000_000_000).unwrap();
        assert_eq!(record.from, "RECLUTA");
        assert_eq!(record.to, "ACTIVO");
        assert_eq!(record.xp, 300);
        assert_eq!(record.certificates, 5);
        assert_eq!(agent.rank, "ACTIVO");
    }

    #[test]
    fn promote_rejects_missing_certificates() {
        let mut agent = recruit(300, 0, 0, 4);
        let err = promote(&mut agent, &RankTable::default(), 0).unwrap_err();
        assert!(err.to_string().contains("1 certificates"));
        assert_eq!(agent.rank, "RECLUTA");
    }

    #[test]
    fn table_deserializes_with_folded_keys() {
        let table: RankTable = serde_json::from_str(
            r#"{"novato":{"required_xp":10,"required_certificates":1,"next_rank":"RECLUTA"}}"#,
        )
        .unwrap();
        assert_eq!(table.rule_for("NOVATO").unwrap().required_xp, 10);
    }
}
