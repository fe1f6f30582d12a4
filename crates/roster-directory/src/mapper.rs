//! Row → Agent mapping
//!
//! Derived fields are computed here and never read from the row:
//! - experience total is the sum of the three components
//! - role comes from the configured rules, highest role wins

use crate::aliases::Field;
use crate::rows::{normalise, Row};
use once_cell::sync::Lazy;
use regex::Regex;
use roster_core::text::fold;
use roster_core::{
    Agent, DirectoryError, ExperienceComponents, NotificationPreferences, Role, RoleRule,
    RoleRuleTarget, RosterError, Secret,
};
use serde_json::Value;

const UNKNOWN_NAME: &str = "AGENTE DESCONOCIDO";
const DEFAULT_RANK: &str = "RECLUTA";
const DEFAULT_STATUS: &str = "ACTIVO";
const DEFAULT_ACCESS: &str = "ESTUDIANTE";
const PENDING_ID: &str = "PENDIENTE";

#[derive(Debug, Clone)]
struct CompiledRule {
    target: RoleRuleTarget,
    pattern: Regex,
    role: Role,
}

impl CompiledRule {
    fn compile(rule: &RoleRule) -> Result<Self, regex::Error> {
        Ok(Self {
            target: rule.target,
            pattern: Regex::new(&rule.pattern)?,
            role: rule.role,
        })
    }
}

static DEFAULT_RULES: Lazy<Vec<CompiledRule>> = Lazy::new(|| {
    RoleRule::defaults()
        .iter()
        .filter_map(|rule| CompiledRule::compile(rule).ok())
        .collect()
});

/// Maps normalised rows to agents
#[derive(Debug, Clone)]
pub struct AgentMapper {
    rules: Vec<CompiledRule>,
}

impl Default for AgentMapper {
    fn default() -> Self {
        Self {
            rules: (*DEFAULT_RULES).clone(),
        }
    }
}

impl AgentMapper {
    /// Compile `rules`; an invalid pattern is a configuration error
    pub fn new(rules: &[RoleRule]) -> Result<Self, RosterError> {
        let rules = rules
            .iter()
            .map(|rule| {
                CompiledRule::compile(rule).map_err(|e| {
                    RosterError::Config(format!("role rule `{}`: {e}", rule.pattern))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Role for an id and raw access level
    #[must_use]
    pub fn role_for(&self, id: &str, access_level: &str) -> Role {
        let access = fold(access_level);
        let id = id.trim();
        self.rules
            .iter()
            .filter(|rule| match rule.target {
                RoleRuleTarget::Id => rule.pattern.is_match(id),
                RoleRuleTarget::Access => rule.pattern.is_match(&access),
            })
            .map(|rule| rule.role)
            .max()
            .unwrap_or(Role::Student)
    }

    /// Map one row
    #[must_use]
    pub fn map_row(&self, row: &Row) -> Agent {
        let id = row
            .text(Field::Id)
            .filter(|id| id != "undefined" && id != "null")
            .unwrap_or_else(|| PENDING_ID.to_string());
        let access_level = row
            .text(Field::AccessLevel)
            .unwrap_or_else(|| DEFAULT_ACCESS.to_string());
        let role = self.role_for(&id, &access_level);

        Agent {
            name: row.text(Field::Name).unwrap_or_else(|| UNKNOWN_NAME.to_string()),
            photo_url: row.text(Field::PhotoUrl).unwrap_or_default(),
            secret: Secret::new(row.text(Field::Secret).unwrap_or_default()),
            experience: ExperienceComponents::new(
                points(row.get(Field::Biblical)),
                points(row.get(Field::Participatory)),
                points(row.get(Field::Leadership)),
            ),
            certificates: certificates(row.get(Field::Certificates)),
            rank: row.text(Field::Rank).unwrap_or_else(|| DEFAULT_RANK.to_string()),
            role,
            access_level,
            status: row.text(Field::Status).unwrap_or_else(|| DEFAULT_STATUS.to_string()),
            biometric_credential: row.text(Field::BiometricCredential),
            notification_prefs: preferences(row.get(Field::NotificationPrefs)),
            last_attendance: row.text(Field::LastAttendance),
            security_question: row.text(Field::SecurityQuestion).unwrap_or_default(),
            security_answer: Secret::new(row.text(Field::SecurityAnswer).unwrap_or_default()),
            must_change_secret: row
                .get(Field::MustChangeSecret)
                .is_some_and(truthy),
            id,
        }
    }

    /// Normalise and map a raw directory response
    pub fn map_roster(&self, raw: Value) -> Result<Vec<Agent>, DirectoryError> {
        Ok(normalise(raw)?.iter().map(|row| self.map_row(row)).collect())
    }
}

/// Leading integer of a cell; anything else, including negatives, is 0
#[allow(clippy::cast_possible_truncation)]
fn points(value: Option<&Value>) -> u32 {
    let parsed = match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Some(Value::String(s)) => leading_integer(s),
        _ => None,
    };
    parsed
        .map(|n| u32::try_from(n.max(0)).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

fn leading_integer(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let (sign, rest) = match raw.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, raw.strip_prefix('+').unwrap_or(raw)),
    };
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse::<i64>().ok().map(|n| sign * n)
}

fn certificates(value: Option<&Value>) -> u32 {
    match value {
        Some(Value::Array(items)) => u32::try_from(items.len()).unwrap_or(u32::MAX),
        other => points(other),
    }
}

fn preferences(value: Option<&Value>) -> NotificationPreferences {
    let decoded = match value {
        Some(Value::String(raw)) if !raw.trim().is_empty() => serde_json::from_str(raw),
        Some(v @ Value::Object(_)) => serde_json::from_value(v.clone()),
        _ => return NotificationPreferences::default(),
    };
    decoded.unwrap_or_else(|err| {
        tracing::debug!(error = %err, "ignoring malformed notification preferences");
        NotificationPreferences::default()
    })
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(fold(s).as_str(), "SI" | "TRUE" | "1"),
        Value::Number(n) => n.as_i64() == Some(1),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => Row::from_pairs(map),
            _ => Row::default(),
        }
    }

    #[test]
    fn experience_total_ignores_remote_scalar() {
        let agent = AgentMapper::default().map_row(&row(json!({
            "id": "V-1",
            "xp": 9999,
            "biblia": "40",
            "apuntes": 30,
            "liderazgo": "",
        })));
        assert_eq!(agent.experience, ExperienceComponents::new(40, 30, 0));
        assert_eq!(agent.experience_total(), 70);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let agent = AgentMapper::default().map_row(&row(json!({ "id": "" })));
        assert_eq!(agent.id, "PENDIENTE");
        assert_eq!(agent.name, "AGENTE DESCONOCIDO");
        assert_eq!(agent.rank, "RECLUTA");
        assert_eq!(agent.status, "ACTIVO");
        assert_eq!(agent.role, Role::Student);
        assert!(!agent.has_biometric());
    }

    #[test]
    fn lenient_numbers() {
        assert_eq!(points(Some(&json!("12 pts"))), 12);
        assert_eq!(points(Some(&json!("-5"))), 0);
        assert_eq!(points(Some(&json!("abc"))), 0);
        assert_eq!(points(Some(&json!(7.9))), 7);
        assert_eq!(certificates(Some(&json!(["a", "b"]))), 2);
    }

    #[test]
    fn access_level_is_folded_before_matching() {
        let mapper = AgentMapper::default();
        assert_eq!(mapper.role_for("V-1", "Líder de célula"), Role::Leader);
        assert_eq!(mapper.role_for("V-1", "director general"), Role::Director);
        assert_eq!(mapper.role_for("V-1", "ESTUDIANTE"), Role::Student);
    }

    #[test]
    fn director_outranks_leader() {
        let mapper = AgentMapper::new(&[
            RoleRule::id("4251", Role::Leader),
            RoleRule::id("20389331", Role::Director),
            RoleRule::access("DIRECTOR", Role::Director),
        ])
        .unwrap();
        assert_eq!(mapper.role_for("V-4251", "ESTUDIANTE"), Role::Leader);
        assert_eq!(mapper.role_for("V-4251", "DIRECTOR"), Role::Director);
        assert_eq!(mapper.role_for("20389331", "ESTUDIANTE"), Role::Director);
    }

    #[test]
    fn invalid_rule_is_config_error() {
        let err = AgentMapper::new(&[RoleRule::id("(", Role::Leader)]).unwrap_err();
        assert!(matches!(err, RosterError::Config(_)));
    }

    #[test]
    fn preferences_accept_json_text() {
        let agent = AgentMapper::default().map_row(&row(json!({
            "id": "V-1",
            "notif_prefs": r#"{"read":["n1"],"deleted":["n2"]}"#,
            "cambio": "si",
            "biometric_credential": "abc",
        })));
        assert!(agent.notification_prefs.read.contains("n1"));
        assert!(agent.notification_prefs.deleted.contains("n2"));
        assert!(agent.must_change_secret);
        assert!(agent.has_biometric());
    }

    #[test]
    fn secrets_are_trimmed() {
        let agent = AgentMapper::default().map_row(&row(json!({ "id": "V-1", "pin": 1234 })));
        assert!(agent.secret.matches("1234"));
    }
}
