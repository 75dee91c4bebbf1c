use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// A scheduled, live or finished football fixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    /// Always serialized as a string; numeric input is kept in its text form.
    #[serde(deserialize_with = "fixture_id_from_text_or_number")]
    pub fixture_id: String,
    pub fixture_status: FixtureStatus,
    pub football_full_state: FootballFullState,
}

/// Display flags. Independent of each other and of the match phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureStatus {
    pub displayed: bool,
    pub suspended: bool,
}

/// Nested live-match payload of a fixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FootballFullState {
    pub home_team: String,
    pub away_team: String,
    pub finished: bool,
    pub game_time_in_seconds: i64,
    pub goals: Vec<MatchEvent>,
    /// Free-text play segment label ("" before kickoff)
    pub period: String,
    pub possibles: Vec<MatchEvent>,
    pub corners: Vec<MatchEvent>,
    pub red_cards: Vec<MatchEvent>,
    pub yellow_cards: Vec<MatchEvent>,
    /// Kickoff in local time, e.g. "2019-08-20T14:00:00"
    pub start_date_time: NaiveDateTime,
    pub started: bool,
    /// Caller order is preserved verbatim; never re-sorted by association.
    pub teams: Vec<Team>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub association: Association,
    pub name: String,
    pub team_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Association {
    Home,
    Away,
}

impl Association {
    pub fn as_str(&self) -> &'static str {
        match self {
            Association::Home => "HOME",
            Association::Away => "AWAY",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "HOME" => Some(Association::Home),
            "AWAY" => Some(Association::Away),
            _ => None,
        }
    }
}

/// A single in-match event (goal, card, corner, possible).
///
/// The payload is opaque to the store and round-trips verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchEvent(pub serde_json::Value);

/// Structural violation found while validating a fixture record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid record: {field}: {reason}")]
pub struct InvalidRecord {
    pub field: String,
    pub reason: String,
}

impl InvalidRecord {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        InvalidRecord {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Check the structural invariants of a fixture record. Pure, no I/O.
pub fn validate(record: &Fixture) -> Result<(), InvalidRecord> {
    if record.fixture_id.trim().is_empty() {
        return Err(InvalidRecord::new("fixtureId", "must not be empty"));
    }

    let state = &record.football_full_state;
    if state.game_time_in_seconds < 0 {
        return Err(InvalidRecord::new(
            "footballFullState.gameTimeInSeconds",
            format!("must be >= 0, got {}", state.game_time_in_seconds),
        ));
    }
    if state.finished && !state.started {
        return Err(InvalidRecord::new(
            "footballFullState.finished",
            "a fixture cannot be finished before it has started",
        ));
    }

    if state.teams.len() != 2 {
        return Err(InvalidRecord::new(
            "footballFullState.teams",
            format!("expected exactly 2 teams, got {}", state.teams.len()),
        ));
    }
    for assoc in [Association::Home, Association::Away] {
        let count = state.teams.iter().filter(|t| t.association == assoc).count();
        if count != 1 {
            return Err(InvalidRecord::new(
                "footballFullState.teams",
                format!("association {} must appear exactly once, got {}", assoc.as_str(), count),
            ));
        }
    }

    Ok(())
}

fn fixture_id_from_text_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Signed(i64),
        Unsigned(u64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Signed(n) => n.to_string(),
        RawId::Unsigned(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixture_json(id: serde_json::Value) -> serde_json::Value {
        json!({
            "fixtureId": id,
            "fixtureStatus": { "displayed": true, "suspended": false },
            "footballFullState": {
                "homeTeam": "Test Home Team",
                "awayTeam": "Test Away Team",
                "finished": true,
                "gameTimeInSeconds": 5400,
                "goals": [],
                "period": "",
                "possibles": [],
                "corners": [],
                "redCards": [],
                "yellowCards": [],
                "startDateTime": "2019-08-20T14:00:00",
                "started": true,
                "teams": [
                    { "association": "HOME", "name": "Test Home Team", "teamId": "HOME" },
                    { "association": "AWAY", "name": "Test Away Team", "teamId": "AWAY" }
                ]
            }
        })
    }

    fn parse(v: serde_json::Value) -> Fixture {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_wire_format_round_trips_verbatim() {
        let input = fixture_json(json!("4"));
        let fixture = parse(input.clone());
        assert_eq!(serde_json::to_value(&fixture).unwrap(), input);
    }

    #[test]
    fn test_numeric_fixture_id_becomes_text() {
        let fixture = parse(fixture_json(json!(42)));
        assert_eq!(fixture.fixture_id, "42");
        let out = serde_json::to_value(&fixture).unwrap();
        assert_eq!(out["fixtureId"], json!("42"));
    }

    #[test]
    fn test_leading_zero_id_is_kept() {
        let fixture = parse(fixture_json(json!("007")));
        assert_eq!(fixture.fixture_id, "007");
    }

    #[test]
    fn test_start_time_is_naive_and_second_precision() {
        let mut v = fixture_json(json!("4"));
        v["footballFullState"]["startDateTime"] = json!("2019-08-20T14:00:00.000");
        let fixture = parse(v);
        let out = serde_json::to_value(&fixture).unwrap();
        assert_eq!(out["footballFullState"]["startDateTime"], json!("2019-08-20T14:00:00"));

        let mut v = fixture_json(json!("4"));
        v["footballFullState"]["startDateTime"] = json!("2019-08-20T14:00:00Z");
        assert!(serde_json::from_value::<Fixture>(v).is_err());
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let mut v = fixture_json(json!("1"));
        v["footballFullState"].as_object_mut().unwrap().remove("teams");
        assert!(serde_json::from_value::<Fixture>(v).is_err());
    }

    #[test]
    fn test_validate_accepts_reference_record() {
        assert_eq!(validate(&parse(fixture_json(json!("1")))), Ok(()));
    }

    #[test]
    fn test_validate_keeps_away_first_order_valid() {
        let mut f = parse(fixture_json(json!("1")));
        f.football_full_state.teams.reverse();
        assert!(validate(&f).is_ok());
        assert_eq!(f.football_full_state.teams[0].association, Association::Away);
    }

    #[test]
    fn test_validate_rejects_finished_without_start() {
        let mut f = parse(fixture_json(json!("1")));
        f.football_full_state.started = false;
        let err = validate(&f).unwrap_err();
        assert_eq!(err.field, "footballFullState.finished");
    }

    #[test]
    fn test_validate_rejects_negative_clock() {
        let mut f = parse(fixture_json(json!("1")));
        f.football_full_state.game_time_in_seconds = -1;
        assert!(validate(&f).is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_association() {
        let mut f = parse(fixture_json(json!("1")));
        f.football_full_state.teams[1].association = Association::Home;
        let err = validate(&f).unwrap_err();
        assert_eq!(err.field, "footballFullState.teams");
    }

    #[test]
    fn test_validate_rejects_wrong_team_count() {
        let mut f = parse(fixture_json(json!("1")));
        f.football_full_state.teams.pop();
        assert!(validate(&f).is_err());
    }

    #[test]
    fn test_validate_rejects_blank_id() {
        let f = parse(fixture_json(json!("  ")));
        assert_eq!(validate(&f).unwrap_err().field, "fixtureId");
    }
}
