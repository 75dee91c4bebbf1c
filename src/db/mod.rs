use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, ErrorCode};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use crate::fixture::{
    Association, EventList, Fixture, FixtureStatus, FootballFullState, MatchEvent, Team,
};
use crate::store::{BackendError, FixtureBackend};

#[derive(Debug, Error)]
#[error("fixture {0} missing from database")]
pub struct MissingFixture(pub String);

/// Thread-safe SQLite connection pool (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Private in-memory database, used by tests.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection mutex poisoned"))
    }

    // ── Fixtures ──────────────────────────────────────────────────────────────

    /// Insert a fixture with its teams and events in one transaction.
    pub fn insert_fixture(&self, fixture: &Fixture) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let state = &fixture.football_full_state;

        tx.execute(
            "INSERT INTO fixtures (
                fixture_id, displayed, suspended, home_team, away_team,
                started, finished, game_time_in_seconds, period,
                start_date_time, created_at
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
            params![
                fixture.fixture_id,
                fixture.fixture_status.displayed,
                fixture.fixture_status.suspended,
                state.home_team,
                state.away_team,
                state.started,
                state.finished,
                state.game_time_in_seconds,
                state.period,
                state.start_date_time,
                Utc::now(),
            ],
        )?;

        for (position, team) in state.teams.iter().enumerate() {
            tx.execute(
                "INSERT INTO fixture_teams (fixture_id, position, association, name, team_id)
                 VALUES (?1,?2,?3,?4,?5)",
                params![
                    fixture.fixture_id,
                    position as i64,
                    team.association.as_str(),
                    team.name,
                    team.team_id,
                ],
            )?;
        }

        for list in EventList::ALL {
            for (seq, event) in list.events(state).iter().enumerate() {
                insert_event(&tx, &fixture.fixture_id, list, seq, event)?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Rewrite the scalar columns of a fixture (flags, clock, period).
    ///
    /// Teams and `start_date_time` are fixed at creation and not touched.
    pub fn update_fixture_state(&self, fixture: &Fixture) -> Result<()> {
        let conn = self.conn()?;
        let state = &fixture.football_full_state;
        let updated = conn.execute(
            "UPDATE fixtures SET
                displayed=?1, suspended=?2, started=?3, finished=?4,
                game_time_in_seconds=?5, period=?6
             WHERE fixture_id=?7",
            params![
                fixture.fixture_status.displayed,
                fixture.fixture_status.suspended,
                state.started,
                state.finished,
                state.game_time_in_seconds,
                state.period,
                fixture.fixture_id,
            ],
        )?;
        if updated == 0 {
            return Err(MissingFixture(fixture.fixture_id.clone()).into());
        }
        Ok(())
    }

    /// Append one event row at position `seq` of the given list.
    pub fn insert_fixture_event(
        &self,
        fixture_id: &str,
        list: EventList,
        seq: usize,
        event: &MatchEvent,
    ) -> Result<()> {
        let conn = self.conn()?;
        insert_event(&conn, fixture_id, list, seq, event)
    }

    /// Delete a fixture; teams and events cascade. Returns false if absent.
    pub fn delete_fixture(&self, fixture_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM fixtures WHERE fixture_id=?1",
            params![fixture_id],
        )?;
        Ok(deleted > 0)
    }

    /// Load every fixture, fully assembled, ordered by fixture id.
    pub fn list_fixtures(&self) -> Result<Vec<Fixture>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT fixture_id, displayed, suspended, home_team, away_team,
                    started, finished, game_time_in_seconds, period, start_date_time
             FROM fixtures ORDER BY fixture_id",
        )?;
        let mut fixtures: BTreeMap<String, Fixture> = stmt
            .query_map([], map_fixture)?
            .map(|r| r.map(|f| (f.fixture_id.clone(), f)))
            .collect::<rusqlite::Result<_>>()?;

        let mut stmt = conn.prepare(
            "SELECT fixture_id, association, name, team_id
             FROM fixture_teams ORDER BY fixture_id, position",
        )?;
        let teams = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for (fixture_id, association, name, team_id) in teams {
            let association = Association::from_str_opt(&association)
                .ok_or_else(|| anyhow!("fixture {fixture_id}: bad association '{association}'"))?;
            if let Some(f) = fixtures.get_mut(&fixture_id) {
                f.football_full_state.teams.push(Team {
                    association,
                    name,
                    team_id,
                });
            }
        }

        let mut stmt = conn.prepare(
            "SELECT fixture_id, list_name, payload
             FROM fixture_events ORDER BY fixture_id, list_name, seq",
        )?;
        let events = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for (fixture_id, list_name, payload) in events {
            let list: EventList = list_name
                .parse()
                .with_context(|| format!("fixture {fixture_id}"))?;
            let value = serde_json::from_str(&payload)
                .with_context(|| format!("fixture {fixture_id}: bad {list} payload"))?;
            if let Some(f) = fixtures.get_mut(&fixture_id) {
                list.events_mut(&mut f.football_full_state)
                    .push(MatchEvent(value));
            }
        }

        Ok(fixtures.into_values().collect())
    }
}

/// Constraint violations and missing rows mean the database disagrees with
/// the caller; everything else (busy, I/O, poisoned mutex) is transient.
fn classify(err: anyhow::Error) -> BackendError {
    let out_of_sync = err.chain().any(|cause| {
        cause.is::<MissingFixture>()
            || cause
                .downcast_ref::<rusqlite::Error>()
                .and_then(|e| e.sqlite_error_code())
                == Some(ErrorCode::ConstraintViolation)
    });
    if out_of_sync {
        BackendError::OutOfSync(format!("{err:#}"))
    } else {
        BackendError::Transient(err)
    }
}

impl FixtureBackend for Database {
    fn load_all(&self) -> Result<Vec<Fixture>, BackendError> {
        self.list_fixtures().map_err(classify)
    }

    fn insert(&self, fixture: &Fixture) -> Result<(), BackendError> {
        self.insert_fixture(fixture).map_err(classify)
    }

    fn update(&self, fixture: &Fixture) -> Result<(), BackendError> {
        self.update_fixture_state(fixture).map_err(classify)
    }

    fn append_event(
        &self,
        fixture_id: &str,
        list: EventList,
        seq: usize,
        event: &MatchEvent,
    ) -> Result<(), BackendError> {
        self.insert_fixture_event(fixture_id, list, seq, event)
            .map_err(classify)
    }

    fn remove(&self, fixture_id: &str) -> Result<bool, BackendError> {
        self.delete_fixture(fixture_id).map_err(classify)
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

fn insert_event(
    conn: &Connection,
    fixture_id: &str,
    list: EventList,
    seq: usize,
    event: &MatchEvent,
) -> Result<()> {
    conn.execute(
        "INSERT INTO fixture_events (fixture_id, list_name, seq, payload, recorded_at)
         VALUES (?1,?2,?3,?4,?5)",
        params![
            fixture_id,
            list.as_str(),
            seq as i64,
            serde_json::to_string(&event.0)?,
            Utc::now(),
        ],
    )?;
    Ok(())
}

fn map_fixture(row: &rusqlite::Row) -> rusqlite::Result<Fixture> {
    let start_date_time: NaiveDateTime = row.get(9)?;
    Ok(Fixture {
        fixture_id: row.get(0)?,
        fixture_status: FixtureStatus {
            displayed: row.get(1)?,
            suspended: row.get(2)?,
        },
        football_full_state: FootballFullState {
            home_team: row.get(3)?,
            away_team: row.get(4)?,
            started: row.get(5)?,
            finished: row.get(6)?,
            game_time_in_seconds: row.get(7)?,
            period: row.get(8)?,
            start_date_time,
            goals: vec![],
            possibles: vec![],
            corners: vec![],
            red_cards: vec![],
            yellow_cards: vec![],
            teams: vec![],
        },
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS fixtures (
    fixture_id           TEXT    PRIMARY KEY,
    displayed            INTEGER NOT NULL,
    suspended            INTEGER NOT NULL,
    home_team            TEXT    NOT NULL,
    away_team            TEXT    NOT NULL,
    started              INTEGER NOT NULL,
    finished             INTEGER NOT NULL,
    game_time_in_seconds INTEGER NOT NULL,
    period               TEXT    NOT NULL,
    start_date_time      TEXT    NOT NULL,
    created_at           TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS fixture_teams (
    fixture_id  TEXT    NOT NULL,
    position    INTEGER NOT NULL,
    association TEXT    NOT NULL,
    name        TEXT    NOT NULL,
    team_id     TEXT    NOT NULL,
    PRIMARY KEY (fixture_id, position),
    FOREIGN KEY (fixture_id) REFERENCES fixtures(fixture_id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS fixture_events (
    fixture_id  TEXT    NOT NULL,
    list_name   TEXT    NOT NULL,
    seq         INTEGER NOT NULL,
    payload     TEXT    NOT NULL,
    recorded_at TEXT    NOT NULL,
    PRIMARY KEY (fixture_id, list_name, seq),
    FOREIGN KEY (fixture_id) REFERENCES fixtures(fixture_id) ON DELETE CASCADE
);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::seed::default_fixtures;
    use serde_json::json;

    #[test]
    fn test_insert_and_load_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let mut fixture = default_fixtures().remove(1);
        fixture.football_full_state.teams.reverse();
        fixture.football_full_state.goals = vec![
            MatchEvent(json!({ "team": "HOME", "minute": 12 })),
            MatchEvent(json!({ "team": "AWAY", "minute": 3 })),
        ];
        fixture.football_full_state.yellow_cards = vec![MatchEvent(json!("raw string event"))];

        db.insert_fixture(&fixture).unwrap();
        let loaded = db.list_fixtures().unwrap();
        assert_eq!(loaded, vec![fixture]);
    }

    #[test]
    fn test_duplicate_insert_fails_and_leaves_original() {
        let db = Database::open_in_memory().unwrap();
        let original = default_fixtures().remove(0);
        db.insert_fixture(&original).unwrap();

        let mut clash = original.clone();
        clash.football_full_state.home_team = "Somebody Else".into();
        assert!(db.insert_fixture(&clash).is_err());

        assert_eq!(db.list_fixtures().unwrap(), vec![original]);
    }

    #[test]
    fn test_failed_insert_rolls_back_teams() {
        let db = Database::open_in_memory().unwrap();
        let original = default_fixtures().remove(0);
        db.insert_fixture(&original).unwrap();
        assert!(db.insert_fixture(&original).is_err());

        let conn = db.conn().unwrap();
        let teams: i64 = conn
            .query_row("SELECT COUNT(*) FROM fixture_teams", [], |r| r.get(0))
            .unwrap();
        assert_eq!(teams, 2);
    }

    #[test]
    fn test_delete_cascades() {
        let db = Database::open_in_memory().unwrap();
        let mut fixture = default_fixtures().remove(0);
        fixture.football_full_state.corners = vec![MatchEvent(json!({ "minute": 4 }))];
        db.insert_fixture(&fixture).unwrap();

        assert!(db.delete_fixture("1").unwrap());
        assert!(!db.delete_fixture("1").unwrap());
        assert!(db.list_fixtures().unwrap().is_empty());

        let conn = db.conn().unwrap();
        let events: i64 = conn
            .query_row("SELECT COUNT(*) FROM fixture_events", [], |r| r.get(0))
            .unwrap();
        assert_eq!(events, 0);
    }

    #[test]
    fn test_update_and_append_persist() {
        let db = Database::open_in_memory().unwrap();
        let mut fixture = default_fixtures().remove(1);
        db.insert_fixture(&fixture).unwrap();

        fixture.football_full_state.game_time_in_seconds = 3000;
        fixture.football_full_state.period = "ET".into();
        fixture.fixture_status.suspended = true;
        db.update_fixture_state(&fixture).unwrap();

        let goal = MatchEvent(json!({ "minute": 50 }));
        db.insert_fixture_event("2", EventList::Goals, 0, &goal).unwrap();
        fixture.football_full_state.goals.push(goal);

        assert_eq!(db.list_fixtures().unwrap(), vec![fixture]);
    }

    #[test]
    fn test_update_missing_fixture_errors() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.update_fixture_state(&default_fixtures()[0]).is_err());
    }

    #[test]
    fn test_backend_errors_are_classified() {
        let db = Database::open_in_memory().unwrap();
        let fixture = default_fixtures().remove(1);

        let err = db.update(&fixture).unwrap_err();
        assert!(matches!(err, BackendError::OutOfSync(ref m) if m.contains("missing")));

        let event = MatchEvent(json!({ "minute": 1 }));
        let err = FixtureBackend::append_event(&db, "2", EventList::Goals, 0, &event).unwrap_err();
        assert!(matches!(err, BackendError::OutOfSync(_)));

        db.insert(&fixture).unwrap();
        assert!(matches!(db.insert(&fixture), Err(BackendError::OutOfSync(_))));

        let err = classify(anyhow!("disk unavailable"));
        assert!(matches!(err, BackendError::Transient(_)));
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(matches!(classify(busy.into()), BackendError::Transient(_)));
    }

    #[test]
    fn test_reopen_keeps_fixtures() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixtures.db");
        let path = path.to_str().unwrap();

        {
            let db = Database::open(path).unwrap();
            for f in default_fixtures() {
                db.insert_fixture(&f).unwrap();
            }
        }

        let db = Database::open(path).unwrap();
        assert_eq!(db.list_fixtures().unwrap(), default_fixtures());
    }
}
