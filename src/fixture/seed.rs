use chrono::NaiveDate;

use super::model::{Association, Fixture, FixtureStatus, FootballFullState, Team};

/// Fixtures loaded into an empty store at startup.
pub fn default_fixtures() -> Vec<Fixture> {
    vec![
        fixture("1", "Arsenal", "Chelsea", (2019, 8, 17, 12, 30), true, true, 5400),
        fixture("2", "Liverpool", "Everton", (2019, 8, 18, 15, 0), true, false, 2710),
        fixture("3", "Leeds United", "Wolves", (2019, 8, 24, 17, 30), false, false, 0),
    ]
}

fn fixture(
    id: &str,
    home: &str,
    away: &str,
    (y, mo, d, h, mi): (i32, u32, u32, u32, u32),
    started: bool,
    finished: bool,
    clock: i64,
) -> Fixture {
    let start_date_time = NaiveDate::from_ymd_opt(y, mo, d)
        .and_then(|date| date.and_hms_opt(h, mi, 0))
        .unwrap_or_default();
    let period = match (started, finished) {
        (false, _) => "",
        (true, false) => "2nd half",
        (true, true) => "FT",
    };

    Fixture {
        fixture_id: id.to_string(),
        fixture_status: FixtureStatus {
            displayed: true,
            suspended: false,
        },
        football_full_state: FootballFullState {
            home_team: home.to_string(),
            away_team: away.to_string(),
            finished,
            game_time_in_seconds: clock,
            goals: vec![],
            period: period.to_string(),
            possibles: vec![],
            corners: vec![],
            red_cards: vec![],
            yellow_cards: vec![],
            start_date_time,
            started,
            teams: vec![
                Team {
                    association: Association::Home,
                    name: home.to_string(),
                    team_id: "HOME".to_string(),
                },
                Team {
                    association: Association::Away,
                    name: away.to_string(),
                    team_id: "AWAY".to_string(),
                },
            ],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::model::validate;

    #[test]
    fn test_seed_fixtures_are_valid_and_unique() {
        let seeds = default_fixtures();
        assert_eq!(seeds.len(), 3);
        for f in &seeds {
            validate(f).unwrap();
        }
        let mut ids: Vec<_> = seeds.iter().map(|f| f.fixture_id.as_str()).collect();
        ids.dedup();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }
}
