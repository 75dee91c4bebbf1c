//! Match state engine.
//!
//! Pure transition functions over [`FootballFullState`]. Every operation takes
//! the current state by reference and returns a new state or a rule
//! violation; the caller (the fixture store) owns the record and decides what
//! to publish. Nothing here keeps state between calls.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use super::model::{FootballFullState, MatchEvent};

/// Match lifecycle derived from the `(started, finished)` flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    Scheduled,
    Live,
    Finished,
}

impl MatchPhase {
    /// `(false, true)` never passes validation; it is treated as finished so
    /// that a corrupt record still refuses further mutation.
    pub fn of(state: &FootballFullState) -> Self {
        match (state.started, state.finished) {
            (false, false) => MatchPhase::Scheduled,
            (true, false) => MatchPhase::Live,
            (_, true) => MatchPhase::Finished,
        }
    }
}

/// The five ordered event sequences of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventList {
    Goals,
    Possibles,
    Corners,
    RedCards,
    YellowCards,
}

impl EventList {
    pub const ALL: [EventList; 5] = [
        EventList::Goals,
        EventList::Possibles,
        EventList::Corners,
        EventList::RedCards,
        EventList::YellowCards,
    ];

    /// Wire name, identical to the JSON field name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventList::Goals => "goals",
            EventList::Possibles => "possibles",
            EventList::Corners => "corners",
            EventList::RedCards => "redCards",
            EventList::YellowCards => "yellowCards",
        }
    }

    pub fn events<'a>(&self, state: &'a FootballFullState) -> &'a Vec<MatchEvent> {
        match self {
            EventList::Goals => &state.goals,
            EventList::Possibles => &state.possibles,
            EventList::Corners => &state.corners,
            EventList::RedCards => &state.red_cards,
            EventList::YellowCards => &state.yellow_cards,
        }
    }

    pub fn events_mut<'a>(&self, state: &'a mut FootballFullState) -> &'a mut Vec<MatchEvent> {
        match self {
            EventList::Goals => &mut state.goals,
            EventList::Possibles => &mut state.possibles,
            EventList::Corners => &mut state.corners,
            EventList::RedCards => &mut state.red_cards,
            EventList::YellowCards => &mut state.yellow_cards,
        }
    }
}

impl fmt::Display for EventList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventList {
    type Err = MatchStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventList::ALL
            .into_iter()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| MatchStateError::UnknownEventList(s.to_string()))
    }
}

/// Partial update of the match flags. `None` leaves a flag untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct StatusUpdate {
    pub started: Option<bool>,
    pub finished: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchStateError {
    #[error("illegal transition: {0}")]
    IllegalTransition(String),

    #[error("clock regression: {requested}s is before the current {current}s")]
    ClockRegression { current: i64, requested: i64 },

    #[error("fixture is finished and accepts no further match updates")]
    FixtureFinalized,

    #[error("unknown event list '{0}' (expected goals, possibles, corners, redCards or yellowCards)")]
    UnknownEventList(String),
}

fn ensure_not_finished(state: &FootballFullState) -> Result<(), MatchStateError> {
    if MatchPhase::of(state) == MatchPhase::Finished {
        return Err(MatchStateError::FixtureFinalized);
    }
    Ok(())
}

/// Append `event` to the end of `list`. Existing entries are never reordered.
pub fn append_event(
    state: &FootballFullState,
    list: EventList,
    event: MatchEvent,
) -> Result<FootballFullState, MatchStateError> {
    ensure_not_finished(state)?;
    let mut next = state.clone();
    list.events_mut(&mut next).push(event);
    Ok(next)
}

/// Move the match clock to `seconds`. Backward moves are rejected, not clamped.
pub fn advance_clock(
    state: &FootballFullState,
    seconds: i64,
) -> Result<FootballFullState, MatchStateError> {
    ensure_not_finished(state)?;
    if seconds < state.game_time_in_seconds {
        return Err(MatchStateError::ClockRegression {
            current: state.game_time_in_seconds,
            requested: seconds,
        });
    }
    let mut next = state.clone();
    next.game_time_in_seconds = seconds;
    Ok(next)
}

/// Apply a start/finish update.
///
/// Start is one-way, finish requires start, and a finished match only
/// accepts a repeated `finished = true`.
pub fn set_status(
    state: &FootballFullState,
    update: StatusUpdate,
) -> Result<FootballFullState, MatchStateError> {
    if MatchPhase::of(state) == MatchPhase::Finished {
        let reapplies_finish = update.finished == Some(true) && update.started != Some(false);
        if reapplies_finish {
            return Ok(state.clone());
        }
        return Err(MatchStateError::IllegalTransition(
            "fixture is finished; only finished=true may be re-applied".into(),
        ));
    }

    let started = update.started.unwrap_or(state.started);
    let finished = update.finished.unwrap_or(state.finished);

    if state.started && !started {
        return Err(MatchStateError::IllegalTransition(
            "a started match cannot return to not-started".into(),
        ));
    }
    if finished && !started {
        return Err(MatchStateError::IllegalTransition(
            "cannot finish a match that has not started".into(),
        ));
    }

    let mut next = state.clone();
    next.started = started;
    next.finished = finished;
    Ok(next)
}

/// Replace the period label ("1st half", "HT", ...).
pub fn set_period(
    state: &FootballFullState,
    period: &str,
) -> Result<FootballFullState, MatchStateError> {
    ensure_not_finished(state)?;
    let mut next = state.clone();
    next.period = period.to_string();
    Ok(next)
}
