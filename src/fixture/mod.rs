pub mod match_state;
pub mod model;
pub mod seed;

pub use match_state::{EventList, MatchPhase, MatchStateError, StatusUpdate};
pub use model::{
    validate, Association, Fixture, FixtureStatus, FootballFullState, InvalidRecord, MatchEvent,
    Team,
};
