pub mod data;

pub use data::{
    AddedBy, BarIntervalData, InsertOutcome, Provenance, SessionData, SessionMetrics,
    SessionStats, SymbolSessionData,
};
