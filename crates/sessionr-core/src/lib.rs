pub mod clock;
pub mod config;
pub mod coordinator;
pub mod drivers;
pub mod errors;
pub mod events;
pub mod indicators;
pub mod interfaces;
pub mod prefetch;
pub mod processor;
pub mod quality;
pub mod requirements;
pub mod runtime;
pub mod scanner;
pub mod session;
pub mod sync;

pub use clock::{Clock, VirtualClock, WallClock};
pub use config::{SessionConfig, SessionMode};
pub use coordinator::{BoundaryState, ProvisionOutcome, SessionCoordinator, SymbolReport};
pub use errors::{ConfigError, SessionError};
pub use events::{DriverEvent, Notification, NotificationKind, NotificationQueue};
pub use indicators::{Indicator, IndicatorConfig, IndicatorData, IndicatorKind, IndicatorManager};
pub use interfaces::{
    ExecutionAdapter, FeedAdapter, HistoricalStore, NullExecutionAdapter, NullFeedAdapter,
};
pub use processor::DataProcessor;
pub use quality::{GapSpan, QualityChecker, QualityMetrics};
pub use runtime::SessionRuntime;
pub use scanner::{ScanContext, ScanResult, Scanner, ScannerManager};
pub use session::{AddedBy, Provenance, SessionData, SymbolSessionData};
pub use sync::{StreamSubscription, SyncMode};
