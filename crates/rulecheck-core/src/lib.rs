//! ---
//! rc_section: "04-core"
//! rc_subsection: "module"
//! rc_type: "source"
//! rc_scope: "code"
//! rc_description: "Operation correlation engine and scenario execution."
//! rc_version: "v0.1.0"
//! rc_owner: "tbd"
//! ---
//! Correlation and timing-verification engine: the operation store, the
//! response-time correlator, the lifecycle controller and the scenario driver.

pub mod correlator;
pub mod driver;
pub mod error;
pub mod inbox;
pub mod lifecycle;
pub mod scenario;
pub mod store;
pub mod suite;

pub use correlator::{ResponseTimeCorrelator, TriggerInstant};
pub use driver::{judge, Outcome, ScenarioDriver, ScenarioPhase, Verdict};
pub use error::{HarnessError, Result};
pub use inbox::OperationInbox;
pub use lifecycle::OperationLifecycle;
pub use scenario::{motor_overheat_catalog, Expectation, Scenario, Step};
pub use store::{OperationStore, ReceiveOutcome};
pub use suite::{ScenarioReport, SuiteReport, SuiteRunner};
