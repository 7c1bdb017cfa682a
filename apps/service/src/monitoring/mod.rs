/// Monitoring engine module - probes checks and acts on the outcome
///
/// - `validation`: field rules a check must pass before it is probed
/// - `checker`: the HTTP/HTTPS prober
/// - `evaluator`: outcome to state, audit line, state write-back and alert
/// - `executor`: one check end to end
/// - `scheduler`: the periodic cycles and the worker pool
pub mod checker;
pub mod evaluator;
pub mod executor;
pub mod scheduler;
pub mod types;
pub mod validation;

pub use executor::MonitoringExecutor;
pub use scheduler::MonitoringScheduler;
pub use types::CheckState;
