// =============================================================================
// Dashboard Monitors
// =============================================================================
//
// Each monitor is an independent poll loop spawned from main: pair watch
// (fast, per watched symbol), funding ranking, money flow and open interest
// (slow, whole-exchange sweeps). All four share the same shape: a ticker
// drives one cycle at a time and each cycle publishes its result into
// `DashboardState`. A failed cycle is logged and recorded in the error
// feed; the loop itself never dies, it stops only through its
// `ShutdownSignal`.

pub mod funding_ranks;
pub mod money_flow;
pub mod open_interest;
pub mod pair_watch;

pub use funding_ranks::FundingRanksMonitor;
pub use money_flow::MoneyFlowMonitor;
pub use open_interest::OpenInterestMonitor;
pub use pair_watch::PairWatchMonitor;
