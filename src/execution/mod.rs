pub mod engine;
pub mod fill_simulator;
pub mod position_sizer;
pub mod risk_manager;
pub mod trade_executor;

pub use engine::{
    emergency_stop, run_cycle, run_trading_engine, CycleSummary, Dispatcher, EngineConfig, InFlightPairs,
    TradingContext,
};
pub use fill_simulator::{FillSimulator, SimulatedFill, SimulationConfig};
pub use position_sizer::{calculate_size, SizeDecision, SizingStrategy};
pub use risk_manager::{check_slippage, Authorization, RiskGovernor, RiskLimits, RiskViolation};
pub use trade_executor::{ExecutionConfig, ExecutionError, ExecutionReport, ExecutionState, TradeExecutor};
