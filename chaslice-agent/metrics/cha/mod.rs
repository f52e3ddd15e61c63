pub mod calculator;
pub mod types;

pub use calculator::{calculate_cha_counters, BoxStatistics, ChaStatistics, SocketStatistics};
pub use types::{CountsTable, TableShape};
