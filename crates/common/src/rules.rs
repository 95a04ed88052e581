mod rule_engine;
mod rule_table;

pub use rule_engine::*;
pub use rule_table::*;
