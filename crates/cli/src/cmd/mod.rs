mod changes;
mod inspect;
mod plan;

pub use changes::cmd_changes;
pub use inspect::cmd_inspect;
pub use plan::cmd_plan;
