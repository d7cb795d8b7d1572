pub mod inspect;
pub mod serve;

pub use inspect::InspectCommand;
pub use serve::ServeCommand;
