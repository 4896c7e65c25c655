pub mod actor;
pub mod messages;

pub use actor::RelayActor;
pub use messages::RelayCommand;
