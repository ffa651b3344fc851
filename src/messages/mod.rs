//! Plaintext, envelope and typed message schemas.
mod agent_message;
mod basic_message;
mod decorators;
mod envelope;
mod forward;
mod mediation;
mod message_type;
mod pickup;
mod plaintext;
mod problem_report;
mod serialization;

pub use agent_message::*;
pub use basic_message::*;
pub use decorators::*;
pub use envelope::*;
pub use forward::*;
pub use mediation::*;
pub use message_type::*;
pub use pickup::*;
pub use plaintext::*;
pub use problem_report::*;
