pub mod discovery;
pub mod response;
mod traits;
mod transport;

pub use discovery::{ModelCatalog, ModelInfo};
pub use response::{parse_completion, AssistantReply, ExchangeOutcome};
pub use traits::*;
pub use transport::{ChatTransport, HttpReply, HttpTransport};
