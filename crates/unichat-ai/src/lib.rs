//! Remote-service collaborators for the chat client: wire types, errors and
//! the HTTP transport for the text-generation service.

mod error;
mod providers;
mod transport;
mod types;

pub use error::{ChatError, ChatErrorCode};
pub use providers::{
    PollinationsClient, PollinationsConfig, StaticPersonaSource, DEFAULT_IMAGE_ENDPOINT,
    DEFAULT_MODELS_ENDPOINT, DEFAULT_TEXT_ENDPOINT,
};
pub use transport::{
    read_full_response, ByteStream, CompletionTransport, ImageDescriber, ModelCatalogSource,
    PersonaSource,
};
pub use types::{CompletionRequest, Message, ModelEntry, Role};
