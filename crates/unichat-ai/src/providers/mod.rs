mod common;
mod pollinations;
mod static_persona;

pub use pollinations::{
    PollinationsClient, PollinationsConfig, DEFAULT_IMAGE_ENDPOINT, DEFAULT_MODELS_ENDPOINT,
    DEFAULT_TEXT_ENDPOINT,
};
pub use static_persona::StaticPersonaSource;
