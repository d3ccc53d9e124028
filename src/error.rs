use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to parse atlas: {message}")]
    AtlasParse { message: String },

    #[error("failed to load texture '{path}' for atlas page '{page}'")]
    TextureLoad {
        page: String,
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
