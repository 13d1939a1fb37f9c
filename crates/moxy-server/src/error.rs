use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProxyError>;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wire protocol error: {0}")]
    Wire(#[from] moxy_wire::WireError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("module error: {0}")]
    Module(String),
}
