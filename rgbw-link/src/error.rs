use rgbw_proto::EncodeError;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("websocket is not open")]
    NotOpen,
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("websocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}
