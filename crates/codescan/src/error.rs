use codescan_session::{ConfigureError, StartError, TorchError};

#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    #[error(transparent)]
    Configure(#[from] ConfigureError),
    #[error(transparent)]
    Start(#[from] StartError),
    #[error(transparent)]
    Torch(#[from] TorchError),
    #[error("scan region given before the preview geometry is known")]
    PreviewGeometryUnknown,
    #[error("failed to spawn result relay: {0}")]
    Relay(#[source] std::io::Error),
}
