pub mod decode_error;

pub use decode_error::DatalayerError;

pub type CResult<T> = std::result::Result<T, DatalayerError>;
