//! Crate-level error types.

use std::fmt;

use crate::gpu::render_context::RenderContextError;

/// Errors produced by the lightcull crate.
///
/// Only boundary failures are represented here. Caller-contract violations
/// (dispatching before resources exist, discard-mapping a static buffer)
/// are assertions, and allocation failures are fatal through wgpu's device
/// error handler.
#[derive(Debug)]
pub enum LightcullError {
    /// GPU context initialization failure.
    Gpu(RenderContextError),
    /// A WGSL shader failed to compose or validate.
    ShaderCompose {
        /// File path the shader was registered under.
        file_path: String,
        /// Composer diagnostic.
        message: String,
    },
    /// A staging buffer could not be mapped for reading.
    BufferMap(wgpu::BufferAsyncError),
    /// Generic I/O failure.
    Io(std::io::Error),
    /// TOML options parsing/serialization failure.
    OptionsParse(String),
    /// Options parsed but hold an unsupported value.
    InvalidOption(String),
    /// Viewer event-loop failure.
    Viewer(String),
}

impl fmt::Display for LightcullError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gpu(e) => write!(f, "GPU error: {e}"),
            Self::ShaderCompose { file_path, message } => {
                write!(f, "shader '{file_path}' failed to compose: {message}")
            }
            Self::BufferMap(e) => write!(f, "buffer map failed: {e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::OptionsParse(msg) => {
                write!(f, "options parse error: {msg}")
            }
            Self::InvalidOption(msg) => write!(f, "invalid option: {msg}"),
            Self::Viewer(msg) => write!(f, "viewer error: {msg}"),
        }
    }
}

impl std::error::Error for LightcullError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Gpu(e) => Some(e),
            Self::BufferMap(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RenderContextError> for LightcullError {
    fn from(e: RenderContextError) -> Self {
        Self::Gpu(e)
    }
}

impl From<std::io::Error> for LightcullError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<toml::de::Error> for LightcullError {
    fn from(e: toml::de::Error) -> Self {
        Self::OptionsParse(e.to_string())
    }
}

impl From<toml::ser::Error> for LightcullError {
    fn from(e: toml::ser::Error) -> Self {
        Self::OptionsParse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_failing_shader() {
        let err = LightcullError::ShaderCompose {
            file_path: "tile.wgsl".to_owned(),
            message: "unknown identifier".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "shader 'tile.wgsl' failed to compose: unknown identifier"
        );
    }

    #[test]
    fn io_errors_keep_their_source() {
        let err: LightcullError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(std::error::Error::source(&err).is_some());
    }
}
