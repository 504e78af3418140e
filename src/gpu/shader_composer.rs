use std::borrow::Cow;
use std::collections::HashMap;

use naga_oil::compose::{
    ComposableModuleDescriptor, Composer, NagaModuleDescriptor, ShaderDefValue,
    ShaderLanguage, ShaderType,
};

use crate::error::LightcullError;

/// Shader def switching G-buffer and depth bindings to their multisampled
/// texture types.
pub const MULTISAMPLED_DEF: &str = "MULTISAMPLED";

/// Wraps `naga_oil::compose::Composer` to provide shader composition with
/// `#import` support.
///
/// Pre-loads all shared WGSL modules at construction time. Consuming shaders
/// use `#import lightcull::module::{items}` to pull in shared code. The
/// composer produces `naga::Module` IR directly, skipping WGSL re-parse at
/// runtime.
pub struct ShaderComposer {
    composer: Composer,
}

/// Shared module definition.
struct ModuleDef {
    source: &'static str,
    file_path: &'static str,
}

/// Shared modules in dependency order.
const MODULES: &[ModuleDef] = &[
    ModuleDef {
        source: include_str!("../../assets/shaders/modules/frame.wgsl"),
        file_path: "modules/frame.wgsl",
    },
    ModuleDef {
        source: include_str!("../../assets/shaders/modules/fullscreen.wgsl"),
        file_path: "modules/fullscreen.wgsl",
    },
    ModuleDef {
        source: include_str!("../../assets/shaders/modules/lighting.wgsl"),
        file_path: "modules/lighting.wgsl",
    },
    ModuleDef {
        source: include_str!("../../assets/shaders/modules/gbuffer.wgsl"),
        file_path: "modules/gbuffer.wgsl",
    },
    ModuleDef {
        source: include_str!("../../assets/shaders/modules/depth.wgsl"),
        file_path: "modules/depth.wgsl",
    },
    ModuleDef {
        source: include_str!("../../assets/shaders/modules/mesh.wgsl"),
        file_path: "modules/mesh.wgsl",
    },
    ModuleDef {
        source: include_str!("../../assets/shaders/modules/streaming.wgsl"),
        file_path: "modules/streaming.wgsl",
    },
];

impl ShaderComposer {
    /// Register every shared module.
    ///
    /// # Errors
    ///
    /// Returns [`LightcullError::ShaderCompose`] if a module fails to parse.
    pub fn new() -> Result<Self, LightcullError> {
        let mut composer = Composer::default();
        for m in MODULES {
            let _ = composer
                .add_composable_module(ComposableModuleDescriptor {
                    source: m.source,
                    file_path: m.file_path,
                    language: ShaderLanguage::Wgsl,
                    ..Default::default()
                })
                .map_err(|e| LightcullError::ShaderCompose {
                    file_path: m.file_path.to_owned(),
                    message: e.to_string(),
                })?;
        }
        Ok(Self { composer })
    }

    /// Compose a shader source string into a `wgpu::ShaderModule` ready for
    /// pipeline creation.
    ///
    /// # Errors
    ///
    /// Returns [`LightcullError::ShaderCompose`] if composition fails.
    pub fn compose(
        &mut self,
        device: &wgpu::Device,
        label: &str,
        source: &str,
        file_path: &str,
        multisampled: bool,
    ) -> Result<wgpu::ShaderModule, LightcullError> {
        let naga_module = self
            .compose_naga(source, file_path, multisampled)
            .map_err(|e| LightcullError::ShaderCompose {
                file_path: file_path.to_owned(),
                message: e.to_string(),
            })?;
        Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Naga(Cow::Owned(naga_module)),
        }))
    }

    /// Compose a shader source into a `naga::Module` without creating a wgpu
    /// shader module. Useful for testing shader composition without a GPU
    /// device.
    ///
    /// # Errors
    ///
    /// Returns the composer error when imports, defs, or WGSL are invalid.
    pub fn compose_naga(
        &mut self,
        source: &str,
        file_path: &str,
        multisampled: bool,
    ) -> Result<naga::Module, Box<naga_oil::compose::ComposerError>> {
        self.composer
            .make_naga_module(NagaModuleDescriptor {
                source,
                file_path,
                shader_type: ShaderType::Wgsl,
                shader_defs: multisample_defs(multisampled),
                ..Default::default()
            })
            .map_err(Box::new)
    }
}

fn multisample_defs(multisampled: bool) -> HashMap<String, ShaderDefValue> {
    let mut defs = HashMap::new();
    if multisampled {
        let _ = defs.insert(MULTISAMPLED_DEF.to_owned(), ShaderDefValue::Bool(true));
    }
    defs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::programs::ProgramId;

    #[test]
    fn all_programs_compose_in_both_sample_modes() {
        let mut composer = ShaderComposer::new().unwrap();
        for program in ProgramId::all() {
            let (source, file_path) = program.shader_source();
            for multisampled in [false, true] {
                if let Err(e) = composer.compose_naga(source, file_path, multisampled) {
                    panic!(
                        "'{file_path}' (multisampled: {multisampled}) failed: {}",
                        e.emit_to_string(&composer.composer)
                    );
                }
            }
        }
    }
}
