//! SPIR-V shader loading

use std::fs::File;
use std::io::Cursor;
use std::path::Path;

use crate::render::api::{ShaderModuleHandle, SharedDevice};
use crate::render::error::{RenderError, RenderResult};

/// SPIR-V magic number, first word of every module
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: SharedDevice,
    module: ShaderModuleHandle,
}

impl ShaderModule {
    /// Create shader module from SPIR-V bytecode
    ///
    /// Byte order is normalized from the magic number; bytecode whose length
    /// is not a multiple of four is rejected.
    pub fn from_bytes(device: SharedDevice, bytes: &[u8]) -> RenderResult<Self> {
        let words = ash::util::read_spv(&mut Cursor::new(bytes))
            .map_err(|e| RenderError::creation_failed("shader module", format!("invalid SPIR-V: {e}")))?;

        Self::from_words(device, &words)
    }

    /// Create shader module from SPIR-V words
    pub fn from_words(device: SharedDevice, words: &[u32]) -> RenderResult<Self> {
        if words.first() != Some(&SPIRV_MAGIC) {
            return Err(RenderError::creation_failed(
                "shader module",
                "missing SPIR-V magic number",
            ));
        }

        let module = device.create_shader_module(words)?;
        log::debug!("Created shader module {module:?} ({} words)", words.len());
        Ok(Self { device, module })
    }

    /// Load shader from SPIR-V file
    pub fn from_file<P: AsRef<Path>>(device: SharedDevice, path: P) -> RenderResult<Self> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| {
            RenderError::creation_failed(
                "shader module",
                format!("failed to open {}: {e}", path.display()),
            )
        })?;

        let words = ash::util::read_spv(&mut file).map_err(|e| {
            RenderError::creation_failed(
                "shader module",
                format!("failed to read {}: {e}", path.display()),
            )
        })?;

        Self::from_words(device, &words)
    }

    /// Get shader module handle
    pub const fn handle(&self) -> ShaderModuleHandle {
        self.module
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        self.device.destroy_shader_module(self.module);
    }
}

/// Load a SPIR-V file into a shader module
pub fn load_shader(device: &SharedDevice, path: impl AsRef<Path>) -> RenderResult<ShaderModule> {
    ShaderModule::from_file(device.clone(), path)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use super::*;
    use crate::render::backends::headless::HeadlessDevice;

    fn module_bytes() -> Vec<u8> {
        [SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]
            .iter()
            .flat_map(|word| word.to_le_bytes())
            .collect()
    }

    #[test]
    fn test_missing_magic_rejected() {
        let device: SharedDevice = Arc::new(HeadlessDevice::new());
        let err = ShaderModule::from_words(device, &[0xdead_beef, 0]).err();
        assert!(matches!(err, Some(RenderError::ResourceCreationFailed { .. })));
    }

    #[test]
    fn test_truncated_bytecode_rejected() {
        let device: SharedDevice = Arc::new(HeadlessDevice::new());
        let mut bytes = module_bytes();
        bytes.pop();
        assert!(ShaderModule::from_bytes(device, &bytes).is_err());
    }

    #[test]
    fn test_load_from_file_and_release() {
        let device = HeadlessDevice::new();
        let gpu = device.gpu();
        let device: SharedDevice = Arc::new(device);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&module_bytes()).unwrap();

        let module = load_shader(&device, file.path()).unwrap();
        assert!(!module.handle().is_null());
        assert_eq!(gpu.stats().live_objects, 1);

        drop(module);
        assert_eq!(gpu.stats().live_objects, 0);
    }

    #[test]
    fn test_missing_file_reported() {
        let device: SharedDevice = Arc::new(HeadlessDevice::new());
        let dir = tempfile::tempdir().unwrap();
        assert!(load_shader(&device, dir.path().join("absent.spv")).is_err());
    }
}
