//! Headless GPU context creation and device capability probing.

use fieldshade_core::capability::DeviceProfile;
use fieldshade_core::lookup;
use fieldshade_core::shader::Dialect;

/// Error in acquiring a GPU context.
#[derive(thiserror::Error, Debug)]
pub enum ContextError {
    /// No compatible graphics adapter was found.
    #[error("no compatible graphics adapter found")]
    NoAdapter,
    /// The adapter refused to hand out a device.
    #[error("failed to acquire a device")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),
}

/// A headless wgpu device and queue.
///
/// No window or surface is involved;
/// presenting rendered images is a collaborator concern.
#[derive(Debug)]
pub struct GpuContext {
    /// The wgpu device.
    pub device: wgpu::Device,
    /// The queue uploads go through.
    pub queue: wgpu::Queue,
    /// The adapter the device was created from,
    /// kept for capability probing.
    pub adapter: wgpu::Adapter,
}

impl GpuContext {
    /// Acquire a device on the default adapter.
    pub async fn new() -> Result<Self, ContextError> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .ok_or(ContextError::NoAdapter)?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    label: None,
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await?;

        log::debug!("acquired device on {}", adapter.get_info().name);

        Ok(Self {
            device,
            queue,
            adapter,
        })
    }

    /// Acquire a device, blocking the calling thread.
    pub fn new_blocking() -> Result<Self, ContextError> {
        futures::executor::block_on(Self::new())
    }

    /// What this device can run, for capability composition.
    pub fn device_profile(&self) -> DeviceProfile {
        profile_from_limits(&self.adapter.limits())
    }
}

/// Derive a device profile from adapter limits.
///
/// Everything the WGSL backend emits fits the WebGPU baseline,
/// so only the volume-texture size is actually in question.
pub fn profile_from_limits(limits: &wgpu::Limits) -> DeviceProfile {
    DeviceProfile {
        dialect: Dialect::Wgsl,
        supports_3d_textures: limits.max_texture_dimension_3d as usize >= lookup::RESOLUTION_3D,
        supports_dependent_lookup: true,
        supports_per_pixel_lighting: true,
        supports_depth_peeling: true,
    }
}

//
// tests
//

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_support_the_full_profile() {
        let profile = profile_from_limits(&wgpu::Limits::default());
        assert_eq!(profile.dialect, Dialect::Wgsl);
        assert!(profile.supports_3d_textures);

        let profile = profile_from_limits(&wgpu::Limits::downlevel_webgl2_defaults());
        assert!(profile.supports_3d_textures);
    }

    #[test]
    fn tiny_volume_limits_disable_3d_textures() {
        let limits = wgpu::Limits {
            max_texture_dimension_3d: 16,
            ..wgpu::Limits::default()
        };
        assert!(!profile_from_limits(&limits).supports_3d_textures);
    }
}
