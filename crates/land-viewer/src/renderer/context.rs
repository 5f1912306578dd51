use anyhow::{anyhow, Result};
use marker_core::GpuDescriptor;
use std::sync::Arc;
use winit::window::Window;

/// Holds all GPU resources needed for rendering.
pub struct GfxContext {
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub size: winit::dpi::PhysicalSize<u32>,
    pub adapter_info: wgpu::AdapterInfo,
}

impl GfxContext {
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());

        // The surface must outlive the window; `Arc` guarantees this.
        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow!("Failed to find a suitable GPU adapter."))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Adapter: {} ({:?}, {:?}, driver '{}')",
            adapter_info.name,
            adapter_info.backend,
            adapter_info.device_type,
            adapter_info.driver
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await?;

        let caps = surface.get_capabilities(&adapter);
        let surface_format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| anyhow!("Surface reports no supported formats."))?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            size,
            adapter_info,
        })
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.size = new_size;
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    pub fn gpu_descriptor(&self) -> GpuDescriptor {
        gpu_descriptor(&self.adapter_info)
    }
}

fn vendor_name(id: u32) -> Option<&'static str> {
    match id {
        0x10de => Some("NVIDIA"),
        0x1002 | 0x1022 => Some("AMD"),
        0x8086 => Some("Intel"),
        0x106b => Some("Apple"),
        0x13b5 => Some("ARM"),
        0x5143 => Some("Qualcomm"),
        0x1010 => Some("Imagination"),
        0x10005 => Some("Mesa"),
        _ => None,
    }
}

/// Renderer/vendor strings for tier classification.
pub fn gpu_descriptor(info: &wgpu::AdapterInfo) -> GpuDescriptor {
    let vendor = match (vendor_name(info.vendor), info.driver.trim()) {
        (Some(v), "") => v.to_string(),
        (Some(v), driver) => format!("{v} ({driver})"),
        (None, "") => String::new(),
        (None, driver) => driver.to_string(),
    };
    GpuDescriptor::new(info.name.trim(), vendor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use marker_core::{classify, GpuTier};

    fn info(name: &str, vendor: u32, driver: &str) -> wgpu::AdapterInfo {
        wgpu::AdapterInfo {
            name: name.to_string(),
            vendor,
            device: 0,
            device_type: wgpu::DeviceType::DiscreteGpu,
            driver: driver.to_string(),
            driver_info: String::new(),
            backend: wgpu::Backend::Vulkan,
        }
    }

    #[test]
    fn adapter_info_maps_to_descriptor() {
        let d = gpu_descriptor(&info("NVIDIA GeForce RTX 3070", 0x10de, "NVIDIA"));
        assert_eq!(d.renderer, "NVIDIA GeForce RTX 3070");
        assert_eq!(d.vendor, "NVIDIA (NVIDIA)");
        assert_eq!(classify(Some(&d)).tier, GpuTier::HighEnd);
    }

    #[test]
    fn software_adapter_is_integrated() {
        let d = gpu_descriptor(&info("llvmpipe (LLVM 17.0.6, 256 bits)", 0x10005, ""));
        assert_eq!(d.vendor, "Mesa");
        assert_eq!(classify(Some(&d)).tier, GpuTier::Integrated);
    }

    #[test]
    fn blank_adapter_name_falls_back_to_unknown() {
        let d = gpu_descriptor(&info("", 0xdead, ""));
        let c = classify(Some(&d));
        assert_eq!(c.renderer, "Unknown");
        assert_eq!(c.vendor, "Unknown");
    }
}
