//! Offscreen scene targets, sized by the quality level's resolution scale.

pub const COLOR_FMT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const DEPTH_FMT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Scene size for a window size and resolution scale; never zero.
pub fn scaled_extent(size: winit::dpi::PhysicalSize<u32>, scale: f32) -> (u32, u32) {
    let scale = if scale.is_finite() { scale.clamp(0.25, 1.0) } else { 1.0 };
    let w = ((size.width as f32 * scale).round() as u32).max(1);
    let h = ((size.height as f32 * scale).round() as u32).max(1);
    (w, h)
}

pub struct Targets {
    _color_tex: wgpu::Texture,
    _depth_tex: wgpu::Texture,

    pub color: wgpu::TextureView,
    pub depth: wgpu::TextureView,

    pub width: u32,
    pub height: u32,
    pub scale: f32,
}

impl Targets {
    pub fn new(device: &wgpu::Device, size: winit::dpi::PhysicalSize<u32>, scale: f32) -> Self {
        let (width, height) = scaled_extent(size, scale);
        let tex_size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let create_tex = |label: &str, format, usage| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: tex_size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage,
                view_formats: &[],
            })
        };

        let color_tex = create_tex(
            "Scene Color Target",
            COLOR_FMT,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        );
        let depth_tex = create_tex("Scene Depth Target", DEPTH_FMT, wgpu::TextureUsages::RENDER_ATTACHMENT);

        log::debug!("Scene targets {}x{} (scale {:.2})", width, height, scale);

        Self {
            color: color_tex.create_view(&wgpu::TextureViewDescriptor::default()),
            depth: depth_tex.create_view(&wgpu::TextureViewDescriptor::default()),
            _color_tex: color_tex,
            _depth_tex: depth_tex,
            width,
            height,
            scale,
        }
    }

    /// Recreates the targets only when the effective size changes.
    pub fn resize(&mut self, device: &wgpu::Device, size: winit::dpi::PhysicalSize<u32>, scale: f32) {
        if scaled_extent(size, scale) == (self.width, self.height) {
            self.scale = scale;
            return;
        }
        *self = Self::new(device, size, scale);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::PhysicalSize;

    #[test]
    fn scale_shrinks_targets() {
        assert_eq!(scaled_extent(PhysicalSize::new(1920, 1080), 1.0), (1920, 1080));
        assert_eq!(scaled_extent(PhysicalSize::new(1920, 1080), 0.75), (1440, 810));
        assert_eq!(scaled_extent(PhysicalSize::new(1920, 1080), 0.5), (960, 540));
    }

    #[test]
    fn degenerate_inputs_stay_positive() {
        assert_eq!(scaled_extent(PhysicalSize::new(0, 0), 0.5), (1, 1));
        assert_eq!(scaled_extent(PhysicalSize::new(800, 600), f32::NAN), (800, 600));
        assert_eq!(scaled_extent(PhysicalSize::new(800, 600), 0.0), (200, 150));
    }
}
