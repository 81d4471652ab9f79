use crate::atlas::{build_atlas_image, AtlasError, GlyphRasterizer};
use crate::charsets::Charset;

/// GPU copy of a glyph strip for one (charset, cell size) pair.
pub(crate) struct GlyphAtlas {
    texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    pub charset: Charset,
    pub cell_size: u32,
    pub glyph_count: usize,
}

impl GlyphAtlas {
    pub fn build<R>(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        charset: Charset,
        cell_size: u32,
        max_texture_dimension: u32,
        rasterizer: &mut R,
    ) -> Result<Self, AtlasError>
    where
        R: GlyphRasterizer + ?Sized,
    {
        let glyphs = charset.glyphs();
        let width = cell_size.saturating_mul(glyphs.len() as u32);
        if width > max_texture_dimension || cell_size > max_texture_dimension {
            return Err(AtlasError::TooWide {
                width,
                limit: max_texture_dimension,
            });
        }
        let image = build_atlas_image(&glyphs, cell_size, rasterizer)?;

        let size = wgpu::Extent3d {
            width: image.width(),
            height: image.height(),
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("glyph atlas"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * size.width),
                rows_per_image: Some(size.height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("glyph atlas sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        tracing::debug!(
            charset = charset.id(),
            glyphs = glyphs.len(),
            cell_size,
            "built glyph atlas"
        );

        Ok(Self {
            texture,
            view,
            sampler,
            charset,
            cell_size,
            glyph_count: glyphs.len(),
        })
    }

    pub fn matches(&self, charset: Charset, cell_size: u32) -> bool {
        self.charset == charset && self.cell_size == cell_size
    }

    /// Releases the GPU memory now instead of when the last handle drops.
    pub fn destroy(self) {
        self.texture.destroy();
    }
}
