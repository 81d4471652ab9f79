use crate::media::Frame;

/// The reusable media texture with its full mip chain.
///
/// The texture is allocated once per media size; later frames are written
/// into it in place. Uploads are skipped when the frame generation has not
/// moved since the last one.
pub(crate) struct FrameTexture {
    texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    size: (u32, u32),
    mip_levels: u32,
    uploaded_generation: Option<u64>,
}

impl FrameTexture {
    pub fn new(device: &wgpu::Device, size: (u32, u32), mip_levels: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("media frame"),
            size: extent(size),
            mip_level_count: mip_levels.max(1),
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("media frame sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        tracing::debug!(
            width = size.0,
            height = size.1,
            mip_levels,
            "allocated frame texture"
        );
        Self {
            texture,
            view,
            sampler,
            size,
            mip_levels: mip_levels.max(1),
            uploaded_generation: None,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Whether `frame` can be written into this texture without reallocating.
    pub fn fits(&self, frame: &Frame) -> bool {
        frame.size() == self.size && frame.levels.len() as u32 == self.mip_levels
    }

    /// Copies every mip level of `frame`. Returns `false` when the frame was
    /// already resident.
    pub fn upload(&mut self, queue: &wgpu::Queue, frame: &Frame) -> bool {
        if self.uploaded_generation == Some(frame.generation) {
            return false;
        }
        for (level, image) in frame.levels.iter().enumerate() {
            let size = image.dimensions();
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &self.texture,
                    mip_level: level as u32,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                image.as_raw(),
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * size.0),
                    rows_per_image: Some(size.1),
                },
                extent(size),
            );
        }
        self.uploaded_generation = Some(frame.generation);
        true
    }

    pub fn destroy(self) {
        self.texture.destroy();
    }
}

fn extent((width, height): (u32, u32)) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: width.max(1),
        height: height.max(1),
        depth_or_array_layers: 1,
    }
}
