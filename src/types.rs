//! Common types shared across the frame graph.

use bitflags::bitflags;

/// Logical usage state of a GPU resource.
///
/// Each state corresponds to an image layout / resource state on the
/// backend API (Vulkan image layouts, D3D12 resource states). The barrier
/// planner tracks one current state per resource and emits a transition
/// whenever a pass requests a different one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceState {
    /// Contents undefined; any transition out of this state is free to
    /// discard previous contents.
    #[default]
    Undefined,
    /// General-purpose state.
    Common,
    /// Color attachment write.
    RenderTarget,
    /// Depth attachment write.
    DepthWrite,
    /// Depth attachment read (shadow sampling with depth compare).
    DepthRead,
    /// Sampled in a shader.
    ShaderResource,
    /// Storage image read/write from compute.
    UnorderedAccess,
    /// Copy source.
    TransferSrc,
    /// Copy destination.
    TransferDst,
    /// Swapchain present.
    Present,
}

impl ResourceState {
    /// States where the GPU may be writing through the output merger or
    /// storage path. Back-to-back accesses in one of these states still
    /// need a barrier to order the writes.
    pub fn is_write_target(self) -> bool {
        matches!(
            self,
            Self::RenderTarget | Self::DepthWrite | Self::UnorderedAccess
        )
    }
}

/// Texture format enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    Rgba32Float,
    R32Float,
    Depth32Float,
    Depth24PlusStencil8,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            TextureFormat::Depth32Float | TextureFormat::Depth24PlusStencil8
        )
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Bgra8Unorm
            | TextureFormat::Bgra8UnormSrgb
            | TextureFormat::R32Float
            | TextureFormat::Depth32Float
            | TextureFormat::Depth24PlusStencil8 => 4,
            TextureFormat::Rgba16Float => 8,
            TextureFormat::Rgba32Float => 16,
        }
    }
}

/// Texture dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureType {
    #[default]
    D2,
    D2Array,
    D3,
    Cube,
}

bitflags! {
    /// Texture usage flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const COPY_SRC = 1 << 0;
        const COPY_DST = 1 << 1;
        const SAMPLED = 1 << 2;
        const STORAGE = 1 << 3;
        const RENDER_ATTACHMENT = 1 << 4;
    }
}

impl Default for TextureUsage {
    fn default() -> Self {
        TextureUsage::SAMPLED | TextureUsage::RENDER_ATTACHMENT
    }
}

/// Description of a texture resource.
///
/// The resource pool hashes the structural fields (size, format, mips,
/// layers, type) to find recyclable textures, so two descriptors that
/// differ only in `label` share a pool bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub array_layers: u32,
    pub mip_levels: u32,
    pub format: TextureFormat,
    pub texture_type: TextureType,
    pub usage: TextureUsage,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            depth: 1,
            array_layers: 1,
            mip_levels: 1,
            format: TextureFormat::Rgba8Unorm,
            texture_type: TextureType::D2,
            usage: TextureUsage::default(),
        }
    }
}

impl TextureDescriptor {
    /// Create a 2D texture descriptor.
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            width,
            height,
            format,
            usage,
            ..Default::default()
        }
    }

    /// Create a 2D array texture descriptor (e.g. cascaded shadow maps).
    pub fn new_2d_array(
        width: u32,
        height: u32,
        array_layers: u32,
        format: TextureFormat,
        usage: TextureUsage,
    ) -> Self {
        Self {
            width,
            height,
            array_layers,
            format,
            usage,
            texture_type: TextureType::D2Array,
            ..Default::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// A descriptor with zero extent cannot back a physical texture.
    pub fn is_zero_sized(&self) -> bool {
        self.width == 0 || self.height == 0 || self.depth == 0 || self.array_layers == 0
    }
}

/// Where an allocation lives and how the CPU may access it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryUsage {
    /// Device-local, no CPU access.
    GpuOnly,
    /// Host-visible upload memory.
    CpuToGpu,
    /// Host-visible readback memory.
    GpuToCpu,
}
