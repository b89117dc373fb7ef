//! VirGL protocol definitions
//!
//! This module defines the VirGL command stream vocabulary: opcodes, object
//! types, Gallium pipe enums, bind flags and the identifier newtypes that the
//! rest of the crate keys on.
//!
//! Every command in the stream is framed by a single header word:
//!
//! ```text
//! 31              16 15       8 7        0
//! ┌─────────────────┬──────────┬──────────┐
//! │ payload length  │   mid    │  opcode  │
//! └─────────────────┴──────────┴──────────┘
//! ```

use bitflags::bitflags;

/// Shift of the payload length field in a command header
pub const HEADER_LENGTH_SHIFT: u32 = 16;

/// Shift of the object-type (`mid`) field in a command header
pub const HEADER_MID_SHIFT: u32 = 8;

/// Mask applied to the `mid` and opcode fields
pub const HEADER_FIELD_MASK: u32 = 0xFF;

/// Largest payload a single command can carry, in words
pub const MAX_PAYLOAD_WORDS: usize = 0xFFFF;

/// Pack a command header word.
pub const fn encode_header(length: u32, mid: u32, opcode: u32) -> u32 {
    (length << HEADER_LENGTH_SHIFT)
        | ((mid & HEADER_FIELD_MASK) << HEADER_MID_SHIFT)
        | (opcode & HEADER_FIELD_MASK)
}

/// VirGL command opcodes
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum VirGLCommand {
    Nop = 0,
    CreateObject = 1,
    BindObject,
    DestroyObject,
    SetViewportState,
    SetFramebufferState,
    SetVertexBuffers,
    Clear,
    DrawVbo,
    ResourceInlineWrite,
    SetSamplerViews,
    SetIndexBuffer,
    SetConstantBuffer,
    SetStencilRef,
    SetBlendColor,
    SetScissorState,
    Blit,
    ResourceCopyRegion,
    BindSamplerStates,
    BeginQuery,
    EndQuery,
    GetQueryResult,
    SetPolygonStipple,
    SetClipState,
    SetSampleMask,
    SetStreamoutTargets,
    SetRenderCondition,
    SetUniformBuffer,

    SetSubCtx,
    CreateSubCtx,
    DestroySubCtx,
    BindShader,
    SetTessState,
    SetMinSamples,
    SetShaderBuffers,
    SetShaderImages,
    MemoryBarrier,
    LaunchGrid,
    SetFramebufferStateNoAttach,
    TextureBarrier,
    SetAtomicBuffers,
    SetDebugFlags,
    GetQueryResultQbo,
    Transfer3d,
    EndTransfers,
    CopyTransfer3d,
    SetTweaks,
    ClearTexture,
    PipeResourceCreate,
    PipeResourceSetType,
    GetMemoryInfo,
    SendStringMarker,
}

impl VirGLCommand {
    const ALL: [VirGLCommand; 52] = [
        VirGLCommand::Nop,
        VirGLCommand::CreateObject,
        VirGLCommand::BindObject,
        VirGLCommand::DestroyObject,
        VirGLCommand::SetViewportState,
        VirGLCommand::SetFramebufferState,
        VirGLCommand::SetVertexBuffers,
        VirGLCommand::Clear,
        VirGLCommand::DrawVbo,
        VirGLCommand::ResourceInlineWrite,
        VirGLCommand::SetSamplerViews,
        VirGLCommand::SetIndexBuffer,
        VirGLCommand::SetConstantBuffer,
        VirGLCommand::SetStencilRef,
        VirGLCommand::SetBlendColor,
        VirGLCommand::SetScissorState,
        VirGLCommand::Blit,
        VirGLCommand::ResourceCopyRegion,
        VirGLCommand::BindSamplerStates,
        VirGLCommand::BeginQuery,
        VirGLCommand::EndQuery,
        VirGLCommand::GetQueryResult,
        VirGLCommand::SetPolygonStipple,
        VirGLCommand::SetClipState,
        VirGLCommand::SetSampleMask,
        VirGLCommand::SetStreamoutTargets,
        VirGLCommand::SetRenderCondition,
        VirGLCommand::SetUniformBuffer,
        VirGLCommand::SetSubCtx,
        VirGLCommand::CreateSubCtx,
        VirGLCommand::DestroySubCtx,
        VirGLCommand::BindShader,
        VirGLCommand::SetTessState,
        VirGLCommand::SetMinSamples,
        VirGLCommand::SetShaderBuffers,
        VirGLCommand::SetShaderImages,
        VirGLCommand::MemoryBarrier,
        VirGLCommand::LaunchGrid,
        VirGLCommand::SetFramebufferStateNoAttach,
        VirGLCommand::TextureBarrier,
        VirGLCommand::SetAtomicBuffers,
        VirGLCommand::SetDebugFlags,
        VirGLCommand::GetQueryResultQbo,
        VirGLCommand::Transfer3d,
        VirGLCommand::EndTransfers,
        VirGLCommand::CopyTransfer3d,
        VirGLCommand::SetTweaks,
        VirGLCommand::ClearTexture,
        VirGLCommand::PipeResourceCreate,
        VirGLCommand::PipeResourceSetType,
        VirGLCommand::GetMemoryInfo,
        VirGLCommand::SendStringMarker,
    ];

    /// Look up an opcode from its wire value
    pub fn from_raw(value: u32) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    /// Wire value of this opcode
    pub const fn raw(self) -> u32 {
        self as u32
    }
}

/// Pipe-state object types, carried in the `mid` field of object commands
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum ObjectType {
    None = 0,
    Blend,
    Rasterizer,
    Dsa,
    Shader,
    VertexElements,
    SamplerView,
    SamplerState,
    Surface,
    Query,
    StreamoutTarget,
    MsaaSurface,
}

/// Gallium texture targets
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum PipeTextureTarget {
    Buffer = 0,
    Texture1d,
    Texture2d,
    Texture3d,
    TextureCube,
    TextureRect,
    Texture1dArray,
    Texture2dArray,
    TextureCubeArray,
}

/// Gallium primitive topologies
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum PipePrimitive {
    Points = 0,
    Lines,
    LineLoop,
    LineStrip,
    Triangles,
    TriangleStrip,
    TriangleFan,
    Quads,
    QuadStrip,
    Polygon,
    LinesAdjacency,
    LineStripAdjacency,
    TrianglesAdjacency,
    TriangleStripAdjacency,
    Patches,
}

/// Gallium shader stages
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum ShaderType {
    Vertex = 0,
    Fragment,
    Geometry,
    TessCtrl,
    TessEval,
    Compute,
}

/// Texture formats usable for surfaces and scanout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TextureFormat {
    B8G8R8A8Unorm = 1,
    B8G8R8X8Unorm = 2,
    A8R8G8B8Unorm = 3,
    X8R8G8B8Unorm = 4,
    R8G8B8A8Unorm = 67,
    X8B8G8R8Unorm = 68,
    A8B8G8R8Unorm = 121,
    R8G8B8X8Unorm = 134,
}

impl TextureFormat {
    /// Bytes per pixel
    pub fn bytes_per_pixel(&self) -> u32 {
        4
    }
}

/// Raw Gallium formats for vertex elements and buffers
pub mod pipe_format {
    pub const R32G32_FLOAT: u32 = 29;
    pub const R32G32B32_FLOAT: u32 = 30;
    pub const R32G32B32A32_FLOAT: u32 = 31;
    /// Format used for plain byte buffers
    pub const BUFFER: u32 = 45;
}

bitflags! {
    /// Resource bind flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BindFlags: u32 {
        const DEPTH_STENCIL = 1 << 0;
        const RENDER_TARGET = 1 << 1;
        const SAMPLER_VIEW = 1 << 3;
        const VERTEX_BUFFER = 1 << 4;
        const INDEX_BUFFER = 1 << 5;
        const CONSTANT_BUFFER = 1 << 6;
        const DISPLAY_TARGET = 1 << 7;
        const COMMAND_ARGS = 1 << 8;
        const STREAM_OUTPUT = 1 << 11;
        const SHADER_BUFFER = 1 << 14;
        const QUERY_BUFFER = 1 << 15;
        const CURSOR = 1 << 16;
        const CUSTOM = 1 << 17;
        const SCANOUT = 1 << 18;
    }
}

bitflags! {
    /// Buffers affected by a CLEAR command
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearBuffers: u32 {
        const DEPTH = 1 << 0;
        const STENCIL = 1 << 1;
        const COLOR0 = 1 << 2;
        const COLOR1 = 1 << 3;
        const COLOR2 = 1 << 4;
        const COLOR3 = 1 << 5;
        const COLOR4 = 1 << 6;
        const COLOR5 = 1 << 7;
        const COLOR6 = 1 << 8;
        const COLOR7 = 1 << 9;
    }
}

/// Locally allocated identifier of a pipe-state object. Zero is never issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectHandle(u32);

impl ObjectHandle {
    /// The reserved non-value
    pub const NULL: ObjectHandle = ObjectHandle(0);

    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u32 {
        self.0
    }

    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }
}

/// Identifier of a GPU-visible resource, assigned by the adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(u32);

impl ResourceId {
    /// Used on the wire to mean "no resource"
    pub const NONE: ResourceId = ResourceId(0);

    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u32 {
        self.0
    }
}

/// Identifier of a GPU rendering context
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextId(u32);

impl ContextId {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u32 {
        self.0
    }
}

/// Rectangle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the rectangle covers no pixels
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// 3D box
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Box3d {
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl Box3d {
    /// A one-dimensional span of `length` bytes starting at zero
    pub const fn flat(length: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            z: 0,
            width: length,
            height: 1,
            depth: 1,
        }
    }

    /// A single-slice box covering `rect`
    pub const fn from_rect(rect: Rect) -> Self {
        Self {
            x: rect.x,
            y: rect.y,
            z: 0,
            width: rect.width,
            height: rect.height,
            depth: 1,
        }
    }
}

/// Direction of a transfer between guest memory and a host resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TransferDirection {
    /// Guest memory to host resource
    ToHost = 1,
    /// Host resource to guest memory
    FromHost = 2,
}

impl TransferDirection {
    pub fn from_raw(value: u32) -> Option<Self> {
        match value {
            1 => Some(TransferDirection::ToHost),
            2 => Some(TransferDirection::FromHost),
            _ => None,
        }
    }
}

/// Parameters for creating a 3D resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resource3DSpecification {
    pub target: PipeTextureTarget,
    pub format: u32,
    pub bind: BindFlags,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub array_size: u32,
    pub last_level: u32,
    pub nr_samples: u32,
    pub flags: u32,
}

impl Resource3DSpecification {
    /// A linear buffer of `size` bytes
    pub fn buffer(size: u32, bind: BindFlags) -> Self {
        Self {
            target: PipeTextureTarget::Buffer,
            format: pipe_format::BUFFER,
            bind,
            width: size,
            height: 1,
            depth: 1,
            array_size: 1,
            last_level: 0,
            nr_samples: 0,
            flags: 0,
        }
    }

    /// A single-level 2D texture
    pub fn texture_2d(width: u32, height: u32, format: TextureFormat, bind: BindFlags) -> Self {
        Self {
            target: PipeTextureTarget::Texture2d,
            format: format as u32,
            bind,
            width,
            height,
            depth: 1,
            array_size: 1,
            last_level: 0,
            nr_samples: 0,
            flags: 0,
        }
    }

    /// Check the dimensions are consistent with the target
    pub fn is_valid(&self) -> bool {
        if self.width == 0 || self.height == 0 || self.depth == 0 || self.array_size == 0 {
            return false;
        }
        match self.target {
            PipeTextureTarget::Buffer | PipeTextureTarget::Texture1d => {
                self.height == 1 && self.depth == 1
            }
            PipeTextureTarget::Texture3d => true,
            _ => self.depth == 1,
        }
    }

    /// Full-extent rectangle of the first mip level
    pub fn rect(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }
}
