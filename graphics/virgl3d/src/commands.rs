//! Fixed-shape VirGL commands
//!
//! Each helper emits one complete record. The field order inside every
//! payload is the positional layout virglrenderer decodes, so it must not be
//! rearranged.

use crate::encoder::{Encoder, WordSink};
use crate::protocol::{
    Box3d, ClearBuffers, ObjectHandle, ObjectType, PipePrimitive, ResourceId, ShaderType,
    TextureFormat, TransferDirection, VirGLCommand,
};
use crate::{Error, Result};

/// Transfer usage flags used for uploads from the transfer region
pub const TRANSFER_USAGE_UPLOAD: u32 = 242;

/// Transfer usage flags used for readback into the transfer region
pub const TRANSFER_USAGE_READBACK: u32 = 1;

/// Color mask enabling all four channels of a render target
pub const COLORMASK_RGBA: u32 = 0x7800_0000;

/// GLES tweak: apply dest swizzle when BGRA surfaces are emulated by RGBA
pub const TWEAK_GLES_EMULATE_BGRA: u32 = 1;

/// GLES tweak: value returned when emulating GL_SAMPLES_PASSED
pub const TWEAK_GLES_SAMPLES_PASSED: u32 = 2;

/// Largest width, height, layer or sample count a framebuffer can carry
pub const MAX_FRAMEBUFFER_EXTENT: u32 = 0xFFFF;

/// Blend state object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendState {
    /// S0: independent blend, logicop enable, dither, alpha-to-coverage bits
    pub flags: u32,
    /// S1: logicop function
    pub logicop_func: u32,
    /// S2: per render target blend word
    pub render_targets: [u32; 8],
}

impl BlendState {
    pub const FLAG_DITHER: u32 = 1 << 2;

    /// Dithering on, blending off, all channels written on render target 0
    pub fn opaque() -> Self {
        let mut render_targets = [0; 8];
        render_targets[0] = COLORMASK_RGBA;
        Self {
            flags: Self::FLAG_DITHER,
            logicop_func: 0,
            render_targets,
        }
    }
}

/// One vertex attribute fetched from a vertex buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexElement {
    pub src_offset: u32,
    pub instance_divisor: u32,
    pub vertex_buffer_index: u32,
    pub src_format: u32,
}

/// Viewport transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportState {
    pub scale: [f32; 3],
    pub translate: [f32; 3],
}

impl ViewportState {
    /// Map normalised device coordinates onto a `width` x `height` target,
    /// with y pointing down
    pub fn for_extent(width: u32, height: u32) -> Self {
        let half_w = width as f32 / 2.0;
        let half_h = height as f32 / 2.0;
        Self {
            scale: [half_w, -half_h, 0.5],
            translate: [half_w, half_h, 0.5],
        }
    }
}

/// Vertex buffer binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBufferBinding {
    pub stride: u32,
    pub offset: u32,
    pub resource: ResourceId,
}

/// Draw parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawInfo {
    pub start: u32,
    pub count: u32,
    pub mode: PipePrimitive,
    pub indexed: bool,
    pub instance_count: u32,
    pub index_bias: u32,
    pub start_instance: u32,
    pub primitive_restart: bool,
    pub restart_index: u32,
    pub min_index: u32,
    pub max_index: u32,
    pub count_from_stream_output: u32,
}

impl DrawInfo {
    /// Non-indexed, single-instance triangle list
    pub fn triangles(count: u32) -> Self {
        Self {
            start: 0,
            count,
            mode: PipePrimitive::Triangles,
            indexed: false,
            instance_count: 1,
            index_bias: 0,
            start_instance: 0,
            primitive_restart: false,
            restart_index: 0,
            min_index: 0,
            max_index: 0xFFFF_FFFF,
            count_from_stream_output: 0,
        }
    }
}

/// A 3D box copy between the transfer region and a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer3d {
    pub resource: ResourceId,
    pub level: u32,
    pub usage: u32,
    pub stride: u32,
    pub layer_stride: u32,
    pub region: Box3d,
    pub data_offset: u32,
    pub direction: TransferDirection,
}

impl Transfer3d {
    /// Upload `length` bytes from the start of the transfer region
    pub fn flat_upload(resource: ResourceId, length: u32) -> Self {
        Self {
            resource,
            level: 0,
            usage: TRANSFER_USAGE_UPLOAD,
            stride: 0,
            layer_stride: 0,
            region: Box3d::flat(length),
            data_offset: 0,
            direction: TransferDirection::ToHost,
        }
    }
}

impl<S: WordSink> Encoder<S> {
    /// CREATE_OBJECT(BLEND)
    pub fn create_blend(&mut self, handle: ObjectHandle, state: &BlendState) -> Result<()> {
        let mut record = self.begin_record(VirGLCommand::CreateObject, ObjectType::Blend as u32)?;
        record.append_u32(handle.value())?;
        record.append_u32(state.flags)?;
        record.append_u32(state.logicop_func)?;
        record.append_slice(&state.render_targets)?;
        record.finalize();
        Ok(())
    }

    /// CREATE_OBJECT(VERTEX_ELEMENTS)
    pub fn create_vertex_elements(
        &mut self,
        handle: ObjectHandle,
        elements: &[VertexElement],
    ) -> Result<()> {
        let mut record =
            self.begin_record(VirGLCommand::CreateObject, ObjectType::VertexElements as u32)?;
        record.append_u32(handle.value())?;
        for element in elements {
            record.append_u32(element.src_offset)?;
            record.append_u32(element.instance_divisor)?;
            record.append_u32(element.vertex_buffer_index)?;
            record.append_u32(element.src_format)?;
        }
        record.finalize();
        Ok(())
    }

    /// CREATE_OBJECT(SURFACE) over the first level and layer of `resource`
    pub fn create_surface(
        &mut self,
        handle: ObjectHandle,
        resource: ResourceId,
        format: TextureFormat,
    ) -> Result<()> {
        let mut record = self.begin_record(VirGLCommand::CreateObject, ObjectType::Surface as u32)?;
        record.append_u32(handle.value())?;
        record.append_u32(resource.value())?;
        record.append_u32(format as u32)?;
        record.append_u32(0)?; // level / first element
        record.append_u32(0)?; // layers / last element
        record.finalize();
        Ok(())
    }

    /// CREATE_OBJECT(SHADER) carrying TGSI text inline
    pub fn create_shader(
        &mut self,
        handle: ObjectHandle,
        shader_type: ShaderType,
        source: &str,
    ) -> Result<()> {
        let mut record = self.begin_record(VirGLCommand::CreateObject, ObjectType::Shader as u32)?;
        record.append_u32(handle.value())?;
        record.append_u32(shader_type as u32)?;
        record.append_u32(0)?; // offset
        // Length includes the null terminator
        record.append_u32(source.len() as u32 + 1)?;
        record.append_u32(0)?; // num_tokens
        record.append_padded_string(source.as_bytes())?;
        record.finalize();
        Ok(())
    }

    /// BIND_OBJECT
    pub fn bind_object(&mut self, handle: ObjectHandle, object_type: ObjectType) -> Result<()> {
        let mut record = self.begin_record(VirGLCommand::BindObject, object_type as u32)?;
        record.append_u32(handle.value())?;
        record.finalize();
        Ok(())
    }

    /// DESTROY_OBJECT
    pub fn destroy_object(&mut self, handle: ObjectHandle, object_type: ObjectType) -> Result<()> {
        let mut record = self.begin_record(VirGLCommand::DestroyObject, object_type as u32)?;
        record.append_u32(handle.value())?;
        record.finalize();
        Ok(())
    }

    /// BIND_SHADER
    pub fn bind_shader(&mut self, handle: ObjectHandle, shader_type: ShaderType) -> Result<()> {
        let mut record = self.begin_record(VirGLCommand::BindShader, 0)?;
        record.append_u32(handle.value())?;
        record.append_u32(shader_type as u32)?;
        record.finalize();
        Ok(())
    }

    /// SET_FRAMEBUFFER_STATE with `color_surfaces` as color buffers
    pub fn set_framebuffer_state(
        &mut self,
        depth_surface: ObjectHandle,
        color_surfaces: &[ObjectHandle],
    ) -> Result<()> {
        let mut record = self.begin_record(VirGLCommand::SetFramebufferState, 0)?;
        record.append_u32(color_surfaces.len() as u32)?;
        record.append_u32(depth_surface.value())?;
        for surface in color_surfaces {
            record.append_u32(surface.value())?;
        }
        record.finalize();
        Ok(())
    }

    /// SET_FRAMEBUFFER_STATE_NO_ATTACH. Every field is packed into 16 bits.
    pub fn set_framebuffer_state_no_attach(
        &mut self,
        width: u32,
        height: u32,
        layers: u32,
        samples: u32,
    ) -> Result<()> {
        if [width, height, layers, samples]
            .iter()
            .any(|value| *value > MAX_FRAMEBUFFER_EXTENT)
        {
            return Err(Error::InvalidArgument);
        }
        let mut record = self.begin_record(VirGLCommand::SetFramebufferStateNoAttach, 0)?;
        record.append_u32((height << 16) | (width & 0xFFFF))?;
        record.append_u32((samples << 16) | (layers & 0xFFFF))?;
        record.finalize();
        Ok(())
    }

    /// SET_VIEWPORT_STATE starting at `start_slot`
    pub fn set_viewport_state(&mut self, start_slot: u32, viewports: &[ViewportState]) -> Result<()> {
        let mut record = self.begin_record(VirGLCommand::SetViewportState, 0)?;
        record.append_u32(start_slot)?;
        for viewport in viewports {
            for scale in viewport.scale {
                record.append_f32(scale)?;
            }
            for translate in viewport.translate {
                record.append_f32(translate)?;
            }
        }
        record.finalize();
        Ok(())
    }

    /// SET_VERTEX_BUFFERS
    pub fn set_vertex_buffers(&mut self, bindings: &[VertexBufferBinding]) -> Result<()> {
        let mut record = self.begin_record(VirGLCommand::SetVertexBuffers, 0)?;
        for binding in bindings {
            record.append_u32(binding.stride)?;
            record.append_u32(binding.offset)?;
            record.append_u32(binding.resource.value())?;
        }
        record.finalize();
        Ok(())
    }

    /// SET_CONSTANT_BUFFER
    pub fn set_constant_buffer(
        &mut self,
        shader_type: ShaderType,
        index: u32,
        constants: &[f32],
    ) -> Result<()> {
        let mut record = self.begin_record(VirGLCommand::SetConstantBuffer, 0)?;
        record.append_u32(shader_type as u32)?;
        record.append_u32(index)?;
        for value in constants {
            record.append_f32(*value)?;
        }
        record.finalize();
        Ok(())
    }

    /// CLEAR
    pub fn clear(
        &mut self,
        buffers: ClearBuffers,
        color: [f32; 4],
        depth: f64,
        stencil: u32,
    ) -> Result<()> {
        let mut record = self.begin_record(VirGLCommand::Clear, 0)?;
        record.append_u32(buffers.bits())?;
        for channel in color {
            record.append_f32(channel)?;
        }
        record.append_f64(depth)?;
        record.append_u32(stencil)?;
        record.finalize();
        Ok(())
    }

    /// CLEAR of color buffer 0 to an opaque color, depth 1.0
    pub fn clear_color(&mut self, r: f32, g: f32, b: f32) -> Result<()> {
        self.clear(ClearBuffers::COLOR0, [r, g, b, 1.0], 1.0, 0)
    }

    /// DRAW_VBO
    pub fn draw_vbo(&mut self, info: &DrawInfo) -> Result<()> {
        let mut record = self.begin_record(VirGLCommand::DrawVbo, 0)?;
        record.append_u32(info.start)?;
        record.append_u32(info.count)?;
        record.append_u32(info.mode as u32)?;
        record.append_u32(info.indexed as u32)?;
        record.append_u32(info.instance_count)?;
        record.append_u32(info.index_bias)?;
        record.append_u32(info.start_instance)?;
        record.append_u32(info.primitive_restart as u32)?;
        record.append_u32(info.restart_index)?;
        record.append_u32(info.min_index)?;
        record.append_u32(info.max_index)?;
        record.append_u32(info.count_from_stream_output)?;
        record.finalize();
        Ok(())
    }

    /// TRANSFER3D
    pub fn transfer3d(&mut self, transfer: &Transfer3d) -> Result<()> {
        let mut record = self.begin_record(VirGLCommand::Transfer3d, 0)?;
        record.append_u32(transfer.resource.value())?;
        record.append_u32(transfer.level)?;
        record.append_u32(transfer.usage)?;
        record.append_u32(transfer.stride)?;
        record.append_u32(transfer.layer_stride)?;
        record.append_u32(transfer.region.x)?;
        record.append_u32(transfer.region.y)?;
        record.append_u32(transfer.region.z)?;
        record.append_u32(transfer.region.width)?;
        record.append_u32(transfer.region.height)?;
        record.append_u32(transfer.region.depth)?;
        record.append_u32(transfer.data_offset)?;
        record.append_u32(transfer.direction as u32)?;
        record.finalize();
        Ok(())
    }

    /// END_TRANSFERS
    pub fn end_transfers(&mut self) -> Result<()> {
        self.begin_record(VirGLCommand::EndTransfers, 0)?.finalize();
        Ok(())
    }

    /// CREATE_SUB_CTX
    pub fn create_sub_ctx(&mut self, sub_ctx: u32) -> Result<()> {
        let mut record = self.begin_record(VirGLCommand::CreateSubCtx, 0)?;
        record.append_u32(sub_ctx)?;
        record.finalize();
        Ok(())
    }

    /// SET_SUB_CTX
    pub fn set_sub_ctx(&mut self, sub_ctx: u32) -> Result<()> {
        let mut record = self.begin_record(VirGLCommand::SetSubCtx, 0)?;
        record.append_u32(sub_ctx)?;
        record.finalize();
        Ok(())
    }

    /// SET_TWEAKS
    pub fn set_tweaks(&mut self, id: u32, value: u32) -> Result<()> {
        let mut record = self.begin_record(VirGLCommand::SetTweaks, 0)?;
        record.append_u32(id)?;
        record.append_u32(value)?;
        record.finalize();
        Ok(())
    }

    /// SET_POLYGON_STIPPLE
    pub fn set_polygon_stipple(&mut self, pattern: &[u32; 32]) -> Result<()> {
        let mut record = self.begin_record(VirGLCommand::SetPolygonStipple, 0)?;
        record.append_slice(pattern)?;
        record.finalize();
        Ok(())
    }

    /// SET_TESS_STATE: four outer then two inner levels
    pub fn set_tess_state(&mut self, outer: [f32; 4], inner: [f32; 2]) -> Result<()> {
        let mut record = self.begin_record(VirGLCommand::SetTessState, 0)?;
        for level in outer.iter().chain(inner.iter()) {
            record.append_f32(*level)?;
        }
        record.finalize();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn test_create_blend_layout() {
        let mut encoder = Encoder::growable();
        encoder
            .create_blend(ObjectHandle::new(17), &BlendState::opaque())
            .unwrap();
        let words = encoder.words();
        assert_eq!(words.len(), 12);
        assert_eq!(words[0], 0x000B_0101);
        assert_eq!(&words[1..5], &[17, 4, 0, COLORMASK_RGBA]);
        assert!(words[5..].iter().all(|w| *w == 0));
    }

    #[test]
    fn test_create_vertex_elements_layout() {
        let elements = [
            VertexElement {
                src_offset: 12,
                instance_divisor: 0,
                vertex_buffer_index: 0,
                src_format: crate::protocol::pipe_format::R32G32_FLOAT,
            },
            VertexElement {
                src_offset: 0,
                instance_divisor: 0,
                vertex_buffer_index: 0,
                src_format: crate::protocol::pipe_format::R32G32B32_FLOAT,
            },
        ];
        let mut encoder = Encoder::growable();
        encoder
            .create_vertex_elements(ObjectHandle::new(20), &elements)
            .unwrap();
        assert_eq!(
            encoder.words(),
            &[0x0009_0501, 20, 12, 0, 0, 29, 0, 0, 0, 30]
        );
    }

    #[test]
    fn test_create_shader_inlines_source() {
        let source = "FRAG\nEND\n";
        let mut encoder = Encoder::growable();
        encoder
            .create_shader(ObjectHandle::new(30), ShaderType::Fragment, source)
            .unwrap();
        let words = encoder.words();

        // 10 bytes with terminator -> 3 words of text
        assert_eq!(words[0], ((5 + 3) << 16) | 0x0401);
        assert_eq!(&words[1..6], &[30, 1, 0, 10, 0]);
        let text: Vec<u8> = words[6..].iter().flat_map(|w| w.to_le_bytes()).collect();
        assert_eq!(&text[..9], source.as_bytes());
        assert!(text[9..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_framebuffer_state_layouts() {
        let mut encoder = Encoder::growable();
        encoder
            .set_framebuffer_state(ObjectHandle::NULL, &[ObjectHandle::new(21)])
            .unwrap();
        encoder
            .set_framebuffer_state_no_attach(1024, 768, 0, 0)
            .unwrap();
        assert_eq!(
            encoder.words(),
            &[0x0003_0005, 1, 0, 21, 0x0002_0026, (768 << 16) | 1024, 0]
        );
    }

    #[test]
    fn test_no_attach_rejects_wide_fields() {
        let mut encoder = Encoder::growable();
        assert_eq!(
            encoder.set_framebuffer_state_no_attach(0x1_0000, 768, 0, 0),
            Err(Error::InvalidArgument)
        );
        assert_eq!(
            encoder.set_framebuffer_state_no_attach(1024, 0x1_0000, 0, 0),
            Err(Error::InvalidArgument)
        );
        assert!(encoder.is_empty());

        encoder
            .set_framebuffer_state_no_attach(MAX_FRAMEBUFFER_EXTENT, MAX_FRAMEBUFFER_EXTENT, 0, 0)
            .unwrap();
        assert_eq!(encoder.words(), &[0x0002_0026, 0xFFFF_FFFF, 0]);
    }

    #[test]
    fn test_viewport_layout() {
        let mut encoder = Encoder::growable();
        encoder
            .set_viewport_state(0, &[ViewportState::for_extent(1024, 768)])
            .unwrap();
        let words = encoder.words();
        assert_eq!(words[0], 0x0007_0004);
        assert_eq!(words[1], 0);
        assert_eq!(f32::from_bits(words[2]), 512.0);
        assert_eq!(f32::from_bits(words[3]), -384.0);
        assert_eq!(f32::from_bits(words[4]), 0.5);
        assert_eq!(f32::from_bits(words[5]), 512.0);
        assert_eq!(f32::from_bits(words[6]), 384.0);
        assert_eq!(f32::from_bits(words[7]), 0.5);
    }

    #[test]
    fn test_constant_buffer_is_variable_length() {
        let identity = [
            1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0,
        ];
        let mut encoder = Encoder::growable();
        encoder
            .set_constant_buffer(ShaderType::Vertex, 0, &identity)
            .unwrap();
        let words = encoder.words();
        assert_eq!(words[0], (18 << 16) | 12);
        assert_eq!(&words[1..3], &[0, 0]);
        assert_eq!(words[3], 1.0f32.to_bits());
        assert_eq!(words.len(), 19);
    }

    #[test]
    fn test_clear_layout() {
        let mut encoder = Encoder::growable();
        encoder.clear_color(0.0, 0.0, 0.5).unwrap();
        assert_eq!(
            encoder.words(),
            &[
                0x0008_0007,
                4,
                0,
                0,
                0x3F00_0000,
                0x3F80_0000,
                0,
                0x3FF0_0000,
                0
            ]
        );
    }

    #[test]
    fn test_transfer3d_layout() {
        let mut encoder = Encoder::growable();
        encoder
            .transfer3d(&Transfer3d::flat_upload(ResourceId::new(9), 60))
            .unwrap();
        encoder.end_transfers().unwrap();
        assert_eq!(
            encoder.words(),
            &[0x000D_002B, 9, 0, 242, 0, 0, 0, 0, 0, 60, 1, 1, 0, 1, 0x0000_002C]
        );
    }

    #[test]
    fn test_setup_helpers() {
        let mut encoder = Encoder::growable();
        encoder.create_sub_ctx(1).unwrap();
        encoder.set_sub_ctx(1).unwrap();
        encoder.set_tweaks(TWEAK_GLES_SAMPLES_PASSED, 1024).unwrap();
        encoder.set_polygon_stipple(&[0xFFFF_FFFF; 32]).unwrap();
        encoder.set_tess_state([1.0; 4], [1.0; 2]).unwrap();

        let words = encoder.words();
        assert_eq!(&words[..7], &[0x0001_001D, 1, 0x0001_001C, 1, 0x0002_002E, 2, 1024]);
        assert_eq!(words[7], (32 << 16) | 22);
        assert_eq!(words[40], (6 << 16) | 32);
        assert_eq!(words.len(), 47);
    }
}
