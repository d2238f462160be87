//! Headless wgpu render engine.

use amodal_core::{PinholeIntrinsics, TriangleMesh};
use bytemuck::Zeroable;
use glam::{Mat4, Vec3};
use image::RgbaImage;
use pollster::FutureExt;
use wgpu::util::DeviceExt;

use crate::renderer::{check_camera_size, CameraSetup, DEFAULT_FAR, DEFAULT_NEAR};
use crate::screenshot::image_from_rgba;
use crate::{Material, OffscreenRenderer, RenderError, RenderResult};

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Per-vertex data uploaded to the GPU.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct MeshVertex {
    position: [f32; 3],
    color: [f32; 4],
}

impl MeshVertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] = [
        wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x3,
            offset: 0,
            shader_location: 0,
        },
        wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x4,
            offset: 12,
            shader_location: 1,
        },
    ];

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct CameraUniforms {
    view_proj: [[f32; 4]; 4],
}

struct GpuGeometry {
    name: String,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    double_sided: bool,
}

/// Offscreen renderer drawing on the GPU without a window or surface.
///
/// Each frame is rendered into an RGBA8 texture and copied back to host
/// memory through a mappable buffer.
pub struct HeadlessEngine {
    device: wgpu::Device,
    queue: wgpu::Queue,
    width: u32,
    height: u32,
    color_texture: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    readback_buffer: wgpu::Buffer,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    double_sided_pipeline: wgpu::RenderPipeline,
    culled_pipeline: wgpu::RenderPipeline,
    geometries: Vec<GpuGeometry>,
    camera: Option<CameraSetup>,
    near: f32,
    far: f32,
    background: Vec3,
}

impl HeadlessEngine {
    /// Creates an engine, blocking until the adapter and device are ready.
    pub fn new(width: u32, height: u32) -> RenderResult<Self> {
        Self::new_async(width, height).block_on()
    }

    /// Creates an engine with a `width x height` render target.
    pub async fn new_async(width: u32, height: u32) -> RenderResult<Self> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidDimensions { width, height });
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| RenderError::AdapterCreationFailed)?;

        let limits = adapter.limits();
        if width > limits.max_texture_dimension_2d || height > limits.max_texture_dimension_2d {
            return Err(RenderError::InvalidDimensions { width, height });
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("amodal-mask device (headless)"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
                trace: Default::default(),
                experimental_features: Default::default(),
            })
            .await?;

        log::info!(
            "headless engine on '{}' ({:?}), {width}x{height}",
            adapter.get_info().name,
            adapter.get_info().backend
        );

        let color_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("mask color target"),
            size: extent(width, height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let color_view = color_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth texture"),
            size: extent(width, height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let depth_view = depth_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let readback_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback buffer"),
            size: u64::from(aligned_bytes_per_row(width)) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("camera uniforms"),
            contents: bytemuck::cast_slice(&[CameraUniforms {
                view_proj: Mat4::IDENTITY.to_cols_array_2d(),
            }]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("camera bind group layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("camera bind group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        let double_sided_pipeline = create_mesh_pipeline(&device, &bind_group_layout, None);
        let culled_pipeline =
            create_mesh_pipeline(&device, &bind_group_layout, Some(wgpu::Face::Back));

        Ok(Self {
            device,
            queue,
            width,
            height,
            color_texture,
            color_view,
            depth_view,
            readback_buffer,
            camera_buffer,
            camera_bind_group,
            double_sided_pipeline,
            culled_pipeline,
            geometries: Vec::new(),
            camera: None,
            near: DEFAULT_NEAR,
            far: DEFAULT_FAR,
            background: Vec3::ONE,
        })
    }

    /// Copies the color target into host memory, dropping row padding.
    fn read_color_target(&self) -> RenderResult<Vec<u8>> {
        let bytes_per_row = aligned_bytes_per_row(self.width);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.color_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.readback_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            extent(self.width, self.height),
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = self.readback_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|_| RenderError::BufferMapFailed)?;
        rx.recv()
            .map_err(|_| RenderError::BufferMapFailed)?
            .map_err(|_| RenderError::BufferMapFailed)?;

        let data = buffer_slice.get_mapped_range();
        let row_bytes = self.width as usize * 4;
        let mut result = Vec::with_capacity(row_bytes * self.height as usize);
        for row in 0..self.height as usize {
            let start = row * bytes_per_row as usize;
            result.extend_from_slice(&data[start..start + row_bytes]);
        }
        drop(data);
        self.readback_buffer.unmap();

        Ok(result)
    }
}

impl OffscreenRenderer for HeadlessEngine {
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn add_geometry(
        &mut self,
        name: &str,
        mesh: &TriangleMesh,
        material: &Material,
    ) -> RenderResult<()> {
        if self.has_geometry(name) {
            return Err(RenderError::GeometryExists(name.to_string()));
        }

        let vertices: Vec<MeshVertex> = mesh
            .positions()
            .iter()
            .zip(mesh.colors())
            .map(|(p, c)| MeshVertex {
                position: p.to_array(),
                color: (c.extend(1.0) * material.base_color).to_array(),
            })
            .collect();
        let indices: Vec<u32> = mesh.triangles().iter().flatten().copied().collect();

        // Zero-sized buffers cannot be bound, so empty meshes get one padding element.
        let zero_vertex = MeshVertex::zeroed();
        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(name),
                contents: if vertices.is_empty() {
                    bytemuck::bytes_of(&zero_vertex)
                } else {
                    bytemuck::cast_slice(&vertices)
                },
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(name),
                contents: if indices.is_empty() {
                    bytemuck::cast_slice(&[0u32])
                } else {
                    bytemuck::cast_slice(&indices)
                },
                usage: wgpu::BufferUsages::INDEX,
            });

        let index_count = u32::try_from(indices.len())
            .map_err(|_| RenderError::GeometryTooLarge(name.to_string()))?;
        self.geometries.push(GpuGeometry {
            name: name.to_string(),
            vertex_buffer,
            index_buffer,
            index_count,
            double_sided: material.double_sided,
        });
        log::debug!("uploaded geometry '{name}' ({} triangles)", mesh.face_count());
        Ok(())
    }

    fn remove_geometry(&mut self, name: &str) -> bool {
        let before = self.geometries.len();
        self.geometries.retain(|g| g.name != name);
        self.geometries.len() != before
    }

    fn has_geometry(&self, name: &str) -> bool {
        self.geometries.iter().any(|g| g.name == name)
    }

    fn geometry_count(&self) -> usize {
        self.geometries.len()
    }

    fn setup_camera(
        &mut self,
        intrinsics: &PinholeIntrinsics,
        world_to_camera: Mat4,
    ) -> RenderResult<()> {
        check_camera_size(intrinsics, self.width, self.height)?;
        self.camera = Some(CameraSetup {
            intrinsics: *intrinsics,
            world_to_camera,
            near: self.near,
            far: self.far,
        });
        Ok(())
    }

    fn set_clip_planes(&mut self, near: f32, far: f32) {
        self.near = near;
        self.far = far;
        if let Some(camera) = &mut self.camera {
            camera.near = near;
            camera.far = far;
        }
    }

    fn set_background(&mut self, color: Vec3) {
        self.background = color;
    }

    fn render_to_image(&mut self) -> RenderResult<RgbaImage> {
        let camera = self.camera.ok_or(RenderError::CameraNotSet)?;
        let uniforms = CameraUniforms {
            view_proj: camera.view_projection().to_cols_array_2d(),
        };
        self.queue
            .write_buffer(&self.camera_buffer, 0, bytemuck::cast_slice(&[uniforms]));

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("mask render encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Mask Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: f64::from(self.background.x),
                            g: f64::from(self.background.y),
                            b: f64::from(self.background.z),
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });

            render_pass.set_bind_group(0, &self.camera_bind_group, &[]);
            for geometry in self.geometries.iter().filter(|g| g.index_count > 0) {
                render_pass.set_pipeline(if geometry.double_sided {
                    &self.double_sided_pipeline
                } else {
                    &self.culled_pipeline
                });
                render_pass.set_vertex_buffer(0, geometry.vertex_buffer.slice(..));
                render_pass.set_index_buffer(geometry.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..geometry.index_count, 0, 0..1);
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        let data = self.read_color_target()?;
        Ok(image_from_rgba(data, self.width, self.height)?)
    }
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

/// Row pitch of the readback buffer, padded to the copy alignment.
fn aligned_bytes_per_row(width: u32) -> u32 {
    let unaligned = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unaligned.div_ceil(align) * align
}

fn create_mesh_pipeline(
    device: &wgpu::Device,
    bind_group_layout: &wgpu::BindGroupLayout,
    cull_mode: Option<wgpu::Face>,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("unlit mesh shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("shaders/unlit_mesh.wgsl").into()),
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("unlit mesh pipeline layout"),
        bind_group_layouts: &[bind_group_layout],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("unlit mesh pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[MeshVertex::layout()],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: COLOR_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use amodal_core::{resolve_camera, CameraFrame};
    use image::Rgba;

    #[test]
    fn test_aligned_bytes_per_row() {
        assert_eq!(aligned_bytes_per_row(64), 256);
        assert_eq!(aligned_bytes_per_row(65), 512);
        assert_eq!(aligned_bytes_per_row(512), 2048);
    }

    #[test]
    fn test_vertex_layout_stride() {
        assert_eq!(MeshVertex::layout().array_stride, 28);
    }

    #[test]
    fn test_zero_size_rejected_before_adapter() {
        assert!(matches!(
            HeadlessEngine::new(0, 16),
            Err(RenderError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_headless_cube_render() {
        let Ok(mut engine) = HeadlessEngine::new(32, 32) else {
            eprintln!("Skipping headless engine test: no GPU adapter available");
            return;
        };

        let frame = CameraFrame {
            camera_angle_x: std::f32::consts::FRAC_PI_2,
            transform_matrix: Mat4::from_translation(Vec3::new(0.5, 0.5, 3.0)),
        };
        let camera = resolve_camera(&frame, 32, 32).unwrap();
        engine
            .setup_camera(&camera.intrinsics, camera.world_to_camera)
            .unwrap();
        engine
            .add_geometry("mesh", &TriangleMesh::unit_cube(), &Material::unlit())
            .unwrap();
        let empty = TriangleMesh::uncolored(Vec::new(), Vec::new()).unwrap();
        engine
            .add_geometry("empty", &empty, &Material::unlit())
            .unwrap();

        let img = engine.render_to_image().unwrap();
        assert_eq!(img.dimensions(), (32, 32));
        assert_eq!(*img.get_pixel(16, 16), Rgba([128, 128, 128, 255]));
        assert_eq!(*img.get_pixel(0, 0), Rgba([255, 255, 255, 255]));

        assert!(engine.remove_geometry("mesh"));
        let img = engine.render_to_image().unwrap();
        assert!(img.pixels().all(|p| *p == Rgba([255, 255, 255, 255])));
    }
}
