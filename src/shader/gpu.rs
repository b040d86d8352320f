//! [`ShaderBackend`] implementation on top of `wgpu`.
//!
//! Every context draws one full-screen triangle. The vertex stage is
//! provided here; the fragment source supplied by the caller must define
//! `fs_main`, taking the vertex output below:
//!
//! ```wgsl
//! struct VertexOutput {
//!     @builtin(position) position: vec4<f32>,
//!     @location(0) uv: vec2<f32>,
//! };
//! ```
//!
//! Bindings available to the fragment stage:
//! * group 0, binding 0: `Globals { resolution, css_size, device_pixel_ratio }` uniform
//! * group 1, binding `2 * i`: the `i`th declared texture (`texture_2d<f32>`)
//! * group 1, binding `2 * i + 1`: its sampler

use std::{iter, sync::Arc};

use bytemuck::{Pod, Zeroable};
use glam::{UVec2, Vec2};
use wgpu::util::DeviceExt;

use super::{
    texture_bytes, ContextOptions, ShaderBackend, ShaderContext, ShaderError, TextureOptions,
};
use crate::raster::RasterBuffer;

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

#[derive(Copy, Clone, Debug, Pod, Zeroable)]
#[repr(C)]
struct Globals {
    resolution: Vec2,
    css_size: Vec2,
    device_pixel_ratio: f32,
    _pad: [f32; 3],
}

/// A `wgpu` device able to create shader contexts.
pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    vertex_module: wgpu::ShaderModule,
    globals_layout: wgpu::BindGroupLayout,
    sampler: Arc<wgpu::Sampler>,
}

impl WgpuBackend {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("fullscreen"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../shaders/fullscreen.wgsl").into()),
        });

        let globals_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("globals"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("texture_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            device,
            queue,
            vertex_module,
            globals_layout,
            sampler: Arc::new(sampler),
        }
    }

    /// Creates a backend on the first available adapter, with no window surface.
    pub async fn headless() -> Result<Self, ShaderError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::LowPower,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .ok_or(ShaderError::NoAdapter)?;

        let info = adapter.get_info();
        log::info!("Using adapter '{}' ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("titlefx"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults()
                        .using_resolution(adapter.limits()),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| ShaderError::RequestDevice(e.to_string()))?;

        Ok(Self::new(Arc::new(device), Arc::new(queue)))
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    fn create_texture_layout(&self, count: usize) -> wgpu::BindGroupLayout {
        let entries: Vec<_> = (0..count as u32)
            .flat_map(|i| {
                [
                    wgpu::BindGroupLayoutEntry {
                        binding: 2 * i,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2 * i + 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ]
            })
            .collect();

        self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("textures"),
            entries: &entries,
        })
    }
}

impl ShaderBackend for WgpuBackend {
    type Context = WgpuContext;

    fn create_context(&self, options: &ContextOptions) -> Result<WgpuContext, ShaderError> {
        let size = options.device_size.max(UVec2::ONE);
        let max = self.device.limits().max_texture_dimension_2d;
        if size.x > max || size.y > max {
            return Err(ShaderError::SurfaceTooLarge {
                width: size.x,
                height: size.y,
                max,
            });
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let fragment_module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("fragment"),
            source: wgpu::ShaderSource::Wgsl(options.fragment_source.into()),
        });
        let texture_layout = self.create_texture_layout(options.textures.len());

        let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("title"),
            bind_group_layouts: &[&self.globals_layout, &texture_layout],
            push_constant_ranges: &[],
        });
        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("title"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &self.vertex_module,
                entry_point: "vs_main",
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: "fs_main",
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
        if options.preserve_output_buffer {
            usage |= wgpu::TextureUsages::COPY_SRC;
        }
        let target = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("target"),
            size: extent(size),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage,
            view_formats: &[],
        });

        let globals = Globals {
            resolution: size.as_vec2(),
            css_size: options.css_size,
            device_pixel_ratio: if options.css_size.x > 0. {
                size.x as f32 / options.css_size.x
            } else {
                1.
            },
            _pad: [0.; 3],
        };
        let globals_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("globals"),
            contents: bytemuck::bytes_of(&globals),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let globals_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("globals"),
            layout: &self.globals_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: globals_buffer.as_entire_binding(),
            }],
        });

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            target.destroy();
            globals_buffer.destroy();
            return Err(ShaderError::Compile(error.to_string()));
        }

        log::info!(
            "Created shader context of {}x{} with textures {:?}",
            size.x,
            size.y,
            options.textures
        );

        Ok(WgpuContext {
            device: Arc::clone(&self.device),
            queue: Arc::clone(&self.queue),
            pipeline,
            texture_layout,
            sampler: Arc::clone(&self.sampler),
            globals_buffer,
            globals_bind_group,
            slots: options
                .textures
                .iter()
                .map(|name| TextureSlot {
                    name: name.to_string(),
                    texture: None,
                })
                .collect(),
            target,
            size,
            preserve_output_buffer: options.preserve_output_buffer,
        })
    }
}

struct TextureSlot {
    name: String,
    texture: Option<wgpu::Texture>,
}

/// A compiled fragment shader and its render target.
pub struct WgpuContext {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    pipeline: wgpu::RenderPipeline,
    texture_layout: wgpu::BindGroupLayout,
    sampler: Arc<wgpu::Sampler>,
    globals_buffer: wgpu::Buffer,
    globals_bind_group: wgpu::BindGroup,
    slots: Vec<TextureSlot>,
    target: wgpu::Texture,
    size: UVec2,
    preserve_output_buffer: bool,
}

impl WgpuContext {
    pub fn target(&self) -> &wgpu::Texture {
        &self.target
    }

    /// Copies the last rendered frame back to the CPU as RGBA8 rows.
    ///
    /// Only available when the context was created with
    /// `preserve_output_buffer`.
    pub fn read_pixels(&self) -> Result<Vec<u8>, ShaderError> {
        if !self.preserve_output_buffer {
            return Err(ShaderError::OutputNotPreserved);
        }

        let unpadded_bytes_per_row = 4 * self.size.x;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback"),
            size: padded_bytes_per_row as u64 * self.size.y as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(self.size.y),
                },
            },
            extent(self.size),
        );
        self.queue.submit(iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        pollster::block_on(receiver)
            .map_err(|_| ShaderError::Readback("mapping was cancelled".to_owned()))?
            .map_err(|e| ShaderError::Readback(e.to_string()))?;

        let mut pixels = Vec::with_capacity((unpadded_bytes_per_row * self.size.y) as usize);
        {
            let data = slice.get_mapped_range();
            for row in data.chunks(padded_bytes_per_row as usize) {
                pixels.extend_from_slice(&row[..unpadded_bytes_per_row as usize]);
            }
        }
        buffer.unmap();
        buffer.destroy();

        Ok(pixels)
    }
}

impl ShaderContext for WgpuContext {
    fn set_texture(
        &mut self,
        name: &str,
        raster: &RasterBuffer,
        options: TextureOptions,
    ) -> Result<(), ShaderError> {
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.name == name)
            .ok_or_else(|| ShaderError::UnknownTexture(name.to_owned()))?;

        let size = raster.device_size();
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(name),
            size: extent(size),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &texture_bytes(raster, options),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * size.x),
                rows_per_image: Some(size.y),
            },
            extent(size),
        );

        if let Some(old) = slot.texture.replace(texture) {
            old.destroy();
        }
        Ok(())
    }

    fn render(&mut self) -> Result<(), ShaderError> {
        let mut views = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            let texture = slot
                .texture
                .as_ref()
                .ok_or_else(|| ShaderError::MissingTexture(slot.name.clone()))?;
            views.push(texture.create_view(&Default::default()));
        }

        let entries: Vec<_> = views
            .iter()
            .enumerate()
            .flat_map(|(i, view)| {
                [
                    wgpu::BindGroupEntry {
                        binding: 2 * i as u32,
                        resource: wgpu::BindingResource::TextureView(view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2 * i as u32 + 1,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ]
            })
            .collect();
        let textures_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("textures"),
            layout: &self.texture_layout,
            entries: &entries,
        });

        let target_view = self.target.create_view(&Default::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("title"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("title"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.globals_bind_group, &[]);
            pass.set_bind_group(1, &textures_bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        self.queue.submit(iter::once(encoder.finish()));

        Ok(())
    }

    fn device_size(&self) -> UVec2 {
        self.size
    }

    fn release(self) {
        for slot in &self.slots {
            if let Some(texture) = &slot.texture {
                texture.destroy();
            }
        }
        self.target.destroy();
        self.globals_buffer.destroy();
    }
}

fn extent(size: UVec2) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: size.x,
        height: size.y,
        depth_or_array_layers: 1,
    }
}
