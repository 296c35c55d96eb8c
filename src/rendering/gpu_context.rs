use std::sync::Arc;

use winit::window::Window;

use crate::{error::RenderResult, rendering::config::GpuOptions};

/// Adapter, device and queue shared by the scene renderer and the picker.
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// A context without a surface, for offscreen rendering and tests.
    pub async fn headless(options: &GpuOptions) -> RenderResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        Self::with_instance(instance, None, options).await
    }

    /// A context able to present to `window`.
    pub async fn for_window(
        window: Arc<Window>,
        options: &GpuOptions,
    ) -> RenderResult<(Self, wgpu::Surface<'static>)> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let surface = instance.create_surface(window)?;
        let context = Self::with_instance(instance, Some(&surface), options).await?;
        Ok((context, surface))
    }

    async fn with_instance(
        instance: wgpu::Instance,
        surface: Option<&wgpu::Surface<'static>>,
        options: &GpuOptions,
    ) -> RenderResult<Self> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: options.power_preference,
                compatible_surface: surface,
                force_fallback_adapter: options.force_fallback_adapter,
            })
            .await?;

        let info = adapter.get_info();
        log::info!("Using {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
                label: Some("sceneview device"),
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }
}
