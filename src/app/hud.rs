use glyphon::{
    Attrs, Cache, Color, Family, FontSystem, Metrics, Resolution, Shaping, SwashCache, TextArea,
    TextAtlas, TextBounds, TextRenderer, Viewport,
};

use crate::gfx::WgpuDevice;

const FONT_SIZE: f32 = 18.0;
const LINE_HEIGHT: f32 = 24.0;
const MARGIN: f32 = 10.0;

/// Text overlay drawn on top of the composited frame.
pub struct Hud {
    font_system: FontSystem,
    swash_cache: SwashCache,
    text_atlas: TextAtlas,
    text_renderer: TextRenderer,
    viewport: Viewport,
    buffer: glyphon::Buffer,
    size: (u32, u32),
}

impl Hud {
    pub fn new(device: &WgpuDevice) -> Self {
        let (width, height) = device.size();
        let mut font_system = FontSystem::new();
        let swash_cache = SwashCache::new();
        let cache = Cache::new(device.device());
        let mut text_atlas =
            TextAtlas::new(device.device(), device.queue(), &cache, device.surface_format());
        let text_renderer = TextRenderer::new(
            &mut text_atlas,
            device.device(),
            wgpu::MultisampleState::default(),
            None,
        );
        let mut viewport = Viewport::new(device.device(), &cache);
        viewport.update(device.queue(), Resolution { width, height });

        let buffer = glyphon::Buffer::new(&mut font_system, Metrics::new(FONT_SIZE, LINE_HEIGHT));

        Self {
            font_system,
            swash_cache,
            text_atlas,
            text_renderer,
            viewport,
            buffer,
            size: (width, height),
        }
    }

    pub fn resize(&mut self, queue: &wgpu::Queue, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.size = (width, height);
        self.viewport.update(queue, Resolution { width, height });
    }

    pub fn draw(&mut self, device: &mut WgpuDevice, lines: &[String]) {
        let (width, height) = self.size;
        self.buffer.set_text(
            &mut self.font_system,
            &lines.join("\n"),
            &Attrs::new().family(Family::SansSerif),
            Shaping::Advanced,
            None,
        );
        self.buffer.set_size(
            &mut self.font_system,
            Some(width as f32 - MARGIN),
            Some(height as f32 - MARGIN),
        );

        let text_area = TextArea {
            buffer: &self.buffer,
            left: MARGIN,
            top: MARGIN,
            scale: 1.0,
            bounds: TextBounds {
                left: 0,
                top: 0,
                right: width as i32,
                bottom: height as i32,
            },
            default_color: Color::rgb(255, 255, 255),
            custom_glyphs: &[],
        };

        if let Err(e) = self.text_renderer.prepare(
            device.device(),
            device.queue(),
            &mut self.font_system,
            &mut self.text_atlas,
            &self.viewport,
            [text_area],
            &mut self.swash_cache,
        ) {
            tracing::warn!("HUD text prepare failed: {}", e);
            return;
        }

        let text_renderer = &self.text_renderer;
        let text_atlas = &self.text_atlas;
        let viewport = &self.viewport;
        device.draw_overlay(|_, _, encoder, view| {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("HUD Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                ..Default::default()
            });

            if let Err(e) = text_renderer.render(text_atlas, viewport, &mut pass) {
                tracing::warn!("HUD text render failed: {}", e);
            }
        });
    }

    /// Drops glyphs unused since the last frame.
    pub fn trim(&mut self) {
        self.text_atlas.trim();
    }
}
