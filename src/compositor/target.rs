use std::ops::{Deref, DerefMut};

use crate::diagnostics::{self, DiagnosticKind};
use crate::gfx::{GraphicsDevice, TargetDesc, TargetStatus, TexelFormat};

/// A framebuffer with one color and one depth attachment, sized to the viewport.
pub struct OffscreenTarget<D: GraphicsDevice> {
    label: String,
    format: TexelFormat,
    width: u32,
    height: u32,
    target: D::Target,
}

impl<D: GraphicsDevice> OffscreenTarget<D> {
    /// Creates the attachments and checks completeness. An incomplete target
    /// is reported and kept; drawing into it gives undefined pixels.
    pub fn new(device: &mut D, label: &str, width: u32, height: u32, format: TexelFormat) -> Self {
        let target = device.create_target(&TargetDesc {
            label: label.to_string(),
            width,
            height,
            color_format: format,
        });
        Self::check(device, label, &target);

        Self {
            label: label.to_string(),
            format,
            width,
            height,
            target,
        }
    }

    fn check(device: &D, label: &str, target: &D::Target) {
        if let TargetStatus::Incomplete(reason) = device.target_status(target) {
            diagnostics::report(
                DiagnosticKind::Resource,
                format!("framebuffer '{}' is not complete: {:?}", label, reason),
            );
        }
    }

    /// Recreates the attachments at a new size. Zero sizes are ignored.
    pub fn resize(&mut self, device: &mut D, width: u32, height: u32) {
        if width == 0 || height == 0 || (width == self.width && height == self.height) {
            return;
        }
        *self = Self::new(device, &self.label, width, height, self.format);
    }

    pub fn status(&self, device: &D) -> TargetStatus {
        device.target_status(&self.target)
    }

    pub fn is_complete(&self, device: &D) -> bool {
        self.status(device).is_complete()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn handle(&self) -> &D::Target {
        &self.target
    }

    /// The color attachment as a sampleable texture.
    pub fn color<'t>(&'t self, device: &D) -> &'t D::Texture {
        device.target_color(&self.target)
    }

    /// Binds the target until the returned guard is dropped, which returns
    /// the device to the default framebuffer.
    pub fn bind<'d>(&self, device: &'d mut D) -> TargetBinding<'d, D> {
        device.bind_target(&self.target);
        TargetBinding { device }
    }
}

/// Scoped binding of an [`OffscreenTarget`]. Derefs to the device.
pub struct TargetBinding<'d, D: GraphicsDevice> {
    device: &'d mut D,
}

impl<D: GraphicsDevice> Deref for TargetBinding<'_, D> {
    type Target = D;

    fn deref(&self) -> &D {
        self.device
    }
}

impl<D: GraphicsDevice> DerefMut for TargetBinding<'_, D> {
    fn deref_mut(&mut self) -> &mut D {
        self.device
    }
}

impl<D: GraphicsDevice> Drop for TargetBinding<'_, D> {
    fn drop(&mut self) {
        self.device.unbind_target();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::{Command, RecordingDevice};

    #[test]
    fn zero_sized_target_reports_incomplete() {
        let mut device = RecordingDevice::new();
        diagnostics::drain();

        let target = OffscreenTarget::new(&mut device, "Clouds", 0, 0, TexelFormat::Rgba16Float);
        assert!(!target.is_complete(&device));
        assert_eq!(diagnostics::count(DiagnosticKind::Resource), 1);
    }

    #[test]
    fn valid_target_is_complete_and_silent() {
        let mut device = RecordingDevice::new();
        diagnostics::drain();

        let target = OffscreenTarget::new(&mut device, "Sky", 320, 200, TexelFormat::Rgba8Unorm);
        assert!(target.is_complete(&device));
        assert_eq!(diagnostics::count(DiagnosticKind::Resource), 0);
    }

    #[test]
    fn binding_guard_unbinds_on_every_exit() {
        let mut device = RecordingDevice::new();
        let target = OffscreenTarget::new(&mut device, "Sky", 64, 64, TexelFormat::Rgba8Unorm);
        device.take_commands();

        let render = |device: &mut RecordingDevice, bail: bool| -> Option<()> {
            let mut bound = target.bind(device);
            bound.clear([0.0, 0.0, 0.0, 1.0]);
            if bail {
                return None;
            }
            bound.clear([1.0, 1.0, 1.0, 1.0]);
            Some(())
        };
        assert!(render(&mut device, true).is_none());

        let commands = device.take_commands();
        assert!(matches!(commands.first(), Some(Command::BindTarget { .. })));
        assert_eq!(commands.last(), Some(&Command::UnbindTarget));
        assert_eq!(commands.len(), 3);
    }

    #[test]
    fn resize_recreates_attachments() {
        let mut device = RecordingDevice::new();
        let mut target = OffscreenTarget::new(&mut device, "Sky", 64, 64, TexelFormat::Rgba8Unorm);

        target.resize(&mut device, 0, 10);
        assert_eq!(target.size(), (64, 64));

        target.resize(&mut device, 128, 72);
        assert_eq!(target.size(), (128, 72));
        assert_eq!(
            target.color(&device).desc.extent,
            crate::gfx::Extent::D2 {
                width: 128,
                height: 72
            }
        );
    }
}
