// SPDX-License-Identifier: CEPL-1.0
use crate::RenderSize;

/// What the frame lifecycle needs from the window. Methods take `&self`; the
/// surface is shared between the renderer and the application loop.
pub trait PresentationSurface {
    /// Current drawable size in physical pixels.
    fn drawable_size(&self) -> RenderSize;
    fn was_resized(&self) -> bool;
    fn reset_resized_flag(&self);
    /// Blocks until at least one platform event has been handled.
    fn wait_events(&self);
    fn is_closing(&self) -> bool {
        false
    }
}

/// Blocks on platform events until the drawable size is usable. `None` if the
/// surface starts closing first.
pub(crate) fn wait_for_extent<S: PresentationSurface + ?Sized>(surface: &S) -> Option<RenderSize> {
    loop {
        let size = surface.drawable_size();
        if !size.is_degenerate() {
            return Some(size);
        }
        if surface.is_closing() {
            return None;
        }
        tracing::debug!("drawable extent {size} is degenerate, waiting for events");
        surface.wait_events();
    }
}
