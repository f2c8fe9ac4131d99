// SPDX-License-Identifier: CEPL-1.0
//! Recording backend and scripted surface for exercising the frame lifecycle
//! without a GPU. Handles are plain counters; every call lands in a shared log.
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use anyhow::{anyhow, Result};

use crate::backend::{
    Acquired, AttachmentCounts, ClearValues, FrameSync, GpuBackend, PresentTargets, SurfaceStatus,
    SyncSet,
};
use crate::error::FrameError;
use crate::surface::PresentationSurface;
use crate::RenderSize;

pub const COLOR_FORMAT: u32 = 50;
pub const DEPTH_FORMAT: u32 = 126;

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    WaitIdle,
    AllocateCommandBuffers(usize),
    FreeCommandBuffers(Vec<u32>),
    BeginCommands(u32),
    EndCommands(u32),
    BeginRenderPass { cmd: u32, targets: u32, image_index: u32 },
    EndRenderPass(u32),
    CreateTargets { id: u32, extent: RenderSize, previous: Option<u32> },
    DestroyTargets(u32),
    CreateSync(FrameSync<u32, u32>),
    DestroySync(FrameSync<u32, u32>),
    WaitFence(u32),
    ResetFence(u32),
    Acquire { targets: u32, semaphore: u32 },
    Submit { cmd: u32, wait: u32, signal: u32, fence: u32 },
    Present { targets: u32, image_index: u32, wait: u32 },
    WaitEvents,
}

pub type CallLog = Rc<RefCell<Vec<Call>>>;

#[derive(Debug)]
pub struct MockTargets {
    pub id: u32,
    pub extent: RenderSize,
    pub color_format: u32,
    pub depth_format: u32,
    pub counts: AttachmentCounts,
}

impl PresentTargets for MockTargets {
    type Format = u32;
    type RenderPass = u32;

    fn color_format(&self) -> u32 {
        self.color_format
    }
    fn depth_format(&self) -> u32 {
        self.depth_format
    }
    fn extent(&self) -> RenderSize {
        self.extent
    }
    fn render_pass(&self) -> u32 {
        self.id
    }
    fn attachment_counts(&self) -> AttachmentCounts {
        self.counts
    }
}

pub struct MockBackend {
    log: CallLog,
    next_handle: Cell<u32>,
    next_image: Cell<u32>,
    pub image_count: Cell<usize>,
    pub acquire_script: RefCell<VecDeque<Acquired>>,
    pub present_script: RefCell<VecDeque<SurfaceStatus>>,
    /// One-shot (color, depth) override for the next created targets.
    pub next_formats: Cell<Option<(u32, u32)>>,
    /// One-shot attachment-count override for the next created targets.
    pub next_counts: Cell<Option<AttachmentCounts>>,
    /// One-shot: the next `present` fails with a device error.
    pub fail_present: Cell<bool>,
    /// One-shot: the next `create_targets` fails with a device error.
    pub fail_targets: Cell<bool>,
    /// One-shot: the next `create_targets` finds a 0x0 surface.
    pub degenerate_targets: Cell<bool>,
    /// Successful `create_frame_sync` calls left before one fails.
    pub sync_budget: Cell<Option<usize>>,
}

impl MockBackend {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            next_handle: Cell::new(0),
            next_image: Cell::new(0),
            image_count: Cell::new(3),
            acquire_script: RefCell::new(VecDeque::new()),
            present_script: RefCell::new(VecDeque::new()),
            next_formats: Cell::new(None),
            next_counts: Cell::new(None),
            fail_present: Cell::new(false),
            fail_targets: Cell::new(false),
            degenerate_targets: Cell::new(false),
            sync_budget: Cell::new(None),
        }
    }

    pub fn script_acquire(&self, results: impl IntoIterator<Item = Acquired>) {
        self.acquire_script.borrow_mut().extend(results);
    }

    pub fn script_present(&self, results: impl IntoIterator<Item = SurfaceStatus>) {
        self.present_script.borrow_mut().extend(results);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.borrow().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.log.borrow().iter().filter(|c| pred(c)).count()
    }

    pub fn clear_log(&self) {
        self.log.borrow_mut().clear();
    }

    fn handle(&self) -> u32 {
        let h = self.next_handle.get() + 1;
        self.next_handle.set(h);
        h
    }

    fn record(&self, call: Call) {
        self.log.borrow_mut().push(call);
    }
}

impl GpuBackend for MockBackend {
    type CommandBuffer = u32;
    type Semaphore = u32;
    type Fence = u32;
    type Targets = MockTargets;

    fn wait_idle(&self) -> Result<()> {
        self.record(Call::WaitIdle);
        Ok(())
    }

    fn allocate_command_buffers(&self, count: usize) -> Result<Vec<u32>> {
        self.record(Call::AllocateCommandBuffers(count));
        Ok((0..count).map(|_| self.handle()).collect())
    }

    fn free_command_buffers(&self, buffers: &[u32]) {
        self.record(Call::FreeCommandBuffers(buffers.to_vec()));
    }

    fn begin_commands(&self, cmd: u32) -> Result<()> {
        self.record(Call::BeginCommands(cmd));
        Ok(())
    }

    fn end_commands(&self, cmd: u32) -> Result<()> {
        self.record(Call::EndCommands(cmd));
        Ok(())
    }

    fn begin_render_pass(&self, cmd: u32, targets: &MockTargets, image_index: u32, _: &ClearValues) {
        self.record(Call::BeginRenderPass {
            cmd,
            targets: targets.id,
            image_index,
        });
    }

    fn end_render_pass(&self, cmd: u32) {
        self.record(Call::EndRenderPass(cmd));
    }

    fn create_targets(&self, extent: RenderSize, previous: Option<&MockTargets>) -> Result<MockTargets> {
        if self.fail_targets.take() {
            return Err(anyhow!("mock: swapchain creation failed"));
        }
        if self.degenerate_targets.take() {
            return Err(FrameError::DegenerateExtent { width: 0, height: 0 }.into());
        }
        let id = self.handle();
        self.record(Call::CreateTargets {
            id,
            extent,
            previous: previous.map(|p| p.id),
        });
        let (color_format, depth_format) =
            self.next_formats.take().unwrap_or((COLOR_FORMAT, DEPTH_FORMAT));
        let counts = self
            .next_counts
            .take()
            .unwrap_or(AttachmentCounts::uniform(self.image_count.get()));
        Ok(MockTargets {
            id,
            extent,
            color_format,
            depth_format,
            counts,
        })
    }

    fn destroy_targets(&self, targets: &mut MockTargets) {
        self.record(Call::DestroyTargets(targets.id));
    }

    fn create_frame_sync(&self) -> Result<SyncSet<Self>> {
        match self.sync_budget.get() {
            Some(0) => {
                self.sync_budget.set(None);
                return Err(anyhow!("mock: semaphore creation failed"));
            }
            Some(n) => self.sync_budget.set(Some(n - 1)),
            None => {}
        }
        let sync = FrameSync {
            image_available: self.handle(),
            render_finished: self.handle(),
            in_flight: self.handle(),
        };
        self.record(Call::CreateSync(sync));
        Ok(sync)
    }

    fn destroy_frame_sync(&self, sync: &SyncSet<Self>) {
        self.record(Call::DestroySync(*sync));
    }

    fn wait_for_fence(&self, fence: u32) -> Result<()> {
        self.record(Call::WaitFence(fence));
        Ok(())
    }

    fn reset_fence(&self, fence: u32) -> Result<()> {
        self.record(Call::ResetFence(fence));
        Ok(())
    }

    fn acquire_image(&self, targets: &MockTargets, signal: u32) -> Result<Acquired> {
        self.record(Call::Acquire {
            targets: targets.id,
            semaphore: signal,
        });
        if let Some(scripted) = self.acquire_script.borrow_mut().pop_front() {
            return Ok(scripted);
        }
        let index = self.next_image.get() % targets.counts.images as u32;
        self.next_image.set(index + 1);
        Ok(Acquired::Image {
            index,
            suboptimal: false,
        })
    }

    fn submit(&self, cmd: u32, wait: u32, signal: u32, fence: u32) -> Result<()> {
        self.record(Call::Submit {
            cmd,
            wait,
            signal,
            fence,
        });
        Ok(())
    }

    fn present(&self, targets: &MockTargets, image_index: u32, wait: u32) -> Result<SurfaceStatus> {
        self.record(Call::Present {
            targets: targets.id,
            image_index,
            wait,
        });
        if self.fail_present.take() {
            return Err(anyhow!("mock: device lost"));
        }
        Ok(self
            .present_script
            .borrow_mut()
            .pop_front()
            .unwrap_or(SurfaceStatus::Optimal))
    }
}

pub struct MockSurface {
    log: CallLog,
    sizes: RefCell<VecDeque<RenderSize>>,
    current: Cell<RenderSize>,
    pub resized: Cell<bool>,
    pub closing: Cell<bool>,
    pub waits: Cell<usize>,
}

impl MockSurface {
    pub fn new(log: CallLog, size: RenderSize) -> Self {
        Self {
            log,
            sizes: RefCell::new(VecDeque::new()),
            current: Cell::new(size),
            resized: Cell::new(false),
            closing: Cell::new(false),
            waits: Cell::new(0),
        }
    }

    /// Each poll of `drawable_size` consumes one entry; the last one sticks.
    pub fn script_sizes(&self, sizes: impl IntoIterator<Item = RenderSize>) {
        self.sizes.borrow_mut().extend(sizes);
    }
}

impl PresentationSurface for MockSurface {
    fn drawable_size(&self) -> RenderSize {
        if let Some(next) = self.sizes.borrow_mut().pop_front() {
            self.current.set(next);
        }
        self.current.get()
    }

    fn was_resized(&self) -> bool {
        self.resized.get()
    }

    fn reset_resized_flag(&self) {
        self.resized.set(false);
    }

    fn wait_events(&self) {
        self.waits.set(self.waits.get() + 1);
        self.log.borrow_mut().push(Call::WaitEvents);
    }

    fn is_closing(&self) -> bool {
        self.closing.get()
    }
}

pub fn fixture(size: RenderSize) -> (Rc<MockBackend>, Rc<MockSurface>) {
    let log = CallLog::default();
    let backend = Rc::new(MockBackend::new(Rc::clone(&log)));
    let surface = Rc::new(MockSurface::new(log, size));
    (backend, surface)
}
