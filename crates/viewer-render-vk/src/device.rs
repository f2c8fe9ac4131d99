// SPDX-License-Identifier: CEPL-1.0
use std::ffi::{c_char, c_void, CStr};

use anyhow::{anyhow, bail, Context, Result};
use ash::ext::debug_utils as ext_debug;
use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, error, info, warn};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
const APP_NAME: &CStr = c"viewer";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PresentModePreference {
    /// Low latency triple buffering, FIFO when unavailable.
    #[default]
    Mailbox,
    Fifo,
}

impl PresentModePreference {
    /// Modes to try, most preferred first.
    pub fn candidates(self) -> [vk::PresentModeKHR; 2] {
        match self {
            Self::Mailbox => [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO],
            Self::Fifo => [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        }
    }
}

#[derive(Clone, Debug)]
pub struct DeviceConfig {
    /// Enables the Khronos validation layer and a debug messenger when the
    /// layer is installed.
    pub validation: bool,
    pub present_mode: PresentModePreference,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            present_mode: PresentModePreference::default(),
        }
    }
}

/// What the surface supports on the selected physical device, queried fresh for
/// every swapchain generation.
pub(crate) struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() {
        return vk::FALSE;
    }
    // SAFETY: the loader passes a valid callback struct for the duration of the call.
    let msg = unsafe {
        let p = (*data).p_message;
        if p.is_null() {
            return vk::FALSE;
        }
        CStr::from_ptr(p).to_string_lossy()
    };
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!("[vulkan] {msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!("[vulkan] {msg}");
    } else {
        debug!("[vulkan] {msg}");
    }
    vk::FALSE
}

/// Instance, surface, logical device, graphics queue and command pool.
///
/// The window passed to [`VkDevice::new`] must outlive this value.
pub struct VkDevice {
    _entry: Entry,
    instance: Instance,
    debug: Option<(ext_debug::Instance, vk::DebugUtilsMessengerEXT)>,
    surface_loader: surface::Instance,
    surface: vk::SurfaceKHR,
    phys: vk::PhysicalDevice,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    queue_family: u32,
    device: ash::Device,
    queue: vk::Queue,
    command_pool: vk::CommandPool,
    pub(crate) swapchain_loader: swapchain::Device,
    pub(crate) present_mode: PresentModePreference,
}

impl VkDevice {
    pub fn new<W>(window: &W, config: &DeviceConfig) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle + ?Sized,
    {
        let display_raw = window
            .display_handle()
            .map_err(|e| anyhow!("display_handle: {e}"))?
            .as_raw();
        let window_raw = window
            .window_handle()
            .map_err(|e| anyhow!("window_handle: {e}"))?
            .as_raw();

        // STRICT ORDER: instance -> surface -> physical device (present support is
        // checked against this surface) -> logical device -> pool.
        // SAFETY: the loaded entry outlives every object created from it; all
        // create infos reference locals that live across the calls.
        unsafe {
            let entry = Entry::load().context("loading the Vulkan library")?;

            let validation = config.validation && has_layer(&entry, VALIDATION_LAYER)?;
            if config.validation && !validation {
                warn!("validation requested but {VALIDATION_LAYER:?} is not installed");
            }
            let instance = create_instance(&entry, display_raw, validation)?;
            let debug = if validation {
                Some(create_debug_messenger(&entry, &instance)?)
            } else {
                None
            };

            let surface_loader = surface::Instance::new(&entry, &instance);
            let surface =
                ash_window::create_surface(&entry, &instance, display_raw, window_raw, None)
                    .context("ash_window::create_surface")?;

            let (phys, queue_family) = pick_device_and_queue(&instance, &surface_loader, surface)?;
            let props = instance.get_physical_device_properties(phys);
            let name = CStr::from_ptr(props.device_name.as_ptr()).to_string_lossy();
            info!(
                "gpu: {name} ({:?}), queue family {queue_family}, validation={validation}",
                props.device_type
            );

            let priorities = [1.0_f32];
            let qinfo = vk::DeviceQueueCreateInfo {
                s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
                queue_family_index: queue_family,
                queue_count: 1,
                p_queue_priorities: priorities.as_ptr(),
                ..Default::default()
            };
            let device_exts = [swapchain::NAME.as_ptr()];
            let features = vk::PhysicalDeviceFeatures::default();
            let dinfo = vk::DeviceCreateInfo {
                s_type: vk::StructureType::DEVICE_CREATE_INFO,
                queue_create_info_count: 1,
                p_queue_create_infos: &qinfo,
                enabled_extension_count: device_exts.len() as u32,
                pp_enabled_extension_names: device_exts.as_ptr(),
                p_enabled_features: &features,
                ..Default::default()
            };
            let device = instance
                .create_device(phys, &dinfo, None)
                .context("create_device")?;
            let queue = device.get_device_queue(queue_family, 0);

            let pool_info = vk::CommandPoolCreateInfo {
                s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
                queue_family_index: queue_family,
                flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
                ..Default::default()
            };
            let command_pool = device
                .create_command_pool(&pool_info, None)
                .context("create_command_pool")?;

            let swapchain_loader = swapchain::Device::new(&instance, &device);
            let memory_properties = instance.get_physical_device_memory_properties(phys);

            Ok(Self {
                _entry: entry,
                instance,
                debug,
                surface_loader,
                surface,
                phys,
                memory_properties,
                queue_family,
                device,
                queue,
                command_pool,
                swapchain_loader,
                present_mode: config.present_mode,
            })
        }
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    pub fn command_pool(&self) -> vk::CommandPool {
        self.command_pool
    }

    pub(crate) fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    pub(crate) fn surface_support(&self) -> Result<SurfaceSupport> {
        // SAFETY: surface and physical device belong to this instance.
        unsafe {
            let l = &self.surface_loader;
            Ok(SurfaceSupport {
                capabilities: l
                    .get_physical_device_surface_capabilities(self.phys, self.surface)
                    .context("surface capabilities")?,
                formats: l
                    .get_physical_device_surface_formats(self.phys, self.surface)
                    .context("surface formats")?,
                present_modes: l
                    .get_physical_device_surface_present_modes(self.phys, self.surface)
                    .context("surface present modes")?,
            })
        }
    }

    pub fn find_memory_type(&self, type_bits: u32, req: vk::MemoryPropertyFlags) -> Result<u32> {
        find_memory_type(&self.memory_properties, type_bits, req)
            .ok_or_else(|| anyhow!("no memory type with {req:?} in mask {type_bits:#b}"))
    }

    /// First candidate whose tiling features include `features`.
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> Result<vk::Format> {
        candidates
            .iter()
            .copied()
            .find(|&fmt| {
                // SAFETY: plain property query on our physical device.
                let props = unsafe {
                    self.instance
                        .get_physical_device_format_properties(self.phys, fmt)
                };
                match tiling {
                    vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
                    _ => props.optimal_tiling_features.contains(features),
                }
            })
            .ok_or_else(|| anyhow!("none of {candidates:?} supports {features:?}"))
    }

    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        props: vk::MemoryPropertyFlags,
    ) -> Result<(vk::Buffer, vk::DeviceMemory)> {
        let d = &self.device;
        let bci = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        // SAFETY: handles are destroyed here on failure, by the caller otherwise.
        unsafe {
            let buf = d.create_buffer(&bci, None).context("create_buffer")?;
            let req = d.get_buffer_memory_requirements(buf);
            let memory = self
                .find_memory_type(req.memory_type_bits, props)
                .and_then(|memory_type_index| {
                    let mai = vk::MemoryAllocateInfo {
                        s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
                        allocation_size: req.size,
                        memory_type_index,
                        ..Default::default()
                    };
                    d.allocate_memory(&mai, None).context("allocate_memory(buffer)")
                });
            let mem = match memory {
                Ok(mem) => mem,
                Err(e) => {
                    d.destroy_buffer(buf, None);
                    return Err(e);
                }
            };
            if let Err(e) = d.bind_buffer_memory(buf, mem, 0) {
                d.destroy_buffer(buf, None);
                d.free_memory(mem, None);
                return Err(e).context("bind_buffer_memory");
            }
            Ok((buf, mem))
        }
    }

    pub fn create_image_with_info(
        &self,
        info: &vk::ImageCreateInfo<'_>,
        props: vk::MemoryPropertyFlags,
    ) -> Result<(vk::Image, vk::DeviceMemory)> {
        let d = &self.device;
        // SAFETY: as for create_buffer.
        unsafe {
            let image = d.create_image(info, None).context("create_image")?;
            let req = d.get_image_memory_requirements(image);
            let memory = self
                .find_memory_type(req.memory_type_bits, props)
                .and_then(|memory_type_index| {
                    let alloc = vk::MemoryAllocateInfo {
                        s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
                        allocation_size: req.size,
                        memory_type_index,
                        ..Default::default()
                    };
                    d.allocate_memory(&alloc, None).context("allocate_memory(image)")
                });
            let mem = match memory {
                Ok(mem) => mem,
                Err(e) => {
                    d.destroy_image(image, None);
                    return Err(e);
                }
            };
            if let Err(e) = d.bind_image_memory(image, mem, 0) {
                d.destroy_image(image, None);
                d.free_memory(mem, None);
                return Err(e).context("bind_image_memory");
            }
            Ok((image, mem))
        }
    }

    /// One-shot copy on the graphics queue. Blocks until the queue is idle.
    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) -> Result<()> {
        let d = &self.device;
        let ai = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.command_pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: 1,
            ..Default::default()
        };
        // SAFETY: the temporary command buffer is freed on every path below.
        unsafe {
            let cmd = d.allocate_command_buffers(&ai)?[0];
            let record_and_submit = || -> Result<()> {
                let bi = vk::CommandBufferBeginInfo {
                    s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
                    flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
                    ..Default::default()
                };
                d.begin_command_buffer(cmd, &bi)?;
                let region = vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: 0,
                    size,
                };
                d.cmd_copy_buffer(cmd, src, dst, std::slice::from_ref(&region));
                d.end_command_buffer(cmd)?;

                let si = vk::SubmitInfo {
                    s_type: vk::StructureType::SUBMIT_INFO,
                    command_buffer_count: 1,
                    p_command_buffers: &cmd,
                    ..Default::default()
                };
                d.queue_submit(self.queue, std::slice::from_ref(&si), vk::Fence::null())?;
                d.queue_wait_idle(self.queue)?;
                Ok(())
            };
            let result = record_and_submit().context("copy_buffer");
            d.free_command_buffers(self.command_pool, std::slice::from_ref(&cmd));
            result
        }
    }
}

// STRICT TEARDOWN ORDER:
// - device_wait_idle()
// - command pool BEFORE device
// - device BEFORE surface
// - debug messenger, then instance last.
// Swapchains, models and pipelines hold an Rc to this device and are gone by now.
impl Drop for VkDevice {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

pub(crate) fn find_memory_type(
    mem: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    req: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..mem.memory_type_count).find(|&i| {
        (type_bits & (1 << i)) != 0 && mem.memory_types[i as usize].property_flags.contains(req)
    })
}

unsafe fn has_layer(entry: &Entry, name: &CStr) -> Result<bool> {
    // SAFETY: caller holds a loaded entry.
    let layers = unsafe { entry.enumerate_instance_layer_properties() }
        .context("enumerate_instance_layer_properties")?;
    Ok(layers
        .iter()
        .any(|l| unsafe { CStr::from_ptr(l.layer_name.as_ptr()) } == name))
}

unsafe fn create_instance(
    entry: &Entry,
    display_raw: raw_window_handle::RawDisplayHandle,
    validation: bool,
) -> Result<Instance> {
    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: APP_NAME.as_ptr(),
        application_version: 0,
        p_engine_name: APP_NAME.as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    let mut exts: Vec<*const c_char> = ash_window::enumerate_required_extensions(display_raw)
        .context("enumerate_required_extensions")?
        .to_vec();
    let layers: Vec<*const c_char> = if validation {
        exts.push(ext_debug::NAME.as_ptr());
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        Vec::new()
    };

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: exts.len() as u32,
        pp_enabled_extension_names: exts.as_ptr(),
        enabled_layer_count: layers.len() as u32,
        pp_enabled_layer_names: layers.as_ptr(),
        ..Default::default()
    };
    // SAFETY: every pointer in create_info refers to the locals above.
    unsafe { entry.create_instance(&create_info, None) }.context("create_instance")
}

unsafe fn create_debug_messenger(
    entry: &Entry,
    instance: &Instance,
) -> Result<(ext_debug::Instance, vk::DebugUtilsMessengerEXT)> {
    let loader = ext_debug::Instance::new(entry, instance);
    let ci = vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    };
    // SAFETY: the debug_utils extension was enabled on this instance.
    let messenger = unsafe { loader.create_debug_utils_messenger(&ci, None) }
        .context("create_debug_utils_messenger")?;
    Ok((loader, messenger))
}

/// First device with a graphics queue that can present to `surface` and exposes
/// the swapchain extension. Discrete GPUs win over the rest.
unsafe fn pick_device_and_queue(
    instance: &Instance,
    surf_i: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, u32)> {
    let mut best: Option<(vk::PhysicalDevice, u32, bool)> = None;
    // SAFETY: all queries are against devices enumerated from `instance`.
    unsafe {
        for phys in instance.enumerate_physical_devices()? {
            let has_swapchain = instance
                .enumerate_device_extension_properties(phys)?
                .iter()
                .any(|e| CStr::from_ptr(e.extension_name.as_ptr()) == swapchain::NAME);
            if !has_swapchain {
                continue;
            }
            let qprops = instance.get_physical_device_queue_family_properties(phys);
            let family = qprops.iter().enumerate().find_map(|(i, q)| {
                let present = surf_i
                    .get_physical_device_surface_support(phys, i as u32, surface)
                    .unwrap_or(false);
                (q.queue_flags.contains(vk::QueueFlags::GRAPHICS) && present).then_some(i as u32)
            });
            let Some(family) = family else { continue };

            let discrete = instance.get_physical_device_properties(phys).device_type
                == vk::PhysicalDeviceType::DISCRETE_GPU;
            match best {
                Some((_, _, true)) => {}
                Some(_) if !discrete => {}
                _ => best = Some((phys, family, discrete)),
            }
        }
    }
    match best {
        Some((phys, family, _)) => Ok((phys, family)),
        None => bail!("no physical device with a graphics queue that can present to the window"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut mem = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (i, &f) in flags.iter().enumerate() {
            mem.memory_types[i].property_flags = f;
        }
        mem
    }

    #[test]
    fn memory_type_respects_mask_and_flags() {
        use vk::MemoryPropertyFlags as M;
        let mem = memory(&[
            M::DEVICE_LOCAL,
            M::HOST_VISIBLE | M::HOST_COHERENT,
            M::DEVICE_LOCAL | M::HOST_VISIBLE | M::HOST_COHERENT,
        ]);
        let host = M::HOST_VISIBLE | M::HOST_COHERENT;

        assert_eq!(find_memory_type(&mem, 0b111, M::DEVICE_LOCAL), Some(0));
        assert_eq!(find_memory_type(&mem, 0b111, host), Some(1));
        assert_eq!(find_memory_type(&mem, 0b101, host), Some(2));
        assert_eq!(find_memory_type(&mem, 0b001, host), None);
    }

    #[test]
    fn present_mode_candidates_fall_back_to_the_other_mode() {
        assert_eq!(
            PresentModePreference::Mailbox.candidates(),
            [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO]
        );
        assert_eq!(
            PresentModePreference::Fifo.candidates()[0],
            vk::PresentModeKHR::FIFO
        );
    }
}
