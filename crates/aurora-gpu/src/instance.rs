//! Vulkan instance creation and physical device negotiation.

use crate::config::ContextConfig;
use crate::error::{GpuError, Result};
use ash::vk;
use std::ffi::{CStr, CString};

/// Mandatory instance extensions for presentation.
pub fn required_instance_extensions() -> Vec<&'static CStr> {
    vec![
        ash::khr::surface::NAME,
        #[cfg(target_os = "macos")]
        ash::khr::portability_enumeration::NAME,
    ]
}

/// Platform surface extension candidates. At least one must be available;
/// a Wayland-only or X-only driver offers exactly one of the Linux pair.
pub fn platform_surface_extensions() -> Vec<&'static CStr> {
    vec![
        #[cfg(target_os = "windows")]
        ash::khr::win32_surface::NAME,
        #[cfg(target_os = "linux")]
        ash::khr::xlib_surface::NAME,
        #[cfg(target_os = "linux")]
        ash::khr::wayland_surface::NAME,
        #[cfg(target_os = "macos")]
        ash::ext::metal_surface::NAME,
    ]
}

/// Mandatory device extensions.
pub fn required_device_extensions() -> Vec<&'static CStr> {
    vec![ash::khr::swapchain::NAME]
}

/// Mandatory validation layers when validation is enabled.
pub fn validation_layers() -> Vec<&'static CStr> {
    vec![c"VK_LAYER_KHRONOS_validation"]
}

/// Create a Vulkan instance.
///
/// Mandatory instance extensions and validation layers are verified up
/// front; a missing one means no accelerator is usable and startup aborts.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn create_instance(entry: &ash::Entry, config: &ContextConfig) -> Result<ash::Instance> {
    let extension_props = entry.enumerate_instance_extension_properties(None)?;
    let available: Vec<&CStr> = extension_props
        .iter()
        .map(|props| unsafe { CStr::from_ptr(props.extension_name.as_ptr()) })
        .collect();

    check_instance_extensions(&available, &config.instance_extensions)?;

    let platform = supported_platform_extensions(&platform_surface_extensions(), &available);
    if platform.is_empty() {
        let wanted = platform_surface_extensions()
            .iter()
            .map(|ext| ext.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" or ");
        return Err(GpuError::MissingExtension(wanted));
    }

    let layers = if config.validation {
        check_validation_layers(entry, &config.validation_layers)?;
        config.validation_layers.clone()
    } else {
        vec![]
    };

    let app_name = CString::new(config.app_name.as_str()).unwrap_or_default();
    let engine_name = CString::new(config.engine_name.as_str()).unwrap_or_default();

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 1, 0, 0))
        .engine_name(&engine_name)
        .engine_version(vk::make_api_version(0, 1, 0, 0))
        .api_version(vk::API_VERSION_1_3);

    let extension_names: Vec<*const i8> = config
        .instance_extensions
        .iter()
        .chain(platform.iter())
        .map(|ext| ext.as_ptr())
        .collect();
    let layer_names: Vec<*const i8> = layers.iter().map(|l| l.as_ptr()).collect();

    // Required for MoltenVK on macOS
    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .flags(create_flags);

    let instance = entry.create_instance(&create_info, None)?;

    Ok(instance)
}

/// Verify that every mandatory instance extension is available.
fn check_instance_extensions(available: &[&CStr], required: &[&'static CStr]) -> Result<()> {
    for ext in required {
        if !available.contains(ext) {
            return Err(GpuError::MissingExtension(
                ext.to_string_lossy().into_owned(),
            ));
        }
    }
    Ok(())
}

/// Intersect the platform surface candidates with what the driver offers,
/// preserving candidate order. One survivor is enough to present; an empty
/// result means startup must abort.
pub fn supported_platform_extensions<'a>(
    candidates: &[&'a CStr],
    available: &[&CStr],
) -> Vec<&'a CStr> {
    candidates
        .iter()
        .copied()
        .filter(|candidate| available.contains(candidate))
        .collect()
}

/// Verify that every mandatory validation layer is available.
unsafe fn check_validation_layers(entry: &ash::Entry, required: &[&'static CStr]) -> Result<()> {
    let available = entry.enumerate_instance_layer_properties()?;
    for layer in required {
        let found = available
            .iter()
            .any(|props| unsafe { CStr::from_ptr(props.layer_name.as_ptr()) } == *layer);
        if !found {
            return Err(GpuError::MissingLayer(layer.to_string_lossy().into_owned()));
        }
    }
    Ok(())
}

/// Capability summary of one enumerable accelerator, as used by the
/// scoring policy. Transient; exists only during negotiation.
#[derive(Debug, Clone, Copy)]
pub struct PhysicalCandidate {
    pub device_type: vk::PhysicalDeviceType,
    pub supports_geometry_shader: bool,
    pub supports_tessellation_shader: bool,
    pub supports_required_extensions: bool,
}

/// Score a candidate accelerator. `None` means the candidate fails
/// mandatory checks and must be discarded.
///
/// Dedicated accelerators outrank integrated, which outrank everything
/// else; optional advanced stages add a small increment on top.
pub fn score_candidate(candidate: &PhysicalCandidate) -> Option<u32> {
    if !candidate.supports_required_extensions {
        return None;
    }

    let mut score = match candidate.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        _ => 10,
    };

    if candidate.supports_geometry_shader {
        score += 1;
    }
    if candidate.supports_tessellation_shader {
        score += 1;
    }

    Some(score)
}

/// Pick the highest-scoring candidate index. Ties are broken by
/// enumeration order: the first seen wins.
pub fn select_best_candidate(candidates: &[PhysicalCandidate]) -> Option<usize> {
    let mut best: Option<(usize, u32)> = None;

    for (index, candidate) in candidates.iter().enumerate() {
        let Some(score) = score_candidate(candidate) else {
            continue;
        };
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((index, score)),
        }
    }

    best.map(|(index, _)| index)
}

/// Select the best physical device for the given requirements.
///
/// # Safety
/// The instance must be valid.
pub unsafe fn select_physical_device(
    instance: &ash::Instance,
    config: &ContextConfig,
) -> Result<vk::PhysicalDevice> {
    let devices = instance.enumerate_physical_devices()?;

    if devices.is_empty() {
        return Err(GpuError::NoSuitableDevice);
    }

    let candidates: Vec<PhysicalCandidate> = devices
        .iter()
        .map(|&device| examine_physical_device(instance, device, &config.device_extensions))
        .collect();

    let best = select_best_candidate(&candidates).ok_or(GpuError::NoSuitableDevice)?;

    let properties = instance.get_physical_device_properties(devices[best]);
    let name = CStr::from_ptr(properties.device_name.as_ptr()).to_string_lossy();
    tracing::info!("Selected GPU: {name} ({:?})", properties.device_type);

    Ok(devices[best])
}

/// Build a scoring summary for one physical device.
unsafe fn examine_physical_device(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    required_extensions: &[&'static CStr],
) -> PhysicalCandidate {
    let properties = instance.get_physical_device_properties(device);
    let features = instance.get_physical_device_features(device);

    let available = instance
        .enumerate_device_extension_properties(device)
        .unwrap_or_default();

    let supports_required_extensions = required_extensions.iter().all(|required| {
        available
            .iter()
            .any(|props| unsafe { CStr::from_ptr(props.extension_name.as_ptr()) } == *required)
    });

    PhysicalCandidate {
        device_type: properties.device_type,
        supports_geometry_shader: features.geometry_shader == vk::TRUE,
        supports_tessellation_shader: features.tessellation_shader == vk::TRUE,
        supports_required_extensions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(device_type: vk::PhysicalDeviceType) -> PhysicalCandidate {
        PhysicalCandidate {
            device_type,
            supports_geometry_shader: false,
            supports_tessellation_shader: false,
            supports_required_extensions: true,
        }
    }

    #[test]
    fn discrete_outranks_integrated_outranks_other() {
        let discrete = score_candidate(&candidate(vk::PhysicalDeviceType::DISCRETE_GPU)).unwrap();
        let integrated =
            score_candidate(&candidate(vk::PhysicalDeviceType::INTEGRATED_GPU)).unwrap();
        let cpu = score_candidate(&candidate(vk::PhysicalDeviceType::CPU)).unwrap();
        let other = score_candidate(&candidate(vk::PhysicalDeviceType::OTHER)).unwrap();

        assert!(discrete > integrated);
        assert!(integrated > cpu);
        assert!(integrated > other);
    }

    #[test]
    fn optional_features_break_type_ties() {
        let plain = candidate(vk::PhysicalDeviceType::DISCRETE_GPU);
        let rich = PhysicalCandidate {
            supports_geometry_shader: true,
            supports_tessellation_shader: true,
            ..plain
        };

        assert!(score_candidate(&rich).unwrap() > score_candidate(&plain).unwrap());

        // A feature-rich integrated part still never outranks a discrete one.
        let rich_integrated = PhysicalCandidate {
            device_type: vk::PhysicalDeviceType::INTEGRATED_GPU,
            ..rich
        };
        assert!(score_candidate(&plain).unwrap() > score_candidate(&rich_integrated).unwrap());
    }

    #[test]
    fn missing_mandatory_extensions_discards_candidate() {
        let unsupported = PhysicalCandidate {
            supports_required_extensions: false,
            ..candidate(vk::PhysicalDeviceType::DISCRETE_GPU)
        };
        assert_eq!(score_candidate(&unsupported), None);

        // Even when it is the only candidate.
        assert_eq!(select_best_candidate(&[unsupported]), None);
    }

    #[test]
    fn highest_score_wins() {
        let candidates = [
            candidate(vk::PhysicalDeviceType::INTEGRATED_GPU),
            candidate(vk::PhysicalDeviceType::DISCRETE_GPU),
            candidate(vk::PhysicalDeviceType::CPU),
        ];
        assert_eq!(select_best_candidate(&candidates), Some(1));
    }

    #[test]
    fn equal_scores_favor_enumeration_order() {
        let candidates = [
            candidate(vk::PhysicalDeviceType::DISCRETE_GPU),
            candidate(vk::PhysicalDeviceType::DISCRETE_GPU),
        ];
        assert_eq!(select_best_candidate(&candidates), Some(0));
    }

    #[test]
    fn single_platform_surface_extension_suffices() {
        let candidates: Vec<&CStr> = vec![c"VK_KHR_xlib_surface", c"VK_KHR_wayland_surface"];

        // Wayland-only driver: no xlib, presentation still possible.
        let available: Vec<&CStr> = vec![c"VK_KHR_surface", c"VK_KHR_wayland_surface"];
        let supported = supported_platform_extensions(&candidates, &available);
        assert_eq!(supported, vec![c"VK_KHR_wayland_surface"]);

        // X-only driver.
        let available: Vec<&CStr> = vec![c"VK_KHR_surface", c"VK_KHR_xlib_surface"];
        let supported = supported_platform_extensions(&candidates, &available);
        assert_eq!(supported, vec![c"VK_KHR_xlib_surface"]);
    }

    #[test]
    fn no_platform_surface_extension_leaves_nothing_to_enable() {
        let candidates: Vec<&CStr> = vec![c"VK_KHR_xlib_surface", c"VK_KHR_wayland_surface"];
        let available: Vec<&CStr> = vec![c"VK_KHR_surface"];

        assert!(supported_platform_extensions(&candidates, &available).is_empty());
    }

    #[test]
    fn missing_mandatory_instance_extension_is_fatal() {
        let available: Vec<&CStr> = vec![c"VK_KHR_wayland_surface"];
        let result = check_instance_extensions(&available, &[c"VK_KHR_surface"]);
        assert!(matches!(result, Err(GpuError::MissingExtension(_))));

        let available: Vec<&CStr> = vec![c"VK_KHR_surface"];
        assert!(check_instance_extensions(&available, &[c"VK_KHR_surface"]).is_ok());
    }

    #[test]
    fn no_passing_candidate_fails_negotiation() {
        assert_eq!(select_best_candidate(&[]), None);

        let all_failing = [
            PhysicalCandidate {
                supports_required_extensions: false,
                ..candidate(vk::PhysicalDeviceType::DISCRETE_GPU)
            },
            PhysicalCandidate {
                supports_required_extensions: false,
                ..candidate(vk::PhysicalDeviceType::INTEGRATED_GPU)
            },
        ];
        assert_eq!(select_best_candidate(&all_failing), None);
    }
}
