use cpal::traits::{DeviceTrait, HostTrait};
use cpal::Device;

fn get_host() -> cpal::Host {
    cpal::default_host()
}

/// Find an input device by name, or fall back to the host default.
pub fn get_or_default_input(device_name: Option<String>) -> anyhow::Result<Device> {
    let host = get_host();
    tracing::debug!("host: {:?}", host.id());

    let Some(target) = device_name else {
        return host
            .default_input_device()
            .ok_or_else(|| anyhow::anyhow!("no default input device"));
    };

    host.input_devices()?
        .find(|device| device.name().is_ok_and(|name| name == target))
        .ok_or_else(|| anyhow::anyhow!("input device {:?} not found", target))
}

/// Find an output device by name, or fall back to the host default.
pub fn get_or_default_output(device_name: Option<String>) -> anyhow::Result<Device> {
    let host = get_host();

    let Some(target) = device_name else {
        return host
            .default_output_device()
            .ok_or_else(|| anyhow::anyhow!("no default output device"));
    };

    host.output_devices()?
        .find(|device| device.name().is_ok_and(|name| name == target))
        .ok_or_else(|| anyhow::anyhow!("output device {:?} not found", target))
}
