//! Input device lookup by name substring

use cpal::traits::{DeviceTrait, HostTrait};

use crate::{Error, Result};

/// List the names of all input devices, in enumeration order
///
/// # Errors
///
/// Returns error if the audio host cannot enumerate devices
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| Error::Audio(e.to_string()))?;

    Ok(devices
        .map(|d| d.name().unwrap_or_else(|_| "<unnamed>".to_string()))
        .collect())
}

/// Index of the first device whose name contains `target`
#[must_use]
pub fn find_input_device<S: AsRef<str>>(names: &[S], target: &str) -> Option<usize> {
    names.iter().position(|n| n.as_ref().contains(target))
}

/// Resolve the microphone index, falling back when nothing matches
///
/// Wake detection and command capture share one enumeration, so a single
/// index serves both.
#[must_use]
pub fn resolve_input_device<S: AsRef<str>>(names: &[S], target: &str, fallback: usize) -> usize {
    if let Some(index) = find_input_device(names, target) {
        tracing::info!(index, name = names[index].as_ref(), "found microphone");
        index
    } else {
        tracing::warn!(
            target,
            fallback,
            "could not find microphone, using fallback index for wake detection and capture"
        );
        fallback
    }
}
