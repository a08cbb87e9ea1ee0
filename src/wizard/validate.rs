//! Input checks shared by the built-in state handlers.

use crate::config::Component;
use crate::data::{keys, WorkflowData};
use crate::disk;
use crate::error::ValidationError;
use crate::types::WizardMode;
use std::path::PathBuf;

pub fn license_accepted(data: &WorkflowData) -> Result<(), ValidationError> {
    match data.get_bool(keys::ACCEPT_LICENSE) {
        Some(true) => Ok(()),
        _ => Err(ValidationError::new(
            keys::ACCEPT_LICENSE,
            "the license agreement must be accepted to continue",
        )),
    }
}

/// At least one component, no unknown ids, every required id present.
pub fn component_selection(
    data: &WorkflowData,
    components: &[Component],
) -> Result<(), ValidationError> {
    let field = keys::SELECTED_COMPONENTS;
    let selected = data
        .get_string_list(field)
        .ok_or_else(|| ValidationError::new(field, "no component selection recorded"))?;

    if selected.is_empty() {
        return Err(ValidationError::new(field, "select at least one component"));
    }
    if let Some(unknown) = selected
        .iter()
        .find(|id| !components.iter().any(|c| &c.id == *id))
    {
        return Err(ValidationError::new(
            field,
            format!("unknown component '{}'", unknown),
        ));
    }

    let missing: Vec<&str> = components
        .iter()
        .filter(|c| c.required && !selected.contains(&c.id))
        .map(|c| c.id.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::new(
            field,
            format!("required component(s) missing: {}", missing.join(", ")),
        ));
    }
    Ok(())
}

/// Non-empty, absolute, below an existing directory, and with enough room
/// when a minimum is configured. Returns the parsed path.
pub fn install_path(
    data: &WorkflowData,
    min_free_space: Option<u64>,
) -> Result<PathBuf, ValidationError> {
    let field = keys::INSTALL_PATH;
    let raw = data.get_str(field).map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(ValidationError::new(field, "an install location is required"));
    }

    let path = PathBuf::from(raw);
    if !path.is_absolute() {
        return Err(ValidationError::new(
            field,
            format!("{} is not an absolute path", path.display()),
        ));
    }

    let anchor = disk::nearest_existing_ancestor(&path).ok_or_else(|| {
        ValidationError::new(field, format!("{} cannot be resolved", path.display()))
    })?;
    if !anchor.is_dir() {
        return Err(ValidationError::new(
            field,
            format!("{} is not a directory", anchor.display()),
        ));
    }

    if let Some(required) = min_free_space {
        match disk::available_space(&anchor) {
            Ok(free) if free < required => {
                return Err(ValidationError::new(
                    field,
                    format!(
                        "not enough free space at {}: {} bytes available, {} required",
                        anchor.display(),
                        free,
                        required
                    ),
                ));
            }
            Ok(_) => {}
            Err(e) => log::debug!("Free space unknown for {}: {}", anchor.display(), e),
        }
    }

    Ok(path)
}

/// The branch picked in the advanced wizard. Only express and custom are
/// valid answers.
pub fn chosen_mode(data: &WorkflowData) -> Result<WizardMode, ValidationError> {
    let field = keys::INSTALL_MODE;
    let raw = data
        .get_str(field)
        .ok_or_else(|| ValidationError::new(field, "choose an install mode"))?;
    match raw.parse::<WizardMode>() {
        Ok(mode @ (WizardMode::Express | WizardMode::Custom)) => Ok(mode),
        _ => Err(ValidationError::new(
            field,
            format!("'{}' is not an install mode (express or custom)", raw),
        )),
    }
}
