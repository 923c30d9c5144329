use std::ffi::CString;

use crate::error::{LoadError, Result};

use super::{ModelCreateFn, ModelDestroyFn, ModelInterface, ModelStepFn};

const SYM_CREATE: &[u8] = b"model_create\0";
const SYM_STEP: &[u8] = b"model_step\0";
const SYM_DESTROY: &[u8] = b"model_destroy\0";

/// Opens `dynlib_path`, resolves the fixed `model_create`/`model_step`/
/// `model_destroy` symbols, and calls `model_create(instance, yaml_path)`
/// if the library exports one.
///
/// `model_create`, `model_step` and `model_destroy` are each resolved
/// independently and are all optional; a library exporting neither
/// `model_create` nor `model_step` is a fatal, completely empty interface
/// ([`LoadError::IncompleteInterface`]), matching §4.1. A create-only
/// model (no `model_step`) loads fine — its step is the no-op advance
/// [`ModelInterface::step`] falls back to.
pub fn load_model(instance: &str, dynlib_path: &str, yaml_path: &str) -> Result<ModelInterface> {
    let lib = unsafe { libloading::Library::new(dynlib_path) }.map_err(|e| LoadError::OpenFailed {
        path: dynlib_path.to_string(),
        reason: e.to_string(),
    })?;

    let step: Option<ModelStepFn> = unsafe { lib.get::<ModelStepFn>(SYM_STEP).ok().map(|sym| *sym) };
    let create: Option<ModelCreateFn> = unsafe { lib.get::<ModelCreateFn>(SYM_CREATE).ok().map(|sym| *sym) };
    let destroy: Option<ModelDestroyFn> = unsafe { lib.get::<ModelDestroyFn>(SYM_DESTROY).ok().map(|sym| *sym) };

    if create.is_none() && step.is_none() {
        return Err(LoadError::IncompleteInterface {
            instance: instance.to_string(),
        }
        .into());
    }

    let desc = match create {
        Some(create) => {
            let c_name = CString::new(instance).map_err(|_| LoadError::IncompleteInterface {
                instance: instance.to_string(),
            })?;
            let c_yaml = CString::new(yaml_path).map_err(|_| LoadError::IncompleteInterface {
                instance: instance.to_string(),
            })?;
            unsafe { create(c_name.as_ptr(), c_yaml.as_ptr()) }
        }
        None => std::ptr::null_mut(),
    };

    Ok(ModelInterface::new(lib, step, destroy, desc))
}
