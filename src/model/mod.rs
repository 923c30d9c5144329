//!
//! Dynamically loaded model libraries and the fixed FFI ABI they export.
//!

mod loader;
pub use self::loader::load_model;

use std::os::raw::{c_char, c_double, c_int, c_void};

/// Opaque handle a model implementation allocates in `model_create` and
/// receives back in `model_step`/`model_destroy`. The host never
/// dereferences it.
pub type ModelDesc = *mut c_void;

/// `void* model_create(const char *name, const char *yaml_path)`
pub type ModelCreateFn = unsafe extern "C" fn(name: *const c_char, yaml_path: *const c_char) -> ModelDesc;

/// `int model_step(void *desc, double *model_time, double stop_time)`
pub type ModelStepFn = unsafe extern "C" fn(desc: ModelDesc, model_time: *mut c_double, stop_time: c_double) -> c_int;

/// `void model_destroy(void *desc)`
pub type ModelDestroyFn = unsafe extern "C" fn(desc: ModelDesc);

/// The resolved FFI interface for one loaded model instance, plus the
/// opaque descriptor `create` returned (or a null pointer, for a model
/// that does not export `model_create`).
///
/// `model_create`, `model_step` and `model_destroy` are each
/// independently optional (§6); loading only fails when *both*
/// `model_create` and `model_step` are absent. A model with no
/// `model_step` of its own simply advances `model_time` to `stop_time`
/// and reports success, the same as the built-in gateway stub. Dropping
/// this calls `model_destroy` exactly once, if the library exported one;
/// the backing `libloading::Library` is kept alive alongside it so the
/// function pointers it holds are never dangling.
pub struct ModelInterface {
    lib: libloading::Library,
    step: Option<ModelStepFn>,
    destroy: Option<ModelDestroyFn>,
    desc: ModelDesc,
}

// SAFETY: the host calls into a loaded model's exported functions only
// from the single thread that drives the step loop; no interior mutation
// of `self` ever races with another handle to the same library.
unsafe impl Send for ModelInterface {}

// SAFETY: `step` takes `&self` and performs no interior mutation visible
// across threads; required so `Arc<ModelInterface>` (shared between a
// `ControllerModel` and the auto-registered `ModelFunction` closure that
// calls it) can itself be `Send` for the process-wide controller.
unsafe impl Sync for ModelInterface {}

impl ModelInterface {
    pub(crate) fn new(
        lib: libloading::Library,
        step: Option<ModelStepFn>,
        destroy: Option<ModelDestroyFn>,
        desc: ModelDesc,
    ) -> Self {
        Self {
            lib,
            step,
            destroy,
            desc,
        }
    }

    /// Invokes the model's step function for the current tick.
    ///
    /// `model_time` is passed by reference and may be advanced by the
    /// model itself (per the ABI); the host always re-reads it back. A
    /// positive return code means "model requests exit" and is reported
    /// to the caller but does not poison the handle: callers decide
    /// whether a single model's exit request should end the whole run.
    ///
    /// A model that exports no `model_step` (create-only) has nothing to
    /// run here; it simply advances to `stop_time` and reports success,
    /// matching the built-in gateway stub's own no-op step.
    pub fn step(&self, model_time: &mut f64, stop_time: f64) -> i32 {
        match self.step {
            Some(step) => unsafe { step(self.desc, model_time as *mut f64, stop_time) },
            None => {
                *model_time = stop_time;
                0
            }
        }
    }
}

impl Drop for ModelInterface {
    fn drop(&mut self) {
        if let Some(destroy) = self.destroy {
            unsafe { destroy(self.desc) }
        }
        // `lib` is dropped after `desc`'s owner releases it, so the
        // symbols above remain valid for the unsafe call.
        let _ = &self.lib;
    }
}

impl std::fmt::Debug for ModelInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelInterface").finish_non_exhaustive()
    }
}
