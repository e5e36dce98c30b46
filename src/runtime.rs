//! Binding to a host runtime that must know about every thread calling into
//! the decoder.
//!
//! Embedders whose own runtime requires threads to be registered before they
//! call back into it install a [`RuntimeBinding`] once per process. Every
//! decoder entry point then attaches the calling thread on first use; the
//! thread stays attached until it exits. Without an installed binding nothing
//! happens.
//!
//! ```
//! use stream_decoder::runtime::{self, RuntimeBinding};
//! use stream_decoder::BindingError;
//!
//! struct Registry;
//!
//! impl RuntimeBinding for Registry {
//!     fn attach_current_thread(&self) -> Result<(), BindingError> {
//!         Ok(())
//!     }
//!
//!     fn detach_current_thread(&self) {}
//! }
//!
//! runtime::install_binding(Registry).unwrap();
//! assert!(runtime::is_installed());
//! ```

use std::cell::RefCell;
use std::sync::OnceLock;

use tracing::{debug, trace};

use crate::error::BindingError;

/// Registers threads with a host runtime.
pub trait RuntimeBinding: Send + Sync + 'static {
    /// Makes the current thread known to the runtime.
    fn attach_current_thread(&self) -> Result<(), BindingError>;

    /// Releases the current thread. Called once, when the thread exits.
    fn detach_current_thread(&self);
}

static BINDING: OnceLock<Box<dyn RuntimeBinding>> = OnceLock::new();

/// Installs the process-wide binding.
///
/// # Errors
///
/// Fails if a binding is already installed; the first one stays in place.
pub fn install_binding(binding: impl RuntimeBinding) -> Result<(), BindingError> {
    BINDING
        .set(Box::new(binding))
        .map_err(|_| BindingError("a runtime binding is already installed".to_owned()))?;
    debug!("runtime binding installed");
    Ok(())
}

/// Whether a binding has been installed.
pub fn is_installed() -> bool {
    BINDING.get().is_some()
}

/// Detaches its thread when the thread-local is destroyed.
struct Attachment {
    binding: &'static dyn RuntimeBinding,
}

impl Drop for Attachment {
    fn drop(&mut self) {
        trace!("detaching thread from runtime binding");
        self.binding.detach_current_thread();
    }
}

thread_local! {
    static ATTACHMENT: RefCell<Option<Attachment>> = const { RefCell::new(None) };
}

/// Attaches the current thread to the installed binding unless it already is.
pub(crate) fn ensure_call_context() -> Result<(), BindingError> {
    let Some(binding) = BINDING.get() else {
        return Ok(());
    };

    ATTACHMENT
        .try_with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.is_none() {
                binding.attach_current_thread()?;
                trace!("attached thread to runtime binding");
                *slot = Some(Attachment {
                    binding: binding.as_ref(),
                });
            }
            Ok(())
        })
        .map_err(|_| BindingError("thread is shutting down".to_owned()))?
}
