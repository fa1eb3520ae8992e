//! Process-wide channel for failures nobody is waiting on.
//!
//! A panic raised by a lookup callback has no caller left to return to, so
//! it is caught at the completion step and reported here instead of being
//! re-raised into the runtime. Without a hook installed the report is
//! logged at `error` level.

use std::any::Any;
use std::sync::Arc;

use parking_lot::{const_rwlock, RwLock};
use tracing::error;

/// A panic that escaped a lookup callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackPanic {
    /// Host the failed lookup was issued for.
    pub host: String,
    /// Panic message, when the payload was a string.
    pub message: String,
}

impl CallbackPanic {
    pub(crate) fn from_payload(host: &str, payload: Box<dyn Any + Send>) -> Self {
        Self {
            host: host.to_string(),
            message: panic_message(payload.as_ref()),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

type Hook = Arc<dyn Fn(&CallbackPanic) + Send + Sync>;

static HOOK: RwLock<Option<Hook>> = const_rwlock(None);

/// Install `hook` as the receiver for unhandled callback failures,
/// replacing any previous one.
pub fn set_hook<F>(hook: F)
where
    F: Fn(&CallbackPanic) + Send + Sync + 'static,
{
    *HOOK.write() = Some(Arc::new(hook));
}

/// Remove the installed hook and go back to logging.
pub fn clear_hook() {
    *HOOK.write() = None;
}

/// Hand a failure to the installed hook.
pub fn report(panic: CallbackPanic) {
    // clone out so the hook runs without the lock held
    let hook = HOOK.read().clone();
    match hook {
        Some(hook) => hook(&panic),
        None => error!(
            host = %panic.host,
            message = %panic.message,
            "unhandled panic in lookup callback"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_messages() {
        let p = CallbackPanic::from_payload("a", Box::new("boom"));
        assert_eq!(p.message, "boom");
        let p = CallbackPanic::from_payload("b", Box::new(String::from("bang")));
        assert_eq!(p.message, "bang");
        assert_eq!(p.host, "b");
        let p = CallbackPanic::from_payload("c", Box::new(7u8));
        assert_eq!(p.message, "non-string panic payload");
    }
}
