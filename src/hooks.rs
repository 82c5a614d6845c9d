use crate::response::Response;
use crate::Error;
use rand::distr::Alphanumeric;
use rand::Rng;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

///
/// A callable adjusting every matched response while it is registered.
///
pub type Hook = Arc<dyn Fn(&mut Response) -> Result<(), Error> + Send + Sync>;

#[derive(Clone, Default)]
pub(crate) struct HookRegistry {
    hooks: Arc<Mutex<Vec<(String, Hook)>>>,
}

impl HookRegistry {
    pub(crate) fn register(&self, hook: Hook) -> HookGuard {
        let id: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .map(char::from)
            .take(24)
            .collect();

        self.lock().push((id.clone(), hook));
        log::trace!("registered dynamic hook {}", id);

        HookGuard {
            registry: self.clone(),
            id,
        }
    }

    ///
    /// Runs every registered hook on `response`, in registration order. The first failing hook
    /// stops the chain.
    ///
    pub(crate) fn apply(&self, response: &mut Response) -> Result<(), Error> {
        // Hooks run unlocked so they may register or drop other hooks.
        let hooks: Vec<Hook> = self.lock().iter().map(|(_, hook)| hook.clone()).collect();

        for hook in hooks {
            hook(&mut *response)?;
        }

        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn ids(&self) -> Vec<String> {
        self.lock().iter().map(|(id, _)| id.clone()).collect()
    }

    fn remove(&self, id: &str) {
        let mut hooks = self.lock();
        if let Some(pos) = hooks.iter().position(|(hook_id, _)| hook_id == id) {
            hooks.remove(pos);
            log::trace!("removed dynamic hook {}", id);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(String, Hook)>> {
        self.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

///
/// Keeps a dynamic hook registered. The hook is removed when the guard is dropped, whichever
/// way the scope holding it is left.
///
#[must_use = "the hook is removed as soon as the guard is dropped"]
pub struct HookGuard {
    registry: HookRegistry,
    id: String,
}

impl HookGuard {
    /// The identifier of the registration.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Debug for HookGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookGuard").field("id", &self.id).finish()
    }
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}
