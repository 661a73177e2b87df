//! Scoped overrides of session values.
//!
//! Some session values (completion timeout, recovery state) are swapped for the duration of one
//! operation and must be restored afterwards, no matter how the operation ends. [`Scoped`] holds
//! the previous value and writes it back when dropped, including on early returns with `?` and on
//! unwinding.

use std::ops::{Deref, DerefMut};

/// A guard that temporarily replaces one field of `S` and restores it on drop.
///
/// The guard dereferences to `S`, so the overridden value is in effect for everything done
/// through it.
///
/// ```
/// use specan::Scoped;
///
/// struct Settings { timeout_ms: u32 }
///
/// let mut settings = Settings { timeout_ms: 100 };
/// {
///     let scoped = Scoped::new(&mut settings, |s| &mut s.timeout_ms, 5000);
///     assert_eq!(scoped.timeout_ms, 5000);
/// }
/// assert_eq!(settings.timeout_ms, 100);
/// ```
pub struct Scoped<'a, S, V> {
    target: &'a mut S,
    field: fn(&mut S) -> &mut V,
    previous: Option<V>,
}

impl<'a, S, V> Scoped<'a, S, V> {
    /// Replace the field selected by `field` with `value` until the guard is dropped.
    pub fn new(target: &'a mut S, field: fn(&mut S) -> &mut V, value: V) -> Self {
        let previous = std::mem::replace(field(target), value);
        Self {
            target,
            field,
            previous: Some(previous),
        }
    }

    /// The value that will be restored.
    pub fn previous(&self) -> Option<&V> {
        self.previous.as_ref()
    }
}

impl<S, V> Deref for Scoped<'_, S, V> {
    type Target = S;

    fn deref(&self) -> &S {
        self.target
    }
}

impl<S, V> DerefMut for Scoped<'_, S, V> {
    fn deref_mut(&mut self) -> &mut S {
        self.target
    }
}

impl<S, V> Drop for Scoped<'_, S, V> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            *(self.field)(self.target) = previous;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Settings {
        timeout: u32,
        name: String,
    }

    fn fails(settings: &mut Settings) -> Result<(), String> {
        let scoped = Scoped::new(settings, |s| &mut s.timeout, 9000);
        assert_eq!(scoped.timeout, 9000);
        Err::<(), String>("boom".to_string())?;
        Ok(())
    }

    #[test]
    fn test_restored_on_error_path() {
        let mut settings = Settings {
            timeout: 10,
            name: "a".to_string(),
        };
        assert!(fails(&mut settings).is_err());
        assert_eq!(settings.timeout, 10);
    }

    #[test]
    fn test_nested_overrides_restore_in_order() {
        let mut settings = Settings {
            timeout: 1,
            name: "outer".to_string(),
        };
        {
            let mut outer = Scoped::new(&mut settings, |s| &mut s.timeout, 2);
            {
                let inner = Scoped::new(&mut *outer, |s| &mut s.timeout, 3);
                assert_eq!(inner.previous(), Some(&2));
                assert_eq!(inner.timeout, 3);
            }
            assert_eq!(outer.timeout, 2);
        }
        assert_eq!(settings.timeout, 1);
    }

    #[test]
    fn test_mutation_through_guard_is_kept_for_other_fields() {
        let mut settings = Settings {
            timeout: 1,
            name: "old".to_string(),
        };
        {
            let mut scoped = Scoped::new(&mut settings, |s| &mut s.timeout, 2);
            scoped.name = "new".to_string();
        }
        assert_eq!(settings.timeout, 1);
        assert_eq!(settings.name, "new");
    }

    #[test]
    fn test_restored_on_unwind() {
        let mut settings = Settings {
            timeout: 7,
            name: String::new(),
        };
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _scoped = Scoped::new(&mut settings, |s| &mut s.timeout, 8);
            panic!("unwinding");
        }));
        assert!(result.is_err());
        assert_eq!(settings.timeout, 7);
    }
}
