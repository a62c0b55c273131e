use std::{cell::RefCell, ffi::OsStr, time::Duration};

#[derive(Clone, Copy)]
struct Env {
    /// Zero means no deadline.
    timeout_ms: u64,
    minimal: bool,
}

thread_local! {
    /// Must only be mutated within `set_env`
    static ENV: RefCell<Option<Env>> = const { RefCell::new(None) };
}

pub fn init() {
    let value = Env {
        timeout_ms: var_u64("RAILS_TIMEOUT_MS").unwrap_or(0),
        minimal: var_is("RAILS_MINIMAL", "1"),
    };
    set_env(value);
}

/// Default deadline for a run, if any.
pub fn default_timeout() -> Option<Duration> {
    with_env(|env| (env.timeout_ms > 0).then(|| Duration::from_millis(env.timeout_ms)))
}

pub fn is_minimal_forced() -> bool {
    with_env(|env| env.minimal)
}

fn set_env(value: Env) {
    ENV.with(|env| {
        let mut env = env.borrow_mut();
        assert!(
            env.is_none(),
            "tried to initialize environment state multiple times"
        );
        *env = Some(value);
    });
}

fn with_env<F, R>(callback: F) -> R
where
    F: Fn(&Env) -> R,
{
    ENV.with(|env| {
        let env = env.borrow();
        let env = env.unwrap_or_else(|| {
            panic!("tried to access environment state before initialization");
        });
        callback(&env)
    })
}

fn var_is(name: impl AsRef<OsStr>, value: impl AsRef<str>) -> bool {
    std::env::var(name.as_ref()).is_ok_and(|v| v == value.as_ref())
}

/// Unparseable values are treated as unset.
fn var_u64(name: impl AsRef<OsStr>) -> Option<u64> {
    std::env::var(name.as_ref()).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_zero_means_none() {
        // Each test thread has its own environment slot
        set_env(Env {
            timeout_ms: 0,
            minimal: false,
        });
        assert_eq!(default_timeout(), None);
        assert!(!is_minimal_forced());
    }

    #[test]
    fn timeout_from_millis() {
        set_env(Env {
            timeout_ms: 250,
            minimal: true,
        });
        assert_eq!(default_timeout(), Some(Duration::from_millis(250)));
        assert!(is_minimal_forced());
    }

    #[test]
    #[should_panic(expected = "before initialization")]
    fn read_before_init() {
        default_timeout();
    }
}
