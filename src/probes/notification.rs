//! Notification blocking via Focus Assist.
//!
//! The blocker backs up the current Focus Assist setting, writes the
//! alarms-only mode, and restores the backup when disabled or dropped.
//! `check` compares the stored value against what was written; external
//! changes inside the grace window after our own write are not reported,
//! since the shell echoes programmatic writes back asynchronously.
//!
//! One blocker per process: the OS setting is global state and two
//! instances would fight over the backup.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Focus Assist "alarms only" mode.
pub const ALARMS_ONLY: u32 = 2;

/// External changes within this window after our own write are ignored.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(5000);

static ACTIVE: AtomicBool = AtomicBool::new(false);

#[derive(Debug)]
pub enum NotificationError {
    /// Another blocker instance is alive in this process.
    AlreadyActive,
    /// No supported setting store on this platform.
    Unsupported,
    Store(String),
}

impl std::fmt::Display for NotificationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationError::AlreadyActive => {
                write!(f, "a notification blocker is already active")
            }
            NotificationError::Unsupported => {
                write!(f, "notification blocking is not supported on this platform")
            }
            NotificationError::Store(e) => write!(f, "setting store error: {e}"),
        }
    }
}

impl std::error::Error for NotificationError {}

/// Tamper verdict from [`NotificationBlocker::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TamperState {
    /// Blocking is not enabled.
    Inactive,
    /// The setting still holds the value we wrote.
    Intact,
    /// The setting differs but we wrote recently; not yet a verdict.
    GracePeriod,
    Tampered { expected: u32, found: u32 },
}

/// Storage for the Focus Assist value. The registry on Windows; an
/// in-memory store for tests.
pub trait SettingStore: Send {
    fn read(&mut self) -> Result<u32, String>;
    fn write(&mut self, value: u32) -> Result<(), String>;
}

/// In-memory store, for tests and harnesses.
#[derive(Debug, Default)]
pub struct MemoryStore {
    value: u32,
}

impl MemoryStore {
    pub fn new(value: u32) -> Self {
        Self { value }
    }
}

impl SettingStore for MemoryStore {
    fn read(&mut self) -> Result<u32, String> {
        Ok(self.value)
    }

    fn write(&mut self, value: u32) -> Result<(), String> {
        self.value = value;
        Ok(())
    }
}

pub struct NotificationBlocker {
    store: Box<dyn SettingStore>,
    grace: Duration,
    backup: Option<u32>,
    last_write: Option<Instant>,
    enabled: bool,
}

impl NotificationBlocker {
    /// Build against the platform store.
    pub fn new() -> Result<Self, NotificationError> {
        Self::with_store(default_store()?, DEFAULT_GRACE_PERIOD)
    }

    /// Build against a caller-supplied store with a custom grace period.
    pub fn with_store(
        store: Box<dyn SettingStore>,
        grace: Duration,
    ) -> Result<Self, NotificationError> {
        if ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(NotificationError::AlreadyActive);
        }
        Ok(Self {
            store,
            grace,
            backup: None,
            last_write: None,
            enabled: false,
        })
    }

    /// Back up the current value and write alarms-only mode.
    pub fn enable(&mut self) -> Result<(), NotificationError> {
        if self.enabled {
            return Ok(());
        }
        let current = self.store.read().map_err(NotificationError::Store)?;
        self.store
            .write(ALARMS_ONLY)
            .map_err(NotificationError::Store)?;
        self.backup = Some(current);
        self.last_write = Some(Instant::now());
        self.enabled = true;
        tracing::info!(previous = current, "notification blocking enabled");
        Ok(())
    }

    /// Restore the backed-up value.
    pub fn disable(&mut self) -> Result<(), NotificationError> {
        if !self.enabled {
            return Ok(());
        }
        if let Some(backup) = self.backup.take() {
            self.store.write(backup).map_err(NotificationError::Store)?;
        }
        self.last_write = Some(Instant::now());
        self.enabled = false;
        tracing::info!("notification blocking disabled, setting restored");
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Compare the live value against what we wrote.
    pub fn check(&mut self) -> TamperState {
        if !self.enabled {
            return TamperState::Inactive;
        }
        let found = match self.store.read() {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "could not read notification setting");
                return TamperState::GracePeriod;
            }
        };
        if found == ALARMS_ONLY {
            return TamperState::Intact;
        }
        let within_grace = self
            .last_write
            .map(|at| at.elapsed() < self.grace)
            .unwrap_or(false);
        if within_grace {
            TamperState::GracePeriod
        } else {
            TamperState::Tampered {
                expected: ALARMS_ONLY,
                found,
            }
        }
    }
}

impl Drop for NotificationBlocker {
    fn drop(&mut self) {
        if let Err(e) = self.disable() {
            tracing::warn!(error = %e, "failed to restore notification setting");
        }
        ACTIVE.store(false, Ordering::SeqCst);
    }
}

fn default_store() -> Result<Box<dyn SettingStore>, NotificationError> {
    #[cfg(target_os = "windows")]
    {
        return Ok(Box::new(registry::FocusAssistStore));
    }
    #[allow(unreachable_code)]
    Err(NotificationError::Unsupported)
}

#[cfg(target_os = "windows")]
mod registry {
    use super::SettingStore;
    use windows::core::w;
    use windows::Win32::System::Registry::{
        RegCloseKey, RegCreateKeyExW, RegQueryValueExW, RegSetValueExW, HKEY, HKEY_CURRENT_USER,
        KEY_READ, KEY_WRITE, REG_DWORD, REG_OPTION_NON_VOLATILE,
    };

    /// Focus Assist state under the current user hive.
    pub struct FocusAssistStore;

    fn open() -> Result<HKEY, String> {
        let mut key = HKEY::default();
        let status = unsafe {
            RegCreateKeyExW(
                HKEY_CURRENT_USER,
                w!("Software\\Microsoft\\Windows\\CurrentVersion\\QuietHours"),
                0,
                None,
                REG_OPTION_NON_VOLATILE,
                KEY_READ | KEY_WRITE,
                None,
                &mut key,
                None,
            )
        };
        if status.is_err() {
            return Err(format!("RegCreateKeyExW failed: {status:?}"));
        }
        Ok(key)
    }

    impl SettingStore for FocusAssistStore {
        fn read(&mut self) -> Result<u32, String> {
            let key = open()?;
            let mut data = [0u8; 4];
            let mut size = data.len() as u32;
            let status = unsafe {
                RegQueryValueExW(
                    key,
                    w!("Mode"),
                    None,
                    None,
                    Some(data.as_mut_ptr()),
                    Some(&mut size),
                )
            };
            unsafe {
                let _ = RegCloseKey(key);
            }
            if status.is_err() {
                // Missing value means Focus Assist off.
                return Ok(0);
            }
            Ok(u32::from_le_bytes(data))
        }

        fn write(&mut self, value: u32) -> Result<(), String> {
            let key = open()?;
            let data = value.to_le_bytes();
            let status =
                unsafe { RegSetValueExW(key, w!("Mode"), 0, REG_DWORD, Some(&data)) };
            unsafe {
                let _ = RegCloseKey(key);
            }
            if status.is_err() {
                return Err(format!("RegSetValueExW failed: {status:?}"));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex, MutexGuard};

    // The blocker is a process-wide singleton; serialize the tests that
    // construct one.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    fn serial() -> MutexGuard<'static, ()> {
        TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store shared between the blocker and the test so the test can
    /// simulate external writes.
    #[derive(Clone, Default)]
    struct SharedStore(Arc<Mutex<u32>>);

    impl SettingStore for SharedStore {
        fn read(&mut self) -> Result<u32, String> {
            Ok(*self.0.lock().unwrap())
        }

        fn write(&mut self, value: u32) -> Result<(), String> {
            *self.0.lock().unwrap() = value;
            Ok(())
        }
    }

    #[test]
    fn test_enable_writes_and_disable_restores() {
        let _guard = serial();
        let store = SharedStore(Arc::new(Mutex::new(7)));
        let view = store.clone();

        let mut blocker =
            NotificationBlocker::with_store(Box::new(store), DEFAULT_GRACE_PERIOD).unwrap();
        blocker.enable().unwrap();
        assert_eq!(*view.0.lock().unwrap(), ALARMS_ONLY);

        blocker.disable().unwrap();
        assert_eq!(*view.0.lock().unwrap(), 7);
    }

    #[test]
    fn test_drop_restores_setting() {
        let _guard = serial();
        let store = SharedStore(Arc::new(Mutex::new(1)));
        let view = store.clone();
        {
            let mut blocker =
                NotificationBlocker::with_store(Box::new(store), DEFAULT_GRACE_PERIOD).unwrap();
            blocker.enable().unwrap();
            assert_eq!(*view.0.lock().unwrap(), ALARMS_ONLY);
        }
        assert_eq!(*view.0.lock().unwrap(), 1);
    }

    #[test]
    fn test_singleton_per_process() {
        let _guard = serial();
        let first =
            NotificationBlocker::with_store(Box::<MemoryStore>::default(), DEFAULT_GRACE_PERIOD)
                .unwrap();
        let second =
            NotificationBlocker::with_store(Box::<MemoryStore>::default(), DEFAULT_GRACE_PERIOD);
        assert!(matches!(second, Err(NotificationError::AlreadyActive)));
        drop(first);

        // Released on drop.
        let third =
            NotificationBlocker::with_store(Box::<MemoryStore>::default(), DEFAULT_GRACE_PERIOD);
        assert!(third.is_ok());
    }

    #[test]
    fn test_grace_period_masks_recent_external_change() {
        let _guard = serial();
        let store = SharedStore(Arc::new(Mutex::new(0)));
        let external = store.clone();

        let mut blocker =
            NotificationBlocker::with_store(Box::new(store), Duration::from_millis(50)).unwrap();
        blocker.enable().unwrap();
        assert_eq!(blocker.check(), TamperState::Intact);

        // External change right after our write: grace, not tampering.
        *external.0.lock().unwrap() = 0;
        assert_eq!(blocker.check(), TamperState::GracePeriod);

        // Past the grace window the same difference is a verdict.
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(
            blocker.check(),
            TamperState::Tampered {
                expected: ALARMS_ONLY,
                found: 0
            }
        );
    }

    #[test]
    fn test_check_inactive_before_enable() {
        let _guard = serial();
        let mut blocker =
            NotificationBlocker::with_store(Box::<MemoryStore>::default(), DEFAULT_GRACE_PERIOD)
                .unwrap();
        assert_eq!(blocker.check(), TamperState::Inactive);
    }
}
