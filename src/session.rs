//! Camera session: exclusive owner of the single camera handle.
//!
//! The device handle, the active flag and the frame counter live in one
//! `SessionState` behind one mutex. Every operation that touches any of
//! them (toggle, read, stream iteration, snapshot, live analysis) takes the
//! guard first. There is no read/write distinction.
//!
//! Invariants:
//! - Active iff a handle is held; exactly one handle while Active, none while Inactive.
//! - Activation always opens a fresh handle; deactivation drops it.
//! - Device open and device read run under the guard, so a slow device
//!   stalls every other camera operation until it returns.

use std::sync::{Mutex, MutexGuard};

use crate::camera::{CameraDevice, CaptureSettings, DeviceOpener, SystemOpener};
use crate::error::{VisionError, VisionResult};
use crate::frame::Frame;

/// State behind the session guard.
pub struct SessionState {
    device: Option<Box<dyn CameraDevice>>,
    frame_counter: u64,
}

impl SessionState {
    fn new() -> Self {
        Self {
            device: None,
            frame_counter: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.device.is_some()
    }

    /// Read the next frame. `NotActive` without touching any device.
    pub fn read(&mut self) -> VisionResult<Frame> {
        let device = self.device.as_mut().ok_or(VisionError::NotActive)?;
        device.read_frame()
    }

    /// Advance the frame counter and report whether this frame is the
    /// `frame_skip`-th one. `frame_skip` of 0 or 1 forwards every frame.
    pub fn advance_counter(&mut self, frame_skip: u64) -> bool {
        self.frame_counter = self.frame_counter.wrapping_add(1);
        self.frame_counter % frame_skip.max(1) == 0
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }
}

/// The camera session manager.
///
/// Share it behind an `Arc`; all methods take `&self`.
pub struct CameraSession {
    opener: Box<dyn DeviceOpener>,
    settings: CaptureSettings,
    state: Mutex<SessionState>,
}

impl CameraSession {
    /// A session over real devices (and `stub://` synthetic ones).
    pub fn new(settings: CaptureSettings) -> Self {
        Self::with_opener(settings, SystemOpener)
    }

    pub fn with_opener<O: DeviceOpener + 'static>(settings: CaptureSettings, opener: O) -> Self {
        Self {
            opener: Box::new(opener),
            settings,
            state: Mutex::new(SessionState::new()),
        }
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    /// Acquire the session guard.
    pub fn lock(&self) -> VisionResult<MutexGuard<'_, SessionState>> {
        self.state.lock().map_err(|_| VisionError::SessionPoisoned)
    }

    pub fn is_active(&self) -> VisionResult<bool> {
        Ok(self.lock()?.is_active())
    }

    /// Flip Active/Inactive and return the new state.
    ///
    /// Activation opens the device; on failure the session stays Inactive
    /// and `DeviceUnavailable` is returned. Deactivation releases the handle
    /// unconditionally.
    pub fn toggle(&self) -> VisionResult<bool> {
        let mut state = self.lock()?;
        match state.device.take() {
            Some(device) => {
                log::info!("camera session: deactivating {}", device.describe());
                drop(device);
                Ok(false)
            }
            None => {
                let device = self.opener.open(&self.settings).map_err(|err| {
                    log::warn!("camera session: activation failed: {}", err);
                    match err {
                        VisionError::DeviceUnavailable(_) => err,
                        other => VisionError::device_unavailable(other.to_string()),
                    }
                })?;
                log::info!("camera session: activated {}", device.describe());
                state.device = Some(device);
                Ok(true)
            }
        }
    }

    /// Release the handle if one is held. Returns whether anything was released.
    pub fn deactivate(&self) -> VisionResult<bool> {
        let mut state = self.lock()?;
        match state.device.take() {
            Some(device) => {
                log::info!("camera session: deactivating {}", device.describe());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Read the next frame under the guard.
    pub fn read(&self) -> VisionResult<Frame> {
        self.lock()?.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counters {
        opens: AtomicUsize,
        releases: AtomicUsize,
        reads: AtomicUsize,
    }

    struct CountingDevice {
        counters: Arc<Counters>,
    }

    impl CameraDevice for CountingDevice {
        fn read_frame(&mut self) -> VisionResult<Frame> {
            self.counters.reads.fetch_add(1, Ordering::SeqCst);
            Ok(RgbImage::new(4, 4))
        }

        fn describe(&self) -> String {
            "counting".to_string()
        }
    }

    impl Drop for CountingDevice {
        fn drop(&mut self) {
            self.counters.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct CountingOpener {
        counters: Arc<Counters>,
        fail: bool,
    }

    impl DeviceOpener for CountingOpener {
        fn open(&self, _settings: &CaptureSettings) -> VisionResult<Box<dyn CameraDevice>> {
            if self.fail {
                return Err(VisionError::device_unavailable("no such device"));
            }
            self.counters.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountingDevice {
                counters: self.counters.clone(),
            }))
        }
    }

    fn session(fail: bool) -> (CameraSession, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let opener = CountingOpener {
            counters: counters.clone(),
            fail,
        };
        (
            CameraSession::with_opener(CaptureSettings::default(), opener),
            counters,
        )
    }

    fn open_handles(counters: &Counters) -> usize {
        counters.opens.load(Ordering::SeqCst) - counters.releases.load(Ordering::SeqCst)
    }

    #[test]
    fn toggle_cycles_never_leak_handles() {
        let (session, counters) = session(false);
        for cycle in 1..=25 {
            assert!(session.toggle().unwrap());
            assert_eq!(open_handles(&counters), 1);
            assert!(!session.toggle().unwrap());
            assert_eq!(open_handles(&counters), 0);
            assert_eq!(counters.opens.load(Ordering::SeqCst), cycle);
        }
    }

    #[test]
    fn read_while_inactive_never_touches_device() {
        let (session, counters) = session(false);
        assert!(matches!(session.read(), Err(VisionError::NotActive)));

        session.toggle().unwrap();
        session.toggle().unwrap();
        assert!(matches!(session.read(), Err(VisionError::NotActive)));
        assert_eq!(counters.reads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn read_while_active_returns_frames() {
        let (session, counters) = session(false);
        session.toggle().unwrap();
        let frame = session.read().unwrap();
        assert_eq!(frame.dimensions(), (4, 4));
        assert_eq!(counters.reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_open_leaves_session_inactive() {
        let (session, counters) = session(true);
        let err = session.toggle().unwrap_err();
        assert!(matches!(err, VisionError::DeviceUnavailable(_)));
        assert!(!session.is_active().unwrap());
        assert_eq!(open_handles(&counters), 0);
        // A later toggle tries to open again rather than flipping to Inactive.
        assert!(session.toggle().is_err());
        assert!(!session.is_active().unwrap());
    }

    #[test]
    fn drop_releases_handle() {
        let (session, counters) = session(false);
        session.toggle().unwrap();
        drop(session);
        assert_eq!(open_handles(&counters), 0);
    }

    #[test]
    fn deactivate_is_idempotent() {
        let (session, counters) = session(false);
        assert!(!session.deactivate().unwrap());
        session.toggle().unwrap();
        assert!(session.deactivate().unwrap());
        assert!(!session.deactivate().unwrap());
        assert_eq!(open_handles(&counters), 0);
    }

    #[test]
    fn counter_forwards_every_nth_frame() {
        let mut state = SessionState::new();
        let forwarded = (0..9).filter(|_| state.advance_counter(2)).count();
        assert_eq!(forwarded, 4);
        assert_eq!(state.frame_counter(), 9);

        let mut state = SessionState::new();
        assert!((0..5).all(|_| state.advance_counter(1)));
        let mut state = SessionState::new();
        assert!(state.advance_counter(0));
    }

    #[test]
    fn concurrent_toggles_keep_single_handle() {
        let (session, counters) = session(false);
        let session = Arc::new(session);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let session = session.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        session.toggle().unwrap();
                        let _ = session.read();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        // 400 toggles in total: an even count lands back on Inactive.
        assert!(!session.is_active().unwrap());
        assert_eq!(open_handles(&counters), 0);
    }
}
