// src/scan/camera.rs

use glob::glob;
use std::{
    ops::ControlFlow,
    path::{Path, PathBuf},
};
use tracing::{debug, error, info, warn};

use super::decode::{Frame, SymbolDecoder};
use super::{ScanSession, SymbolScan};
use crate::error::ScanError;

/// An opened capture device. Dropping the handle releases the device.
pub trait FrameGrabber {
    /// One blocking capture; `None` when the device produced no frame.
    fn grab(&mut self) -> Option<Frame>;
}

/// Something that can be opened to capture frames.
pub trait Camera {
    type Handle: FrameGrabber;

    fn open(&mut self) -> Result<Self::Handle, ScanError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScanState {
    #[default]
    Idle,
    Scanning,
    Stopped,
}

/// Result of one acquire/capture/decode/release cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationReport {
    /// The loop is not in `Scanning`; nothing was touched.
    NotScanning,
    /// The device could not be opened. Scanning has been switched off.
    DeviceError(String),
    /// The device opened but returned no frame.
    CaptureFailed,
    /// A frame was decoded; one entry per symbol found (possibly none).
    Scanned(Vec<SymbolScan>),
}

/// Live scanning as an explicit state machine.
///
/// Each `step` opens the camera, grabs one frame, handles its symbols and
/// releases the camera again before returning, whatever happened in between.
/// `stop` only takes effect before the next step; a running step always completes.
pub struct ScanLoop<C: Camera> {
    camera: C,
    state: ScanState,
    iterations: u64,
}

impl<C: Camera> ScanLoop<C> {
    pub fn new(camera: C) -> Self {
        Self {
            camera,
            state: ScanState::Idle,
            iterations: 0,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn start(&mut self) {
        info!("camera started");
        self.state = ScanState::Scanning;
    }

    pub fn stop(&mut self) {
        if self.state == ScanState::Scanning {
            info!(iterations = self.iterations, "camera stopped");
        }
        self.state = ScanState::Stopped;
    }

    pub fn step<D: SymbolDecoder>(&mut self, session: &mut ScanSession<D>) -> IterationReport {
        if self.state != ScanState::Scanning {
            return IterationReport::NotScanning;
        }

        let mut handle = match self.camera.open() {
            Ok(h) => h,
            Err(e) => {
                error!("Could not access webcam: {}", e);
                self.state = ScanState::Stopped;
                return IterationReport::DeviceError(e.to_string());
            }
        };
        self.iterations += 1;
        debug!(iteration = self.iterations, "scanning for QR codes");

        let report = match handle.grab() {
            Some(frame) => IterationReport::Scanned(session.scan_frame(&frame)),
            None => {
                warn!("Could not capture frame from camera");
                IterationReport::CaptureFailed
            }
        };
        drop(handle);
        report
    }

    /// Step until stopped, by the callback returning `Break` or by a device error.
    pub fn run<D, F>(&mut self, session: &mut ScanSession<D>, mut on_iteration: F)
    where
        D: SymbolDecoder,
        F: FnMut(&IterationReport) -> ControlFlow<()>,
    {
        if self.state == ScanState::Idle {
            self.start();
        }
        while self.state == ScanState::Scanning {
            let report = self.step(session);
            if on_iteration(&report).is_break() {
                self.stop();
            }
        }
    }
}

/// Replays image files from a directory as camera frames, one file per open.
/// Opening fails once every file has been handed out.
pub struct DirectoryCamera {
    frames: Vec<PathBuf>,
    next: usize,
}

impl DirectoryCamera {
    /// `pattern` is a glob relative to `dir`, e.g. `*.png`.
    pub fn new(dir: impl AsRef<Path>, pattern: &str) -> Result<Self, ScanError> {
        let full = format!("{}/{}", dir.as_ref().display(), pattern);
        let mut frames: Vec<PathBuf> = glob(&full)
            .map_err(|e| ScanError::Device(format!("bad frame pattern `{}`: {}", full, e)))?
            .filter_map(Result::ok)
            .filter(|p| p.is_file())
            .collect();
        frames.sort();
        info!(count = frames.len(), pattern = %full, "frame source ready");
        Ok(Self { frames, next: 0 })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

pub struct FileFrame {
    path: PathBuf,
}

impl FrameGrabber for FileFrame {
    fn grab(&mut self) -> Option<Frame> {
        match Frame::open(&self.path) {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!(path = %self.path.display(), "unreadable frame: {}", e);
                None
            }
        }
    }
}

impl Camera for DirectoryCamera {
    type Handle = FileFrame;

    fn open(&mut self) -> Result<FileFrame, ScanError> {
        let path = self
            .frames
            .get(self.next)
            .cloned()
            .ok_or_else(|| ScanError::Device("no frames left".into()))?;
        self.next += 1;
        Ok(FileFrame { path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{KeyStore, WriteMode};
    use crate::scan::decode::{Point, Symbol};
    use crate::scan::ScanOutcome;
    use anyhow::Result;
    use image::{GrayImage, Luma};
    use std::{cell::Cell, fs, rc::Rc};
    use tempfile::tempdir;

    /// Decodes each frame's top-left pixel value into a key `key<N>`.
    struct PixelKey;

    impl SymbolDecoder for PixelKey {
        fn decode(&self, frame: &Frame) -> Vec<Symbol> {
            let Some(value) = frame.pixel(0, 0).filter(|&v| v != 0) else {
                return Vec::new();
            };
            vec![Symbol {
                data: format!("key{}", value).into_bytes(),
                polygon: vec![Point { x: 0, y: 0 }],
            }]
        }
    }

    /// Counts opens and releases; fails to open after `budget` opens.
    struct CountingCamera {
        opened: Rc<Cell<u32>>,
        released: Rc<Cell<u32>>,
        budget: u32,
        pixel: u8,
    }

    struct CountingHandle {
        released: Rc<Cell<u32>>,
        pixel: u8,
    }

    impl FrameGrabber for CountingHandle {
        fn grab(&mut self) -> Option<Frame> {
            if self.pixel == 0 {
                return None;
            }
            Frame::from_luma(1, 1, vec![self.pixel])
        }
    }

    impl Drop for CountingHandle {
        fn drop(&mut self) {
            self.released.set(self.released.get() + 1);
        }
    }

    impl Camera for CountingCamera {
        type Handle = CountingHandle;

        fn open(&mut self) -> Result<CountingHandle, ScanError> {
            if self.opened.get() >= self.budget {
                return Err(ScanError::Device("unplugged".into()));
            }
            self.opened.set(self.opened.get() + 1);
            Ok(CountingHandle {
                released: Rc::clone(&self.released),
                pixel: self.pixel,
            })
        }
    }

    fn session(dir: &Path) -> ScanSession<PixelKey> {
        ScanSession::new(KeyStore::open(dir.join("k.csv"), WriteMode::Rewrite), PixelKey)
    }

    fn counting(budget: u32, pixel: u8) -> (CountingCamera, Rc<Cell<u32>>, Rc<Cell<u32>>) {
        let opened = Rc::new(Cell::new(0));
        let released = Rc::new(Cell::new(0));
        let cam = CountingCamera {
            opened: Rc::clone(&opened),
            released: Rc::clone(&released),
            budget,
            pixel,
        };
        (cam, opened, released)
    }

    #[test]
    fn idle_loop_does_not_touch_camera() -> Result<()> {
        let tmp = tempdir()?;
        let (cam, opened, _) = counting(10, 7);
        let mut scan = ScanLoop::new(cam);
        let mut s = session(tmp.path());

        assert_eq!(scan.state(), ScanState::Idle);
        assert_eq!(scan.step(&mut s), IterationReport::NotScanning);
        assert_eq!(opened.get(), 0);
        Ok(())
    }

    #[test]
    fn camera_released_every_iteration() -> Result<()> {
        let tmp = tempdir()?;
        let (cam, opened, released) = counting(10, 7);
        let mut scan = ScanLoop::new(cam);
        let mut s = session(tmp.path());

        scan.start();
        let first = scan.step(&mut s);
        assert_eq!(
            first,
            IterationReport::Scanned(vec![SymbolScan {
                outline: vec![Point { x: 0, y: 0 }],
                outcome: ScanOutcome::Saved("key7".into()),
            }])
        );
        assert_eq!((opened.get(), released.get()), (1, 1));

        match scan.step(&mut s) {
            IterationReport::Scanned(scans) => {
                assert_eq!(scans[0].outcome, ScanOutcome::Duplicate(Some("key7".into())))
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!((opened.get(), released.get()), (2, 2));
        assert_eq!(s.store().record_count()?, 1);
        Ok(())
    }

    #[test]
    fn capture_failure_keeps_scanning() -> Result<()> {
        let tmp = tempdir()?;
        let (cam, _, released) = counting(10, 0);
        let mut scan = ScanLoop::new(cam);
        let mut s = session(tmp.path());

        scan.start();
        assert_eq!(scan.step(&mut s), IterationReport::CaptureFailed);
        assert_eq!(scan.state(), ScanState::Scanning);
        assert_eq!(released.get(), 1);
        Ok(())
    }

    #[test]
    fn device_error_stops_scanning() -> Result<()> {
        let tmp = tempdir()?;
        let (cam, _, _) = counting(0, 7);
        let mut scan = ScanLoop::new(cam);
        let mut s = session(tmp.path());

        scan.start();
        assert!(matches!(scan.step(&mut s), IterationReport::DeviceError(_)));
        assert_eq!(scan.state(), ScanState::Stopped);
        assert_eq!(scan.step(&mut s), IterationReport::NotScanning);
        Ok(())
    }

    #[test]
    fn run_honours_stop_from_callback() -> Result<()> {
        let tmp = tempdir()?;
        let (cam, opened, released) = counting(100, 9);
        let mut scan = ScanLoop::new(cam);
        let mut s = session(tmp.path());

        let mut seen = 0;
        scan.run(&mut s, |_| {
            seen += 1;
            if seen == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert_eq!(scan.state(), ScanState::Stopped);
        assert_eq!(scan.iterations(), 3);
        assert_eq!((opened.get(), released.get()), (3, 3));
        Ok(())
    }

    #[test]
    fn directory_camera_replays_files_in_order() -> Result<()> {
        let tmp = tempdir()?;
        let frames = tmp.path().join("frames");
        fs::create_dir(&frames)?;
        GrayImage::from_pixel(2, 2, Luma([2])).save(frames.join("b.png"))?;
        GrayImage::from_pixel(2, 2, Luma([1])).save(frames.join("a.png"))?;
        GrayImage::from_pixel(2, 2, Luma([1])).save(frames.join("c.png"))?;
        fs::write(frames.join("notes.txt"), "ignored")?;

        let cam = DirectoryCamera::new(&frames, "*.png")?;
        assert_eq!(cam.len(), 3);
        let mut scan = ScanLoop::new(cam);
        let mut s = session(tmp.path());

        let mut reports = Vec::new();
        scan.run(&mut s, |r| {
            reports.push(r.clone());
            ControlFlow::Continue(())
        });

        let outcomes: Vec<ScanOutcome> = reports
            .iter()
            .filter_map(|r| match r {
                IterationReport::Scanned(scans) => Some(scans[0].outcome.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            outcomes,
            vec![
                ScanOutcome::Saved("key1".into()),
                ScanOutcome::Saved("key2".into()),
                ScanOutcome::Duplicate(Some("key1".into())),
            ]
        );
        assert!(matches!(
            reports.last(),
            Some(IterationReport::DeviceError(_))
        ));
        assert_eq!(scan.state(), ScanState::Stopped);
        Ok(())
    }
}
