//! Frames and the depth-1 handoff slot between the capture thread and the UI.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use image::RgbImage;
use std::sync::Arc;

/// Immutable RGB frame at display resolution
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }

    /// Tightly packed RGB bytes, row-major
    pub fn as_rgb(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }
}

/// Called after each delivery to wake the consumer's event loop
pub type FrameNotifier = Arc<dyn Fn() + Send + Sync>;

/// Producer half. Owned by the capture thread.
#[derive(Clone)]
pub struct FrameSender {
    tx: Sender<Frame>,
    evict: Receiver<Frame>,
    notify: Option<FrameNotifier>,
}

/// Consumer half. Owned by the UI thread.
pub struct FrameReceiver {
    rx: Receiver<Frame>,
}

/// Create a slot holding at most one undisplayed frame
pub fn frame_slot(notify: Option<FrameNotifier>) -> (FrameSender, FrameReceiver) {
    let (tx, rx) = bounded(1);
    (
        FrameSender {
            tx,
            evict: rx.clone(),
            notify,
        },
        FrameReceiver { rx },
    )
}

impl FrameSender {
    /// Hand a frame over without waiting for the consumer.
    /// An undisplayed older frame is replaced.
    pub fn deliver(&self, frame: Frame) {
        let mut pending = frame;
        loop {
            match self.tx.try_send(pending) {
                Ok(()) => break,
                Err(TrySendError::Full(frame)) => {
                    let _ = self.evict.try_recv();
                    pending = frame;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
        if let Some(notify) = &self.notify {
            notify();
        }
    }
}

impl FrameReceiver {
    /// Latest undisplayed frame, if any
    pub fn take(&self) -> Option<Frame> {
        self.rx.try_iter().last()
    }

    /// Throw away anything still queued
    pub fn clear(&self) {
        while self.rx.try_recv().is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn solid(value: u8) -> Frame {
        Frame::new(RgbImage::from_pixel(2, 2, image::Rgb([value, value, value])))
    }

    #[test]
    fn test_newer_frame_supersedes_undisplayed_one() {
        let (tx, rx) = frame_slot(None);
        tx.deliver(solid(1));
        tx.deliver(solid(2));
        tx.deliver(solid(3));

        assert_eq!(rx.take(), Some(solid(3)));
        assert_eq!(rx.take(), None);
    }

    #[test]
    fn test_notifier_runs_per_delivery() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let (tx, _rx) = frame_slot(Some(Arc::new(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        })));

        tx.deliver(solid(1));
        tx.deliver(solid(2));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_clear_drops_pending() {
        let (tx, rx) = frame_slot(None);
        tx.deliver(solid(9));
        rx.clear();
        assert!(rx.take().is_none());
    }
}
