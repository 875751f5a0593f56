//! Latest-frame cache shared between the capture worker and readers
//!
//! A single slot guarded by one mutex. Publishing swaps in a new
//! `Arc<Frame>`; the lock is held only for that swap, never while pixels are
//! captured or converted. Readers clone the `Arc`, so a snapshot handed out
//! is never mutated by a later publish.

use std::sync::Arc;

use parking_lot::Mutex;

use super::frame::Frame;

#[derive(Debug, Default)]
struct Slot {
    frame:    Option<Arc<Frame>>,
    sequence: u64,
}

/// Single-slot, overwrite-on-write holder of the most recent frame
#[derive(Debug, Default)]
pub struct FrameBuffer {
    slot: Mutex<Slot>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current frame, returning the sequence number it received
    ///
    /// Sequence numbers keep increasing across [`FrameBuffer::clear`].
    pub fn publish(&self, mut frame: Frame) -> u64 {
        let mut slot = self.slot.lock();
        slot.sequence += 1;
        frame.set_sequence(slot.sequence);
        slot.frame = Some(Arc::new(frame));
        slot.sequence
    }

    /// Snapshot of the most recent frame, or `None` before the first publish
    pub fn read_latest(&self) -> Option<Arc<Frame>> {
        self.slot.lock().frame.clone()
    }

    /// Dimensions of the most recent frame
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.slot.lock().frame.as_ref().map(|frame| frame.dimensions())
    }

    /// Number of frames published over the buffer's lifetime
    pub fn sequence(&self) -> u64 {
        self.slot.lock().sequence
    }

    /// Drops the held frame; later reads return `None` until the next publish
    pub fn clear(&self) {
        self.slot.lock().frame = None;
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::capture::frame::PixelFormat;

    fn solid(width: u32, height: u32, value: u8) -> Frame {
        Frame::new(
            width,
            height,
            width as usize * 4,
            PixelFormat::Bgra8,
            vec![value; width as usize * height as usize * 4],
        )
        .unwrap()
    }

    #[test]
    fn test_empty_before_publish() {
        let buffer = FrameBuffer::new();
        assert!(buffer.read_latest().is_none());
        assert_eq!(buffer.dimensions(), None);
        assert_eq!(buffer.sequence(), 0);
    }

    #[test]
    fn test_publish_replaces_frame() {
        let buffer = FrameBuffer::new();
        assert_eq!(buffer.publish(solid(4, 4, 1)), 1);
        assert_eq!(buffer.publish(solid(8, 2, 2)), 2);

        let latest = buffer.read_latest().unwrap();
        assert_eq!(latest.dimensions(), (8, 2));
        assert_eq!(latest.sequence(), 2);
        assert_eq!(buffer.dimensions(), Some((8, 2)));
    }

    #[test]
    fn test_snapshot_survives_publish() {
        let buffer = FrameBuffer::new();
        buffer.publish(solid(2, 2, 10));
        let snapshot = buffer.read_latest().unwrap();

        buffer.publish(solid(2, 2, 20));

        assert!(snapshot.data().iter().all(|&b| b == 10));
        assert!(buffer.read_latest().unwrap().data().iter().all(|&b| b == 20));
    }

    #[test]
    fn test_clear_keeps_sequence() {
        let buffer = FrameBuffer::new();
        buffer.publish(solid(2, 2, 1));
        buffer.clear();

        assert!(buffer.read_latest().is_none());
        assert_eq!(buffer.publish(solid(2, 2, 1)), 2);
    }

    #[test]
    fn test_readers_never_see_mixed_frames() {
        let buffer = Arc::new(FrameBuffer::new());
        buffer.publish(solid(16, 16, 0));

        let writer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                for value in 1..=200u8 {
                    buffer.publish(solid(16, 16, value));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    for _ in 0..500 {
                        let frame = buffer.read_latest().unwrap();
                        let first = frame.data()[0];
                        assert!(frame.data().iter().all(|&b| b == first));
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(buffer.sequence(), 201);
    }
}
