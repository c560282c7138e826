// THEORY:
// `rangescan_visualizer` sits on the consumer side of the rangefinder. It never
// drives the scan; it receives completed `DepthSnapshot`s and `PixelScan`
// events and turns them into something a person can look at.
//
// The `FrameBus` decouples rendering from whatever consumes the images. The
// simulation thread renders a frame and publishes it; any number of async
// subscribers (a PNG writer, a preview, a test) receive the same `Arc`'d image.
// A slow subscriber lags and skips frames rather than stalling the scan.

pub mod color_map;
pub mod ray_fade;

use image::RgbaImage;
use rangescan::DepthSnapshot;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

pub use color_map::{save_png, DepthColorMap, DepthRange};
pub use ray_fade::{ActiveRay, RayFadeTracker};

/// One rendered depth frame of one robot.
#[derive(Debug, Clone)]
pub struct DepthFrame {
    pub robot: String,
    /// 1-based index of the frame within that robot's scan.
    pub frame_index: u64,
    pub range: Option<DepthRange>,
    pub image: Arc<RgbaImage>,
}

#[derive(Clone)]
pub struct FrameBus {
    pub frames_tx: broadcast::Sender<DepthFrame>,
}

impl FrameBus {
    pub fn new(capacity: usize) -> Self {
        let (frames_tx, _) = broadcast::channel::<DepthFrame>(capacity.max(1));
        Self { frames_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DepthFrame> {
        self.frames_tx.subscribe()
    }

    /// Renders `snapshot` with `color_map` and publishes it. Returns how many
    /// subscribers received the frame; 0 when nobody is listening.
    pub fn publish(&self, robot: &str, frame_index: u64, snapshot: &DepthSnapshot, color_map: &DepthColorMap) -> usize {
        let frame = DepthFrame {
            robot: robot.to_string(),
            frame_index,
            range: DepthRange::from_snapshot(snapshot),
            image: Arc::new(color_map.render(snapshot)),
        };
        match self.frames_tx.send(frame) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!(robot, frame_index, "no frame subscribers");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rangescan::{ScanConfig, ScanEngine};

    fn empty_snapshot() -> DepthSnapshot {
        let config = ScanConfig {
            scan_line_width: 2,
            scan_line_count: 2,
            ..ScanConfig::default()
        };
        ScanEngine::from_config(&config).unwrap().buffer_snapshot()
    }

    #[tokio::test]
    async fn subscribers_share_each_published_frame() {
        let bus = FrameBus::new(4);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        let delivered = bus.publish("RobotRed", 1, &empty_snapshot(), &DepthColorMap::default());
        assert_eq!(delivered, 2);

        let fa = a.recv().await.unwrap();
        let fb = b.recv().await.unwrap();
        assert_eq!(fa.robot, "RobotRed");
        assert_eq!(fa.frame_index, 1);
        assert!(fa.range.is_none());
        assert!(Arc::ptr_eq(&fa.image, &fb.image));
    }

    #[test]
    fn publishing_without_subscribers_is_harmless() {
        let bus = FrameBus::new(1);
        assert_eq!(bus.publish("RobotBlue", 3, &empty_snapshot(), &DepthColorMap::default()), 0);
    }
}
