use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use tokio::{task::JoinHandle, time::interval};

pub static METER: Meter = Meter::new();

/// Counters of streamed frames and time spent in inference.
#[derive(Default)]
pub struct Meter {
    streamed_frames: AtomicU64,
    inferences: AtomicU64,
    inference_micros: AtomicU64,
}

impl Meter {
    pub const fn new() -> Meter {
        Meter {
            streamed_frames: AtomicU64::new(0),
            inferences: AtomicU64::new(0),
            inference_micros: AtomicU64::new(0),
        }
    }

    pub fn tick_streamed(&self) {
        self.streamed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inference(&self, elapsed: Duration) {
        self.inferences.fetch_add(1, Ordering::Relaxed);
        self.inference_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn get_reset_streamed(&self) -> u64 {
        self.streamed_frames.swap(0, Ordering::Relaxed)
    }

    /// Number of inferences and their total duration since the last call.
    pub fn get_reset_inference(&self) -> (u64, Duration) {
        let count = self.inferences.swap(0, Ordering::Relaxed);
        let micros = self.inference_micros.swap(0, Ordering::Relaxed);
        (count, Duration::from_micros(micros))
    }
}

pub fn spawn_meter_logger() -> JoinHandle<()> {
    tokio::spawn(async {
        let mut log_interval = interval(Duration::from_secs(2));
        log_interval.tick().await;

        loop {
            let start = Instant::now();
            log_interval.tick().await;

            let streamed_frames = METER.get_reset_streamed();
            let (inferences, inference_time) = METER.get_reset_inference();
            let elapsed = start.elapsed().as_secs_f32();

            if streamed_frames > 0 {
                let fps = streamed_frames as f32 / elapsed;
                log::info!("Streamed frames per second: {fps:.2}")
            }
            if inferences > 0 {
                let avg_ms = inference_time.as_secs_f32() * 1000.0 / inferences as f32;
                log::info!("Average inference time: {avg_ms:.1} ms")
            }
        }
    })
}
