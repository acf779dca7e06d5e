// src/banner.rs
use log::{debug, info};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time;

/// What the banner shows right now.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BannerFrame {
    pub text: String,
    /// Length of the typing animation, 0.1s per character.
    pub duration_secs: f64,
}

impl BannerFrame {
    pub fn new(text: &str) -> Self {
        BannerFrame {
            text: text.to_string(),
            duration_secs: text.chars().count() as f64 * 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BannerSchedule {
    /// Delay between items on the first sweep.
    pub intro: Duration,
    /// Delay between items on every later sweep.
    pub cycle: Duration,
    /// Sweeps after the intro; the last frame stays up afterwards.
    pub rounds: u32,
}

/// Running banner rotation. The task ends when its rounds are spent, when
/// [`BannerHandle::stop`] is called, or when the handle is dropped.
pub struct BannerHandle {
    frames: watch::Receiver<BannerFrame>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl BannerHandle {
    pub fn current(&self) -> BannerFrame {
        self.frames.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BannerFrame> {
        self.frames.clone()
    }

    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let _ = self.task.await;
    }
}

/// Rotate through `items` on a timer task.
pub fn spawn(items: Vec<String>, schedule: BannerSchedule) -> BannerHandle {
    let first = BannerFrame::new(items.first().map(String::as_str).unwrap_or_default());
    let (tx, rx) = watch::channel(first);
    let (stop_tx, mut stop_rx) = oneshot::channel();

    let task = tokio::spawn(async move {
        if items.len() < 2 {
            return;
        }
        let mut position = 0;
        let mut sweep = 0;
        loop {
            let delay = if sweep == 0 { schedule.intro } else { schedule.cycle };
            tokio::select! {
                _ = &mut stop_rx => {
                    info!("Banner stopped");
                    return;
                }
                _ = time::sleep(delay) => {}
            }

            position += 1;
            if position == items.len() {
                position = 0;
                sweep += 1;
                if sweep > schedule.rounds {
                    debug!("Banner finished {} rounds", schedule.rounds);
                    return;
                }
            }
            tx.send_replace(BannerFrame::new(&items[position]));
        }
    });

    BannerHandle {
        frames: rx,
        stop: Some(stop_tx),
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items() -> Vec<String> {
        ["Suzlon", "Tesla", "Amazon"].map(String::from).to_vec()
    }

    fn schedule(rounds: u32) -> BannerSchedule {
        BannerSchedule {
            intro: Duration::from_millis(500),
            cycle: Duration::from_millis(1500),
            rounds,
        }
    }

    #[test]
    fn animation_length_follows_text_length() {
        let frame = BannerFrame::new("Microsoft");
        assert!((frame.duration_secs - 0.9).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn intro_sweep_then_slower_cycles() {
        let banner = spawn(items(), schedule(10));
        let mut frames = banner.subscribe();
        assert_eq!(banner.current().text, "Suzlon");

        let started = time::Instant::now();
        frames.changed().await.unwrap();
        assert_eq!(frames.borrow_and_update().text, "Tesla");
        assert_eq!(started.elapsed(), Duration::from_millis(500));

        frames.changed().await.unwrap();
        assert_eq!(frames.borrow_and_update().text, "Amazon");

        frames.changed().await.unwrap();
        assert_eq!(frames.borrow_and_update().text, "Suzlon");
        assert_eq!(started.elapsed(), Duration::from_millis(1500));

        // later sweeps use the slower cadence
        frames.changed().await.unwrap();
        assert_eq!(frames.borrow_and_update().text, "Tesla");
        assert_eq!(started.elapsed(), Duration::from_millis(3000));

        banner.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_rotation() {
        let banner = spawn(items(), schedule(1000));
        let frames = banner.subscribe();
        banner.stop().await;

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(frames.borrow().text, "Suzlon");
    }

    #[tokio::test(start_paused = true)]
    async fn finishes_after_configured_rounds() {
        let banner = spawn(items(), schedule(1));
        let mut frames = banner.subscribe();
        // intro (3 x 0.5s) plus one full cycle (3 x 1.5s)
        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(frames.borrow_and_update().text, "Amazon");
        assert!(frames.changed().await.is_err());
    }
}
